//! Configuration loading and parsing for morph.
//!
//! This module handles:
//! - TOML rule file parsing
//! - Directory cascade discovery
//! - Config merging
//! - Building the rule graph from a merged config

pub mod builder;
pub mod cascade;
pub mod parser;
pub mod types;

pub use builder::{FLUSH_WITH_RECORD, build_function, build_morph};
pub use cascade::{
	CONFIG_FILE_NAME, discover_configs, load_config_file, load_merged_config, merge_configs,
	user_config_path,
};
pub use parser::{parse_config_file, parse_config_str};
pub use types::{
	CollectKind, Config, FunctionConfig, LoadedConfig, MapTable, MergedConfig, RuleConfig,
	RuleWithSource,
};

/// Template written by `morph --init`.
pub fn generate_init_template() -> String {
	r##"# morph configuration
# Rules turn record literals into output literals. Sources are path patterns:
# `?` matches one character, `*` any run, `a|b` alternatives, `[ab]` classes.

# Stop looking for .morph.toml files in parent directories.
root = true

# Skip ~/.morph.toml when this variable is truthy.
# root-config-lookup-disable-env-var = "CI"

# Separator between entity and literal names.
# entity-marker = "."

[maps.languages]
ger = "German"
eng = "English"

# Copy the record identifier.
[[rules]]
source = "_id"
name = "id"

# A data rule with a function chain.
[[rules]]
source = "245.a"
name = "title"
functions = [{ kind = "trim" }]

[[rules]]
source = "041.a"
name = "language"
functions = [{ kind = "lookup", map = "languages", default = "other" }]

# A collector combining several data rules.
[[rules]]
collect = "combine"
name = "author"
value = "${last}, ${first}"
flush-with = "100"
reset = true

[[rules.data]]
source = "100.a"
name = "first"

[[rules.data]]
source = "100.b"
name = "last"
"##
	.to_string()
}
