use crate::error::MorphError;
use crate::pipeline::{CaseMode, IsbnForm, UniquePart, UniqueScope};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A named `key -> value` table.
pub type MapTable = BTreeMap<String, String>;

/// Top-level configuration from a `.morph.toml` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
	/// If true, stop directory cascade and jump directly to ~/.morph.toml.
	#[serde(default)]
	pub root: bool,

	/// Environment variable name that, if truthy, skips ~/.morph.toml lookup.
	/// Useful for CI environments.
	#[serde(default)]
	pub root_config_lookup_disable_env_var: Option<String>,

	/// Separator between entity names and literal names in source paths.
	#[serde(default)]
	pub entity_marker: Option<String>,

	/// Tables used by `lookup` and `set-replace` functions.
	#[serde(default)]
	pub maps: BTreeMap<String, MapTable>,

	/// Rules, registered in file order.
	#[serde(default)]
	pub rules: Vec<RuleConfig>,
}

/// Collector kinds accepted by `collect = "..."`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectKind {
	Combine,
	Concat,
	Choose,
	All,
	Any,
	None,
	Equals,
}

impl CollectKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			CollectKind::Combine => "combine",
			CollectKind::Concat => "concat",
			CollectKind::Choose => "choose",
			CollectKind::All => "all",
			CollectKind::Any => "any",
			CollectKind::None => "none",
			CollectKind::Equals => "equals",
		}
	}
}

/// A data rule (`source`) or a collector (`collect`) with nested data rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleConfig {
	/// Wildcard path pattern the rule listens to.
	pub source: Option<String>,

	/// Collector kind (mutually exclusive with source).
	pub collect: Option<CollectKind>,

	/// Output name. Collectors may use `${var}` references.
	pub name: Option<String>,

	/// Output value template of collectors.
	pub value: Option<String>,

	/// Functions applied in order to every value of a data rule.
	#[serde(default)]
	pub functions: Vec<FunctionConfig>,

	/// Inputs of a collector.
	#[serde(default)]
	pub data: Vec<RuleConfig>,

	/// Rule whose output gates the collector.
	#[serde(default, rename = "if")]
	pub condition: Option<Box<RuleConfig>>,

	/// Functions applied to the collector's output.
	#[serde(default)]
	pub postprocess: Vec<FunctionConfig>,

	#[serde(default)]
	pub reset: bool,

	#[serde(default)]
	pub same_entity: bool,

	/// `record` or an entity path pattern.
	pub flush_with: Option<String>,

	/// Defaults to true.
	pub flush_incomplete: Option<bool>,

	pub delimiter: Option<String>,
	pub prefix: Option<String>,
	pub postfix: Option<String>,
}

/// A function stage, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum FunctionConfig {
	Trim,
	Case {
		to: CaseMode,
	},
	Compose {
		#[serde(default)]
		prefix: String,
		#[serde(default)]
		postfix: String,
	},
	Constant {
		value: String,
	},
	Replace {
		pattern: String,
		with: String,
	},
	Regexp {
		pattern: String,
		format: Option<String>,
	},
	Substring {
		#[serde(default)]
		start: usize,
		end: Option<usize>,
	},
	/// Looks the value up in a named map or in inline `entries`.
	Lookup {
		map: Option<String>,
		#[serde(default)]
		entries: MapTable,
		default: Option<String>,
	},
	SetReplace {
		map: String,
	},
	Equals {
		value: String,
	},
	NotEquals {
		value: String,
	},
	Isbn {
		#[serde(default)]
		to: IsbnForm,
		#[serde(default)]
		verify_check_digit: bool,
		error_string: Option<String>,
	},
	Occurrence {
		only: Option<String>,
		format: Option<String>,
		#[serde(default)]
		same_entity: bool,
	},
	Unique {
		#[serde(default)]
		scope: UniqueScope,
		#[serde(default)]
		part: UniquePart,
	},
	Count,
}

/// A loaded configuration with its source path for debugging/display.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
	/// The parsed configuration.
	pub config: Config,

	/// The path this config was loaded from.
	pub path: PathBuf,
}

/// Merged configuration from multiple config files in the cascade.
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
	/// All rules from all configs, most specific file first.
	pub rules: Vec<RuleWithSource>,

	/// Maps by name; the most specific file wins on a clash.
	pub maps: BTreeMap<String, MapTable>,

	/// Entity marker of the most specific file that sets one.
	pub entity_marker: Option<String>,
}

/// A rule with its source config path for debugging/display.
#[derive(Debug, Clone)]
pub struct RuleWithSource {
	/// The rule itself.
	pub rule: RuleConfig,

	/// The config file this rule came from.
	pub source: PathBuf,
}

impl RuleConfig {
	/// Check the shape of this rule and everything nested in it.
	pub fn validate(&self) -> Result<(), MorphError> {
		match (&self.source, &self.collect) {
			(Some(_), Some(_)) => {
				return Err(MorphError::MutuallyExclusive {
					option1: "source".to_string(),
					option2: "collect".to_string(),
				});
			}
			(None, None) => {
				return Err(MorphError::InvalidRule {
					reason: "rule needs either 'source' or 'collect'".to_string(),
				});
			}
			(Some(source), None) => {
				let collector_only = [
					("data", !self.data.is_empty()),
					("if", self.condition.is_some()),
					("flush-with", self.flush_with.is_some()),
					("postprocess", !self.postprocess.is_empty()),
				];
				if let Some((field, _)) = collector_only.iter().find(|(_, set)| *set) {
					return Err(MorphError::InvalidRule {
						reason: format!("'{field}' on data rule '{source}' requires 'collect'"),
					});
				}
			}
			(None, Some(kind)) => {
				if self.data.is_empty() {
					return Err(MorphError::InvalidRule {
						reason: format!("'{}' collector without data rules", kind.as_str()),
					});
				}
				if !self.functions.is_empty() {
					return Err(MorphError::InvalidRule {
						reason: format!(
							"'{}' collector takes 'postprocess', not 'functions'",
							kind.as_str()
						),
					});
				}
			}
		}

		for rule in &self.data {
			rule.validate()?;
		}
		if let Some(condition) = &self.condition {
			condition.validate()?;
		}
		Ok(())
	}
}

impl Config {
	/// Validate all rules in this config.
	pub fn validate(&self) -> Result<(), MorphError> {
		for rule in &self.rules {
			rule.validate()?;
		}
		Ok(())
	}
}
