use std::path::PathBuf;

/// Library-level structured errors for morph.
///
/// Use `thiserror` for structured errors that library consumers can match on.
/// The CLI binary wraps these with `anyhow` for rich context chains.
#[derive(Debug, thiserror::Error)]
pub enum MorphError {
	#[error("Config file not found: {path}")]
	ConfigNotFound { path: PathBuf },

	#[error("Failed to read config file: {path}")]
	ConfigReadError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse config file: {path}")]
	ConfigParseError {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Mutually exclusive options: {option1} and {option2}")]
	MutuallyExclusive { option1: String, option2: String },

	#[error("Invalid rule: {reason}")]
	InvalidRule { reason: String },

	#[error("Keys cannot be added during matching: {key}")]
	MatcherFrozen { key: String },

	#[error("Key '{key}' already in trie")]
	DuplicateKey { key: String },

	#[error("Empty keys cannot be registered")]
	EmptyKey,

	#[error("Unterminated character class in pattern: {pattern}")]
	UnterminatedClass { pattern: String },

	#[error("Empty character class in pattern: {pattern}")]
	EmptyClass { pattern: String },

	#[error("Invalid regex pattern in rule: {pattern}")]
	InvalidRegex {
		pattern: String,
		#[source]
		source: regex::Error,
	},

	#[error("Invalid occurrence filter: {only}")]
	InvalidOccurrenceFilter { only: String },

	#[error("Invalid ISBN: {value}")]
	InvalidIsbn { value: String },

	#[error("Unknown map: {name}")]
	UnknownMap { name: String },

	#[error("Unknown rule node: {id}")]
	UnknownNode { id: usize },

	#[error("Entity starts and ends are not balanced")]
	UnbalancedEntities,

	#[error("Event outside of a record")]
	NoOpenRecord,

	#[error("Feedback loop while dispatching '{name}'")]
	FeedbackLoop { name: String },

	#[error("Rule node '{node}' failed on '{name}'")]
	NodeFailed {
		node: String,
		name: String,
		#[source]
		source: Box<MorphError>,
	},

	#[error("Failed to decode record on line {line}")]
	RecordDecodeError {
		line: usize,
		#[source]
		source: serde_json::Error,
	},

	#[error("Failed to resolve home directory")]
	HomeDirectoryNotFound,
}

/// Result type alias using MorphError.
pub type Result<T> = std::result::Result<T, MorphError>;
