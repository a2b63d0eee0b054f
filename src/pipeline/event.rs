/// Index of a rule node inside a [`RuleGraph`](crate::pipeline::RuleGraph).
pub type RuleId = usize;

/// Who sent a named value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
	/// The record walker, i.e. a literal read from the input stream.
	Stream,

	/// Another rule node.
	Rule(RuleId),
}

/// A named value travelling through the rule graph.
///
/// The epochs are owned by the record walker. Rule nodes only compare them
/// with the last values they saw to detect record and entity boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedValue {
	pub name: String,
	pub value: String,
	pub source: Source,
	pub record: u64,
	pub entity: u64,
}

impl NamedValue {
	/// A value read from the input stream.
	pub fn from_stream(name: &str, value: &str, record: u64, entity: u64) -> Self {
		NamedValue {
			name: name.to_string(),
			value: value.to_string(),
			source: Source::Stream,
			record,
			entity,
		}
	}
}

/// A plain name/value pair, as written to an output record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
	pub name: String,
	pub value: String,
}

impl Literal {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Literal {
			name: name.into(),
			value: value.into(),
		}
	}

	/// Turn this literal into a named value sent by `rule`.
	pub fn sent_by(self, rule: RuleId, record: u64, entity: u64) -> NamedValue {
		NamedValue {
			name: self.name,
			value: self.value,
			source: Source::Rule(rule),
			record,
			entity,
		}
	}
}

/// Where a rule node's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
	/// Out of the graph, to whoever drives it.
	Output,

	/// Into another rule node.
	Rule(RuleId),
}
