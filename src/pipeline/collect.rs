use crate::pipeline::event::{Literal, NamedValue, RuleId, Source};
use crate::pipeline::state::{self, Accumulate, CollectFlags, RuleState};
use crate::pipeline::template;
use std::collections::{HashMap, HashSet};

const DEFAULT_NAME: &str = "";
const DEFAULT_VALUE: &str = "true";

/// Rule nodes that have reported since the last clear.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
	sources: Vec<RuleId>,
	left: HashSet<RuleId>,
}

impl SourceSet {
	fn add(&mut self, source: RuleId) {
		self.sources.push(source);
		self.left.insert(source);
	}

	fn mark(&mut self, source: Source) {
		if let Source::Rule(id) = source {
			self.left.remove(&id);
		}
	}

	fn all_seen(&self) -> bool {
		self.left.is_empty()
	}

	fn reset(&mut self) {
		self.left.extend(self.sources.iter().copied());
	}
}

/// The accumulating part of a collector.
#[derive(Debug, Clone)]
pub enum Collector {
	/// Waits for every source, then formats name and value from `${var}` templates.
	Combine {
		sources: SourceSet,
		variables: HashMap<String, String>,
	},

	/// Joins every received value.
	Concat {
		delimiter: String,
		prefix: String,
		postfix: String,
		values: Vec<String>,
	},

	/// Keeps the value of the highest priority source, i.e. the one added first.
	Choose {
		priorities: HashMap<RuleId, usize>,
		chosen: Option<(usize, String, String)>,
	},

	/// Fires once every source has reported.
	All { sources: SourceSet },

	/// Fires once anything was received.
	Any { received: bool, emitted: bool },

	/// Fires at flush time if nothing was received.
	None { received: bool, emitted: bool },

	/// Fires with the shared value once every source reported the same value.
	EqualsFilter {
		sources: SourceSet,
		values: Vec<String>,
	},
}

impl Collector {
	pub fn combine() -> Self {
		Collector::Combine {
			sources: SourceSet::default(),
			variables: HashMap::new(),
		}
	}

	pub fn concat(delimiter: &str, prefix: &str, postfix: &str) -> Self {
		Collector::Concat {
			delimiter: delimiter.to_string(),
			prefix: prefix.to_string(),
			postfix: postfix.to_string(),
			values: Vec::new(),
		}
	}

	pub fn choose() -> Self {
		Collector::Choose {
			priorities: HashMap::new(),
			chosen: None,
		}
	}

	pub fn all() -> Self {
		Collector::All {
			sources: SourceSet::default(),
		}
	}

	pub fn any() -> Self {
		Collector::Any {
			received: false,
			emitted: false,
		}
	}

	pub fn none() -> Self {
		Collector::None {
			received: false,
			emitted: false,
		}
	}

	pub fn equals_filter() -> Self {
		Collector::EqualsFilter {
			sources: SourceSet::default(),
			values: Vec::new(),
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Collector::Combine { .. } => "combine",
			Collector::Concat { .. } => "concat",
			Collector::Choose { .. } => "choose",
			Collector::All { .. } => "all",
			Collector::Any { .. } => "any",
			Collector::None { .. } => "none",
			Collector::EqualsFilter { .. } => "equals",
		}
	}

	/// Collectors that are never complete on their own and rely on a flush.
	pub fn is_flushing(&self) -> bool {
		matches!(
			self,
			Collector::Concat { .. }
				| Collector::Choose { .. }
				| Collector::Any { .. }
				| Collector::None { .. }
		)
	}

	fn add_source(&mut self, source: RuleId) {
		match self {
			Collector::Combine { sources, .. }
			| Collector::All { sources }
			| Collector::EqualsFilter { sources, .. } => sources.add(source),
			Collector::Choose { priorities, .. } => {
				let priority = priorities.len();
				priorities.entry(source).or_insert(priority);
			}
			Collector::Concat { .. } | Collector::Any { .. } | Collector::None { .. } => {}
		}
	}
}

/// A collector together with its labels and the shared rule state.
#[derive(Debug, Clone)]
pub struct CollectNode {
	pub name: Option<String>,
	pub value: Option<String>,
	pub collector: Collector,
	pub state: RuleState,
}

impl CollectNode {
	pub fn new(
		name: Option<String>,
		value: Option<String>,
		collector: Collector,
		flags: CollectFlags,
	) -> Self {
		CollectNode {
			name,
			value,
			collector,
			state: RuleState::new(flags),
		}
	}

	pub fn add_source(&mut self, source: RuleId) {
		self.collector.add_source(source);
		Labelled::new(&self.name, &self.value, &mut self.collector).clear();
	}

	pub fn receive(&mut self, id: RuleId, event: &NamedValue) -> Option<NamedValue> {
		let mut acc = Labelled::new(&self.name, &self.value, &mut self.collector);
		let emitted = state::receive(&mut self.state, &mut acc, event);
		self.sent_by(id, emitted)
	}

	pub fn flush(&mut self, id: RuleId, record: u64, entity: u64) -> Option<NamedValue> {
		let mut acc = Labelled::new(&self.name, &self.value, &mut self.collector);
		let emitted = state::flush(&mut self.state, &mut acc, record, entity);
		self.sent_by(id, emitted)
	}

	fn sent_by(&self, id: RuleId, emitted: Option<Literal>) -> Option<NamedValue> {
		let epochs = self.state.epochs();
		emitted.map(|literal| literal.sent_by(id, epochs.record(), epochs.entity()))
	}
}

/// A collector borrowed together with the labels it emits under.
struct Labelled<'a> {
	name: Option<&'a str>,
	value: Option<&'a str>,
	collector: &'a mut Collector,
}

impl<'a> Labelled<'a> {
	fn new(name: &'a Option<String>, value: &'a Option<String>, collector: &'a mut Collector) -> Self {
		Labelled {
			name: name.as_deref(),
			value: value.as_deref(),
			collector,
		}
	}

	fn name_or_default(&self) -> String {
		self.name.unwrap_or(DEFAULT_NAME).to_string()
	}

	fn value_or_default(&self) -> String {
		self.value.unwrap_or(DEFAULT_VALUE).to_string()
	}
}

impl Accumulate for Labelled<'_> {
	fn accumulate(&mut self, event: &NamedValue) {
		match &mut *self.collector {
			Collector::Combine { sources, variables } => {
				variables.insert(event.name.clone(), event.value.clone());
				sources.mark(event.source);
			}
			Collector::Concat { values, .. } => values.push(event.value.clone()),
			Collector::Choose { priorities, chosen } => {
				let priority = match event.source {
					Source::Rule(id) => priorities.get(&id).copied().unwrap_or(usize::MAX),
					Source::Stream => usize::MAX,
				};
				if chosen.as_ref().is_none_or(|(best, _, _)| priority <= *best) {
					*chosen = Some((priority, event.name.clone(), event.value.clone()));
				}
			}
			Collector::All { sources } => sources.mark(event.source),
			Collector::Any { received, .. } | Collector::None { received, .. } => *received = true,
			Collector::EqualsFilter { sources, values } => {
				values.push(event.value.clone());
				sources.mark(event.source);
			}
		}
	}

	fn is_complete(&self) -> bool {
		match &*self.collector {
			Collector::Combine { sources, .. }
			| Collector::All { sources }
			| Collector::EqualsFilter { sources, .. } => sources.all_seen(),
			Collector::Any { received, .. } => *received,
			Collector::Concat { .. } | Collector::Choose { .. } | Collector::None { .. } => false,
		}
	}

	fn clear(&mut self) {
		match &mut *self.collector {
			Collector::Combine { sources, variables } => {
				sources.reset();
				variables.clear();
			}
			Collector::Concat { values, .. } => values.clear(),
			Collector::Choose { chosen, .. } => *chosen = None,
			Collector::All { sources } => sources.reset(),
			Collector::Any { received, emitted } | Collector::None { received, emitted } => {
				*received = false;
				*emitted = false;
			}
			Collector::EqualsFilter { sources, values } => {
				sources.reset();
				values.clear();
			}
		}
	}

	fn emit(&mut self) -> Option<Literal> {
		let name = self.name_or_default();
		let value = self.value_or_default();
		match &mut *self.collector {
			Collector::Combine { variables, .. } => Some(Literal::new(
				template::format(self.name.unwrap_or(DEFAULT_NAME), variables),
				template::format(self.value.unwrap_or(DEFAULT_NAME), variables),
			)),
			Collector::Concat {
				delimiter,
				prefix,
				postfix,
				values,
			} => {
				if values.is_empty() {
					return None;
				}
				Some(Literal::new(
					name,
					format!("{prefix}{}{postfix}", values.join(delimiter)),
				))
			}
			Collector::Choose { chosen, .. } => chosen.as_ref().map(|(_, chosen_name, chosen_value)| {
				Literal::new(
					self.name.map_or_else(|| chosen_name.clone(), str::to_string),
					chosen_value.clone(),
				)
			}),
			Collector::All { .. } => Some(Literal::new(name, value)),
			Collector::Any { received, emitted } => {
				if !*received || *emitted {
					return None;
				}
				*emitted = true;
				Some(Literal::new(name, value))
			}
			Collector::None { received, emitted } => {
				if *received || *emitted {
					return None;
				}
				*emitted = true;
				Some(Literal::new(name, value))
			}
			Collector::EqualsFilter { values, .. } => {
				let first = values.first()?;
				if values.iter().all(|v| v == first) {
					Some(Literal::new(name, first.clone()))
				} else {
					None
				}
			}
		}
	}

	fn emits_without_input(&self) -> bool {
		matches!(self.collector, Collector::None { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn from(rule: RuleId, name: &str, value: &str, record: u64) -> NamedValue {
		NamedValue {
			name: name.to_string(),
			value: value.to_string(),
			source: Source::Rule(rule),
			record,
			entity: 0,
		}
	}

	fn node(name: Option<&str>, value: Option<&str>, collector: Collector, flags: CollectFlags) -> CollectNode {
		let mut node = CollectNode::new(
			name.map(str::to_string),
			value.map(str::to_string),
			collector,
			flags,
		);
		node.add_source(1);
		node.add_source(2);
		node
	}

	fn waiting() -> CollectFlags {
		CollectFlags {
			wait_for_flush: true,
			..Default::default()
		}
	}

	fn literal(event: Option<NamedValue>) -> Option<(String, String)> {
		event.map(|e| (e.name, e.value))
	}

	#[test]
	fn test_combine_waits_for_all_sources() {
		let mut combine = node(
			Some("${b}-${a}"),
			Some("${a}${b}"),
			Collector::combine(),
			CollectFlags::default(),
		);

		assert_eq!(combine.receive(10, &from(1, "a", "1", 1)), None);
		let emitted = combine.receive(10, &from(2, "b", "2", 1)).unwrap();
		assert_eq!((emitted.name.as_str(), emitted.value.as_str()), ("2-1", "12"));
		assert_eq!(emitted.source, Source::Rule(10));
		assert_eq!(emitted.record, 1);
	}

	#[test]
	fn test_combine_without_reset_emits_again_on_update() {
		let mut combine = node(Some("c"), Some("${a}${b}"), Collector::combine(), CollectFlags::default());
		combine.receive(10, &from(1, "a", "1", 1));
		combine.receive(10, &from(2, "b", "2", 1));
		let emitted = combine.receive(10, &from(1, "a", "3", 1));
		assert_eq!(literal(emitted), Some(("c".into(), "32".into())));
	}

	#[test]
	fn test_combine_with_reset_starts_over() {
		let flags = CollectFlags {
			reset_after_emit: true,
			..Default::default()
		};
		let mut combine = node(Some("c"), Some("${a}${b}"), Collector::combine(), flags);
		combine.receive(10, &from(1, "a", "1", 1));
		assert!(combine.receive(10, &from(2, "b", "2", 1)).is_some());
		assert_eq!(combine.receive(10, &from(1, "a", "3", 1)), None);
	}

	#[test]
	fn test_concat_joins_on_flush() {
		let mut concat = node(Some("joined"), None, Collector::concat(", ", "[", "]"), waiting());
		concat.receive(10, &from(1, "x", "a", 1));
		concat.receive(10, &from(2, "y", "b", 1));
		assert_eq!(
			literal(concat.flush(10, 1, 0)),
			Some(("joined".into(), "[a, b]".into()))
		);
	}

	#[test]
	fn test_concat_without_values_emits_nothing() {
		let mut concat = node(Some("joined"), None, Collector::concat(",", "", ""), waiting());
		concat.receive(10, &from(1, "x", "a", 1));
		assert_eq!(concat.flush(10, 2, 0), None);
	}

	#[test]
	fn test_choose_prefers_first_added_source() {
		let mut choose = node(None, None, Collector::choose(), waiting());
		choose.receive(10, &from(2, "low", "B", 1));
		choose.receive(10, &from(1, "high", "A", 1));
		choose.receive(10, &from(2, "low", "C", 1));
		assert_eq!(literal(choose.flush(10, 1, 0)), Some(("high".into(), "A".into())));
	}

	#[test]
	fn test_choose_uses_own_name_when_set() {
		let mut choose = node(Some("chosen"), None, Collector::choose(), waiting());
		choose.receive(10, &from(2, "low", "B", 1));
		assert_eq!(literal(choose.flush(10, 1, 0)), Some(("chosen".into(), "B".into())));
	}

	#[test]
	fn test_all_fires_with_defaults() {
		let mut all = node(None, None, Collector::all(), CollectFlags::default());
		assert_eq!(all.receive(10, &from(1, "x", "a", 1)), None);
		assert_eq!(
			literal(all.receive(10, &from(2, "y", "b", 1))),
			Some(("".into(), "true".into()))
		);
		assert_eq!(all.receive(10, &from(1, "x", "a", 2)), None);
	}

	#[test]
	fn test_any_fires_once() {
		let mut any = node(Some("ANY"), Some("yes"), Collector::any(), CollectFlags::default());
		assert_eq!(
			literal(any.receive(10, &from(1, "x", "a", 1))),
			Some(("ANY".into(), "yes".into()))
		);
		assert_eq!(any.receive(10, &from(2, "y", "b", 1)), None);
		assert_eq!(any.flush(10, 1, 0), None);
		assert!(any.receive(10, &from(2, "y", "b", 2)).is_some());
	}

	#[test]
	fn test_none_fires_only_without_input() {
		let mut none = node(None, None, Collector::none(), CollectFlags::default());
		none.receive(10, &from(1, "x", "a", 1));
		assert_eq!(none.flush(10, 1, 0), None);

		assert_eq!(literal(none.flush(10, 2, 0)), Some(("".into(), "true".into())));
		assert_eq!(none.flush(10, 2, 0), None);
	}

	#[test]
	fn test_equals_filter() {
		let mut filter = node(Some("same"), None, Collector::equals_filter(), CollectFlags::default());
		filter.receive(10, &from(1, "x", "a", 1));
		assert_eq!(
			literal(filter.receive(10, &from(2, "y", "a", 1))),
			Some(("same".into(), "a".into()))
		);

		filter.receive(10, &from(1, "x", "a", 2));
		assert_eq!(filter.receive(10, &from(2, "y", "b", 2)), None);
	}

	#[test]
	fn test_is_flushing() {
		assert!(Collector::concat("", "", "").is_flushing());
		assert!(Collector::none().is_flushing());
		assert!(!Collector::combine().is_flushing());
		assert_eq!(Collector::equals_filter().kind(), "equals");
	}
}
