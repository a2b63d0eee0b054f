//! The record walker.
//!
//! [`Morph`] receives record, entity and literal events, flattens entity
//! nesting into `entity.literal` paths, looks the paths up in a wildcard
//! registry and pushes the values into the rule graph. Whatever leaves the
//! graph ends up in the current [`OutputRecord`].

use crate::error::{MorphError, Result};
use crate::pipeline::{Literal, NamedValue, RuleGraph, RuleId};
use crate::tries::WildcardTrie;

/// Name under which record identifiers are dispatched.
pub const ID_NAME: &str = "_id";

/// Source name of the rule receiving literals nothing else matched.
pub const ELSE_NAME: &str = "_else";

/// Leading character of names that are fed back into the walker.
pub const FEEDBACK_CHAR: char = '@';

pub const ESCAPE_CHAR: char = '\\';

pub const DEFAULT_ENTITY_MARKER: &str = ".";

const MAX_FEEDBACK_DEPTH: usize = 32;

/// One event of a record stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
	StartRecord(String),
	StartEntity(String),
	Literal { name: String, value: String },
	EndEntity,
	EndRecord,
}

impl StreamEvent {
	pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
		StreamEvent::Literal {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// The transformed form of one input record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRecord {
	pub id: String,
	pub literals: Vec<Literal>,
}

#[derive(Debug, Clone)]
pub struct Morph {
	graph: RuleGraph,
	registry: WildcardTrie<RuleId>,
	flush_registry: WildcardTrie<RuleId>,
	record_flush: Vec<RuleId>,
	else_rule: Option<RuleId>,
	entity_marker: String,

	record: u64,
	entity_count: u64,
	/// Id of the last entity started; never decreases within a record.
	current_entity: u64,
	path: String,
	/// Path lengths to restore as open entities end.
	open_entities: Vec<usize>,
	output: Option<OutputRecord>,
}

impl Morph {
	pub fn new(graph: RuleGraph, entity_marker: &str) -> Self {
		Morph {
			graph,
			registry: WildcardTrie::new(),
			flush_registry: WildcardTrie::new(),
			record_flush: Vec::new(),
			else_rule: None,
			entity_marker: entity_marker.to_string(),
			record: 0,
			entity_count: 0,
			current_entity: 0,
			path: String::new(),
			open_entities: Vec::new(),
			output: None,
		}
	}

	pub fn graph(&self) -> &RuleGraph {
		&self.graph
	}

	pub fn graph_mut(&mut self) -> &mut RuleGraph {
		&mut self.graph
	}

	/// Feed values of paths matching `source` into `rule`.
	///
	/// `_else` registers the fallback rule; only the first one is kept.
	pub fn register(&mut self, source: &str, rule: RuleId) -> Result<()> {
		self.graph.node(rule)?;
		if source == ELSE_NAME {
			if self.else_rule.is_some() {
				log::warn!("only one '{ELSE_NAME}' rule is allowed, ignoring rule {rule}");
			} else {
				self.else_rule = Some(rule);
			}
			return Ok(());
		}
		log::debug!("registered rule {rule} for '{source}'");
		self.registry.put(source, rule)
	}

	/// Flush `rule` whenever a path matching `pattern` is dispatched, which
	/// includes the end of an entity with that path.
	pub fn flush_with(&mut self, pattern: &str, rule: RuleId) -> Result<()> {
		self.graph.node(rule)?;
		self.flush_registry.put(pattern, rule)
	}

	/// Flush `rule` at the end of every record.
	pub fn flush_with_record(&mut self, rule: RuleId) -> Result<()> {
		self.graph.node(rule)?;
		self.record_flush.push(rule);
		Ok(())
	}

	/// Rules receiving values dispatched under `path`.
	pub fn matching_rules(&self, path: &str) -> Vec<RuleId> {
		self.registry.get(path)
	}

	pub fn else_rule(&self) -> Option<RuleId> {
		self.else_rule
	}

	/// Process one event; returns the output record when a record ends.
	pub fn feed(&mut self, event: StreamEvent) -> Result<Option<OutputRecord>> {
		match event {
			StreamEvent::StartRecord(id) => self.start_record(&id)?,
			StreamEvent::StartEntity(name) => self.start_entity(&name)?,
			StreamEvent::Literal { name, value } => self.literal(&name, &value)?,
			StreamEvent::EndEntity => self.end_entity()?,
			StreamEvent::EndRecord => return self.end_record().map(Some),
		}
		Ok(None)
	}

	/// Run a whole record through the walker.
	pub fn process<I>(&mut self, events: I) -> Result<Vec<OutputRecord>>
	where
		I: IntoIterator<Item = StreamEvent>,
	{
		let mut records = Vec::new();
		for event in events {
			if let Some(record) = self.feed(event)? {
				records.push(record);
			}
		}
		Ok(records)
	}

	pub fn start_record(&mut self, id: &str) -> Result<()> {
		self.record += 1;
		self.entity_count = 0;
		self.current_entity = 0;
		self.path.clear();
		self.open_entities.clear();
		self.output = Some(OutputRecord {
			id: id.to_string(),
			literals: Vec::new(),
		});
		log::trace!("record {} started: {id}", self.record);
		self.dispatch(ID_NAME, id, false, 0)
	}

	pub fn start_entity(&mut self, name: &str) -> Result<()> {
		self.require_record()?;
		self.entity_count += 1;
		self.open_entities.push(self.path.len());
		self.current_entity = self.entity_count;
		if !self.path.is_empty() {
			self.path.push_str(&self.entity_marker);
		}
		self.path.push_str(name);
		Ok(())
	}

	pub fn literal(&mut self, name: &str, value: &str) -> Result<()> {
		self.require_record()?;
		let path = if self.path.is_empty() {
			name.to_string()
		} else {
			format!("{}{}{name}", self.path, self.entity_marker)
		};
		self.dispatch(&path, value, true, 0)
	}

	pub fn end_entity(&mut self) -> Result<()> {
		self.require_record()?;
		let Some(parent_path_len) = self.open_entities.pop() else {
			return Err(MorphError::UnbalancedEntities);
		};
		let path = self.path.clone();
		self.dispatch(&path, "", false, 0)?;
		self.path.truncate(parent_path_len);
		Ok(())
	}

	pub fn end_record(&mut self) -> Result<OutputRecord> {
		self.require_record()?;
		if !self.open_entities.is_empty() {
			return Err(MorphError::UnbalancedEntities);
		}

		let mut emitted = Vec::new();
		for &rule in &self.record_flush {
			self.graph
				.flush(rule, self.record, self.current_entity, &mut emitted)?;
		}
		self.emit(emitted, 0)?;

		let record = self.output.take().ok_or(MorphError::NoOpenRecord)?;
		log::trace!(
			"record {} ended with {} literals",
			self.record,
			record.literals.len()
		);
		Ok(record)
	}

	fn require_record(&self) -> Result<()> {
		match self.output {
			Some(_) => Ok(()),
			None => Err(MorphError::NoOpenRecord),
		}
	}

	fn dispatch(&mut self, path: &str, value: &str, fallback: bool, depth: usize) -> Result<()> {
		let rules = self.registry.get(path);
		let flushes = self.flush_registry.get(path);

		let mut emitted = Vec::new();
		if !rules.is_empty() || !flushes.is_empty() {
			for rule in rules {
				let event = NamedValue::from_stream(path, value, self.record, self.current_entity);
				self.graph.receive(rule, &event, &mut emitted)?;
			}
			for rule in flushes {
				self.graph
					.flush(rule, self.record, self.current_entity, &mut emitted)?;
			}
		} else if let (true, Some(rule)) = (fallback, self.else_rule) {
			let event = NamedValue::from_stream(
				&escape_feedback(path),
				value,
				self.record,
				self.current_entity,
			);
			self.graph.receive(rule, &event, &mut emitted)?;
		}
		self.emit(emitted, depth)
	}

	/// Write values leaving the graph, feeding `@` names back in.
	fn emit(&mut self, values: Vec<NamedValue>, depth: usize) -> Result<()> {
		for value in values {
			if value.name.starts_with(FEEDBACK_CHAR) {
				if depth >= MAX_FEEDBACK_DEPTH {
					return Err(MorphError::FeedbackLoop { name: value.name });
				}
				self.dispatch(&value.name, &value.value, false, depth + 1)?;
				continue;
			}
			let output = self.output.as_mut().ok_or(MorphError::NoOpenRecord)?;
			output
				.literals
				.push(Literal::new(unescape_feedback(&value.name), value.value));
		}
		Ok(())
	}
}

fn escape_feedback(name: &str) -> String {
	if name.starts_with(FEEDBACK_CHAR) {
		format!("{ESCAPE_CHAR}{name}")
	} else {
		name.to_string()
	}
}

fn unescape_feedback(name: &str) -> &str {
	let mut chars = name.chars();
	match (chars.next(), chars.next()) {
		(Some(ESCAPE_CHAR), Some(FEEDBACK_CHAR | ESCAPE_CHAR)) => &name[ESCAPE_CHAR.len_utf8()..],
		_ => name,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pipeline::{CaseMode, CollectFlags, Collector, Function};

	fn record(id: &str, body: Vec<StreamEvent>) -> Vec<StreamEvent> {
		let mut events = vec![StreamEvent::StartRecord(id.to_string())];
		events.extend(body);
		events.push(StreamEvent::EndRecord);
		events
	}

	fn pairs(record: &OutputRecord) -> Vec<(&str, &str)> {
		record
			.literals
			.iter()
			.map(|l| (l.name.as_str(), l.value.as_str()))
			.collect()
	}

	fn data(morph: &mut Morph, source: &str, name: Option<&str>) -> RuleId {
		let rule = morph
			.graph_mut()
			.add_function(name.map(str::to_string), Function::Identity);
		morph.register(source, rule).unwrap();
		rule
	}

	#[test]
	fn test_entity_paths_are_flattened() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		data(&mut morph, "245.a", Some("title"));

		let records = morph
			.process(record(
				"1",
				vec![
					StreamEvent::StartEntity("245".into()),
					StreamEvent::literal("a", "Dune"),
					StreamEvent::literal("b", "ignored"),
					StreamEvent::EndEntity,
					StreamEvent::literal("a", "top level"),
				],
			))
			.unwrap();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].id, "1");
		assert_eq!(pairs(&records[0]), vec![("title", "Dune")]);
	}

	#[test]
	fn test_custom_entity_marker() {
		let mut morph = Morph::new(RuleGraph::new(), "/");
		data(&mut morph, "a/b/c", None);

		let records = morph
			.process(record(
				"1",
				vec![
					StreamEvent::StartEntity("a".into()),
					StreamEvent::StartEntity("b".into()),
					StreamEvent::literal("c", "deep"),
					StreamEvent::EndEntity,
					StreamEvent::EndEntity,
				],
			))
			.unwrap();
		assert_eq!(pairs(&records[0]), vec![("a/b/c", "deep")]);
	}

	#[test]
	fn test_id_is_dispatched() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		data(&mut morph, ID_NAME, Some("id"));

		let records = morph.process(record("rec-7", vec![])).unwrap();
		assert_eq!(pairs(&records[0]), vec![("id", "rec-7")]);
	}

	#[test]
	fn test_wildcard_sources_receive_all_matches() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		data(&mut morph, "10?", Some("short"));
		data(&mut morph, "1*", Some("any"));

		let records = morph
			.process(record("1", vec![StreamEvent::literal("100", "x")]))
			.unwrap();
		assert_eq!(pairs(&records[0]), vec![("short", "x"), ("any", "x")]);
	}

	#[test]
	fn test_else_gets_unmatched_literals_only() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		data(&mut morph, "keep", Some("kept"));
		data(&mut morph, ELSE_NAME, None);

		let records = morph
			.process(record(
				"1",
				vec![
					StreamEvent::literal("keep", "1"),
					StreamEvent::literal("other", "2"),
					StreamEvent::literal("@odd", "3"),
				],
			))
			.unwrap();
		assert_eq!(
			pairs(&records[0]),
			vec![("kept", "1"), ("other", "2"), ("@odd", "3")]
		);
	}

	#[test]
	fn test_second_else_is_ignored() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		let first = data(&mut morph, ELSE_NAME, None);
		data(&mut morph, ELSE_NAME, Some("second"));
		assert_eq!(morph.else_rule(), Some(first));
	}

	#[test]
	fn test_feedback_names_are_redispatched() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		data(&mut morph, "in", Some("@tmp"));
		let upper = morph
			.graph_mut()
			.add_function(Some("out".into()), Function::Case(CaseMode::Upper));
		morph.register("@tmp", upper).unwrap();

		let records = morph
			.process(record("1", vec![StreamEvent::literal("in", "abc")]))
			.unwrap();
		assert_eq!(pairs(&records[0]), vec![("out", "ABC")]);
	}

	#[test]
	fn test_feedback_loop_is_bounded() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		data(&mut morph, "in", Some("@loop"));
		data(&mut morph, "@loop", Some("@loop"));

		let err = morph
			.process(record("1", vec![StreamEvent::literal("in", "x")]))
			.unwrap_err();
		assert!(matches!(err, MorphError::FeedbackLoop { name } if name == "@loop"));
	}

	#[test]
	fn test_escaped_feedback_char_is_written() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		data(&mut morph, "in", Some("\\@literal"));

		let records = morph
			.process(record("1", vec![StreamEvent::literal("in", "x")]))
			.unwrap();
		assert_eq!(pairs(&records[0]), vec![("@literal", "x")]);
	}

	#[test]
	fn test_record_flush_emits_concat() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		let concat = morph.graph_mut().add_collector(
			Some("all".into()),
			None,
			Collector::concat(",", "", ""),
			CollectFlags::default(),
		);
		let source = data(&mut morph, "v", None);
		morph.graph_mut().connect(source, concat).unwrap();
		morph.flush_with_record(concat).unwrap();

		let mut events = record(
			"1",
			vec![StreamEvent::literal("v", "a"), StreamEvent::literal("v", "b")],
		);
		events.extend(record("2", vec![StreamEvent::literal("v", "c")]));
		let records = morph.process(events).unwrap();
		assert_eq!(pairs(&records[0]), vec![("all", "a,b")]);
		assert_eq!(pairs(&records[1]), vec![("all", "c")]);
	}

	#[test]
	fn test_entity_flush_groups_per_entity() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		let flags = CollectFlags {
			wait_for_flush: true,
			same_entity: true,
			reset_after_emit: true,
			..Default::default()
		};
		let concat = morph.graph_mut().add_collector(
			Some("author".into()),
			None,
			Collector::concat(" ", "", ""),
			flags,
		);
		let source = data(&mut morph, "100.?", None);
		morph.graph_mut().connect(source, concat).unwrap();
		morph.flush_with("100", concat).unwrap();

		let entity = |first: &str, last: &str| {
			vec![
				StreamEvent::StartEntity("100".into()),
				StreamEvent::literal("a", first),
				StreamEvent::literal("b", last),
				StreamEvent::EndEntity,
			]
		};
		let mut body = entity("Ada", "Lovelace");
		body.extend(entity("Alan", "Turing"));

		let records = morph.process(record("1", body)).unwrap();
		assert_eq!(
			pairs(&records[0]),
			vec![("author", "Ada Lovelace"), ("author", "Alan Turing")]
		);
	}

	#[test]
	fn test_entity_epoch_never_decreases() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		morph.start_record("1").unwrap();
		assert_eq!(morph.current_entity, 0);

		morph.start_entity("outer").unwrap();
		assert_eq!(morph.current_entity, 1);
		morph.start_entity("inner").unwrap();
		assert_eq!(morph.current_entity, 2);
		morph.end_entity().unwrap();
		assert_eq!(morph.current_entity, 2);
		assert_eq!(morph.path, "outer");
		morph.end_entity().unwrap();
		assert_eq!(morph.current_entity, 2);
		assert!(morph.path.is_empty());

		morph.start_entity("next").unwrap();
		assert_eq!(morph.current_entity, 3);
		morph.end_entity().unwrap();
		morph.end_record().unwrap();

		morph.start_record("2").unwrap();
		assert_eq!(morph.current_entity, 0);
	}

	#[test]
	fn test_literal_after_nested_entity_keeps_its_epoch() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		let flags = CollectFlags {
			same_entity: true,
			..Default::default()
		};
		let concat = morph.graph_mut().add_collector(
			Some("joined".into()),
			None,
			Collector::concat("+", "", ""),
			flags,
		);
		let inner = data(&mut morph, "outer.inner.v", None);
		let after = data(&mut morph, "outer.v", None);
		morph.graph_mut().connect(inner, concat).unwrap();
		morph.graph_mut().connect(after, concat).unwrap();
		morph.flush_with_record(concat).unwrap();

		let records = morph
			.process(record(
				"1",
				vec![
					StreamEvent::StartEntity("outer".into()),
					StreamEvent::StartEntity("inner".into()),
					StreamEvent::literal("v", "a"),
					StreamEvent::EndEntity,
					StreamEvent::literal("v", "b"),
					StreamEvent::EndEntity,
				],
			))
			.unwrap();
		assert_eq!(pairs(&records[0]), vec![("joined", "a+b")]);
	}

	#[test]
	fn test_record_flush_emits_same_entity_concat() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		let flags = CollectFlags {
			same_entity: true,
			..Default::default()
		};
		let concat = morph.graph_mut().add_collector(
			Some("author".into()),
			None,
			Collector::concat(" ", "", ""),
			flags,
		);
		let source = data(&mut morph, "100.?", None);
		morph.graph_mut().connect(source, concat).unwrap();
		morph.flush_with_record(concat).unwrap();

		let records = morph
			.process(record(
				"1",
				vec![
					StreamEvent::StartEntity("100".into()),
					StreamEvent::literal("a", "Ada"),
					StreamEvent::literal("b", "Lovelace"),
					StreamEvent::EndEntity,
				],
			))
			.unwrap();
		assert_eq!(pairs(&records[0]), vec![("author", "Ada Lovelace")]);
	}

	#[test]
	fn test_entity_end_is_dispatched_with_empty_value() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		data(&mut morph, "700", Some("contributor-end"));

		let records = morph
			.process(record(
				"1",
				vec![
					StreamEvent::StartEntity("700".into()),
					StreamEvent::literal("a", "x"),
					StreamEvent::EndEntity,
				],
			))
			.unwrap();
		assert_eq!(pairs(&records[0]), vec![("contributor-end", "")]);
	}

	#[test]
	fn test_unbalanced_entities() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		morph.start_record("1").unwrap();
		assert!(matches!(
			morph.end_entity(),
			Err(MorphError::UnbalancedEntities)
		));

		morph.start_entity("open").unwrap();
		assert!(matches!(
			morph.end_record(),
			Err(MorphError::UnbalancedEntities)
		));
	}

	#[test]
	fn test_events_outside_records() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		assert!(matches!(
			morph.literal("a", "b"),
			Err(MorphError::NoOpenRecord)
		));
		assert!(matches!(morph.end_record(), Err(MorphError::NoOpenRecord)));
	}

	#[test]
	fn test_register_unknown_rule() {
		let mut morph = Morph::new(RuleGraph::new(), DEFAULT_ENTITY_MARKER);
		assert!(matches!(
			morph.register("a", 4),
			Err(MorphError::UnknownNode { id: 4 })
		));
	}
}
