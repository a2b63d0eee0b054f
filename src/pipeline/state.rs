//! Behaviour shared by every rule node: epoch tracking, condition gating,
//! emit-on-complete and flushing.
//!
//! Node kinds only supply the [`Accumulate`] capability; the state machine
//! around it lives here once.

use crate::pipeline::event::{Literal, NamedValue, RuleId, Source};

/// Configuration flags of a collecting rule node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectFlags {
	/// Discard partial state when the entity changes, and only flush for the
	/// entity the state was gathered in.
	pub same_entity: bool,

	/// Reset condition and partial state right after emitting.
	pub reset_after_emit: bool,

	/// Never emit on receive; only flushes emit.
	pub wait_for_flush: bool,

	/// Emit on flush even if the node is not complete.
	pub flush_incomplete: bool,
}

impl Default for CollectFlags {
	fn default() -> Self {
		CollectFlags {
			same_entity: false,
			reset_after_emit: false,
			wait_for_flush: false,
			flush_incomplete: true,
		}
	}
}

/// Last record and entity epochs a node has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochTracker {
	record: u64,
	entity: u64,
}

impl EpochTracker {
	/// Store the given epochs and report whether a boundary invalidating
	/// partial state was crossed.
	pub fn observe(&mut self, record: u64, entity: u64, same_entity: bool) -> bool {
		let stale = record != self.record || (same_entity && entity != self.entity);
		self.record = record;
		self.entity = entity;
		stale
	}

	/// Whether state gathered so far belongs to the given record (and entity).
	pub fn matches(&self, record: u64, entity: u64, same_entity: bool) -> bool {
		self.record == record && (!same_entity || self.entity == entity)
	}

	pub fn record(&self) -> u64 {
		self.record
	}

	pub fn entity(&self) -> u64 {
		self.entity
	}
}

/// Mutable state every collecting node carries next to its accumulator.
#[derive(Debug, Clone)]
pub struct RuleState {
	pub flags: CollectFlags,
	epochs: EpochTracker,
	condition_met: bool,
	condition_source: Option<RuleId>,
}

impl RuleState {
	pub fn new(flags: CollectFlags) -> Self {
		RuleState {
			flags,
			epochs: EpochTracker::default(),
			condition_met: true,
			condition_source: None,
		}
	}

	/// Make `source` the node whose values gate emission.
	///
	/// A second call replaces the first source.
	pub fn set_condition_source(&mut self, source: RuleId) {
		if let Some(previous) = self.condition_source {
			log::warn!("condition source {previous} replaced by {source}");
		}
		self.condition_source = Some(source);
		self.reset_condition();
	}

	pub fn condition_source(&self) -> Option<RuleId> {
		self.condition_source
	}

	pub fn reset_condition(&mut self) {
		self.condition_met = self.condition_source.is_none();
	}

	pub fn condition_met(&self) -> bool {
		self.condition_met
	}

	pub fn epochs(&self) -> EpochTracker {
		self.epochs
	}

	fn is_condition_source(&self, source: Source) -> bool {
		matches!(source, Source::Rule(id) if self.condition_source == Some(id))
	}

	/// Observe the epochs, resetting the condition when state went stale.
	fn observe(&mut self, record: u64, entity: u64) -> bool {
		let stale = self.epochs.observe(record, entity, self.flags.same_entity);
		if stale {
			self.reset_condition();
		}
		stale
	}
}

/// Node-specific part of a collecting rule node.
pub trait Accumulate {
	/// Fold one value into the partial result.
	fn accumulate(&mut self, event: &NamedValue);

	/// Whether the partial result is ready to be emitted.
	fn is_complete(&self) -> bool;

	/// Drop the partial result.
	fn clear(&mut self);

	/// Produce the output for the current partial result, if any.
	fn emit(&mut self) -> Option<Literal>;

	/// Nodes that can emit without ever receiving a value in the current
	/// record treat a flush as an epoch observation.
	fn emits_without_input(&self) -> bool {
		false
	}
}

/// Run one received value through the state machine.
pub fn receive<A: Accumulate>(
	state: &mut RuleState,
	acc: &mut A,
	event: &NamedValue,
) -> Option<Literal> {
	if state.observe(event.record, event.entity) {
		acc.clear();
	}

	if state.is_condition_source(event.source) {
		state.condition_met = true;
	} else {
		acc.accumulate(event);
	}

	if state.flags.wait_for_flush || !state.condition_met || !acc.is_complete() {
		return None;
	}

	let emitted = acc.emit();
	if state.flags.reset_after_emit {
		state.reset_condition();
		acc.clear();
	}
	emitted
}

/// Give the node a chance to emit at the end of a record or entity.
pub fn flush<A: Accumulate>(
	state: &mut RuleState,
	acc: &mut A,
	record: u64,
	entity: u64,
) -> Option<Literal> {
	if acc.emits_without_input() && state.observe(record, entity) {
		acc.clear();
	}

	if !state
		.epochs
		.matches(record, entity, state.flags.same_entity)
	{
		return None;
	}

	let emitted = if state.condition_met && (state.flags.flush_incomplete || acc.is_complete()) {
		acc.emit()
	} else {
		None
	};

	if state.flags.reset_after_emit {
		state.reset_condition();
		acc.clear();
	}
	emitted
}
