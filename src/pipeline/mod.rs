//! The rule pipeline: named values flowing through an arena of function and
//! collector nodes.

pub mod collect;
pub mod event;
pub mod function;
pub mod graph;
pub mod state;
pub mod template;

pub use collect::{CollectNode, Collector};
pub use event::{Literal, NamedValue, RuleId, Source, Target};
pub use function::{
	CaseMode, Function, FunctionNode, IsbnForm, OccurrenceFilter, UniquePart, UniqueScope,
};
pub use graph::{RuleGraph, RuleNode};
pub use state::{Accumulate, CollectFlags, EpochTracker, RuleState};
