use crate::error::{MorphError, Result};
use crate::pipeline::collect::{CollectNode, Collector};
use crate::pipeline::event::{NamedValue, RuleId, Target};
use crate::pipeline::function::{Function, FunctionNode};
use crate::pipeline::state::CollectFlags;

/// A node of the rule graph.
#[derive(Debug, Clone)]
pub enum RuleNode {
	Function(FunctionNode),
	Collect(CollectNode),
}

impl RuleNode {
	pub fn kind(&self) -> &'static str {
		match self {
			RuleNode::Function(node) => node.function.kind(),
			RuleNode::Collect(node) => node.collector.kind(),
		}
	}

	/// Name used in error messages: the kind, plus the configured name if any.
	pub fn label(&self) -> String {
		match self {
			RuleNode::Function(node) => label(node.function.kind(), node.name.as_deref()),
			RuleNode::Collect(node) => label(node.collector.kind(), node.name.as_deref()),
		}
	}
}

fn label(kind: &str, name: Option<&str>) -> String {
	match name {
		Some(name) if !name.is_empty() => format!("{kind} '{name}'"),
		_ => kind.to_string(),
	}
}

/// Arena of rule nodes, each with one target.
///
/// Values are pushed synchronously: a node's output is handed straight to its
/// target before `receive` returns. Values reaching [`Target::Output`] are
/// appended to the caller's buffer.
#[derive(Debug, Clone, Default)]
pub struct RuleGraph {
	nodes: Vec<RuleNode>,
	targets: Vec<Target>,
}

impl RuleGraph {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_function(&mut self, name: Option<String>, function: Function) -> RuleId {
		self.push(RuleNode::Function(FunctionNode::new(name, function)))
	}

	pub fn add_collector(
		&mut self,
		name: Option<String>,
		value: Option<String>,
		collector: Collector,
		flags: CollectFlags,
	) -> RuleId {
		self.push(RuleNode::Collect(CollectNode::new(name, value, collector, flags)))
	}

	fn push(&mut self, node: RuleNode) -> RuleId {
		self.nodes.push(node);
		self.targets.push(Target::Output);
		self.nodes.len() - 1
	}

	/// Route the output of `from` into `to` as a value input.
	pub fn connect(&mut self, from: RuleId, to: RuleId) -> Result<()> {
		self.check(from)?;
		if let RuleNode::Collect(collector) = self.node_mut(to)? {
			collector.add_source(from);
		}
		self.targets[from] = Target::Rule(to);
		Ok(())
	}

	/// Route the output of `source` into `collector` as its condition.
	pub fn set_condition(&mut self, collector: RuleId, source: RuleId) -> Result<()> {
		self.check(source)?;
		match self.node_mut(collector)? {
			RuleNode::Collect(node) => node.state.set_condition_source(source),
			RuleNode::Function(node) => {
				return Err(MorphError::InvalidRule {
					reason: format!(
						"condition on '{}' requires a collector",
						node.function.kind()
					),
				});
			}
		}
		self.targets[source] = Target::Rule(collector);
		Ok(())
	}

	pub fn connect_output(&mut self, node: RuleId) -> Result<()> {
		self.check(node)?;
		self.targets[node] = Target::Output;
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn node(&self, id: RuleId) -> Result<&RuleNode> {
		self.nodes.get(id).ok_or(MorphError::UnknownNode { id })
	}

	pub fn target(&self, id: RuleId) -> Result<Target> {
		self.targets
			.get(id)
			.copied()
			.ok_or(MorphError::UnknownNode { id })
	}

	fn node_mut(&mut self, id: RuleId) -> Result<&mut RuleNode> {
		self.nodes.get_mut(id).ok_or(MorphError::UnknownNode { id })
	}

	fn check(&self, id: RuleId) -> Result<()> {
		self.node(id).map(|_| ())
	}

	/// Push `event` into node `id` and cascade whatever it emits.
	pub fn receive(&mut self, id: RuleId, event: &NamedValue, out: &mut Vec<NamedValue>) -> Result<()> {
		let emitted = match self.node_mut(id)? {
			RuleNode::Function(node) => {
				node.receive(id, event).map_err(|source| MorphError::NodeFailed {
					node: label(node.function.kind(), node.name.as_deref()),
					name: event.name.clone(),
					source: Box::new(source),
				})?
			}
			RuleNode::Collect(node) => node.receive(id, event),
		};
		log::trace!("node {id} received '{}', emitted {}", event.name, emitted.is_some());
		match emitted {
			Some(value) => self.forward(id, value, out),
			None => Ok(()),
		}
	}

	/// Flush node `id`. Only collectors react; functions have nothing pending.
	pub fn flush(&mut self, id: RuleId, record: u64, entity: u64, out: &mut Vec<NamedValue>) -> Result<()> {
		let emitted = match self.node_mut(id)? {
			RuleNode::Collect(node) => node.flush(id, record, entity),
			RuleNode::Function(_) => None,
		};
		log::debug!("flushed node {id} for record {record}, entity {entity}");
		match emitted {
			Some(value) => self.forward(id, value, out),
			None => Ok(()),
		}
	}

	fn forward(&mut self, from: RuleId, value: NamedValue, out: &mut Vec<NamedValue>) -> Result<()> {
		match self.targets[from] {
			Target::Output => {
				out.push(value);
				Ok(())
			}
			Target::Rule(next) => self.receive(next, &value, out),
		}
	}
}
