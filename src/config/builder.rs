//! Turns a merged configuration into a ready [`Morph`].

use crate::config::types::{CollectKind, FunctionConfig, MapTable, MergedConfig, RuleConfig};
use crate::error::{MorphError, Result};
use crate::morph::{DEFAULT_ENTITY_MARKER, Morph};
use crate::pipeline::{CollectFlags, Collector, Function, RuleGraph, RuleId};
use crate::tries::TextReplacer;
use std::collections::{BTreeMap, HashMap};

/// `flush-with` value flushing at the end of every record.
pub const FLUSH_WITH_RECORD: &str = "record";

/// Build the walker and rule graph for `config`.
pub fn build_morph(config: &MergedConfig) -> Result<Morph> {
	let marker = config
		.entity_marker
		.as_deref()
		.unwrap_or(DEFAULT_ENTITY_MARKER);
	let mut builder = Builder {
		morph: Morph::new(RuleGraph::new(), marker),
		maps: &config.maps,
	};

	for rule in &config.rules {
		builder.rule(&rule.rule)?;
	}
	log::debug!(
		"built {} rule nodes from {} rules",
		builder.morph.graph().len(),
		config.rules.len()
	);
	Ok(builder.morph)
}

/// Build the stand-alone function for a function config.
pub fn build_function(config: &FunctionConfig, maps: &BTreeMap<String, MapTable>) -> Result<Function> {
	let function = match config {
		FunctionConfig::Trim => Function::Trim,
		FunctionConfig::Case { to } => Function::Case(*to),
		FunctionConfig::Compose { prefix, postfix } => Function::Compose {
			prefix: prefix.clone(),
			postfix: postfix.clone(),
		},
		FunctionConfig::Constant { value } => Function::Constant(value.clone()),
		FunctionConfig::Replace { pattern, with } => Function::replace(pattern, with)?,
		FunctionConfig::Regexp { pattern, format } => Function::regexp(pattern, format.as_deref())?,
		FunctionConfig::Substring { start, end } => Function::Substring {
			start: *start,
			end: *end,
		},
		FunctionConfig::Lookup {
			map,
			entries,
			default,
		} => {
			let mut table: HashMap<String, String> = match map {
				Some(name) => lookup_map(maps, name)?.clone().into_iter().collect(),
				None => HashMap::new(),
			};
			table.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
			Function::Lookup {
				table,
				default: default.clone(),
			}
		}
		FunctionConfig::SetReplace { map } => {
			Function::SetReplace(TextReplacer::from_pairs(lookup_map(maps, map)?)?)
		}
		FunctionConfig::Equals { value } => Function::Equals(value.clone()),
		FunctionConfig::NotEquals { value } => Function::NotEquals(value.clone()),
		FunctionConfig::Isbn {
			to,
			verify_check_digit,
			error_string,
		} => Function::Isbn {
			to: *to,
			verify_check_digit: *verify_check_digit,
			error_string: error_string.clone(),
		},
		FunctionConfig::Occurrence {
			only,
			format,
			same_entity,
		} => Function::occurrence(only.as_deref(), format.as_deref(), *same_entity)?,
		FunctionConfig::Unique { scope, part } => Function::unique(*scope, *part),
		FunctionConfig::Count => Function::Count(0),
	};
	Ok(function)
}

fn lookup_map<'a>(maps: &'a BTreeMap<String, MapTable>, name: &str) -> Result<&'a MapTable> {
	maps.get(name).ok_or_else(|| MorphError::UnknownMap {
		name: name.to_string(),
	})
}

struct Builder<'a> {
	morph: Morph,
	maps: &'a BTreeMap<String, MapTable>,
}

impl Builder<'_> {
	/// Build `rule` and return the node its output leaves from.
	fn rule(&mut self, rule: &RuleConfig) -> Result<RuleId> {
		match (&rule.source, rule.collect) {
			(Some(source), None) => self.data(source, rule),
			(None, Some(kind)) => self.collector(kind, rule),
			_ => {
				rule.validate()?;
				Err(MorphError::InvalidRule {
					reason: "rule needs either 'source' or 'collect'".to_string(),
				})
			}
		}
	}

	fn data(&mut self, source: &str, rule: &RuleConfig) -> Result<RuleId> {
		let mut functions = rule
			.functions
			.iter()
			.map(|f| build_function(f, self.maps))
			.collect::<Result<Vec<_>>>()?;
		if functions.is_empty() {
			functions.push(Function::Identity);
		}

		// Only the last stage renames; earlier ones pass the path through
		let last = functions.len() - 1;
		let mut nodes = Vec::with_capacity(functions.len());
		for (index, function) in functions.into_iter().enumerate() {
			let name = if index == last { rule.name.clone() } else { None };
			nodes.push(self.morph.graph_mut().add_function(name, function));
		}
		for pair in nodes.windows(2) {
			self.morph.graph_mut().connect(pair[0], pair[1])?;
		}

		self.morph.register(source, nodes[0])?;
		Ok(nodes[last])
	}

	fn collector(&mut self, kind: CollectKind, rule: &RuleConfig) -> Result<RuleId> {
		let collector = match kind {
			CollectKind::Combine => Collector::combine(),
			CollectKind::Concat => Collector::concat(
				rule.delimiter.as_deref().unwrap_or(""),
				rule.prefix.as_deref().unwrap_or(""),
				rule.postfix.as_deref().unwrap_or(""),
			),
			CollectKind::Choose => Collector::choose(),
			CollectKind::All => Collector::all(),
			CollectKind::Any => Collector::any(),
			CollectKind::None => Collector::none(),
			CollectKind::Equals => Collector::equals_filter(),
		};
		let flushing = collector.is_flushing();
		let flags = CollectFlags {
			same_entity: rule.same_entity,
			reset_after_emit: rule.reset,
			wait_for_flush: rule.flush_with.is_some(),
			flush_incomplete: rule.flush_incomplete.unwrap_or(true),
		};

		let id = self.morph.graph_mut().add_collector(
			rule.name.clone(),
			rule.value.clone(),
			collector,
			flags,
		);

		for data in &rule.data {
			let exit = self.rule(data)?;
			self.morph.graph_mut().connect(exit, id)?;
		}
		if let Some(condition) = &rule.condition {
			let exit = self.rule(condition)?;
			self.morph.graph_mut().set_condition(id, exit)?;
		}

		match rule.flush_with.as_deref() {
			Some(FLUSH_WITH_RECORD) => self.morph.flush_with_record(id)?,
			Some(pattern) => self.morph.flush_with(pattern, id)?,
			None if flushing => self.morph.flush_with_record(id)?,
			None => {}
		}

		let mut exit = id;
		for postprocess in &rule.postprocess {
			let function = build_function(postprocess, self.maps)?;
			let node = self.morph.graph_mut().add_function(None, function);
			self.morph.graph_mut().connect(exit, node)?;
			exit = node;
		}
		Ok(exit)
	}
}
