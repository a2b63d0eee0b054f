//! JSON lines record I/O for the CLI.
//!
//! One JSON object per line is one record. Nested objects become entities,
//! arrays repeat their key, `null` is skipped. The `_id` member names the
//! record; without it the 1-based line number does.

use crate::error::{MorphError, Result};
use crate::morph::{ID_NAME, OutputRecord, StreamEvent};
use serde_json::{Map, Value};

/// Decode one input line into the events of one record.
pub fn decode_line(line: &str, line_number: usize) -> Result<Vec<StreamEvent>> {
	let object: Map<String, Value> =
		serde_json::from_str(line).map_err(|source| MorphError::RecordDecodeError {
			line: line_number,
			source,
		})?;

	let id = match object.get(ID_NAME) {
		Some(Value::String(id)) => id.clone(),
		Some(Value::Number(id)) => id.to_string(),
		_ => line_number.to_string(),
	};

	let mut events = vec![StreamEvent::StartRecord(id)];
	for (name, value) in &object {
		if name != ID_NAME {
			push_value(name, value, &mut events);
		}
	}
	events.push(StreamEvent::EndRecord);
	Ok(events)
}

fn push_value(name: &str, value: &Value, events: &mut Vec<StreamEvent>) {
	match value {
		Value::Null => {}
		Value::Bool(b) => events.push(StreamEvent::literal(name, b.to_string())),
		Value::Number(n) => events.push(StreamEvent::literal(name, n.to_string())),
		Value::String(s) => events.push(StreamEvent::literal(name, s.as_str())),
		Value::Array(items) => {
			for item in items {
				push_value(name, item, events);
			}
		}
		Value::Object(members) => {
			events.push(StreamEvent::StartEntity(name.to_string()));
			for (member, value) in members {
				push_value(member, value, events);
			}
			events.push(StreamEvent::EndEntity);
		}
	}
}

/// Encode an output record as a JSON object. Repeated names become arrays.
///
/// Literals named `_id` replace the record id instead of being listed; the
/// last one wins.
pub fn encode_record(record: &OutputRecord) -> Value {
	let id = record
		.literals
		.iter()
		.rev()
		.find(|literal| literal.name == ID_NAME)
		.map_or(&record.id, |literal| &literal.value);

	let mut object = Map::new();
	object.insert(ID_NAME.to_string(), Value::String(id.clone()));

	for literal in record.literals.iter().filter(|l| l.name != ID_NAME) {
		let value = Value::String(literal.value.clone());
		match object.get_mut(&literal.name) {
			None => {
				object.insert(literal.name.clone(), value);
			}
			Some(Value::Array(values)) => values.push(value),
			Some(existing) => {
				let first = existing.take();
				*existing = Value::Array(vec![first, value]);
			}
		}
	}
	Value::Object(object)
}
