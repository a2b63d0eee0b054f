use crate::error::{MorphError, Result};
use crate::pipeline::event::{NamedValue, RuleId, Source};
use crate::pipeline::state::EpochTracker;
use crate::pipeline::template;
use crate::tries::TextReplacer;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

const LESS_THAN: &str = "lessThan ";
const MORE_THAN: &str = "moreThan ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseMode {
	Upper,
	Lower,
}

/// Target form of the `isbn` function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsbnForm {
	/// Only strip separators.
	#[default]
	Clean,
	Isbn10,
	Isbn13,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniqueScope {
	#[default]
	Record,
	Entity,
}

/// Which part of a named value makes it unique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniquePart {
	#[default]
	Value,
	Name,
	Both,
}

/// Which occurrences of a value `occurrence` lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceFilter {
	All,
	Equals(u64),
	LessThan(u64),
	MoreThan(u64),
}

impl OccurrenceFilter {
	fn accepts(&self, count: u64) -> bool {
		match *self {
			OccurrenceFilter::All => true,
			OccurrenceFilter::Equals(n) => count == n,
			OccurrenceFilter::LessThan(n) => count < n,
			OccurrenceFilter::MoreThan(n) => count > n,
		}
	}
}

impl FromStr for OccurrenceFilter {
	type Err = MorphError;

	/// Parses `N`, `lessThan N` or `moreThan N`.
	fn from_str(only: &str) -> Result<Self> {
		let invalid = || MorphError::InvalidOccurrenceFilter {
			only: only.to_string(),
		};
		let number = |s: &str| s.trim().parse::<u64>().map_err(|_| invalid());

		if let Some(rest) = only.strip_prefix(LESS_THAN) {
			Ok(OccurrenceFilter::LessThan(number(rest)?))
		} else if let Some(rest) = only.strip_prefix(MORE_THAN) {
			Ok(OccurrenceFilter::MoreThan(number(rest)?))
		} else {
			Ok(OccurrenceFilter::Equals(number(only)?))
		}
	}
}

/// A value transformation. Returning no value drops the input.
#[derive(Debug, Clone)]
pub enum Function {
	/// Passes values through; used by plain data rules.
	Identity,
	Trim,
	Case(CaseMode),
	Compose {
		prefix: String,
		postfix: String,
	},
	Constant(String),
	/// Regex substitution of every match; `$1` style references.
	Replace {
		pattern: Regex,
		with: String,
	},
	/// Keeps the first match, optionally formatted from its groups.
	Regexp {
		pattern: Regex,
		format: Option<String>,
	},
	/// Char based; `end` is exclusive.
	Substring {
		start: usize,
		end: Option<usize>,
	},
	Lookup {
		table: HashMap<String, String>,
		default: Option<String>,
	},
	/// Literal multi-pattern replacement from a map.
	SetReplace(TextReplacer),
	Equals(String),
	NotEquals(String),
	Isbn {
		to: IsbnForm,
		verify_check_digit: bool,
		error_string: Option<String>,
	},
	Occurrence {
		filter: OccurrenceFilter,
		format: Option<String>,
		same_entity: bool,
		count: u64,
	},
	Unique {
		scope: UniqueScope,
		part: UniquePart,
		seen: HashSet<String>,
	},
	/// Running count of values in the current record.
	Count(u64),
}

impl Function {
	pub fn replace(pattern: &str, with: &str) -> Result<Self> {
		Ok(Function::Replace {
			pattern: compile_regex(pattern)?,
			with: with.to_string(),
		})
	}

	pub fn regexp(pattern: &str, format: Option<&str>) -> Result<Self> {
		Ok(Function::Regexp {
			pattern: compile_regex(pattern)?,
			format: format.map(str::to_string),
		})
	}

	pub fn occurrence(only: Option<&str>, format: Option<&str>, same_entity: bool) -> Result<Self> {
		let filter = only
			.map(OccurrenceFilter::from_str)
			.transpose()?
			.unwrap_or(OccurrenceFilter::All);
		Ok(Function::Occurrence {
			filter,
			format: format.map(str::to_string),
			same_entity,
			count: 0,
		})
	}

	pub fn unique(scope: UniqueScope, part: UniquePart) -> Self {
		Function::Unique {
			scope,
			part,
			seen: HashSet::new(),
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Function::Identity => "data",
			Function::Trim => "trim",
			Function::Case(_) => "case",
			Function::Compose { .. } => "compose",
			Function::Constant(_) => "constant",
			Function::Replace { .. } => "replace",
			Function::Regexp { .. } => "regexp",
			Function::Substring { .. } => "substring",
			Function::Lookup { .. } => "lookup",
			Function::SetReplace(_) => "set-replace",
			Function::Equals(_) => "equals",
			Function::NotEquals(_) => "not-equals",
			Function::Isbn { .. } => "isbn",
			Function::Occurrence { .. } => "occurrence",
			Function::Unique { .. } => "unique",
			Function::Count(_) => "count",
		}
	}

	/// Stateful functions forget their state at record boundaries.
	pub fn is_stateful(&self) -> bool {
		matches!(
			self,
			Function::Occurrence { .. } | Function::Unique { .. } | Function::Count(_)
		)
	}

	/// Whether state is also forgotten at entity boundaries.
	pub fn resets_on_entity_change(&self) -> bool {
		match self {
			Function::Occurrence { same_entity, .. } => *same_entity,
			Function::Unique { scope, .. } => *scope == UniqueScope::Entity,
			_ => false,
		}
	}

	pub fn reset(&mut self) {
		match self {
			Function::Occurrence { count, .. } | Function::Count(count) => *count = 0,
			Function::Unique { seen, .. } => seen.clear(),
			_ => {}
		}
	}

	/// Transform one value. `Ok(None)` means the value is dropped.
	pub fn process(&mut self, name: &str, value: &str) -> Result<Option<String>> {
		let processed = match self {
			Function::Identity => Some(value.to_string()),
			Function::Trim => Some(value.trim().to_string()),
			Function::Case(CaseMode::Upper) => Some(value.to_uppercase()),
			Function::Case(CaseMode::Lower) => Some(value.to_lowercase()),
			Function::Compose { prefix, postfix } => Some(format!("{prefix}{value}{postfix}")),
			Function::Constant(constant) => Some(constant.clone()),
			Function::Replace { pattern, with } => {
				Some(pattern.replace_all(value, with.as_str()).into_owned())
			}
			Function::Regexp { pattern, format } => regexp(pattern, format.as_deref(), value),
			Function::Substring { start, end } => substring(value, *start, *end),
			Function::Lookup { table, default } => table.get(value).or(default.as_ref()).cloned(),
			Function::SetReplace(replacer) => Some(replacer.replace(value)),
			Function::Equals(expected) => (value == expected).then(|| value.to_string()),
			Function::NotEquals(unexpected) => (value != unexpected).then(|| value.to_string()),
			Function::Isbn {
				to,
				verify_check_digit,
				error_string,
			} => match isbn(value, *to, *verify_check_digit) {
				Some(isbn) => Some(isbn),
				None => match error_string {
					Some(error_string) => Some(error_string.clone()),
					None => {
						return Err(MorphError::InvalidIsbn {
							value: value.to_string(),
						});
					}
				},
			},
			Function::Occurrence {
				filter,
				format,
				count,
				..
			} => {
				*count += 1;
				if !filter.accepts(*count) {
					return Ok(None);
				}
				Some(match format {
					Some(format) => {
						let variables = HashMap::from([
							("value".to_string(), value.to_string()),
							("count".to_string(), count.to_string()),
						]);
						template::format(format, &variables)
					}
					None => value.to_string(),
				})
			}
			Function::Unique { part, seen, .. } => {
				let key = match part {
					UniquePart::Value => value.to_string(),
					UniquePart::Name => name.to_string(),
					UniquePart::Both => format!("{name}\u{1f}{value}"),
				};
				seen.insert(key).then(|| value.to_string())
			}
			Function::Count(count) => {
				*count += 1;
				Some(count.to_string())
			}
		};
		Ok(processed)
	}
}

fn compile_regex(pattern: &str) -> Result<Regex> {
	Regex::new(pattern).map_err(|source| MorphError::InvalidRegex {
		pattern: pattern.to_string(),
		source,
	})
}

fn regexp(pattern: &Regex, format: Option<&str>, value: &str) -> Option<String> {
	let captures = pattern.captures(value)?;
	let Some(format) = format else {
		return Some(captures[0].to_string());
	};

	let mut variables = HashMap::new();
	for (index, group) in captures.iter().enumerate() {
		if let Some(group) = group {
			variables.insert(index.to_string(), group.as_str().to_string());
		}
	}
	for group_name in pattern.capture_names().flatten() {
		if let Some(group) = captures.name(group_name) {
			variables.insert(group_name.to_string(), group.as_str().to_string());
		}
	}
	Some(template::format(format, &variables))
}

fn substring(value: &str, start: usize, end: Option<usize>) -> Option<String> {
	let length = value.chars().count();
	if start >= length {
		return None;
	}
	let end = end.filter(|&e| e > 0).map_or(length, |e| e.min(length));
	Some(value.chars().skip(start).take(end.saturating_sub(start)).collect())
}

const ISBN10_SIZE: usize = 10;
const ISBN13_SIZE: usize = 13;
const CHECK: &[u8] = b"0123456789X0";

/// Strip separators and keep the first run of ISBN characters.
fn cleanse_isbn(value: &str) -> String {
	let normalized: String = value
		.chars()
		.filter(|c| *c != '.' && *c != '-')
		.map(|c| if c == 'x' { 'X' } else { c })
		.collect();
	normalized
		.chars()
		.skip_while(|c| !is_isbn_char(*c))
		.take_while(|c| is_isbn_char(*c))
		.collect()
}

fn is_isbn_char(c: char) -> bool {
	c.is_ascii_digit() || c == 'X'
}

fn digit(c: u8) -> i64 {
	i64::from(c) - i64::from(b'0')
}

fn check10(data: &[u8]) -> u8 {
	let sum: i64 = data
		.iter()
		.enumerate()
		.map(|(i, &c)| (10 - i as i64) * digit(c))
		.sum();
	CHECK[(11 - sum.rem_euclid(11)) as usize]
}

fn check13(data: &[u8]) -> u8 {
	let sum: i64 = data
		.iter()
		.enumerate()
		.map(|(i, &c)| if i % 2 == 0 { digit(c) } else { 3 * digit(c) })
		.sum();
	let rest = sum.rem_euclid(10);
	CHECK[if rest == 0 { 0 } else { (10 - rest) as usize }]
}

fn isbn_is_valid(isbn: &[u8]) -> bool {
	match isbn.len() {
		ISBN10_SIZE => check10(&isbn[..9]) == isbn[9],
		ISBN13_SIZE => check13(&isbn[..12]) == isbn[12],
		_ => false,
	}
}

/// Normalise an ISBN; `None` if it is not a usable ISBN.
fn isbn(value: &str, to: IsbnForm, verify_check_digit: bool) -> Option<String> {
	let cleansed = cleanse_isbn(value);
	let bytes = cleansed.as_bytes();
	if bytes.len() != ISBN10_SIZE && bytes.len() != ISBN13_SIZE {
		return None;
	}
	if verify_check_digit && !isbn_is_valid(bytes) {
		return None;
	}

	let converted = match (to, bytes.len()) {
		(IsbnForm::Isbn10, ISBN13_SIZE) => {
			let mut isbn10 = bytes[3..12].to_vec();
			isbn10.push(check10(&bytes[3..12]));
			isbn10
		}
		(IsbnForm::Isbn13, ISBN10_SIZE) => {
			let mut isbn13 = b"978".to_vec();
			isbn13.extend_from_slice(&bytes[..9]);
			let check = check13(&isbn13);
			isbn13.push(check);
			isbn13
		}
		_ => bytes.to_vec(),
	};
	String::from_utf8(converted).ok()
}

/// A function stage in the rule graph.
#[derive(Debug, Clone)]
pub struct FunctionNode {
	/// Name to emit under; incoming names pass through when unset.
	pub name: Option<String>,
	pub function: Function,
	epochs: EpochTracker,
}

impl FunctionNode {
	pub fn new(name: Option<String>, function: Function) -> Self {
		FunctionNode {
			name,
			function,
			epochs: EpochTracker::default(),
		}
	}

	pub fn receive(&mut self, id: RuleId, event: &NamedValue) -> Result<Option<NamedValue>> {
		if self.function.is_stateful() {
			let same_entity = self.function.resets_on_entity_change();
			if self.epochs.observe(event.record, event.entity, same_entity) {
				self.function.reset();
			}
		}

		let Some(value) = self.function.process(&event.name, &event.value)? else {
			return Ok(None);
		};

		Ok(Some(NamedValue {
			name: self.name.clone().unwrap_or_else(|| event.name.clone()),
			value,
			source: Source::Rule(id),
			record: event.record,
			entity: event.entity,
		}))
	}
}
