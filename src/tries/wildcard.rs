use crate::error::{MorphError, Result};
use crate::tries::trie::{NodeId, PatternTrie, ROOT};
use std::collections::HashSet;

/// Matches zero or more arbitrary characters.
pub const STAR_WILDCARD: char = '*';

/// Matches exactly one arbitrary character.
pub const Q_WILDCARD: char = '?';

/// Separates alternatives sharing one value.
pub const OR_SEPARATOR: char = '|';

const CLASS_START: char = '[';
const CLASS_END: char = ']';

/// A trie of path patterns with `?` and `*` wildcards.
///
/// `get` answers with the values of *every* pattern matching a key. Patterns
/// are anchored at both ends. Alternatives (`a|b`) and character classes
/// (`lit-[AB]`) are expanded into plain registrations when a pattern is put.
#[derive(Debug, Clone)]
pub struct WildcardTrie<T> {
	trie: PatternTrie<Vec<T>>,
}

impl<T: Clone + PartialEq> WildcardTrie<T> {
	pub fn new() -> Self {
		WildcardTrie {
			trie: PatternTrie::new(),
		}
	}

	/// Register `value` for every expansion of `pattern`.
	///
	/// Nothing is inserted if any alternative is malformed.
	pub fn put(&mut self, pattern: &str, value: T) -> Result<()> {
		let mut expanded = Vec::new();
		for alternative in split_alternatives(pattern) {
			expanded.extend(expand_classes(alternative, pattern)?);
		}

		for key in &expanded {
			let node = self.trie.insert_path(key);
			let values = self.trie.payload_mut(node);
			if !values.contains(&value) {
				values.push(value.clone());
			}
		}
		Ok(())
	}

	/// Values of all patterns matching `key` in full.
	pub fn get(&self, key: &str) -> Vec<T> {
		let chars: Vec<char> = key.chars().collect();
		let mut visited: HashSet<(NodeId, usize)> = HashSet::new();
		let mut pending = vec![(ROOT, 0)];
		let mut accepted = Vec::new();

		while let Some((node, offset)) = pending.pop() {
			if !visited.insert((node, offset)) {
				continue;
			}

			// A star may always match the empty string.
			if let Some(star) = self.trie.next(node, STAR_WILDCARD) {
				pending.push((star, offset));
			}

			let Some(&c) = chars.get(offset) else {
				if !self.trie.payload(node).is_empty() {
					accepted.push(node);
				}
				continue;
			};

			if self.trie.node(node).key == Some(STAR_WILDCARD) {
				pending.push((node, offset + 1));
			}
			if let Some(next) = self.trie.next(node, c) {
				pending.push((next, offset + 1));
			}
			if let Some(next) = self.trie.next(node, Q_WILDCARD) {
				pending.push((next, offset + 1));
			}
		}

		accepted.sort_unstable();
		accepted
			.into_iter()
			.flat_map(|node| self.trie.payload(node).iter().cloned())
			.collect()
	}
}

impl<T: Clone + PartialEq> Default for WildcardTrie<T> {
	fn default() -> Self {
		Self::new()
	}
}

/// Split on `|` outside of character classes.
fn split_alternatives(pattern: &str) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut in_class = false;
	let mut from = 0;

	for (index, c) in pattern.char_indices() {
		match c {
			CLASS_START => in_class = true,
			CLASS_END => in_class = false,
			OR_SEPARATOR if !in_class => {
				parts.push(&pattern[from..index]);
				from = index + c.len_utf8();
			}
			_ => {}
		}
	}
	parts.push(&pattern[from..]);
	parts
}

/// Expand every `[...]` group into one key per member.
fn expand_classes(pattern: &str, original: &str) -> Result<Vec<String>> {
	let Some(open) = pattern.find(CLASS_START) else {
		return Ok(vec![pattern.to_string()]);
	};

	let prefix = &pattern[..open];
	let rest = &pattern[open + CLASS_START.len_utf8()..];
	let close = rest
		.find(CLASS_END)
		.ok_or_else(|| MorphError::UnterminatedClass {
			pattern: original.to_string(),
		})?;

	let class = &rest[..close];
	if class.is_empty() {
		return Err(MorphError::EmptyClass {
			pattern: original.to_string(),
		});
	}

	let tails = expand_classes(&rest[close + CLASS_END.len_utf8()..], original)?;
	let mut keys = Vec::with_capacity(class.chars().count() * tails.len());
	for member in class.chars() {
		for tail in &tails {
			keys.push(format!("{prefix}{member}{tail}"));
		}
	}
	Ok(keys)
}
