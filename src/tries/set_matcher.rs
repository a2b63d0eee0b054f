use crate::error::{MorphError, Result};
use crate::tries::trie::{NodeId, PatternTrie, ROOT};
use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::OnceLock;

/// A single occurrence of a registered key in scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<'a, T> {
	/// The value registered for the key.
	pub value: &'a T,

	/// Byte offset of the first matched byte.
	pub start: usize,

	/// Length of the match in bytes.
	pub length: usize,
}

impl<T> Match<'_, T> {
	/// Byte offset one past the last matched byte.
	pub fn end(&self) -> usize {
		self.start + self.length
	}
}

/// Aho-Corasick automaton finding every occurrence of a set of keys in one pass.
///
/// Keys are added while the matcher is being built. The first call to
/// [`SetMatcher::scan`] computes the failure links and freezes the key set;
/// further calls to [`SetMatcher::put`] fail. A frozen matcher is read-only
/// and can be shared.
#[derive(Debug, Clone)]
pub struct SetMatcher<T> {
	trie: PatternTrie<Option<T>>,
	failure: OnceLock<Vec<NodeId>>,
}

impl<T> SetMatcher<T> {
	pub fn new() -> Self {
		SetMatcher {
			trie: PatternTrie::new(),
			failure: OnceLock::new(),
		}
	}

	/// Register `value` for `key`.
	///
	/// A key that so far only exists as the prefix of another key takes the
	/// value; a key that already carries one is rejected.
	pub fn put(&mut self, key: &str, value: T) -> Result<()> {
		if self.is_frozen() {
			return Err(MorphError::MatcherFrozen {
				key: key.to_string(),
			});
		}
		if key.is_empty() {
			return Err(MorphError::EmptyKey);
		}

		let node = self.trie.insert_path(key);
		let payload = self.trie.payload_mut(node);
		if payload.is_some() {
			return Err(MorphError::DuplicateKey {
				key: key.to_string(),
			});
		}
		*payload = Some(value);
		Ok(())
	}

	pub fn is_frozen(&self) -> bool {
		self.failure.get().is_some()
	}

	/// Compute failure links. Called implicitly by the first scan.
	pub fn freeze(&self) {
		self.failure_links();
	}

	fn failure_links(&self) -> &[NodeId] {
		self.failure.get_or_init(|| self.compute_failure_links())
	}

	fn compute_failure_links(&self) -> Vec<NodeId> {
		let mut failure = vec![ROOT; self.trie.len()];
		let mut queue: VecDeque<NodeId> = self.trie.links(ROOT).map(|(_, child)| child).collect();

		while let Some(parent) = queue.pop_front() {
			let parent_failure = failure[parent];
			for (key, child) in self.trie.links(parent) {
				let mut node = parent_failure;
				while self.trie.next(node, key).is_none() && node != ROOT {
					node = failure[node];
				}
				failure[child] = self.trie.next(node, key).unwrap_or(ROOT);
				queue.push_back(child);
			}
		}

		log::debug!("froze set matcher with {} trie nodes", self.trie.len());
		failure
	}

	/// Report every occurrence of every key in `text`.
	///
	/// Matches come in order of their end position; matches ending at the
	/// same position are reported longest first.
	pub fn scan(&self, text: &str) -> Vec<Match<'_, T>> {
		let failure = self.failure_links();

		let mut matches = Vec::new();
		let mut node = ROOT;
		let mut chars = text.char_indices().peekable();

		while let Some(&(index, c)) = chars.peek() {
			if let Some(next) = self.trie.next(node, c) {
				node = next;
			} else if node != ROOT {
				node = failure[node];
				continue;
			}
			chars.next();
			self.collect_matches(failure, node, index + c.len_utf8(), &mut matches);
		}

		matches
	}

	fn collect_matches<'a>(
		&'a self,
		failure: &[NodeId],
		node: NodeId,
		end: usize,
		matches: &mut Vec<Match<'a, T>>,
	) {
		let mut current = node;
		loop {
			if let Some(value) = self.trie.payload(current) {
				let length = self.trie.node(current).depth;
				matches.push(Match {
					value,
					start: end - length,
					length,
				});
			}
			current = failure[current];
			if current == ROOT {
				break;
			}
		}
	}

	/// Render the automaton as a GraphViz digraph. Failure links are gray.
	pub fn to_dot(&self) -> String {
		let failure = self.failure_links();

		let mut out = String::from("digraph ahocorasick {\n");
		for id in 0..self.trie.len() {
			let shape = if self.trie.payload(id).is_some() {
				"circle style=filled"
			} else {
				"point"
			};
			let _ = writeln!(out, "{id} [shape={shape} label=\"\"]");
			if failure[id] != ROOT {
				let _ = writeln!(out, "{id} -> {} [color=gray]", failure[id]);
			}
			let mut links: Vec<_> = self.trie.links(id).collect();
			links.sort_unstable();
			for (key, child) in links {
				let _ = writeln!(out, "{id} -> {child} [label=\"{key}\"]");
			}
		}
		out.push('}');
		out
	}
}

impl<T> Default for SetMatcher<T> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn he_she_his_hers() -> SetMatcher<&'static str> {
		let mut matcher = SetMatcher::new();
		for key in ["he", "she", "his", "hers"] {
			matcher.put(key, key).unwrap();
		}
		matcher
	}

	fn describe(matches: &[Match<'_, &str>]) -> Vec<String> {
		matches
			.iter()
			.map(|m| format!("{}@{}+{}", m.value, m.start, m.length))
			.collect()
	}

	#[test]
	fn test_ushers() {
		let matcher = he_she_his_hers();
		let matches = matcher.scan("ushers");
		assert_eq!(describe(&matches), vec!["she@1+3", "he@2+2", "hers@2+4"]);
	}

	#[test]
	fn test_overlapping_and_nested_matches() {
		let mut matcher = SetMatcher::new();
		matcher.put("aa", "aa").unwrap();
		matcher.put("a", "a").unwrap();
		let matches = matcher.scan("aaa");
		assert_eq!(
			describe(&matches),
			vec!["a@0+1", "aa@0+2", "a@1+1", "aa@1+2", "a@2+1"]
		);
	}

	#[test]
	fn test_failure_chain_after_mismatch() {
		let mut matcher = SetMatcher::new();
		matcher.put("abcd", 1).unwrap();
		matcher.put("bce", 2).unwrap();
		let matches = matcher.scan("abce");
		assert_eq!(matches.len(), 1);
		assert_eq!(*matches[0].value, 2);
		assert_eq!((matches[0].start, matches[0].length), (1, 3));
	}

	#[test]
	fn test_no_match() {
		let matcher = he_she_his_hers();
		assert!(matcher.scan("xyz").is_empty());
		assert!(matcher.scan("").is_empty());
	}

	#[test]
	fn test_multibyte_offsets_are_bytes() {
		let mut matcher = SetMatcher::new();
		matcher.put("über", ()).unwrap();
		let text = "grün über";
		let matches = matcher.scan(text);
		assert_eq!(matches.len(), 1);
		assert_eq!(&text[matches[0].start..matches[0].end()], "über");
	}

	#[test]
	fn test_put_after_scan_fails() {
		let mut matcher = he_she_his_hers();
		let _ = matcher.scan("she");
		assert!(matcher.is_frozen());
		match matcher.put("him", "him").unwrap_err() {
			MorphError::MatcherFrozen { key } => assert_eq!(key, "him"),
			other => panic!("Expected MatcherFrozen error, got {other:?}"),
		}
	}

	#[test]
	fn test_frozen_matcher_scans_through_shared_references() {
		let matcher = he_she_his_hers();
		matcher.freeze();
		assert!(matcher.is_frozen());

		let shared = &matcher;
		let counts: Vec<usize> = std::thread::scope(|scope| {
			let handles: Vec<_> = ["ushers", "his", "xyz"]
				.into_iter()
				.map(|text| scope.spawn(move || shared.scan(text).len()))
				.collect();
			handles.into_iter().map(|h| h.join().unwrap()).collect()
		});
		assert_eq!(counts, vec![3, 1, 0]);
	}

	#[test]
	fn test_duplicate_key_fails() {
		let mut matcher = he_she_his_hers();
		match matcher.put("she", "again").unwrap_err() {
			MorphError::DuplicateKey { key } => assert_eq!(key, "she"),
			other => panic!("Expected DuplicateKey error, got {other:?}"),
		}
	}

	#[test]
	fn test_prefix_node_takes_value() {
		let mut matcher = SetMatcher::new();
		matcher.put("hers", 1).unwrap();
		matcher.put("her", 2).unwrap();
		let values: Vec<_> = matcher.scan("hers").iter().map(|m| *m.value).collect();
		assert_eq!(values, vec![2, 1]);
	}

	#[test]
	fn test_empty_key_rejected() {
		let mut matcher: SetMatcher<u8> = SetMatcher::new();
		assert!(matches!(matcher.put("", 0), Err(MorphError::EmptyKey)));
	}

	#[test]
	fn test_to_dot() {
		let matcher = he_she_his_hers();
		let dot = matcher.to_dot();
		assert!(dot.starts_with("digraph ahocorasick {"));
		assert!(dot.contains("color=gray"));
		assert!(dot.contains("label=\"h\""));
	}

	/// Naive reference: every (start, key) pair where `key` occurs at `start`.
	fn naive(keys: &[String], text: &str) -> Vec<(usize, String)> {
		let mut found = Vec::new();
		for key in keys {
			let mut from = 0;
			while let Some(pos) = text[from..].find(key.as_str()) {
				found.push((from + pos, key.clone()));
				from += pos + 1;
			}
		}
		found.sort();
		found
	}

	proptest! {
		#[test]
		fn prop_reports_every_occurrence(
			keys in prop::collection::hash_set("[ab]{1,4}", 1..6),
			text in "[abc]{0,24}",
		) {
			let keys: Vec<String> = keys.into_iter().collect();
			let mut matcher = SetMatcher::new();
			for key in &keys {
				matcher.put(key, key.clone()).unwrap();
			}

			let mut found: Vec<(usize, String)> = matcher
				.scan(&text)
				.iter()
				.map(|m| {
					prop_assert_eq!(&text[m.start..m.end()], m.value.as_str());
					Ok((m.start, m.value.clone()))
				})
				.collect::<std::result::Result<_, TestCaseError>>()?;
			found.sort();

			prop_assert_eq!(found, naive(&keys, &text));
		}

		#[test]
		fn prop_registration_order_is_irrelevant(
			keys in prop::collection::hash_set("[ab]{1,3}", 1..6),
			text in "[ab]{0,16}",
		) {
			let forward: Vec<String> = keys.into_iter().collect();
			let backward: Vec<String> = forward.iter().rev().cloned().collect();

			let collect = |keys: &[String]| {
				let mut matcher = SetMatcher::new();
				for key in keys {
					matcher.put(key, key.clone()).unwrap();
				}
				let mut found: Vec<_> = matcher
					.scan(&text)
					.iter()
					.map(|m| (m.start, m.length, m.value.clone()))
					.collect();
				found.sort();
				found
			};

			prop_assert_eq!(collect(&forward), collect(&backward));
		}
	}
}
