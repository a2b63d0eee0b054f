//! Pattern tries for morph.
//!
//! This module handles:
//! - Multi-pattern literal search (Aho-Corasick)
//! - Non-overlapping literal replacement built on that search
//! - Wildcard path matching against registered rule sources

pub mod replacer;
pub mod set_matcher;
pub mod trie;
pub mod wildcard;

pub use replacer::TextReplacer;
pub use set_matcher::{Match, SetMatcher};
pub use trie::{NodeId, PatternTrie, ROOT, TrieNode};
pub use wildcard::WildcardTrie;
