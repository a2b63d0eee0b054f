use std::collections::HashMap;

/// Index of a node inside a [`PatternTrie`].
pub type NodeId = usize;

/// The root node is always the first node in the arena.
pub const ROOT: NodeId = 0;

/// A single position in a pattern trie.
#[derive(Debug, Clone)]
pub struct TrieNode<P> {
	/// Character on the edge leading here. `None` for the root.
	pub key: Option<char>,

	/// Length of the path from the root, in bytes of UTF-8.
	pub depth: usize,

	/// Payload stored at this node.
	pub payload: P,

	links: HashMap<char, NodeId>,
}

/// A character-indexed trie whose nodes live in a single arena.
///
/// Child links are indices into the arena, so other structures built on top
/// (failure links, self-loops) can point anywhere in the graph without
/// ownership cycles.
#[derive(Debug, Clone)]
pub struct PatternTrie<P> {
	nodes: Vec<TrieNode<P>>,
}

impl<P: Default> PatternTrie<P> {
	pub fn new() -> Self {
		PatternTrie {
			nodes: vec![TrieNode {
				key: None,
				depth: 0,
				payload: P::default(),
				links: HashMap::new(),
			}],
		}
	}

	/// Follow or create the edge labelled `key` out of `node`.
	pub fn get_or_add(&mut self, node: NodeId, key: char) -> NodeId {
		if let Some(next) = self.next(node, key) {
			return next;
		}
		self.add_next(node, key)
	}

	/// Create a fresh child of `node` on `key`, replacing any existing edge.
	pub fn add_next(&mut self, node: NodeId, key: char) -> NodeId {
		let id = self.nodes.len();
		let depth = self.nodes[node].depth + key.len_utf8();
		self.nodes.push(TrieNode {
			key: Some(key),
			depth,
			payload: P::default(),
			links: HashMap::new(),
		});
		self.nodes[node].links.insert(key, id);
		id
	}

	/// Insert `key` char by char starting at the root, returning the final node.
	pub fn insert_path(&mut self, key: &str) -> NodeId {
		key.chars().fold(ROOT, |node, c| self.get_or_add(node, c))
	}
}

impl<P: Default> Default for PatternTrie<P> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P> PatternTrie<P> {
	/// Add an edge between two existing nodes.
	pub fn link(&mut self, from: NodeId, key: char, to: NodeId) {
		self.nodes[from].links.insert(key, to);
	}

	pub fn next(&self, node: NodeId, key: char) -> Option<NodeId> {
		self.nodes[node].links.get(&key).copied()
	}

	pub fn links(&self, node: NodeId) -> impl Iterator<Item = (char, NodeId)> + '_ {
		self.nodes[node].links.iter().map(|(&c, &n)| (c, n))
	}

	pub fn node(&self, node: NodeId) -> &TrieNode<P> {
		&self.nodes[node]
	}

	pub fn payload(&self, node: NodeId) -> &P {
		&self.nodes[node].payload
	}

	pub fn payload_mut(&mut self, node: NodeId) -> &mut P {
		&mut self.nodes[node].payload
	}

	/// Number of nodes including the root.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.len() == 1
	}
}
