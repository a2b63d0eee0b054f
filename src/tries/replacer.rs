use crate::error::Result;
use crate::tries::set_matcher::SetMatcher;

/// Replaces many literal substrings at once.
///
/// Replacements never overlap. Scanning runs left to right; where several keys
/// start at the same position the longest one wins, and any match starting
/// inside an already replaced span is dropped.
#[derive(Debug, Clone, Default)]
pub struct TextReplacer {
	matcher: SetMatcher<String>,
}

impl TextReplacer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a replacer from `(key, replacement)` pairs.
	pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		let mut replacer = Self::new();
		for (key, replacement) in pairs {
			replacer.put(key.as_ref(), replacement)?;
		}
		Ok(replacer)
	}

	pub fn put(&mut self, key: &str, replacement: impl Into<String>) -> Result<()> {
		self.matcher.put(key, replacement.into())
	}

	pub fn replace(&self, text: &str) -> String {
		let mut matches = self.matcher.scan(text);
		matches.sort_by(|a, b| a.start.cmp(&b.start).then(b.length.cmp(&a.length)));

		let mut out = String::with_capacity(text.len());
		let mut last_cut = 0;
		for m in &matches {
			if m.start < last_cut {
				continue;
			}
			out.push_str(&text[last_cut..m.start]);
			out.push_str(m.value);
			last_cut = m.end();
		}
		out.push_str(&text[last_cut..]);
		out
	}
}
