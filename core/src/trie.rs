//! Prefix trie over the static word set.
use std::fmt;

/// A prefix tree used for fast existence checks and prefix enumeration.
///
/// Sibling edges are kept in insertion order, so `words_with_prefix`
/// enumerates in insertion order of the edges, not frequency order.
/// Callers that need frequency ranking must re-rank against a
/// frequency-ordered source (see `GramStore`); the trie is purely an
/// existence/enumeration structure.
///
/// # Example
/// ```
/// use libqazaq_core::trie::PrefixIndex;
///
/// let mut index = PrefixIndex::new();
/// index.insert("сөз");
/// index.insert("сөйлем");
///
/// assert!(index.contains_word("сөз"));
/// assert!(!index.contains_word("сө"));
/// assert_eq!(index.words_with_prefix("сө").len(), 2);
/// ```
#[derive(Default)]
pub struct PrefixIndex {
    root: Node,
    word_count: usize,
}

#[derive(Default)]
struct Node {
    // Insertion-ordered sibling edges; words are short so a linear scan
    // beats hashing here.
    children: Vec<(char, Box<Node>)>,
    is_end: bool,
}

impl Node {
    fn child(&self, ch: char) -> Option<&Node> {
        self.children
            .iter()
            .find(|(c, _)| *c == ch)
            .map(|(_, n)| n.as_ref())
    }

    fn child_mut(&mut self, ch: char) -> &mut Node {
        let idx = match self.children.iter().position(|(c, _)| *c == ch) {
            Some(idx) => idx,
            None => {
                self.children.push((ch, Box::new(Node::default())));
                self.children.len() - 1
            }
        };
        self.children[idx].1.as_mut()
    }
}

impl PrefixIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a word. O(|word|); re-inserting an existing word is a no-op.
    pub fn insert(&mut self, word: &str) {
        let mut node = &mut self.root;
        for ch in word.chars() {
            node = node.child_mut(ch);
        }
        if !node.is_end {
            node.is_end = true;
            self.word_count += 1;
        }
    }

    /// Check whether the index contains exactly the given word.
    pub fn contains_word(&self, word: &str) -> bool {
        match self.walk(word) {
            Some(node) => node.is_end,
            None => false,
        }
    }

    /// Check whether any indexed word starts with `prefix`.
    pub fn is_prefix(&self, prefix: &str) -> bool {
        self.walk(prefix).is_some()
    }

    /// Enumerate every indexed word starting with `prefix`.
    ///
    /// Traverses to the node matching `prefix`, then depth-first collects
    /// all end-of-word strings beneath it. The prefix itself is included
    /// when it is a word.
    pub fn words_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(node) = self.walk(prefix) {
            let mut buf = prefix.to_string();
            Self::collect(node, &mut buf, &mut out);
        }
        out
    }

    /// Number of distinct words in the index.
    pub fn len(&self) -> usize {
        self.word_count
    }

    /// Whether the index holds no words.
    pub fn is_empty(&self) -> bool {
        self.word_count == 0
    }

    fn walk(&self, path: &str) -> Option<&Node> {
        let mut node = &self.root;
        for ch in path.chars() {
            node = node.child(ch)?;
        }
        Some(node)
    }

    fn collect(node: &Node, buf: &mut String, out: &mut Vec<String>) {
        if node.is_end {
            out.push(buf.clone());
        }
        for (ch, child) in &node.children {
            buf.push(*ch);
            Self::collect(child, buf, out);
            buf.pop();
        }
    }
}

impl fmt::Debug for PrefixIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixIndex")
            .field("words", &self.word_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let mut index = PrefixIndex::new();
        index.insert("ал");
        index.insert("алма");
        index.insert("алға");

        assert!(index.contains_word("ал"));
        assert!(index.contains_word("алма"));
        assert!(!index.contains_word("а"));
        assert!(!index.contains_word("алм"));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn every_proper_prefix_is_reachable() {
        let mut index = PrefixIndex::new();
        index.insert("бала");

        for (i, _) in "бала".char_indices().skip(1) {
            let p = &"бала"[..i];
            assert!(index.is_prefix(p), "prefix {:?} must be reachable", p);
            assert!(index.words_with_prefix(p).contains(&"бала".to_string()));
        }
    }

    #[test]
    fn prefix_enumeration_follows_edge_insertion_order() {
        let mut index = PrefixIndex::new();
        index.insert("сөз");
        index.insert("сен");
        index.insert("сөйлем");

        // "ө" edge was created before "е", so the "сө" subtree enumerates first.
        let words = index.words_with_prefix("с");
        assert_eq!(words, vec!["сөз", "сөйлем", "сен"]);
    }

    #[test]
    fn duplicate_insert_does_not_grow() {
        let mut index = PrefixIndex::new();
        index.insert("сөз");
        index.insert("сөз");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn missing_prefix_enumerates_nothing() {
        let mut index = PrefixIndex::new();
        index.insert("сөз");
        assert!(index.words_with_prefix("қ").is_empty());
        assert!(!index.is_prefix("қ"));
    }
}
