//! Prefix tree over delimited keys.
//!
//! `a:b:c` and `a:b:d` share the path `ROOT -> a -> b`, with `c` and `d`
//! as leaves. Every node remembers its full key path so leaves can be
//! probed and rows rendered without walking back up the tree.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::debug;

use super::TreeError;

/// Segment of the sentinel root node.
pub const ROOT_SEGMENT: &str = "ROOT";

/// One segment of the key namespace.
///
/// `Clone`, `PartialEq` and `Drop` walk the subtree with an explicit stack;
/// `Debug` prints only the node itself and its child count.
pub struct TreeNode {
    segment: String,
    key: String,
    children: BTreeMap<String, TreeNode>,
    leaf_count: u64,
    size_bytes: u64,
    root: bool,
}

impl Default for TreeNode {
    fn default() -> Self {
        Self::root()
    }
}

impl TreeNode {
    /// An empty root node.
    pub fn root() -> Self {
        Self {
            segment: ROOT_SEGMENT.to_string(),
            key: String::new(),
            children: BTreeMap::new(),
            leaf_count: 0,
            size_bytes: 0,
            root: true,
        }
    }

    pub(crate) fn new(segment: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            key: key.into(),
            children: BTreeMap::new(),
            leaf_count: 0,
            size_bytes: 0,
            root: false,
        }
    }

    /// Node with stored totals, used when restoring a snapshot.
    pub(crate) fn with_totals(
        segment: impl Into<String>,
        key: impl Into<String>,
        leaf_count: u64,
        size_bytes: u64,
    ) -> Self {
        let mut node = Self::new(segment, key);
        node.leaf_count = leaf_count;
        node.size_bytes = size_bytes;
        node
    }

    pub(crate) fn restored_root(leaf_count: u64, size_bytes: u64) -> Self {
        let mut root = Self::root();
        root.leaf_count = leaf_count;
        root.size_bytes = size_bytes;
        root
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Full key path from the root (empty for the root itself).
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    /// A terminal key. The root is never a leaf, even when empty.
    pub fn is_leaf(&self) -> bool {
        !self.root && self.children.is_empty()
    }

    /// Children in segment order.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = &TreeNode> + ExactSizeIterator {
        self.children.values()
    }

    pub fn child(&self, segment: &str) -> Option<&TreeNode> {
        self.children.get(segment)
    }

    /// Look up the node for a full key path.
    pub fn find(&self, key: &str, delimiter: char) -> Option<&TreeNode> {
        let mut current = self;
        for segment in key.split(delimiter) {
            current = current.children.get(segment)?;
        }
        Some(current)
    }

    /// Pre-order walk yielding each node with its distance from `self`.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: vec![(0, self)],
        }
    }

    /// Leaves in traversal order.
    pub fn leaves(&self) -> impl Iterator<Item = &TreeNode> {
        self.iter().map(|(_, node)| node).filter(|node| node.is_leaf())
    }

    /// Total number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.iter().map(|(depth, _)| depth).max().unwrap_or(0)
    }

    /// Check that every internal node carries the sum of its children and
    /// every leaf counts itself once.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        for (_, node) in self.iter() {
            if node.is_leaf() {
                if node.leaf_count != 1 {
                    return Err(TreeError::LeafCountMismatch {
                        key: node.key.clone(),
                        expected: 1,
                        actual: node.leaf_count,
                    });
                }
                continue;
            }

            let leaves: u64 = node.children().map(|c| c.leaf_count).sum();
            let bytes: u64 = node.children().map(|c| c.size_bytes).sum();
            if node.leaf_count != leaves {
                return Err(TreeError::LeafCountMismatch {
                    key: node.key.clone(),
                    expected: leaves,
                    actual: node.leaf_count,
                });
            }
            if node.size_bytes != bytes {
                return Err(TreeError::SizeMismatch {
                    key: node.key.clone(),
                    expected: bytes,
                    actual: node.size_bytes,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn take_children(&mut self) -> BTreeMap<String, TreeNode> {
        std::mem::take(&mut self.children)
    }

    pub(crate) fn reset_totals(&mut self) {
        self.leaf_count = 0;
        self.size_bytes = 0;
    }

    pub(crate) fn set_leaf_size(&mut self, size_bytes: u64) {
        self.leaf_count = 1;
        self.size_bytes = size_bytes;
    }

    /// Attach a finished child and add its totals to this node.
    pub(crate) fn absorb(&mut self, child: TreeNode) {
        self.leaf_count += child.leaf_count;
        self.size_bytes += child.size_bytes;
        self.children.insert(child.segment.clone(), child);
    }

    /// Attach a child without touching this node's totals.
    pub(crate) fn attach(&mut self, child: TreeNode) {
        self.children.insert(child.segment.clone(), child);
    }

    /// Copy of this node without its children.
    fn detached(&self) -> Self {
        Self {
            segment: self.segment.clone(),
            key: self.key.clone(),
            children: BTreeMap::new(),
            leaf_count: self.leaf_count,
            size_bytes: self.size_bytes,
            root: self.root,
        }
    }

    fn same_fields(&self, other: &Self) -> bool {
        self.root == other.root
            && self.leaf_count == other.leaf_count
            && self.size_bytes == other.size_bytes
            && self.segment == other.segment
            && self.key == other.key
    }
}

/// Pop finished nodes into their parents until `len` remain.
///
/// `stack` holds the open path of a pre-order rebuild, one node per depth.
pub(crate) fn collapse(stack: &mut Vec<TreeNode>, len: usize) {
    while stack.len() > len {
        if let Some(node) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.attach(node);
            }
        }
    }
}

impl Clone for TreeNode {
    fn clone(&self) -> Self {
        let mut stack: Vec<TreeNode> = Vec::new();
        for (depth, node) in self.iter() {
            collapse(&mut stack, depth);
            stack.push(node.detached());
        }
        collapse(&mut stack, 1);
        stack.pop().unwrap_or_else(|| self.detached())
    }
}

// Two trees are equal when their pre-order walks match node for node.
impl PartialEq for TreeNode {
    fn eq(&self, other: &Self) -> bool {
        let mut left = self.iter();
        let mut right = other.iter();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return true,
                (Some((da, a)), Some((db, b))) if da == db && a.same_fields(b) => {}
                _ => return false,
            }
        }
    }
}

impl Eq for TreeNode {}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("segment", &self.segment)
            .field("key", &self.key)
            .field("leaf_count", &self.leaf_count)
            .field("size_bytes", &self.size_bytes)
            .field("root", &self.root)
            .field("children", &self.children.len())
            .finish()
    }
}

// Dismantle the subtree level by level so deep key paths cannot overflow
// the stack through nested drops.
impl Drop for TreeNode {
    fn drop(&mut self) {
        if self.children.is_empty() {
            return;
        }
        let mut pending: Vec<TreeNode> = std::mem::take(&mut self.children).into_values().collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(std::mem::take(&mut node.children).into_values());
        }
    }
}

/// Pre-order iterator over a subtree.
pub struct Iter<'a> {
    stack: Vec<(usize, &'a TreeNode)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (usize, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        // Reverse so the smallest segment is visited first.
        for child in node.children().rev() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, node))
    }
}

/// Result of building a trie from a key list.
#[derive(Debug)]
pub struct TrieBuild {
    pub root: TreeNode,

    /// Distinct keys inserted.
    pub key_count: usize,

    /// Keys that are also the ancestor path of other keys. Their own values
    /// are not part of the tree.
    pub shadowed: Vec<String>,
}

/// Builds prefix trees from flat key lists.
#[derive(Debug, Clone, Copy)]
pub struct KeyTrie {
    delimiter: char,
}

impl Default for KeyTrie {
    fn default() -> Self {
        Self { delimiter: ':' }
    }
}

impl KeyTrie {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Index `keys` into a fresh, unaggregated tree.
    pub fn build<I, S>(&self, keys: I) -> TrieBuild
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = TreeNode::root();
        let mut distinct: HashSet<String> = HashSet::new();

        for key in keys {
            let key = key.as_ref();
            if !distinct.insert(key.to_string()) {
                continue;
            }
            self.insert(&mut root, key);
        }

        let mut shadowed: Vec<String> = distinct
            .iter()
            .filter(|key| {
                root.find(key, self.delimiter)
                    .is_some_and(|node| !node.is_leaf())
            })
            .cloned()
            .collect();
        shadowed.sort();

        if !shadowed.is_empty() {
            debug!(
                count = shadowed.len(),
                first = %shadowed[0],
                "Keys shadowed by deeper keys are not counted"
            );
        }

        TrieBuild {
            root,
            key_count: distinct.len(),
            shadowed,
        }
    }

    fn insert(&self, root: &mut TreeNode, key: &str) {
        let mut current = root;
        let mut end = 0;

        for (i, segment) in key.split(self.delimiter).enumerate() {
            if i > 0 {
                end += self.delimiter.len_utf8();
            }
            end += segment.len();

            current = current
                .children
                .entry(segment.to_string())
                .or_insert_with(|| TreeNode::new(segment, &key[..end]));
        }
    }
}

/// Build the unaggregated prefix tree for `keys`.
pub fn build_trie<I, S>(keys: I, delimiter: char) -> TreeNode
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    KeyTrie::new(delimiter).build(keys).root
}
