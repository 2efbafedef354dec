//! Depth-cut flattening of an aggregated tree.
//!
//! `flatten(root, levels)` emits every node exactly `levels - 1` edges below
//! the root and nothing else. The walk stops descending at that depth.

use serde::{Deserialize, Serialize};

use super::{ReportError, WILDCARD};
use crate::tree::TreeNode;

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Full key path; prefixes end with the wildcard marker.
    pub key: String,
    pub leaf_count: u64,
    pub size_kb: f64,
}

/// Bytes to kilobytes, rounded to two decimals.
pub fn size_kb(bytes: u64) -> f64 {
    round_kb(bytes as f64 / 1024.0)
}

pub(crate) fn round_kb(kb: f64) -> f64 {
    (kb * 100.0).round() / 100.0
}

/// Flattens aggregated trees into report rows.
#[derive(Debug, Clone, Copy)]
pub struct ReportBuilder {
    delimiter: char,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self { delimiter: ':' }
    }
}

impl ReportBuilder {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    /// Rows for all nodes `levels - 1` edges below `root`, in traversal order.
    pub fn flatten(&self, root: &TreeNode, levels: u32) -> Result<Vec<ReportRow>, ReportError> {
        if levels == 0 {
            return Err(ReportError::InvalidLevels(levels));
        }

        let mut rows = Vec::new();
        let mut stack = vec![(root, levels)];

        while let Some((node, remaining)) = stack.pop() {
            if remaining == 1 {
                rows.push(self.row(node));
                continue;
            }
            for child in node.children().rev() {
                stack.push((child, remaining - 1));
            }
        }

        Ok(rows)
    }

    /// Display key for a node: `a:b:*` for prefixes, `a:b:c` for keys.
    pub fn display_key(&self, node: &TreeNode) -> String {
        if node.is_root() {
            WILDCARD.to_string()
        } else if node.is_leaf() {
            node.key().to_string()
        } else {
            format!("{}{}{}", node.key(), self.delimiter, WILDCARD)
        }
    }

    fn row(&self, node: &TreeNode) -> ReportRow {
        ReportRow {
            key: self.display_key(node),
            leaf_count: node.leaf_count(),
            size_kb: size_kb(node.size_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build_trie;

    #[test]
    fn test_kb_rounding() {
        assert_eq!(size_kb(2048), 2.0);
        assert_eq!(size_kb(1536), 1.5);
        assert_eq!(size_kb(0), 0.0);
        assert_eq!(size_kb(30), 0.03);
        assert_eq!(size_kb(100), 0.1);
    }

    #[test]
    fn test_zero_levels_rejected() {
        let root = build_trie(["a"], ':');
        assert!(matches!(
            ReportBuilder::default().flatten(&root, 0),
            Err(ReportError::InvalidLevels(0))
        ));
    }

    #[test]
    fn test_level_one_is_the_root() {
        let root = build_trie(["a:b", "c"], ':');
        let rows = ReportBuilder::default().flatten(&root, 1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "*");
    }

    #[test]
    fn test_cut_below_shallow_leaves() {
        // "c" ends at depth 1, so a cut at depth 2 skips it entirely.
        let root = build_trie(["a:b", "a:d:e", "c"], ':');
        let rows = ReportBuilder::default().flatten(&root, 3).unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a:b", "a:d:*"]);
    }
}
