//! Keyspace tree and its aggregation.
//!
//! - [`node`]: TreeNode, the KeyTrie builder, traversal iterators
//! - [`aggregate`]: bottom-up leaf count / size aggregation

pub mod aggregate;
pub mod node;

use thiserror::Error;

pub use aggregate::{AggregationEngine, AggregationError, Totals};
pub use node::{build_trie, KeyTrie, TreeNode, TrieBuild, ROOT_SEGMENT};

/// A node whose totals disagree with its children.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {key:?} has leaf_count {actual}, expected {expected}")]
    LeafCountMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("node {key:?} has size_bytes {actual}, expected {expected}")]
    SizeMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },
}
