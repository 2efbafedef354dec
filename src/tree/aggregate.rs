//! Bottom-up aggregation of leaf counts and sizes.
//!
//! Population runs in two phases:
//! 1. Probe: every leaf is measured once through the [`SizeProbe`]. The tree
//!    is only read, so a store fault leaves it exactly as it was.
//! 2. Fold: sizes are folded into the tree post-order with an explicit work
//!    stack. This phase cannot fail.
//!
//! Neither phase recurses, so key depth is bounded by memory only.

use std::collections::{btree_map, HashMap};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use super::TreeNode;
use crate::store::{SizeProbe, StoreError};

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("size probe failed for key {key:?} after {probed} keys: {source}")]
    Probe {
        key: String,
        probed: usize,
        #[source]
        source: StoreError,
    },
}

/// Aggregated totals of a (sub)tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub leaf_count: u64,
    pub size_bytes: u64,
}

impl Totals {
    pub fn of(node: &TreeNode) -> Self {
        Self {
            leaf_count: node.leaf_count(),
            size_bytes: node.size_bytes(),
        }
    }
}

/// Decorates a tree with per-node leaf counts and sizes.
#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    /// Log progress every this many probed leaves (0 = never).
    progress_every: usize,
}

impl AggregationEngine {
    pub fn new(progress_every: usize) -> Self {
        Self { progress_every }
    }

    /// Probe every leaf and aggregate totals up to the root.
    ///
    /// All-or-nothing: on error the tree is left untouched and the caller
    /// decides whether to retry the whole pass. Calling this again on a
    /// populated tree recomputes everything from fresh probes.
    pub fn populate<P>(&self, root: &mut TreeNode, probe: &mut P) -> Result<Totals, AggregationError>
    where
        P: SizeProbe + ?Sized,
    {
        let started = Instant::now();
        let sizes = self.probe_leaves(root, probe)?;

        let tree = std::mem::take(root);
        *root = fold(tree, &sizes);

        let totals = Totals::of(root);
        info!(
            leaves = totals.leaf_count,
            size_bytes = totals.size_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Keyspace aggregated"
        );
        Ok(totals)
    }

    fn probe_leaves<P>(
        &self,
        root: &TreeNode,
        probe: &mut P,
    ) -> Result<HashMap<String, u64>, AggregationError>
    where
        P: SizeProbe + ?Sized,
    {
        let mut sizes = HashMap::new();

        for leaf in root.leaves() {
            let size = probe
                .probe_size(leaf.key())
                .map_err(|source| AggregationError::Probe {
                    key: leaf.key().to_string(),
                    probed: sizes.len(),
                    source,
                })?;
            sizes.insert(leaf.key().to_string(), size);

            if self.progress_every > 0 && sizes.len() % self.progress_every == 0 {
                info!(probed = sizes.len(), "Probing key sizes");
            }
        }

        debug!(probed = sizes.len(), "All leaves probed");
        Ok(sizes)
    }
}

/// A node being rebuilt, with the children not yet folded into it.
struct Frame {
    node: TreeNode,
    pending: btree_map::IntoIter<String, TreeNode>,
}

impl Frame {
    fn enter(mut node: TreeNode) -> Self {
        node.reset_totals();
        let pending = node.take_children().into_iter();
        Self { node, pending }
    }
}

fn fold(mut root: TreeNode, sizes: &HashMap<String, u64>) -> TreeNode {
    let leaf_size = |node: &TreeNode| sizes.get(node.key()).copied().unwrap_or(0);

    if root.is_leaf() {
        let size = leaf_size(&root);
        root.set_leaf_size(size);
        return root;
    }

    let mut stack = vec![Frame::enter(root)];
    let mut finished = None;

    while let Some(frame) = stack.last_mut() {
        match frame.pending.next() {
            Some((_, mut child)) if child.is_leaf() => {
                let size = leaf_size(&child);
                child.set_leaf_size(size);
                frame.node.absorb(child);
            }
            Some((_, child)) => stack.push(Frame::enter(child)),
            None => {
                if let Some(done) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.node.absorb(done.node),
                        None => finished = Some(done.node),
                    }
                }
            }
        }
    }

    finished.unwrap_or_default()
}
