//! Load-or-build orchestration.
//!
//! ```text
//! store --enumerate--> KeyTrie --> AggregationEngine --> SnapshotCache.save
//!                                                              |
//! SnapshotCache.load (hit) ------------------------------------+--> report
//! ```

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{fingerprint, SnapshotCache, SnapshotError, SnapshotMeta};
use crate::config::Config;
use crate::store::{KeySource, SizeProbe, StoreError};
use crate::tree::{AggregationEngine, AggregationError, KeyTrie, TreeNode};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot enumerate keys: {0}")]
    Enumerate(#[source] StoreError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Where the tree of a report run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cached,
    Built,
}

/// An aggregated tree ready for reporting.
#[derive(Debug)]
pub struct Outcome {
    pub root: TreeNode,
    pub meta: SnapshotMeta,
    pub source: Source,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Delete the stored snapshot before running.
    pub regenerate: bool,

    /// Rebuild when the live key set differs from the snapshot's.
    pub verify_keyspace: bool,
}

/// Produces aggregated trees, from the snapshot cache when possible.
#[derive(Debug, Clone)]
pub struct ReportPipeline {
    trie: KeyTrie,
    engine: AggregationEngine,
    cache: SnapshotCache,
}

impl ReportPipeline {
    pub fn new(trie: KeyTrie, engine: AggregationEngine, cache: SnapshotCache) -> Self {
        Self {
            trie,
            engine,
            cache,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            KeyTrie::new(config.report.delimiter),
            AggregationEngine::new(config.store.progress_every),
            SnapshotCache::from_config(&config.snapshot),
        )
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Return the aggregated tree for `name`, scanning the store only when
    /// no usable snapshot exists.
    pub fn load_or_build<S>(
        &self,
        store: &mut S,
        name: &str,
        options: PipelineOptions,
    ) -> Result<Outcome, PipelineError>
    where
        S: KeySource + SizeProbe + ?Sized,
    {
        // Reject bad names before touching the store.
        self.cache.path_for(name)?;

        if options.regenerate {
            self.cache.remove(name)?;
        }

        let mut live_keys = None;

        if let Some(snapshot) = self.cache.load(name)? {
            if !options.verify_keyspace {
                return Ok(Outcome {
                    root: snapshot.root,
                    meta: snapshot.meta,
                    source: Source::Cached,
                });
            }

            let keys = store.enumerate_keys().map_err(PipelineError::Enumerate)?;
            if fingerprint(&keys) == snapshot.meta.fingerprint {
                info!(name, "Snapshot matches live keyspace");
                return Ok(Outcome {
                    root: snapshot.root,
                    meta: snapshot.meta,
                    source: Source::Cached,
                });
            }
            info!(name, "Live keyspace changed since snapshot, rebuilding");
            live_keys = Some(keys);
        }

        let keys = match live_keys {
            Some(keys) => keys,
            None => store.enumerate_keys().map_err(PipelineError::Enumerate)?,
        };

        let (root, meta) = self.build(store, name, keys)?;

        // The report does not depend on the cache, so a failed save only costs
        // the next run a rescan.
        if let Err(e) = self.cache.save(&root, &meta) {
            warn!(name, error = %e, "Could not save snapshot");
        }

        Ok(Outcome {
            root,
            meta,
            source: Source::Built,
        })
    }

    /// Index and aggregate `keys` without consulting the cache.
    pub fn build<P>(
        &self,
        probe: &mut P,
        name: &str,
        keys: Vec<String>,
    ) -> Result<(TreeNode, SnapshotMeta), PipelineError>
    where
        P: SizeProbe + ?Sized,
    {
        info!(keys = keys.len(), "Building keyspace tree");
        let build = self.trie.build(&keys);
        if !build.shadowed.is_empty() {
            warn!(
                count = build.shadowed.len(),
                "Some keys are also prefixes of other keys; their own values are not counted"
            );
        }

        let mut root = build.root;
        self.engine.populate(&mut root, probe)?;

        let meta = SnapshotMeta::for_keys(name, &keys);
        Ok((root, meta))
    }
}
