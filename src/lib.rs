//! keyspace-report: hierarchical memory-utilization reports for key-value stores.
//!
//! Keys such as `user:42:profile` are indexed into a prefix tree on their
//! `:`-delimited segments. Every leaf is measured once, sizes and key counts
//! are summed up to each prefix, and the tree is cut at a chosen depth to
//! produce a report like:
//!
//! ```text
//! Key                 Nr. keys   Size (KB)
//! --------------------------------------------
//! user:*              120000     5120.50
//! session:*           4000       310.25
//! ```
//!
//! Aggregated trees are cached on disk per report name so repeated runs
//! skip the store scan.

pub mod cache;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod tree;
