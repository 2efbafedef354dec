//! Persisted report snapshots.
//!
//! - [`codec`]: binary snapshot format (header + zstd-compressed JSON)
//! - [`snapshot`]: SnapshotCache, one file per report name

pub mod codec;
pub mod snapshot;

pub use codec::{CodecError, Snapshot, SnapshotMeta};
pub use snapshot::{fingerprint, SnapshotCache, SnapshotError};
