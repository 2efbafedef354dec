//! Named on-disk snapshots of aggregated trees.
//!
//! One file per report name, at `<dir>/<name>.snapshot`. Writes go to a
//! temporary sibling first and are renamed into place. A snapshot that
//! cannot be decoded is reported as absent so the caller rebuilds it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::codec::{self, CodecError, Snapshot, SnapshotMeta};
use crate::config::SnapshotConfig;
use crate::tree::TreeNode;

pub const SNAPSHOT_EXTENSION: &str = "snapshot";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("invalid report name {0:?}: use letters, digits, '.', '_' or '-'")]
    InvalidName(String),

    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encoding failed: {0}")]
    Codec(#[from] CodecError),
}

impl SnapshotError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// SHA-256 over the sorted, de-duplicated key list.
pub fn fingerprint<I, S>(keys: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let owned: Vec<S> = keys.into_iter().collect();
    let mut sorted: Vec<&str> = owned.iter().map(|key| key.as_ref()).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for key in sorted {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

impl SnapshotMeta {
    /// Metadata for a tree built right now from `keys`.
    pub fn for_keys(name: &str, keys: &[String]) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            fingerprint: fingerprint(keys),
            key_count: keys.len(),
        }
    }
}

/// Directory of named snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    dir: PathBuf,
    zstd_level: i32,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>, zstd_level: i32) -> Self {
        Self {
            dir: dir.into(),
            zstd_level,
        }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(config.dir.clone(), config.zstd_level)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic file path for a report name.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, SnapshotError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(SnapshotError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.{SNAPSHOT_EXTENSION}")))
    }

    /// Persist `root` under `meta.name`, replacing any previous snapshot.
    pub fn save(&self, root: &TreeNode, meta: &SnapshotMeta) -> Result<PathBuf, SnapshotError> {
        let path = self.path_for(&meta.name)?;
        let bytes = codec::encode(meta, root, self.zstd_level)?;

        std::fs::create_dir_all(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;

        let tmp = path.with_extension(format!("{SNAPSHOT_EXTENSION}.tmp"));
        std::fs::write(&tmp, &bytes).map_err(|e| SnapshotError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| SnapshotError::io(&path, e))?;

        info!(
            name = %meta.name,
            path = %path.display(),
            size = bytes.len(),
            keys = meta.key_count,
            "Saved snapshot"
        );
        Ok(path)
    }

    /// Load the snapshot for `name`, or `None` when it must be rebuilt.
    pub fn load(&self, name: &str) -> Result<Option<Snapshot>, SnapshotError> {
        let path = self.path_for(name)?;

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(name, path = %path.display(), "No snapshot");
                return Ok(None);
            }
            Err(e) => return Err(SnapshotError::io(&path, e)),
        };

        match codec::decode(&bytes) {
            Ok(snapshot) => {
                let age = Utc::now().signed_duration_since(snapshot.meta.created_at);
                info!(
                    name,
                    path = %path.display(),
                    keys = snapshot.meta.key_count,
                    age_secs = age.num_seconds(),
                    "Loaded snapshot"
                );
                Ok(Some(snapshot))
            }
            Err(e) => {
                warn!(name, path = %path.display(), error = %e, "Ignoring unreadable snapshot");
                Ok(None)
            }
        }
    }

    /// Delete the snapshot for `name`. Returns whether a file was removed.
    pub fn remove(&self, name: &str) -> Result<bool, SnapshotError> {
        let path = self.path_for(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(name, path = %path.display(), "Removed snapshot");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SnapshotError::io(&path, e)),
        }
    }
}
