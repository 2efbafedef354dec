//! Snapshot file format.
//!
//! ```text
//! +--------------------------- 24-byte header ----------------------------+
//! | magic "KSREPORT" | version u32 LE | flags u32 LE | payload_len u64 LE |
//! +-----------------------------------------------------------------------+
//! | payload: zstd frame (flag COMPRESSED) containing the JSON envelope     |
//! +-----------------------------------------------------------------------+
//! ```
//!
//! The tree is stored as a flat pre-order list of nodes with their depth,
//! so neither encoding nor decoding recurses over the key hierarchy.

use bytemuck::{Pod, Zeroable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::node::collapse;
use crate::tree::{TreeError, TreeNode};

pub const MAGIC: [u8; 8] = *b"KSREPORT";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_LEN: usize = std::mem::size_of::<SnapshotHeader>();

/// Payload is a zstd frame.
pub const FLAG_COMPRESSED: u32 = 1;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("not a snapshot file (bad magic)")]
    BadMagic,

    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot truncated: expected {expected} payload bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("zstd failure: {0}")]
    Zstd(#[from] std::io::Error),

    #[error("JSON failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed node list: {0}")]
    Structure(String),

    #[error("aggregates do not add up: {0}")]
    Invariant(#[from] TreeError),
}

/// Fixed-size file header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SnapshotHeader {
    magic: [u8; 8],
    version: u32,
    flags: u32,
    payload_len: u64,
}

impl SnapshotHeader {
    fn new(flags: u32, payload_len: u64) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION.to_le(),
            flags: flags.to_le(),
            payload_len: payload_len.to_le(),
        }
    }

    pub fn version(&self) -> u32 {
        u32::from_le(self.version)
    }

    pub fn flags(&self) -> u32 {
        u32::from_le(self.flags)
    }

    pub fn payload_len(&self) -> u64 {
        u64::from_le(self.payload_len)
    }
}

/// Everything stored next to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// SHA-256 over the sorted key list the tree was built from.
    pub fingerprint: String,
    /// Keys enumerated from the store. Keys shadowed by deeper keys are
    /// included, so this can exceed the root's leaf count.
    pub key_count: usize,
}

/// A decoded snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub root: TreeNode,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    name: String,
    created_at: DateTime<Utc>,
    fingerprint: String,
    key_count: usize,
    nodes: Vec<NodeRecord>,
}

#[derive(Serialize, Deserialize)]
struct NodeRecord {
    depth: u32,
    segment: String,
    key: String,
    leaf_count: u64,
    size_bytes: u64,
}

/// Serialize a tree and its metadata, compressing the payload at `zstd_level`.
pub fn encode(meta: &SnapshotMeta, root: &TreeNode, zstd_level: i32) -> Result<Vec<u8>, CodecError> {
    let nodes = root
        .iter()
        .map(|(depth, node)| NodeRecord {
            depth: depth as u32,
            segment: node.segment().to_string(),
            key: node.key().to_string(),
            leaf_count: node.leaf_count(),
            size_bytes: node.size_bytes(),
        })
        .collect();

    let envelope = Envelope {
        name: meta.name.clone(),
        created_at: meta.created_at,
        fingerprint: meta.fingerprint.clone(),
        key_count: meta.key_count,
        nodes,
    };

    let json = serde_json::to_vec(&envelope)?;
    let payload = zstd::encode_all(json.as_slice(), zstd_level)?;
    let header = SnapshotHeader::new(FLAG_COMPRESSED, payload.len() as u64);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(bytemuck::bytes_of(&header));
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parse and validate a snapshot.
pub fn decode(bytes: &[u8]) -> Result<Snapshot, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::BadMagic);
    }

    let header: SnapshotHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_LEN]);
    if header.magic != MAGIC {
        return Err(CodecError::BadMagic);
    }
    if header.version() != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(header.version()));
    }

    let payload = &bytes[HEADER_LEN..];
    if payload.len() as u64 != header.payload_len() {
        return Err(CodecError::Truncated {
            expected: header.payload_len(),
            actual: payload.len() as u64,
        });
    }

    let envelope: Envelope = if header.flags() & FLAG_COMPRESSED != 0 {
        let json = zstd::decode_all(payload)?;
        serde_json::from_slice(&json)?
    } else {
        serde_json::from_slice(payload)?
    };

    let root = rebuild(envelope.nodes)?;
    root.check_invariants()?;

    Ok(Snapshot {
        meta: SnapshotMeta {
            name: envelope.name,
            created_at: envelope.created_at,
            fingerprint: envelope.fingerprint,
            key_count: envelope.key_count,
        },
        root,
    })
}

fn rebuild(records: Vec<NodeRecord>) -> Result<TreeNode, CodecError> {
    let expected = records.len();
    let mut records = records.into_iter();

    let first = records
        .next()
        .ok_or_else(|| CodecError::Structure("empty node list".to_string()))?;
    if first.depth != 0 {
        return Err(CodecError::Structure("first node is not the root".to_string()));
    }

    let mut stack = vec![TreeNode::restored_root(first.leaf_count, first.size_bytes)];

    for record in records {
        let depth = record.depth as usize;
        if depth == 0 || depth > stack.len() {
            return Err(CodecError::Structure(format!(
                "node {:?} at depth {} under a parent at depth {}",
                record.key,
                depth,
                stack.len() - 1
            )));
        }
        collapse(&mut stack, depth);
        stack.push(TreeNode::with_totals(
            record.segment,
            record.key,
            record.leaf_count,
            record.size_bytes,
        ));
    }

    collapse(&mut stack, 1);
    let root = stack
        .pop()
        .ok_or_else(|| CodecError::Structure("root lost while rebuilding".to_string()))?;

    if root.node_count() != expected {
        return Err(CodecError::Structure(format!(
            "{} records but {} distinct nodes",
            expected,
            root.node_count()
        )));
    }
    Ok(root)
}
