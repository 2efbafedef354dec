//! Access to the backing key-value store.
//!
//! The report only needs two things from a store:
//! - [`KeySource`]: enumerate every key currently present
//! - [`SizeProbe`]: measure the byte size of one key's value
//!
//! Backends:
//! - [`memory`]: in-process store for tests and offline runs
//! - `redis`: live Redis connection (feature `redis-backend`)

pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

use thiserror::Error;

pub use memory::{MemoryStore, StoredValue};

#[cfg(feature = "redis-backend")]
pub use self::redis::{LazyRedisStore, RedisStore};

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or answered with a protocol fault.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A key is not valid UTF-8. Such keys cannot be split into segments or
    /// probed again by name, so the scan is aborted instead of guessing.
    #[error("key {} is not valid UTF-8", String::from_utf8_lossy(.0))]
    NonUtf8Key(Vec<u8>),
}

#[cfg(feature = "redis-backend")]
impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Storage kind of a value, as reported by the store's `TYPE` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Set,
    Hash,
    List,
    SortedSet,
    /// Key disappeared between enumeration and probing.
    Missing,
    /// Any kind the size rules do not cover (streams, modules, ...).
    Other(String),
}

impl ValueKind {
    /// Parse a `TYPE` reply.
    pub fn from_type_reply(reply: &str) -> Self {
        match reply {
            "string" => ValueKind::String,
            "set" => ValueKind::Set,
            "hash" => ValueKind::Hash,
            "list" => ValueKind::List,
            "zset" => ValueKind::SortedSet,
            "none" => ValueKind::Missing,
            other => ValueKind::Other(other.to_string()),
        }
    }

    /// Whether the size rules know how to measure this kind.
    pub fn is_sized(&self) -> bool {
        !matches!(self, ValueKind::Missing | ValueKind::Other(_))
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::String => write!(f, "string"),
            ValueKind::Set => write!(f, "set"),
            ValueKind::Hash => write!(f, "hash"),
            ValueKind::List => write!(f, "list"),
            ValueKind::SortedSet => write!(f, "zset"),
            ValueKind::Missing => write!(f, "none"),
            ValueKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Enumerates all keys in a store.
pub trait KeySource {
    fn enumerate_keys(&mut self) -> Result<Vec<String>, StoreError>;
}

/// Measures the size of a single key's value in bytes.
///
/// Implementations return `Ok(0)` for kinds they cannot classify; only a
/// store fault is an error.
pub trait SizeProbe {
    fn probe_size(&mut self, key: &str) -> Result<u64, StoreError>;
}

/// Turn a raw key from the store into a `String`, byte for byte.
pub(crate) fn decode_key(raw: Vec<u8>) -> Result<String, StoreError> {
    String::from_utf8(raw).map_err(|err| StoreError::NonUtf8Key(err.into_bytes()))
}

/// Sum of byte lengths, the common size rule for every collection kind.
pub(crate) fn total_len<I, B>(items: I) -> u64
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    items.into_iter().map(|item| item.as_ref().len() as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_reply_parsing() {
        assert_eq!(ValueKind::from_type_reply("string"), ValueKind::String);
        assert_eq!(ValueKind::from_type_reply("zset"), ValueKind::SortedSet);
        assert_eq!(ValueKind::from_type_reply("none"), ValueKind::Missing);
        assert_eq!(
            ValueKind::from_type_reply("stream"),
            ValueKind::Other("stream".to_string())
        );
        assert!(!ValueKind::from_type_reply("stream").is_sized());
        assert!(ValueKind::Hash.is_sized());
    }

    #[test]
    fn test_decode_key() {
        assert_eq!(decode_key(b"user:1".to_vec()).unwrap(), "user:1");
        assert_eq!(decode_key("café:é".as_bytes().to_vec()).unwrap(), "café:é");

        // Distinct binary keys must not collapse into one replacement string.
        for raw in [b"k:\xff".to_vec(), b"k:\xfe".to_vec()] {
            match decode_key(raw.clone()) {
                Err(StoreError::NonUtf8Key(bytes)) => assert_eq!(bytes, raw),
                other => panic!("expected NonUtf8Key, got {other:?}"),
            }
        }

        let err = decode_key(b"k:\xff".to_vec()).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_total_len() {
        assert_eq!(total_len(vec![b"ab".to_vec(), b"cde".to_vec()]), 5);
        assert_eq!(total_len(Vec::<Vec<u8>>::new()), 0);
    }
}
