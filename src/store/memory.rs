//! In-process key-value store.
//!
//! Holds typed values in a `BTreeMap` and applies the same size rules as the
//! live backend. Also able to inject store faults for specific keys, which
//! is how the all-or-nothing behavior of aggregation is exercised.

use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use super::{total_len, KeySource, SizeProbe, StoreError, ValueKind};

/// A value held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    String(Vec<u8>),
    Set(Vec<Vec<u8>>),
    /// Field/value pairs.
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    List(Vec<Vec<u8>>),
    SortedSet(Vec<(Vec<u8>, f64)>),
    /// A kind with no size rule (e.g. a stream).
    Opaque(String),
}

impl StoredValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            StoredValue::String(_) => ValueKind::String,
            StoredValue::Set(_) => ValueKind::Set,
            StoredValue::Hash(_) => ValueKind::Hash,
            StoredValue::List(_) => ValueKind::List,
            StoredValue::SortedSet(_) => ValueKind::SortedSet,
            StoredValue::Opaque(name) => ValueKind::Other(name.clone()),
        }
    }

    /// Byte size under the report's size rules.
    pub fn size(&self) -> u64 {
        match self {
            StoredValue::String(data) => data.len() as u64,
            StoredValue::Set(members) | StoredValue::List(members) => total_len(members),
            // Only field values count, as with `HVALS`.
            StoredValue::Hash(pairs) => total_len(pairs.iter().map(|(_, value)| value)),
            StoredValue::SortedSet(members) => total_len(members.iter().map(|(m, _)| m)),
            StoredValue::Opaque(_) => 0,
        }
    }
}

/// In-memory store implementing [`KeySource`] and [`SizeProbe`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, StoredValue>,
    failing: HashSet<String>,
    unavailable: bool,
    probes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store of string values, each `size` bytes long.
    pub fn with_sizes<'a>(entries: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
        let mut store = Self::new();
        for (key, size) in entries {
            store.insert(key, StoredValue::String(vec![b'x'; size]));
        }
        store
    }

    pub fn insert(&mut self, key: impl Into<String>, value: StoredValue) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<StoredValue> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Make every probe of `key` fail as if the store went away.
    pub fn fail_on(&mut self, key: impl Into<String>) {
        self.failing.insert(key.into());
    }

    /// Make every call fail as if the store cannot be reached.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Number of `probe_size` calls served so far.
    pub fn probe_count(&self) -> u64 {
        self.probes
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl KeySource for MemoryStore {
    fn enumerate_keys(&mut self) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        Ok(self.values.keys().cloned().collect())
    }
}

impl SizeProbe for MemoryStore {
    fn probe_size(&mut self, key: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        self.probes += 1;

        if self.failing.contains(key) {
            return Err(StoreError::Unavailable(format!("probe of {key:?} failed")));
        }

        match self.values.get(key) {
            Some(value) => {
                let kind = value.kind();
                if !kind.is_sized() {
                    trace!(key, %kind, "Unclassified value, counting as 0 bytes");
                }
                Ok(value.size())
            }
            None => {
                trace!(key, "Key vanished before probing, counting as 0 bytes");
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_rules() {
        let mut store = MemoryStore::new();
        store.insert("s", StoredValue::String(b"hello".to_vec()));
        store.insert("set", StoredValue::Set(vec![b"ab".to_vec(), b"c".to_vec()]));
        store.insert(
            "h",
            StoredValue::Hash(vec![
                (b"field-one".to_vec(), b"1234".to_vec()),
                (b"f2".to_vec(), b"56".to_vec()),
            ]),
        );
        store.insert("stream", StoredValue::Opaque("stream".to_string()));

        assert_eq!(store.probe_size("s").unwrap(), 5);
        assert_eq!(store.probe_size("set").unwrap(), 3);
        assert_eq!(store.probe_size("h").unwrap(), 6);
        assert_eq!(store.probe_size("stream").unwrap(), 0);
        assert_eq!(store.probe_size("missing").unwrap(), 0);
        assert_eq!(store.probe_count(), 5);
    }

    #[test]
    fn test_injected_faults() {
        let mut store = MemoryStore::with_sizes([("a:b", 3)]);
        store.fail_on("a:b");
        assert!(store.probe_size("a:b").is_err());

        store.set_unavailable(true);
        assert!(matches!(
            store.enumerate_keys(),
            Err(StoreError::Unavailable(_))
        ));
    }
}
