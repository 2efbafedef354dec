//! Live Redis backend.
//!
//! Enumeration uses cursor-based `SCAN` so the server is never blocked by a
//! single `KEYS *`. Probing asks for the value's `TYPE` first and then reads
//! only what the size rule for that kind needs.

use std::collections::BTreeSet;

use tracing::{debug, info, trace};

use super::{decode_key, total_len, KeySource, SizeProbe, StoreError, ValueKind};
use crate::config::StoreConfig;

/// Blocking connection to a Redis server.
pub struct RedisStore {
    conn: redis::Connection,
    scan_count: usize,
}

impl RedisStore {
    /// Open a connection described by `config`.
    pub fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_connection()?;
        info!(url = %config.url, "Connected to store");

        Ok(Self {
            conn,
            scan_count: config.scan_count.max(1),
        })
    }

    fn kind_of(&mut self, key: &str) -> Result<ValueKind, StoreError> {
        let reply: String = redis::cmd("TYPE").arg(key).query(&mut self.conn)?;
        Ok(ValueKind::from_type_reply(&reply))
    }

    fn members(&mut self, command: &str, key: &str, range: bool) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd(command);
        cmd.arg(key);
        if range {
            cmd.arg(0).arg(-1);
        }
        let items: Vec<Vec<u8>> = cmd.query(&mut self.conn)?;
        Ok(total_len(items))
    }
}

impl KeySource for RedisStore {
    fn enumerate_keys(&mut self) -> Result<Vec<String>, StoreError> {
        // SCAN may return a key more than once while the keyspace rehashes.
        let mut keys = BTreeSet::new();
        let mut cursor: u64 = 0;
        let mut rounds = 0u64;

        loop {
            let (next, batch): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("COUNT")
                .arg(self.scan_count)
                .query(&mut self.conn)?;

            for raw in batch {
                keys.insert(decode_key(raw)?);
            }

            rounds += 1;
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(rounds, keys = keys.len(), "Keyspace scan complete");
        Ok(keys.into_iter().collect())
    }
}

impl SizeProbe for RedisStore {
    fn probe_size(&mut self, key: &str) -> Result<u64, StoreError> {
        let kind = self.kind_of(key)?;

        let size = match kind {
            ValueKind::String => {
                let len: u64 = redis::cmd("STRLEN").arg(key).query(&mut self.conn)?;
                len
            }
            ValueKind::Set => self.members("SMEMBERS", key, false)?,
            ValueKind::Hash => self.members("HVALS", key, false)?,
            ValueKind::List => self.members("LRANGE", key, true)?,
            ValueKind::SortedSet => self.members("ZRANGE", key, true)?,
            ValueKind::Missing | ValueKind::Other(_) => {
                trace!(key, %kind, "Unclassified value, counting as 0 bytes");
                0
            }
        };

        Ok(size)
    }
}

/// Connects on first use, so report runs served from a snapshot never
/// touch the network.
pub struct LazyRedisStore {
    config: StoreConfig,
    inner: Option<RedisStore>,
}

impl LazyRedisStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_some()
    }

    fn connection(&mut self) -> Result<&mut RedisStore, StoreError> {
        if self.inner.is_none() {
            self.inner = Some(RedisStore::connect(&self.config)?);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("connection not established".to_string()))
    }
}

impl KeySource for LazyRedisStore {
    fn enumerate_keys(&mut self) -> Result<Vec<String>, StoreError> {
        self.connection()?.enumerate_keys()
    }
}

impl SizeProbe for LazyRedisStore {
    fn probe_size(&mut self, key: &str) -> Result<u64, StoreError> {
        self.connection()?.probe_size(key)
    }
}
