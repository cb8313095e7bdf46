//! Storage Backends
//!
//! This module defines the [`Storage`] contract that every backend satisfies
//! and the two backends TtlKV ships with:
//!
//! - [`MemoryStorage`]: a plain `HashMap`, no internal locking
//! - [`SqliteStorage`]: a single SQLite table keyed by key
//!
//! ## Concurrency
//!
//! Backends are **not** responsible for coordinating concurrent callers.
//! Reads take `&self` and writes take `&mut self`; the service wraps the
//! backend in a single reader/writer lock (see [`crate::service::Guarded`]),
//! so a backend only ever sees one writer at a time.
//!
//! ## Expiration
//!
//! Backends store expired entries like any other entry. The only
//! expiration-aware primitives are [`Storage::get_if_not_expired`],
//! [`Storage::remove_if_not_expired`] and [`Storage::remove_expired`], all of
//! which use [`Entry::is_live_at`] as the single boundary rule.
//!
//! ## Example
//!
//! ```
//! use ttlkv::storage::{MemoryStorage, Storage};
//! use bytes::Bytes;
//!
//! let mut storage = MemoryStorage::new();
//! storage.put(Bytes::from("a"), Bytes::from("1"), 1060).unwrap();
//!
//! assert!(storage.get_if_not_expired(b"a", 1060).unwrap().is_some());
//! assert!(storage.get_if_not_expired(b"a", 1061).unwrap().is_none());
//! ```

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

/// A stored value together with its absolute expiration instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored value
    pub value: Bytes,
    /// Expiration instant in seconds since the Unix epoch (UTC)
    pub expires_at: i64,
}

impl Entry {
    pub fn new(value: impl Into<Bytes>, expires_at: i64) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Returns true if the entry is still visible at `now`.
    ///
    /// An entry is live up to and including its expiration instant.
    #[inline]
    pub fn is_live_at(&self, now: i64) -> bool {
        self.expires_at >= now
    }

    /// Returns true once `now` has moved past the expiration instant.
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        !self.is_live_at(now)
    }
}

/// A point-in-time copy of a whole store.
pub type Snapshot = HashMap<Bytes, Entry>;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite backend failed
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A row in the durable table could not be represented as an entry
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The mapping primitives the service is built on.
///
/// All implementations must behave identically; callers may swap one for
/// another without observing a difference beyond durability.
pub trait Storage: Send + Sync {
    /// Returns the entry for `key` whether or not it has expired.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Entry>>;

    /// Returns the entry for `key` only if it is live at `now`.
    fn get_if_not_expired(&self, key: &[u8], now: i64) -> StorageResult<Option<Entry>> {
        Ok(self.get(key)?.filter(|entry| entry.is_live_at(now)))
    }

    /// Inserts or fully replaces the entry for `key`.
    fn put(&mut self, key: Bytes, value: Bytes, expires_at: i64) -> StorageResult<()>;

    /// Deletes `key`, reporting whether it was present.
    fn remove(&mut self, key: &[u8]) -> StorageResult<bool>;

    /// Deletes and returns the entry for `key` only if it is live at `now`.
    ///
    /// An expired entry is left in place.
    fn remove_if_not_expired(&mut self, key: &[u8], now: i64) -> StorageResult<Option<Entry>>;

    /// Copies every entry, expired ones included.
    fn get_all(&self) -> StorageResult<Snapshot>;

    /// Upserts every entry in `entries`, leaving other keys untouched.
    fn put_all(&mut self, entries: Snapshot) -> StorageResult<()>;

    /// Replaces the whole store with `entries`.
    fn replace_all(&mut self, entries: Snapshot) -> StorageResult<()>;

    /// Deletes every entry that has expired at `now`, returning how many
    /// were removed.
    fn remove_expired(&mut self, now: i64) -> StorageResult<u64>;

    /// Returns true if `key` is physically present.
    fn contains(&self, key: &[u8]) -> StorageResult<bool>;

    /// Number of physically present entries, expired ones included.
    fn len(&self) -> StorageResult<usize>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Runs the backend-independent half of the storage contract against a
/// fresh backend. Shared by the backend test modules.
#[cfg(test)]
pub(crate) fn check_contract(storage: &mut dyn Storage) {
    let key = |s: &str| Bytes::from(s.to_string());

    // put / get / contains
    storage.put(key("a"), key("1"), 1060).unwrap();
    assert_eq!(storage.get(b"a").unwrap(), Some(Entry::new("1", 1060)));
    assert!(storage.contains(b"a").unwrap());
    assert!(!storage.contains(b"missing").unwrap());

    // full replacement
    storage.put(key("a"), key("2"), 2000).unwrap();
    assert_eq!(storage.get(b"a").unwrap(), Some(Entry::new("2", 2000)));
    assert_eq!(storage.len().unwrap(), 1);

    // boundary: live exactly at the expiration instant
    assert!(storage.get_if_not_expired(b"a", 2000).unwrap().is_some());
    assert!(storage.get_if_not_expired(b"a", 2001).unwrap().is_none());
    // raw get still sees it
    assert!(storage.get(b"a").unwrap().is_some());

    // remove_if_not_expired leaves expired entries alone
    assert_eq!(storage.remove_if_not_expired(b"a", 2001).unwrap(), None);
    assert!(storage.contains(b"a").unwrap());
    assert_eq!(
        storage.remove_if_not_expired(b"a", 2000).unwrap(),
        Some(Entry::new("2", 2000))
    );
    assert!(!storage.contains(b"a").unwrap());

    // remove
    storage.put(key("b"), key("1"), 10).unwrap();
    assert!(storage.remove(b"b").unwrap());
    assert!(!storage.remove(b"b").unwrap());

    // put_all merges
    storage.put(key("keep"), key("k"), 100).unwrap();
    let mut batch = Snapshot::new();
    batch.insert(key("x"), Entry::new("x", 50));
    batch.insert(key("y"), Entry::new("y", 150));
    storage.put_all(batch).unwrap();
    assert_eq!(storage.len().unwrap(), 3);

    // get_all includes expired entries
    let all = storage.get_all().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.get(&b"x"[..]), Some(&Entry::new("x", 50)));

    // remove_expired uses the strict comparison
    assert_eq!(storage.remove_expired(100).unwrap(), 1);
    assert!(!storage.contains(b"x").unwrap());
    assert!(storage.contains(b"keep").unwrap());
    assert_eq!(storage.remove_expired(100).unwrap(), 0);

    // replace_all clears first
    let mut replacement = Snapshot::new();
    replacement.insert(key("z"), Entry::new("z", 500));
    storage.replace_all(replacement).unwrap();
    assert_eq!(storage.len().unwrap(), 1);
    assert!(!storage.contains(b"keep").unwrap());
    assert!(storage.contains(b"z").unwrap());

    storage.replace_all(Snapshot::new()).unwrap();
    assert!(storage.is_empty().unwrap());
}
