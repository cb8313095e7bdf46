//! In-Memory Storage Backend
//!
//! A `HashMap` from key to [`Entry`]. There is no locking here: the service's
//! reader/writer lock is the only synchronization, so every operation is a
//! direct map operation.

use super::{Entry, Snapshot, Storage, StorageResult};
use bytes::Bytes;
use std::collections::HashMap;

/// Stores all entries in a single `HashMap`.
///
/// # Example
///
/// ```
/// use ttlkv::storage::{MemoryStorage, Storage};
/// use bytes::Bytes;
///
/// let mut storage = MemoryStorage::new();
/// storage.put(Bytes::from("session"), Bytes::from("abc123"), 1060).unwrap();
///
/// assert!(storage.contains(b"session").unwrap());
/// assert_eq!(storage.remove_expired(1061).unwrap(), 1);
/// assert!(storage.is_empty().unwrap());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: HashMap<Bytes, Entry>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: HashMap::with_capacity(capacity),
        }
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Entry>> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: Bytes, value: Bytes, expires_at: i64) -> StorageResult<()> {
        self.data.insert(key, Entry { value, expires_at });
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.data.remove(key).is_some())
    }

    fn remove_if_not_expired(&mut self, key: &[u8], now: i64) -> StorageResult<Option<Entry>> {
        if !self.data.get(key).is_some_and(|entry| entry.is_live_at(now)) {
            return Ok(None);
        }
        Ok(self.data.remove(key))
    }

    fn get_all(&self) -> StorageResult<Snapshot> {
        Ok(self.data.clone())
    }

    fn put_all(&mut self, entries: Snapshot) -> StorageResult<()> {
        self.data.extend(entries);
        Ok(())
    }

    fn replace_all(&mut self, entries: Snapshot) -> StorageResult<()> {
        self.data.clear();
        self.data.extend(entries);
        Ok(())
    }

    fn remove_expired(&mut self, now: i64) -> StorageResult<u64> {
        let before = self.data.len();
        self.data.retain(|_, entry| entry.is_live_at(now));
        Ok((before - self.data.len()) as u64)
    }

    fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.data.contains_key(key))
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.data.len())
    }
}
