//! The Key-Value Service
//!
//! [`KvService`] turns the storage primitives into the externally visible
//! operations. It owns the backend behind a [`Guarded`] lock and reads time
//! from an injected [`Clock`].
//!
//! ## Locking
//!
//! | operation       | lock   |
//! |-----------------|--------|
//! | `get`, `dump`   | read   |
//! | `set`, `delete` | write  |
//! | `restore`       | write  |
//! | `evict_expired` | write  |
//!
//! ## Expiration
//!
//! Reads hide expired entries but leave them in place; the reaper (or
//! `delete`, or the `auto_remove_expired` policy) removes them physically.
//! Every call samples the clock once and uses that instant throughout.

use super::sync::Guarded;
use crate::clock::{self, Clock, SystemClock};
use crate::storage::{MemoryStorage, Snapshot, Storage, StorageError};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// TTL applied when a caller passes zero.
pub const DEFAULT_TTL_SECS: u64 = 120;

/// Errors returned by [`KvService`].
#[derive(Debug, Error)]
pub enum KvError {
    /// A negative TTL was passed to `set`
    #[error("invalid ttl {0}: must be zero (default) or a positive number of seconds")]
    InvalidTtl(i64),

    /// A restore payload contained an absent key or value
    #[error("restore payload contains an absent key or value")]
    InvalidEntry,

    /// Keys must be non-empty
    #[error("key must not be empty")]
    EmptyKey,

    /// The storage backend failed
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

pub type KvResult<T> = Result<T, KvError>;

/// Tunables for [`KvService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// TTL in seconds used when `set` is called with a TTL of zero
    pub default_ttl: u64,

    /// Physically remove expired entries as soon as a read notices them:
    /// `get` removes the entry it found, `dump` runs an eviction pass if it
    /// filtered anything out
    pub auto_remove_expired: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL_SECS,
            auto_remove_expired: false,
        }
    }
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceStats {
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub restores: u64,
    /// Entries removed by eviction passes
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    get_ops: AtomicU64,
    set_ops: AtomicU64,
    del_ops: AtomicU64,
    restores: AtomicU64,
    evicted: AtomicU64,
}

/// A TTL key-value store over one storage backend.
///
/// Wrap it in an `Arc` to share it between connection tasks and the reaper.
///
/// # Example
///
/// ```
/// use ttlkv::clock::ManualClock;
/// use ttlkv::service::{KvService, ServiceConfig};
/// use ttlkv::storage::MemoryStorage;
/// use bytes::Bytes;
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::new(1000));
/// let service = KvService::new(
///     Box::new(MemoryStorage::new()),
///     clock.clone(),
///     ServiceConfig::default(),
/// );
///
/// service.set(Bytes::from("a"), Bytes::from("1"), 60).unwrap();
///
/// clock.set(1059);
/// assert_eq!(service.get(b"a").unwrap(), Some(Bytes::from("1")));
///
/// clock.set(1061);
/// assert_eq!(service.get(b"a").unwrap(), None);
/// ```
pub struct KvService {
    store: Guarded<Box<dyn Storage>>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
    counters: Counters,
}

impl std::fmt::Debug for KvService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvService")
            .field("config", &self.config)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl KvService {
    pub fn new(storage: Box<dyn Storage>, clock: Arc<dyn Clock>, config: ServiceConfig) -> Self {
        Self {
            store: Guarded::new(storage),
            clock,
            config,
            counters: Counters::default(),
        }
    }

    /// An in-memory service on the wall clock.
    pub fn in_memory(config: ServiceConfig) -> Self {
        Self::new(Box::new(MemoryStorage::new()), Arc::new(SystemClock), config)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Stores `value` under `key` for `ttl_secs` seconds.
    ///
    /// A TTL of zero applies the configured default. A negative TTL is
    /// rejected and leaves the store untouched.
    pub fn set(&self, key: Bytes, value: Bytes, ttl_secs: i64) -> KvResult<()> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }
        let ttl = match ttl_secs {
            t if t < 0 => return Err(KvError::InvalidTtl(t)),
            0 => self.config.default_ttl,
            t => t as u64,
        };

        let expires_at = clock::expires_at(self.clock.now(), ttl);

        self.store.write().put(key, value, expires_at)?;

        self.counters.set_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the value for `key` if it is present and not expired.
    pub fn get(&self, key: &[u8]) -> KvResult<Option<Bytes>> {
        self.counters.get_ops.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        if !self.config.auto_remove_expired {
            let store = self.store.read();
            return Ok(store.get_if_not_expired(key, now)?.map(|e| e.value));
        }

        let expired = {
            let store = self.store.read();
            match store.get(key)? {
                Some(entry) if entry.is_live_at(now) => return Ok(Some(entry.value)),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut store = self.store.write();
            // Another writer may have refreshed the key between the two locks
            if let Some(entry) = store.get(key)? {
                if entry.is_expired_at(now) {
                    store.remove(key)?;
                    trace!("Removed expired entry on read");
                }
            }
        }

        Ok(None)
    }

    /// Removes `key` and returns its value if it was live.
    ///
    /// An expired entry is removed as well but reported as absent.
    pub fn delete(&self, key: &[u8]) -> KvResult<Option<Bytes>> {
        self.counters.del_ops.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        let mut store = self.store.write();
        match store.remove_if_not_expired(key, now)? {
            Some(entry) => Ok(Some(entry.value)),
            None => {
                store.remove(key)?;
                Ok(None)
            }
        }
    }

    /// Returns every entry that is live at the moment of the call.
    pub fn dump(&self) -> KvResult<Snapshot> {
        let now = self.clock.now();

        let mut snapshot = self.store.read().get_all()?;
        let stored = snapshot.len();
        snapshot.retain(|_, entry| entry.is_live_at(now));

        if self.config.auto_remove_expired && snapshot.len() < stored {
            let evicted = self.store.write().remove_expired(now)?;
            self.counters.evicted.fetch_add(evicted, Ordering::Relaxed);
            trace!(evicted, "Removed expired entries on dump");
        }

        Ok(snapshot)
    }

    /// Replaces the whole store with the live subset of `entries`.
    ///
    /// Concurrent readers see either the old store or the new one.
    pub fn restore(&self, mut entries: Snapshot) -> KvResult<()> {
        if entries.keys().any(|key| key.is_empty()) {
            return Err(KvError::InvalidEntry);
        }

        let now = self.clock.now();
        let offered = entries.len();
        entries.retain(|_, entry| entry.is_live_at(now));
        let kept = entries.len();

        self.store.write().replace_all(entries)?;

        self.counters.restores.fetch_add(1, Ordering::Relaxed);
        debug!(offered, kept, "Store restored from dump");
        Ok(())
    }

    /// Physically removes every expired entry, returning how many went.
    pub fn evict_expired(&self) -> KvResult<u64> {
        let now = self.clock.now();

        let evicted = self.store.write().remove_expired(now)?;

        self.counters.evicted.fetch_add(evicted, Ordering::Relaxed);
        Ok(evicted)
    }

    /// Number of physically present entries, expired ones included.
    pub fn len(&self) -> KvResult<usize> {
        Ok(self.store.read().len()?)
    }

    pub fn is_empty(&self) -> KvResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            get_ops: self.counters.get_ops.load(Ordering::Relaxed),
            set_ops: self.counters.set_ops.load(Ordering::Relaxed),
            del_ops: self.counters.del_ops.load(Ordering::Relaxed),
            restores: self.counters.restores.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }

    /// Raw presence check used by tests to tell "hidden" from "gone".
    #[cfg(test)]
    pub(crate) fn contains_raw(&self, key: &[u8]) -> bool {
        self.store.read().contains(key).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{Entry, SqliteStorage, StorageResult};

    fn service_at(now: i64) -> (KvService, Arc<ManualClock>) {
        service_with(Box::new(MemoryStorage::new()), now, ServiceConfig::default())
    }

    fn service_with(
        storage: Box<dyn Storage>,
        now: i64,
        config: ServiceConfig,
    ) -> (KvService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        (KvService::new(storage, clock.clone(), config), clock)
    }

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_get_within_ttl() {
        let (service, clock) = service_at(1000);

        service.set(b("a"), b("1"), 60).unwrap();

        clock.set(1059);
        assert_eq!(service.get(b"a").unwrap(), Some(b("1")));

        // still live exactly at the expiration instant
        clock.set(1060);
        assert_eq!(service.get(b"a").unwrap(), Some(b("1")));

        clock.set(1061);
        assert_eq!(service.get(b"a").unwrap(), None);

        // lazy expiration only hides the entry
        assert!(service.contains_raw(b"a"));
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let (service, _clock) = service_with(
            Box::new(MemoryStorage::new()),
            1000,
            ServiceConfig {
                default_ttl: 30,
                ..Default::default()
            },
        );

        service.set(b("a"), b("1"), 0).unwrap();

        let dump = service.dump().unwrap();
        assert_eq!(dump.get(&b"a"[..]), Some(&Entry::new("1", 1030)));
    }

    #[test]
    fn test_negative_ttl_rejected() {
        let (service, _clock) = service_at(1000);
        service.set(b("a"), b("1"), 60).unwrap();

        let err = service.set(b("a"), b("2"), -1).unwrap_err();
        assert!(matches!(err, KvError::InvalidTtl(-1)));

        assert_eq!(service.get(b"a").unwrap(), Some(b("1")));
        assert_eq!(service.len().unwrap(), 1);
    }

    #[test]
    fn test_empty_key_rejected() {
        let (service, _clock) = service_at(1000);
        assert!(matches!(
            service.set(Bytes::new(), b("1"), 10),
            Err(KvError::EmptyKey)
        ));
        assert!(service.is_empty().unwrap());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let (service, _clock) = service_at(1000);
        service.set(b("a"), b("1"), i64::MAX).unwrap();
        assert_eq!(service.dump().unwrap()[&b"a"[..]].expires_at, i64::MAX);
    }

    #[test]
    fn test_reset_refreshes_ttl() {
        let (service, clock) = service_at(1000);
        service.set(b("a"), b("1"), 10).unwrap();

        clock.set(1020);
        assert_eq!(service.get(b"a").unwrap(), None);

        service.set(b("a"), b("2"), 10).unwrap();
        assert_eq!(service.get(b"a").unwrap(), Some(b("2")));
    }

    #[test]
    fn test_delete_live() {
        let (service, _clock) = service_at(1000);
        service.set(b("a"), b("1"), 60).unwrap();

        assert_eq!(service.delete(b"a").unwrap(), Some(b("1")));
        assert_eq!(service.delete(b"a").unwrap(), None);
        assert!(!service.contains_raw(b"a"));
    }

    #[test]
    fn test_delete_expired_reports_missing_but_removes() {
        let (service, clock) = service_at(1000);
        service.set(b("a"), b("1"), 60).unwrap();

        clock.set(1061);
        assert_eq!(service.delete(b"a").unwrap(), None);
        assert!(!service.contains_raw(b"a"));
    }

    #[test]
    fn test_dump_filters_expired() {
        let (service, clock) = service_at(1000);
        service.set(b("short"), b("1"), 10).unwrap();
        service.set(b("long"), b("2"), 100).unwrap();

        clock.set(1011);
        let dump = service.dump().unwrap();

        assert_eq!(dump.len(), 1);
        assert_eq!(dump.get(&b"long"[..]), Some(&Entry::new("2", 1100)));
        // nothing was deleted by the dump
        assert_eq!(service.len().unwrap(), 2);
    }

    #[test]
    fn test_restore_replaces_and_filters() {
        let (service, _clock) = service_at(1_700_000_000);
        service.set(b("before"), b("old"), 1000).unwrap();

        let mut entries = Snapshot::new();
        entries.insert(b("x"), Entry::new("v", 1_700_000_100));
        entries.insert(b("stale"), Entry::new("v", 1_699_999_000));
        entries.insert(b("edge"), Entry::new("v", 1_700_000_000));
        service.restore(entries).unwrap();

        let dump = service.dump().unwrap();
        assert_eq!(dump.len(), 2);
        assert!(dump.contains_key(&b"x"[..]));
        assert!(dump.contains_key(&b"edge"[..]));
        assert!(!dump.contains_key(&b"before"[..]));
        assert!(!service.contains_raw(b"stale"));
    }

    #[test]
    fn test_restore_rejects_empty_key() {
        let (service, _clock) = service_at(1000);
        service.set(b("keep"), b("1"), 60).unwrap();

        let mut entries = Snapshot::new();
        entries.insert(Bytes::new(), Entry::new("v", 2000));
        assert!(matches!(
            service.restore(entries),
            Err(KvError::InvalidEntry)
        ));

        assert_eq!(service.get(b"keep").unwrap(), Some(b("1")));
    }

    #[test]
    fn test_evict_expired_is_idempotent() {
        let (service, clock) = service_at(1000);
        service.set(b("a"), b("1"), 10).unwrap();
        service.set(b("b"), b("2"), 100).unwrap();

        clock.set(1050);
        assert_eq!(service.evict_expired().unwrap(), 1);
        let after_first = service.dump().unwrap();

        assert_eq!(service.evict_expired().unwrap(), 0);
        assert_eq!(service.dump().unwrap(), after_first);
        assert_eq!(service.len().unwrap(), 1);
        assert_eq!(service.stats().evicted, 1);
    }

    #[test]
    fn test_auto_remove_on_read() {
        let (service, clock) = service_with(
            Box::new(MemoryStorage::new()),
            1000,
            ServiceConfig {
                auto_remove_expired: true,
                ..Default::default()
            },
        );
        service.set(b("a"), b("1"), 10).unwrap();
        assert_eq!(service.get(b"a").unwrap(), Some(b("1")));

        clock.set(1011);
        assert_eq!(service.get(b"a").unwrap(), None);
        assert!(!service.contains_raw(b"a"));
    }

    #[test]
    fn test_auto_remove_on_dump() {
        for storage in [
            Box::new(MemoryStorage::new()) as Box<dyn Storage>,
            Box::new(SqliteStorage::open_in_memory().unwrap()),
        ] {
            let (service, clock) = service_with(
                storage,
                1000,
                ServiceConfig {
                    auto_remove_expired: true,
                    ..Default::default()
                },
            );
            service.set(b("a"), b("1"), 10).unwrap();
            service.set(b("b"), b("2"), 100).unwrap();

            clock.set(1011);
            let dump = service.dump().unwrap();

            assert_eq!(dump.len(), 1);
            assert!(dump.contains_key(&b"b"[..]));
            assert!(!service.contains_raw(b"a"));
            assert!(service.contains_raw(b"b"));
            assert_eq!(service.stats().evicted, 1);
        }
    }

    #[test]
    fn test_dump_without_auto_remove_keeps_expired() {
        let (service, clock) = service_at(1000);
        service.set(b("a"), b("1"), 10).unwrap();

        clock.set(1011);
        assert!(service.dump().unwrap().is_empty());
        assert!(service.contains_raw(b"a"));
    }

    #[test]
    fn test_failed_set_is_not_counted() {
        let (service, _clock) = service_with(
            Box::new(FailingPut),
            1000,
            ServiceConfig::default(),
        );

        assert!(matches!(
            service.set(b("a"), b("1"), 10),
            Err(KvError::Storage(_))
        ));
        assert_eq!(service.stats().set_ops, 0);
    }

    /// A backend that rejects every write.
    struct FailingPut;

    impl Storage for FailingPut {
        fn get(&self, _key: &[u8]) -> StorageResult<Option<Entry>> {
            Ok(None)
        }
        fn put(&mut self, _key: Bytes, _value: Bytes, _expires_at: i64) -> StorageResult<()> {
            Err(StorageError::Corrupt("read-only".to_string()))
        }
        fn remove(&mut self, _key: &[u8]) -> StorageResult<bool> {
            Ok(false)
        }
        fn remove_if_not_expired(&mut self, _key: &[u8], _now: i64) -> StorageResult<Option<Entry>> {
            Ok(None)
        }
        fn get_all(&self) -> StorageResult<Snapshot> {
            Ok(Snapshot::new())
        }
        fn put_all(&mut self, _entries: Snapshot) -> StorageResult<()> {
            Ok(())
        }
        fn replace_all(&mut self, _entries: Snapshot) -> StorageResult<()> {
            Ok(())
        }
        fn remove_expired(&mut self, _now: i64) -> StorageResult<u64> {
            Ok(0)
        }
        fn contains(&self, _key: &[u8]) -> StorageResult<bool> {
            Ok(false)
        }
        fn len(&self) -> StorageResult<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_sqlite_backend_behaves_the_same() {
        let (service, clock) = service_with(
            Box::new(SqliteStorage::open_in_memory().unwrap()),
            1000,
            ServiceConfig::default(),
        );

        service.set(b("a"), b("1"), 60).unwrap();
        clock.set(1059);
        assert_eq!(service.get(b"a").unwrap(), Some(b("1")));

        clock.set(1061);
        assert_eq!(service.get(b"a").unwrap(), None);
        assert_eq!(service.delete(b"a").unwrap(), None);
        assert!(!service.contains_raw(b"a"));
    }

    #[test]
    fn test_stats() {
        let (service, _clock) = service_at(1000);
        service.set(b("a"), b("1"), 10).unwrap();
        service.get(b"a").unwrap();
        service.get(b"b").unwrap();
        service.delete(b"a").unwrap();

        let stats = service.stats();
        assert_eq!(stats.set_ops, 1);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.del_ops, 1);
    }
}
