//! SQLite Storage Backend
//!
//! Keeps every entry as one row of a single table:
//!
//! ```text
//! kv_entries
//! ┌──────────────┬──────────────┬──────────────────────┐
//! │ key (BLOB PK)│ value (BLOB) │ expires_at (INTEGER) │
//! └──────────────┴──────────────┴──────────────────────┘
//! ```
//!
//! `expires_at` holds epoch seconds and is indexed so that bulk eviction is a
//! range delete. Bulk writes (`put_all`, `replace_all`) run inside a single
//! transaction.
//!
//! `remove_if_not_expired` is a read followed by a conditional delete. The
//! pair is not atomic at the SQL level; the service's writer lock is what
//! keeps another writer from slipping in between.

use super::{Entry, Snapshot, Storage, StorageError, StorageResult};
use bytes::Bytes;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS kv_entries (
        key        BLOB    PRIMARY KEY NOT NULL,
        value      BLOB    NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS kv_entries_expires_at ON kv_entries (expires_at);
";

const UPSERT: &str = "
    INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
    ON CONFLICT (key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
";

/// Durable backend on top of a SQLite database.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so the connection lives
/// behind a mutex. Write paths reach it through `&mut self` without locking.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and ensures the table exists.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening SQLite storage");
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a private, non-persistent database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn entry_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Entry> {
    let value: Vec<u8> = row.get(offset)?;
    Ok(Entry {
        value: Bytes::from(value),
        expires_at: row.get(offset + 1)?,
    })
}

fn upsert_all(conn: &Connection, entries: Snapshot) -> StorageResult<()> {
    let mut stmt = conn.prepare(UPSERT)?;
    for (key, entry) in entries {
        stmt.execute(params![&key[..], &entry.value[..], entry.expires_at])?;
    }
    Ok(())
}

impl Storage for SqliteStorage {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Entry>> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT value, expires_at FROM kv_entries WHERE key = ?1",
                params![key],
                |row| entry_from_row(row, 0),
            )
            .optional()?;
        Ok(entry)
    }

    fn get_if_not_expired(&self, key: &[u8], now: i64) -> StorageResult<Option<Entry>> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT value, expires_at FROM kv_entries WHERE key = ?1 AND expires_at >= ?2",
                params![key, now],
                |row| entry_from_row(row, 0),
            )
            .optional()?;
        Ok(entry)
    }

    fn put(&mut self, key: Bytes, value: Bytes, expires_at: i64) -> StorageResult<()> {
        self.conn
            .get_mut()
            .execute(UPSERT, params![&key[..], &value[..], expires_at])?;
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> StorageResult<bool> {
        let removed = self
            .conn
            .get_mut()
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn remove_if_not_expired(&mut self, key: &[u8], now: i64) -> StorageResult<Option<Entry>> {
        let entry = self.get_if_not_expired(key, now)?;
        if entry.is_some() {
            self.remove(key)?;
        }
        Ok(entry)
    }

    fn get_all(&self) -> StorageResult<Snapshot> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value, expires_at FROM kv_entries")?;
        let rows = stmt.query_map([], |row| {
            let key: Vec<u8> = row.get(0)?;
            Ok((Bytes::from(key), entry_from_row(row, 1)?))
        })?;

        let mut snapshot = Snapshot::new();
        for row in rows {
            let (key, entry) = row?;
            snapshot.insert(key, entry);
        }
        Ok(snapshot)
    }

    fn put_all(&mut self, entries: Snapshot) -> StorageResult<()> {
        let tx = self.conn.get_mut().transaction()?;
        upsert_all(&tx, entries)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_all(&mut self, entries: Snapshot) -> StorageResult<()> {
        let tx = self.conn.get_mut().transaction()?;
        tx.execute("DELETE FROM kv_entries", [])?;
        upsert_all(&tx, entries)?;
        tx.commit()?;
        Ok(())
    }

    fn remove_expired(&mut self, now: i64) -> StorageResult<u64> {
        let removed = self
            .conn
            .get_mut()
            .execute("DELETE FROM kv_entries WHERE expires_at < ?1", params![now])?;
        Ok(removed as u64)
    }

    fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM kv_entries WHERE key = ?1",
                params![key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn len(&self) -> StorageResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv_entries", [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| StorageError::Corrupt(format!("negative row count {}", count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::check_contract;

    #[test]
    fn test_contract() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        check_contract(&mut storage);
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let path = std::env::temp_dir().join(format!("ttlkv-test-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let mut storage = SqliteStorage::open(&path).unwrap();
            storage
                .put(Bytes::from("durable"), Bytes::from("yes"), 4_000_000_000)
                .unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(
            storage.get(b"durable").unwrap(),
            Some(Entry::new("yes", 4_000_000_000))
        );

        drop(storage);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_replace_all_is_transactional() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .put(Bytes::from("old"), Bytes::from("1"), 100)
            .unwrap();

        let mut entries = Snapshot::new();
        for i in 0..100 {
            entries.insert(Bytes::from(format!("key{}", i)), Entry::new("v", 500));
        }
        storage.replace_all(entries).unwrap();

        assert_eq!(storage.len().unwrap(), 100);
        assert!(!storage.contains(b"old").unwrap());
    }
}
