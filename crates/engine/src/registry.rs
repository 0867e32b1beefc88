//! Persistent registry backing the cache store
//!
//! A small key-value abstraction over redb. redb holds an exclusive handle on
//! its file, so callers open the registry per operation and drop it promptly;
//! [`RedbPersistentState::open_with_retry`] waits out other processes holding it.

use crate::error::{Error, Result};
use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Cloned repositories, keyed by [`crate::store::entry_key`]
pub const REPOS_BUCKET: &str = "repos";
/// Configuration files that have used the store
pub const CONFIGS_BUCKET: &str = "configs";

const OPEN_ATTEMPTS: u32 = 200;
const OPEN_BACKOFF: Duration = Duration::from_millis(25);

/// Trait for persistent state storage
pub trait PersistentState: Send + Sync {
    /// Get a value from a bucket
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set a value in a bucket
    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key from a bucket
    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()>;

    /// Iterate over all key-value pairs in a bucket
    fn for_each<F>(&self, bucket: &str, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>;
}

fn state_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Store(format!("{context}: {e}"))
}

/// Persistent state implementation using redb
pub struct RedbPersistentState {
    db: Database,
}

impl RedbPersistentState {
    /// Open the registry, waiting while another process has it open
    pub fn open_with_retry(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut attempt = 0;
        loop {
            match Database::create(path) {
                Ok(db) => return Ok(Self { db }),
                Err(DatabaseError::DatabaseAlreadyOpen) if attempt < OPEN_ATTEMPTS => {
                    if attempt == 0 {
                        tracing::debug!("registry busy, waiting");
                    }
                    attempt += 1;
                    thread::sleep(OPEN_BACKOFF);
                }
                Err(e) => return Err(state_err("Failed to open registry", e)),
            }
        }
    }

    fn table(bucket: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
        TableDefinition::new(bucket)
    }
}

impl PersistentState for RedbPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| state_err("Failed to begin read transaction", e))?;
        let table = match read_txn.open_table(Self::table(bucket)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(state_err("Failed to open table", e)),
        };
        let value = table
            .get(key)
            .map_err(|e| state_err("Failed to get value", e))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| state_err("Failed to begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(Self::table(bucket))
                .map_err(|e| state_err("Failed to open table", e))?;
            table
                .insert(key, value)
                .map_err(|e| state_err("Failed to insert value", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| state_err("Failed to commit transaction", e))
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| state_err("Failed to begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(Self::table(bucket))
                .map_err(|e| state_err("Failed to open table", e))?;
            table
                .remove(key)
                .map_err(|e| state_err("Failed to remove value", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| state_err("Failed to commit transaction", e))
    }

    fn for_each<F>(&self, bucket: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| state_err("Failed to begin read transaction", e))?;
        let table = match read_txn.open_table(Self::table(bucket)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(e) => return Err(state_err("Failed to open table", e)),
        };
        let iter = table
            .iter()
            .map_err(|e| state_err("Failed to iterate table", e))?;
        for item in iter {
            let (key, value) = item.map_err(|e| state_err("Failed to read item", e))?;
            f(key.value(), value.value())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_delete() {
        let dir = TempDir::new().unwrap();
        let db = RedbPersistentState::open_with_retry(dir.path().join("db.redb")).unwrap();

        assert_eq!(db.get(REPOS_BUCKET, b"k").unwrap(), None);
        db.set(REPOS_BUCKET, b"k", b"v").unwrap();
        assert_eq!(db.get(REPOS_BUCKET, b"k").unwrap(), Some(b"v".to_vec()));
        db.delete(REPOS_BUCKET, b"k").unwrap();
        assert_eq!(db.get(REPOS_BUCKET, b"k").unwrap(), None);
    }

    #[test]
    fn test_for_each_on_missing_bucket_is_empty() {
        let dir = TempDir::new().unwrap();
        let db = RedbPersistentState::open_with_retry(dir.path().join("db.redb")).unwrap();
        let mut count = 0;
        db.for_each(CONFIGS_BUCKET, |_, _| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_reopen_after_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.redb");
        {
            let db = RedbPersistentState::open_with_retry(&path).unwrap();
            db.set(CONFIGS_BUCKET, b"/a/lintel.toml", b"").unwrap();
        }
        let db = RedbPersistentState::open_with_retry(&path).unwrap();
        let mut keys = Vec::new();
        db.for_each(CONFIGS_BUCKET, |k, _| {
            keys.push(k.to_vec());
            Ok(())
        })
        .unwrap();
        assert_eq!(keys, vec![b"/a/lintel.toml".to_vec()]);
    }
}
