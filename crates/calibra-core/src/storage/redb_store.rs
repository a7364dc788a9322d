//! # redb-backed Key-Value Store
//!
//! A disk-backed [`KeyValueStore`] using the redb embedded database.
//!
//! One table maps string keys to string values. Every `set`/`remove` is its
//! own write transaction, so a crash never leaves a half-written record.

use super::KeyValueStore;
use crate::CalibraError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Table for key-value entries: key string -> value string
const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// A disk-backed key-value store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

fn io_err(e: impl std::fmt::Display) -> CalibraError {
    CalibraError::StorageError(e.to_string())
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CalibraError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Create the table up front so reads on a fresh file do not fail.
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(ENTRIES).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        tracing::debug!(path = %path.as_ref().display(), "opened redb store");
        Ok(Self { db })
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<String>, CalibraError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(ENTRIES).map_err(io_err)?;
        let value = table
            .get(key)
            .map_err(io_err)?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), CalibraError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(ENTRIES).map_err(io_err)?;
            table.insert(key, value).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    fn remove(&mut self, key: &str) -> Result<bool, CalibraError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let existed = {
            let mut table = write_txn.open_table(ENTRIES).map_err(io_err)?;
            table.remove(key).map_err(io_err)?.is_some()
        };
        write_txn.commit().map_err(io_err)?;
        Ok(existed)
    }
}

// =============================================================================
// TESTS
// =============================================================================
