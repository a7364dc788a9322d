//! # Storage
//!
//! The core sees persistence only as a key-value capability:
//! `get(key)`, `set(key, value)`, `remove(key)`.
//!
//! Two stores ship with the crate:
//! - [`MemoryStore`]: `BTreeMap`-backed, volatile (tests, previews)
//! - [`RedbStore`]: disk-backed via redb (ACID, survives restarts)
//!
//! [`StorageBackend`] selects between them at runtime; any other type that
//! implements [`KeyValueStore`] can be used directly.

mod redb_store;

pub use redb_store::RedbStore;

use crate::CalibraError;
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// KEY-VALUE CAPABILITY
// =============================================================================

/// Minimal key-value contract used for persisted selections.
pub trait KeyValueStore {
    /// Read a value. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>, CalibraError>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: &str) -> Result<(), CalibraError>;

    /// Remove a value. Returns whether the key existed.
    fn remove(&mut self, key: &str) -> Result<bool, CalibraError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Volatile store backed by a `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CalibraError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), CalibraError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, CalibraError> {
        Ok(self.entries.remove(key).is_some())
    }
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// Storage backend chosen at runtime.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory map (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    /// Open a persistent backend at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CalibraError> {
        Ok(Self::Persistent(RedbStore::open(path)?))
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, StorageBackend::Persistent(_))
    }
}

impl KeyValueStore for StorageBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CalibraError> {
        match self {
            StorageBackend::InMemory(store) => store.get(key),
            StorageBackend::Persistent(store) => store.get(key),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), CalibraError> {
        match self {
            StorageBackend::InMemory(store) => store.set(key, value),
            StorageBackend::Persistent(store) => store.set(key, value),
        }
    }

    fn remove(&mut self, key: &str) -> Result<bool, CalibraError> {
        match self {
            StorageBackend::InMemory(store) => store.remove(key),
            StorageBackend::Persistent(store) => store.remove(key),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
