//! In-memory adapters.
//!
//! Thread-safe implementations of [`MetadataStore`] and [`BlobStore`] backed
//! by `RwLock<HashMap>`. Used by tests and by single-process hosts. Both
//! support injecting transient failures so that retry behaviour can be
//! exercised deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::core::{SessionKey, SessionRecord, Version, Versioned};
use crate::error::{Result, StoreError};
use crate::storage::{BlobStore, MetadataStore};

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::unavailable("in-memory store lock poisoned")
}

/// Consume one injected failure, if any are pending.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory metadata store.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    /// Rows per rendered session key.
    rows: RwLock<HashMap<String, Vec<Versioned<SessionRecord>>>>,
    /// Last assigned version.
    last_version: AtomicU64,
    /// Number of upcoming writes that fail with `StorageUnavailable`.
    failing_writes: AtomicU32,
}

impl MemoryMetadataStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `count` writes fail with a transient error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Append a row under `record`'s key without any uniqueness check.
    ///
    /// Simulates a corrupted table for integrity tests.
    pub fn push_raw(&self, record: SessionRecord) -> Version {
        let version = self.next_version();
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(record.key().to_string())
            .or_default()
            .push(Versioned::new(version, record));
        version
    }

    fn next_version(&self) -> Version {
        Version(self.last_version.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_injected_failure(&self) -> Result<()> {
        if take_failure(&self.failing_writes) {
            return Err(StoreError::unavailable("injected metadata write failure"));
        }
        Ok(())
    }

    /// Check that `key` holds exactly one row and that it is at `expected`.
    fn check_current(
        rows: &HashMap<String, Vec<Versioned<SessionRecord>>>,
        key: &str,
        expected: Version,
    ) -> Result<()> {
        let partition = rows
            .get(key)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StoreError::not_found(key))?;
        if partition.len() > 1 {
            return Err(StoreError::integrity(format!(
                "{} records stored under session key {}",
                partition.len(),
                key
            )));
        }
        if partition[0].version != expected {
            return Err(StoreError::version_conflict(key));
        }
        Ok(())
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn ensure_exists(&self) -> Result<()> {
        Ok(())
    }

    fn query(&self, key: &SessionKey) -> Result<Vec<Versioned<SessionRecord>>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.get(&key.to_string()).cloned().unwrap_or_default())
    }

    fn insert(&self, record: &SessionRecord) -> Result<Version> {
        self.check_injected_failure()?;
        let key = record.key().to_string();
        let mut rows = self.rows.write().map_err(poisoned)?;
        let partition = rows.entry(key.clone()).or_default();
        if !partition.is_empty() {
            return Err(StoreError::already_exists(key));
        }
        let version = self.next_version();
        partition.push(Versioned::new(version, record.clone()));
        Ok(version)
    }

    fn conditional_put(&self, record: &SessionRecord, expected: Version) -> Result<Version> {
        self.check_injected_failure()?;
        let key = record.key().to_string();
        let mut rows = self.rows.write().map_err(poisoned)?;
        Self::check_current(&rows, &key, expected)?;
        let version = self.next_version();
        rows.insert(key, vec![Versioned::new(version, record.clone())]);
        Ok(version)
    }

    fn delete(&self, key: &SessionKey, expected: Version) -> Result<()> {
        self.check_injected_failure()?;
        let key = key.to_string();
        let mut rows = self.rows.write().map_err(poisoned)?;
        Self::check_current(&rows, &key, expected)?;
        rows.remove(&key);
        Ok(())
    }
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    /// Number of upcoming puts that fail with `StorageUnavailable`.
    failing_puts: AtomicU32,
    /// Number of upcoming listings that fail with `StorageUnavailable`.
    failing_lists: AtomicU32,
}

impl MemoryBlobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `count` puts fail with a transient error.
    pub fn fail_next_puts(&self, count: u32) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` prefix listings fail with a transient error.
    pub fn fail_next_lists(&self, count: u32) {
        self.failing_lists.store(count, Ordering::SeqCst);
    }
}

impl BlobStore for MemoryBlobStore {
    fn ensure_exists(&self) -> Result<()> {
        Ok(())
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        if take_failure(&self.failing_puts) {
            return Err(StoreError::unavailable(format!(
                "injected blob write failure for {}",
                name
            )));
        }
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        if blobs.contains_key(name) {
            return Err(StoreError::already_exists(name));
        }
        blobs.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        Ok(blobs.get(name).cloned())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        Ok(blobs.remove(name).is_some())
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        if take_failure(&self.failing_lists) {
            return Err(StoreError::unavailable(format!(
                "injected blob listing failure for {}",
                prefix
            )));
        }
        let blobs = self.blobs.read().map_err(poisoned)?;
        Ok(blobs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}
