//! Storage capability traits.
//!
//! The session manager talks to two collaborators: a metadata store holding
//! one versioned record per session key, and a blob store holding immutable
//! payloads. Both are plain blocking interfaces.

use std::sync::Arc;

use crate::core::{SessionKey, SessionRecord, Version, Versioned};
use crate::error::{Result, StoreError};

/// Versioned key/record store with optimistic concurrency.
pub trait MetadataStore: Send + Sync {
    /// Create the backing table if it does not exist yet. Idempotent.
    fn ensure_exists(&self) -> Result<()>;

    /// All records stored under `key`.
    ///
    /// A healthy store returns zero or one record. More than one is
    /// reported by [`MetadataStore::get`] as an integrity violation.
    fn query(&self, key: &SessionKey) -> Result<Vec<Versioned<SessionRecord>>>;

    /// Insert a new record.
    ///
    /// Fails with `AlreadyExists` if a record exists under the same key.
    fn insert(&self, record: &SessionRecord) -> Result<Version>;

    /// Replace the record if it is still at `expected`.
    ///
    /// Fails with `VersionConflict` if the stored version differs and with
    /// `NotFound` if the record is gone.
    fn conditional_put(&self, record: &SessionRecord, expected: Version) -> Result<Version>;

    /// Delete the record if it is still at `expected`.
    ///
    /// Fails with `VersionConflict` if the stored version differs and with
    /// `NotFound` if the record is gone.
    fn delete(&self, key: &SessionKey, expected: Version) -> Result<()>;

    /// The single record stored under `key`, if any.
    fn get(&self, key: &SessionKey) -> Result<Option<Versioned<SessionRecord>>> {
        let mut rows = self.query(key)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(StoreError::integrity(format!(
                "{} records stored under session key {}",
                n, key
            ))),
        }
    }
}

/// Store of named, immutable binary blobs.
pub trait BlobStore: Send + Sync {
    /// Create the backing container if it does not exist yet. Idempotent.
    fn ensure_exists(&self) -> Result<()>;

    /// Store `bytes` under a new `name`.
    ///
    /// Create-only: fails with `AlreadyExists` if the name is taken. A blob
    /// is visible to readers only once it is complete.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Read a blob. Returns `Ok(None)` if it doesn't exist.
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a blob.
    ///
    /// Returns whether a blob was removed; deleting a missing blob is not an
    /// error.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all blobs starting with `prefix`, in no particular order.
    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

impl<T: MetadataStore + ?Sized> MetadataStore for Arc<T> {
    fn ensure_exists(&self) -> Result<()> {
        (**self).ensure_exists()
    }

    fn query(&self, key: &SessionKey) -> Result<Vec<Versioned<SessionRecord>>> {
        (**self).query(key)
    }

    fn insert(&self, record: &SessionRecord) -> Result<Version> {
        (**self).insert(record)
    }

    fn conditional_put(&self, record: &SessionRecord, expected: Version) -> Result<Version> {
        (**self).conditional_put(record, expected)
    }

    fn delete(&self, key: &SessionKey, expected: Version) -> Result<()> {
        (**self).delete(key, expected)
    }
}

impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn ensure_exists(&self) -> Result<()> {
        (**self).ensure_exists()
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        (**self).put(name, bytes)
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(name)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        (**self).delete(name)
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list_by_prefix(prefix)
    }
}
