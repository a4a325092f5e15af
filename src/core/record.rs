//! Session metadata records.
//!
//! One [`SessionRecord`] exists per (application name, session id). It holds
//! the lock state and the pointer to the current immutable payload blob.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::key::SessionKey;

/// Capability value handed out on exclusive acquisition.
///
/// Incremented on every grant and compared by plain equality on release,
/// update and remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(pub u32);

impl LockToken {
    /// The token after this one; wraps to 0 after `u32::MAX`.
    pub fn next(self) -> Self {
        if self.0 == u32::MAX {
            LockToken(0)
        } else {
            LockToken(self.0 + 1)
        }
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque record version assigned by the metadata store (ETag equivalent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u64);

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: Version,
    #[serde(rename = "record")]
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(version: Version, value: T) -> Self {
        Self { version, value }
    }
}

/// Metadata record of a single session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    /// Session identifier.
    pub session_id: String,
    /// Owning application.
    pub application_name: String,
    /// Session lifetime in minutes.
    pub timeout_minutes: u32,
    /// When the session expires unless touched again.
    pub expires_utc: DateTime<Utc>,
    /// When the record was created.
    pub created_utc: DateTime<Utc>,
    /// When exclusive access was last granted.
    pub lock_date_utc: DateTime<Utc>,
    /// Whether the session is currently held exclusively.
    pub locked: bool,
    /// Token of the most recent exclusive grant.
    pub lock_token: LockToken,
    /// Name of the current payload blob; empty until the first write.
    pub blob_name: String,
    /// False until the first access after creation.
    pub initialized: bool,
}

impl SessionRecord {
    /// Create an uninitialized, unlocked record with no payload.
    pub fn uninitialized(key: &SessionKey, timeout_minutes: u32, now: DateTime<Utc>) -> Self {
        Self {
            session_id: key.session_id().to_string(),
            application_name: key.application_name().to_string(),
            timeout_minutes,
            expires_utc: now + Duration::minutes(i64::from(timeout_minutes)),
            created_utc: now,
            lock_date_utc: now,
            locked: false,
            lock_token: LockToken(0),
            blob_name: String::new(),
            initialized: false,
        }
    }

    /// The composite key of this record.
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.application_name, &self.session_id)
    }

    /// Slide the expiry window forward from `now`.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) {
        self.expires_utc = now + Duration::minutes(i64::from(self.timeout_minutes));
    }

    /// Time since the last exclusive grant, never negative.
    pub fn lock_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.lock_date_utc).max(Duration::zero())
    }

    /// Grant exclusive access: bump the token, stamp the lock date, set locked.
    pub fn acquire(&mut self, now: DateTime<Utc>) -> LockToken {
        self.lock_token = self.lock_token.next();
        self.lock_date_utc = now;
        self.locked = true;
        self.refresh_expiry(now);
        self.lock_token
    }

    /// Clear the lock and slide the expiry window.
    pub fn release(&mut self, now: DateTime<Utc>) {
        self.locked = false;
        self.refresh_expiry(now);
    }

    /// Whether a payload blob has ever been committed.
    pub fn has_blob(&self) -> bool {
        !self.blob_name.is_empty()
    }
}
