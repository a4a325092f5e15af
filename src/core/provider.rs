//! Host-facing capability interface.
//!
//! A web host drives session state exclusively through [`SessionProvider`].
//! [`SessionManager`](crate::core::SessionManager) is the implementation
//! backed by a metadata store and a blob store.

use std::sync::Arc;

use crate::core::{LockToken, SessionData, SessionLookup, SessionRecord, Versioned};
use crate::error::Result;

/// Operations a host uses to read and write session state.
///
/// Identifiers are validated before any storage access: they are trimmed,
/// must be non-empty and within the configured maximum lengths, and the
/// application name must not contain commas.
pub trait SessionProvider: Send + Sync {
    /// Create an uninitialized, unlocked session with no payload.
    ///
    /// Fails with `AlreadyExists` if the session exists and with
    /// `Validation` for a negative timeout.
    fn create_uninitialized(
        &self,
        session_id: &str,
        application_name: &str,
        timeout_minutes: i32,
    ) -> Result<()>;

    /// Read session contents without taking the lock.
    ///
    /// Slides the expiry window. A locked session yields a denied lookup
    /// with no contents and is not modified.
    fn get(&self, session_id: &str, application_name: &str) -> Result<SessionLookup>;

    /// Try to take exclusive access.
    ///
    /// Never blocks: if someone else holds the lock the lookup is denied and
    /// carries the lock age, so the caller can decide when to poll again.
    fn get_exclusive(&self, session_id: &str, application_name: &str) -> Result<SessionLookup>;

    /// Persist new contents and drop the lock held under `lock_token`.
    ///
    /// With `is_new` a fresh record is inserted instead of updating an
    /// existing one.
    fn set_and_release(
        &self,
        session_id: &str,
        application_name: &str,
        lock_token: LockToken,
        data: &SessionData,
        is_new: bool,
    ) -> Result<()>;

    /// Drop the lock held under `lock_token` without changing contents.
    fn release_exclusive(
        &self,
        session_id: &str,
        application_name: &str,
        lock_token: LockToken,
    ) -> Result<()>;

    /// Slide the expiry window without touching the lock or contents.
    fn reset_timeout(&self, session_id: &str, application_name: &str) -> Result<()>;

    /// Delete the session and all of its payload blobs.
    fn remove(&self, session_id: &str, application_name: &str, lock_token: LockToken)
        -> Result<()>;

    /// Empty contents for a session that has not been stored yet.
    fn new_session_data(&self, timeout_minutes: i32) -> Result<SessionData>;

    /// Read the stored record without any side effect.
    fn inspect(
        &self,
        session_id: &str,
        application_name: &str,
    ) -> Result<Option<Versioned<SessionRecord>>>;
}

impl<T: SessionProvider + ?Sized> SessionProvider for Arc<T> {
    fn create_uninitialized(
        &self,
        session_id: &str,
        application_name: &str,
        timeout_minutes: i32,
    ) -> Result<()> {
        (**self).create_uninitialized(session_id, application_name, timeout_minutes)
    }

    fn get(&self, session_id: &str, application_name: &str) -> Result<SessionLookup> {
        (**self).get(session_id, application_name)
    }

    fn get_exclusive(&self, session_id: &str, application_name: &str) -> Result<SessionLookup> {
        (**self).get_exclusive(session_id, application_name)
    }

    fn set_and_release(
        &self,
        session_id: &str,
        application_name: &str,
        lock_token: LockToken,
        data: &SessionData,
        is_new: bool,
    ) -> Result<()> {
        (**self).set_and_release(session_id, application_name, lock_token, data, is_new)
    }

    fn release_exclusive(
        &self,
        session_id: &str,
        application_name: &str,
        lock_token: LockToken,
    ) -> Result<()> {
        (**self).release_exclusive(session_id, application_name, lock_token)
    }

    fn reset_timeout(&self, session_id: &str, application_name: &str) -> Result<()> {
        (**self).reset_timeout(session_id, application_name)
    }

    fn remove(
        &self,
        session_id: &str,
        application_name: &str,
        lock_token: LockToken,
    ) -> Result<()> {
        (**self).remove(session_id, application_name, lock_token)
    }

    fn new_session_data(&self, timeout_minutes: i32) -> Result<SessionData> {
        (**self).new_session_data(timeout_minutes)
    }

    fn inspect(
        &self,
        session_id: &str,
        application_name: &str,
    ) -> Result<Option<Versioned<SessionRecord>>> {
        (**self).inspect(session_id, application_name)
    }
}
