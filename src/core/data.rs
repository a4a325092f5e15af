//! In-memory session contents and lookup results.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::record::LockToken;

/// Flat collection of session items.
pub type SessionItems = BTreeMap<String, String>;

/// Application-scoped static objects.
///
/// Only kept as an explicit value so that the store can refuse it; a
/// non-empty collection is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticObjects(pub BTreeMap<String, String>);

impl StaticObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

/// The contents of a session as seen by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    pub items: SessionItems,
    pub static_objects: StaticObjects,
    pub timeout_minutes: u32,
}

impl SessionData {
    /// Empty session contents with the given timeout.
    pub fn new(timeout_minutes: u32) -> Self {
        Self {
            items: SessionItems::new(),
            static_objects: StaticObjects::new(),
            timeout_minutes,
        }
    }

    /// Builder-style item insertion.
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }
}

/// Extra instruction returned with a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionActions {
    /// Contents come from the stored payload.
    #[default]
    None,
    /// First access after creation; treat as a fresh, empty session.
    InitializeItem,
}

/// Result of a shared or exclusive lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLookup {
    /// Session contents; `None` when the session is locked by someone else.
    pub data: Option<SessionData>,
    /// True when access was denied because another caller holds the lock.
    pub locked: bool,
    /// Time since the last exclusive grant.
    pub lock_age: Duration,
    /// Current lock token. For a granted exclusive lookup this is the
    /// capability required to release, update or remove.
    pub lock_token: Option<LockToken>,
    pub actions: SessionActions,
}

impl SessionLookup {
    /// Access denied because the session is held exclusively.
    pub fn denied(lock_age: Duration, lock_token: LockToken) -> Self {
        Self {
            data: None,
            locked: true,
            lock_age,
            lock_token: Some(lock_token),
            actions: SessionActions::None,
        }
    }

    /// Access granted with the given contents.
    pub fn granted(
        data: SessionData,
        lock_age: Duration,
        lock_token: LockToken,
        actions: SessionActions,
    ) -> Self {
        Self {
            data: Some(data),
            locked: false,
            lock_age,
            lock_token: Some(lock_token),
            actions,
        }
    }

    /// Whether the caller received session contents.
    pub fn is_granted(&self) -> bool {
        !self.locked
    }
}
