//! Session manager.
//!
//! Implements the locking and versioning protocol on top of a
//! [`MetadataStore`] and a [`BlobStore`]:
//!
//! - every metadata change is a read-modify-write guarded by the record
//!   version and wrapped in the [`RetryPolicy`];
//! - payloads are copy-on-write: each write goes to a freshly named blob,
//!   and the record is pointed at it only after the blob is complete;
//! - exclusive access is a flag plus a token on the record. Acquisition never
//!   waits; a held lock is reported back with its age.

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::{Config, SessionConfig};
use crate::core::codec;
use crate::core::key::validate_parameter;
use crate::core::provider::SessionProvider;
use crate::core::{
    LockToken, SessionActions, SessionData, SessionKey, SessionLookup, SessionRecord,
    StaticObjects, Versioned,
};
use crate::error::{BestEffort, Result, StoreError};
use crate::retry::RetryPolicy;
use crate::storage::{BlobStore, MetadataStore};

/// Outcome of the metadata step of a lookup.
enum Access {
    /// Someone else holds the lock.
    Denied { lock_age: Duration, token: LockToken },
    /// Access granted; `record` is the committed state.
    Granted {
        record: SessionRecord,
        actions: SessionActions,
    },
}

/// Lock-coordinated session store over a metadata store and a blob store.
pub struct SessionManager<M: MetadataStore, B: BlobStore> {
    metadata: M,
    blobs: B,
    settings: SessionConfig,
    retry: RetryPolicy,
    /// Static objects declared by the host application. Must stay empty.
    application_statics: StaticObjects,
}

impl<M: MetadataStore, B: BlobStore> SessionManager<M, B> {
    /// Create a manager with default limits and retry policy.
    ///
    /// Does not touch storage; call [`SessionManager::open`] before serving
    /// requests.
    pub fn new(metadata: M, blobs: B) -> Self {
        Self {
            metadata,
            blobs,
            settings: SessionConfig::default(),
            retry: RetryPolicy::default(),
            application_statics: StaticObjects::new(),
        }
    }

    /// Take identifier limits and the retry budget from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.settings = config.session.clone();
        self.retry = RetryPolicy::from(&config.retry);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Declare the host application's static objects.
    ///
    /// Static objects cannot be persisted; a non-empty collection makes
    /// [`SessionManager::open`] and every payload operation fail.
    pub fn with_application_statics(mut self, statics: StaticObjects) -> Self {
        self.application_statics = statics;
        self
    }

    /// One-time startup: create the table and container if absent.
    pub fn open(self) -> Result<Self> {
        codec::ensure_no_static_objects(&StaticObjects::new(), &self.application_statics)?;
        self.metadata.ensure_exists()?;
        self.blobs.ensure_exists()?;
        info!(max_attempts = self.retry.max_attempts, "session store ready");
        Ok(self)
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Validate identifiers and build the record key.
    fn key(&self, session_id: &str, application_name: &str) -> Result<SessionKey> {
        let id = validate_parameter(session_id, "id", self.settings.max_id_length, false)?;
        let app = validate_parameter(
            application_name,
            "applicationName",
            self.settings.max_application_name_length,
            true,
        )?;
        Ok(SessionKey::new(app, id))
    }

    fn timeout(timeout_minutes: i32) -> Result<u32> {
        u32::try_from(timeout_minutes)
            .map_err(|_| StoreError::validation("timeout", "must not be negative"))
    }

    fn current(&self, key: &SessionKey) -> Result<Versioned<SessionRecord>> {
        self.metadata
            .get(key)?
            .ok_or_else(|| StoreError::not_found(key.to_string()))
    }

    /// Shared read-modify-write behind `get` and `get_exclusive`.
    ///
    /// Only exclusive access is denied by a held lock. A shared read ignores it
    /// and returns the last committed payload.
    fn access(&self, key: &SessionKey, exclusive: bool) -> Result<Access> {
        let what = if exclusive { "get_exclusive" } else { "get" };
        self.retry.run(what, || {
            let current = self.current(key)?;
            let mut record = current.value;
            let now = Utc::now();

            if exclusive && record.locked {
                return Ok(Access::Denied {
                    lock_age: record.lock_age(now),
                    token: record.lock_token,
                });
            }

            if exclusive {
                record.acquire(now);
            } else {
                record.refresh_expiry(now);
            }
            let actions = if record.initialized {
                SessionActions::None
            } else {
                record.initialized = true;
                SessionActions::InitializeItem
            };

            self.metadata.conditional_put(&record, current.version)?;
            Ok(Access::Granted { record, actions })
        })
    }

    fn lookup(
        &self,
        session_id: &str,
        application_name: &str,
        exclusive: bool,
    ) -> Result<SessionLookup> {
        let key = self.key(session_id, application_name)?;
        codec::ensure_no_static_objects(&StaticObjects::new(), &self.application_statics)?;

        match self.access(&key, exclusive)? {
            Access::Denied { lock_age, token } => {
                debug!(key = %key, lock_age_ms = lock_age.num_milliseconds(), "session is locked");
                Ok(SessionLookup::denied(lock_age, token))
            }
            Access::Granted { record, actions } => {
                let data = if actions == SessionActions::InitializeItem {
                    SessionData::new(record.timeout_minutes)
                } else {
                    self.read_payload(&record)?
                };
                if exclusive {
                    debug!(key = %key, token = %record.lock_token, "exclusive access granted");
                }
                Ok(SessionLookup::granted(
                    data,
                    record.lock_age(Utc::now()),
                    record.lock_token,
                    actions,
                ))
            }
        }
    }

    /// Read and decode the payload referenced by `record`.
    fn read_payload(&self, record: &SessionRecord) -> Result<SessionData> {
        if !record.has_blob() {
            return Ok(SessionData::new(record.timeout_minutes));
        }
        let bytes = self
            .blobs
            .get(&record.blob_name)?
            .ok_or_else(|| StoreError::not_found(record.blob_name.as_str()))?;
        codec::decode(&bytes, record.timeout_minutes, &self.application_statics)
    }

    /// Clear the lock if `token` still matches. Returns whether it did.
    fn release(&self, key: &SessionKey, token: LockToken) -> Result<bool> {
        self.retry.run("release_exclusive", || {
            let Some(current) = self.metadata.get(key)? else {
                warn!(key = %key, "release of a missing session ignored");
                return Ok(false);
            };
            let mut record = current.value;
            if record.lock_token != token {
                warn!(
                    key = %key,
                    presented = %token,
                    current = %record.lock_token,
                    "release with stale lock token ignored"
                );
                return Ok(false);
            }
            record.release(Utc::now());
            self.metadata.conditional_put(&record, current.version)?;
            Ok(true)
        })
    }

    /// Point the existing record at `blob_name` and release it.
    ///
    /// Returns false, writing nothing, if the record is gone or the token no
    /// longer matches.
    fn commit_update(
        &self,
        key: &SessionKey,
        token: LockToken,
        timeout_minutes: u32,
        blob_name: &str,
    ) -> Result<bool> {
        self.retry.run("set_and_release", || {
            let Some(current) = self.metadata.get(key)? else {
                return Ok(false);
            };
            let mut record = current.value;
            if record.lock_token != token {
                return Ok(false);
            }
            record.timeout_minutes = timeout_minutes;
            record.blob_name = blob_name.to_string();
            record.initialized = true;
            record.release(Utc::now());
            self.metadata.conditional_put(&record, current.version)?;
            Ok(true)
        })
    }

    /// Insert a fresh record already pointing at `blob_name`.
    fn commit_new(&self, key: &SessionKey, timeout_minutes: u32, blob_name: &str) -> Result<()> {
        let mut record = SessionRecord::uninitialized(key, timeout_minutes, Utc::now());
        record.lock_token = LockToken(1);
        record.initialized = true;
        record.blob_name = blob_name.to_string();
        self.retry
            .run("set_and_release", || self.metadata.insert(&record))
            .map(|_| ())
    }

    fn discard_blob(&self, blob_name: &str) {
        self.blobs
            .delete(blob_name)
            .best_effort_default("deleting unreferenced payload blob");
    }

    /// The token currently guarding `key`, if the record exists.
    fn current_token(&self, key: &SessionKey) -> Result<Option<LockToken>> {
        Ok(self.metadata.get(key)?.map(|r| r.value.lock_token))
    }
}

impl<M: MetadataStore, B: BlobStore> SessionProvider for SessionManager<M, B> {
    fn create_uninitialized(
        &self,
        session_id: &str,
        application_name: &str,
        timeout_minutes: i32,
    ) -> Result<()> {
        let key = self.key(session_id, application_name)?;
        let timeout = Self::timeout(timeout_minutes)?;

        let record = SessionRecord::uninitialized(&key, timeout, Utc::now());
        self.retry
            .run("create_uninitialized", || self.metadata.insert(&record))?;
        debug!(key = %key, timeout_minutes = timeout, "created uninitialized session");
        Ok(())
    }

    fn get(&self, session_id: &str, application_name: &str) -> Result<SessionLookup> {
        self.lookup(session_id, application_name, false)
    }

    fn get_exclusive(&self, session_id: &str, application_name: &str) -> Result<SessionLookup> {
        self.lookup(session_id, application_name, true)
    }

    fn set_and_release(
        &self,
        session_id: &str,
        application_name: &str,
        lock_token: LockToken,
        data: &SessionData,
        is_new: bool,
    ) -> Result<()> {
        let key = self.key(session_id, application_name)?;
        let payload = codec::encode(data, &self.application_statics)?;

        if !is_new {
            match self.current_token(&key)? {
                None => {
                    warn!(key = %key, "update of a missing session ignored");
                    return Ok(());
                }
                Some(current) if current != lock_token => {
                    warn!(
                        key = %key,
                        presented = %lock_token,
                        current = %current,
                        "update with stale lock token ignored"
                    );
                    return Ok(());
                }
                Some(_) => {}
            }
        }

        let blob_name = key.fresh_blob_name();
        if let Err(err) = self.blobs.put(&blob_name, &payload) {
            warn!(key = %key, error = %err, "payload write failed");
            if !is_new {
                self.release(&key, lock_token)
                    .best_effort_default("releasing lock after failed payload write");
            }
            return Err(err);
        }

        if is_new {
            if let Err(err) = self.commit_new(&key, data.timeout_minutes, &blob_name) {
                self.discard_blob(&blob_name);
                return Err(err);
            }
            debug!(key = %key, blob = %blob_name, "stored new session");
            return Ok(());
        }

        match self.commit_update(&key, lock_token, data.timeout_minutes, &blob_name) {
            Ok(true) => {
                debug!(key = %key, blob = %blob_name, "stored session and released lock");
                Ok(())
            }
            Ok(false) => {
                warn!(key = %key, "session changed hands during update, payload discarded");
                self.discard_blob(&blob_name);
                Ok(())
            }
            Err(err) => {
                self.discard_blob(&blob_name);
                Err(err)
            }
        }
    }

    fn release_exclusive(
        &self,
        session_id: &str,
        application_name: &str,
        lock_token: LockToken,
    ) -> Result<()> {
        let key = self.key(session_id, application_name)?;
        if self.release(&key, lock_token)? {
            debug!(key = %key, token = %lock_token, "released lock");
        }
        Ok(())
    }

    fn reset_timeout(&self, session_id: &str, application_name: &str) -> Result<()> {
        let key = self.key(session_id, application_name)?;
        self.retry.run("reset_timeout", || {
            let current = self.current(&key)?;
            let mut record = current.value;
            record.refresh_expiry(Utc::now());
            self.metadata.conditional_put(&record, current.version)?;
            Ok(())
        })
    }

    fn remove(
        &self,
        session_id: &str,
        application_name: &str,
        lock_token: LockToken,
    ) -> Result<()> {
        let key = self.key(session_id, application_name)?;

        let deleted = self.retry.run("remove", || {
            let Some(current) = self.metadata.get(&key)? else {
                warn!(key = %key, "remove of a missing session ignored");
                return Ok(false);
            };
            if current.value.lock_token != lock_token {
                warn!(
                    key = %key,
                    presented = %lock_token,
                    current = %current.value.lock_token,
                    "remove with stale lock token ignored"
                );
                return Ok(false);
            }
            self.metadata.delete(&key, current.version)?;
            Ok(true)
        })?;
        if !deleted {
            return Ok(());
        }

        let blob_names = self
            .blobs
            .list_by_prefix(&key.blob_prefix())
            .best_effort_default("listing payload blobs of removed session");
        let mut removed = 0usize;
        for name in &blob_names {
            if self
                .blobs
                .delete(name)
                .best_effort_default("deleting payload blob of removed session")
            {
                removed += 1;
            }
        }
        debug!(key = %key, blobs = removed, "removed session");
        Ok(())
    }

    fn new_session_data(&self, timeout_minutes: i32) -> Result<SessionData> {
        let timeout = Self::timeout(timeout_minutes)?;
        codec::ensure_no_static_objects(&StaticObjects::new(), &self.application_statics)?;
        let mut data = SessionData::new(timeout);
        data.static_objects = self.application_statics.clone();
        Ok(data)
    }

    fn inspect(
        &self,
        session_id: &str,
        application_name: &str,
    ) -> Result<Option<Versioned<SessionRecord>>> {
        let key = self.key(session_id, application_name)?;
        self.metadata.get(&key)
    }
}
