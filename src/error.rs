//! Error taxonomy for the session store.
//!
//! Every operation returns a [`StoreError`] from a fixed taxonomy. Callers
//! branch on the variant (or on [`StoreError::is_transient`] and
//! [`StoreError::is_conflict`]) instead of parsing messages. A denied
//! exclusive acquisition is not an error; it is reported through the lookup
//! result.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for session store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed or oversized identifier, negative timeout, bad argument.
    #[error("invalid {parameter}: {message}")]
    Validation { parameter: String, message: String },

    /// No record (or blob) exists under the given key.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// A record already exists where a new one was to be created.
    #[error("conflict: session {key} already exists")]
    AlreadyExists { key: String },

    /// An optimistic update lost the race against another writer.
    #[error("conflict: session {key} was modified concurrently")]
    VersionConflict { key: String },

    /// The adapter was unreachable, busy, or timed out.
    #[error("storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// The caller asked for something this store refuses to persist.
    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    /// More than one record under a single key, or similar corruption.
    #[error("integrity violation: {message}")]
    IntegrityViolation { message: String },

    /// I/O errors from filesystem adapters.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Payload or record encoding errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading or validation errors.
    #[error("config error: {message}")]
    Config { message: String },
}

/// A specialized Result type for session store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Create a validation error for a named parameter.
    pub fn validation(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an already-exists conflict.
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    /// Create a version conflict.
    pub fn version_conflict(key: impl Into<String>) -> Self {
        Self::VersionConflict { key: key.into() }
    }

    /// Create a storage unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Create an unsupported feature error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            message: message.into(),
        }
    }

    /// Create an integrity violation.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            message: message.into(),
        }
    }

    /// Create a storage error from an I/O error.
    ///
    /// I/O failures that indicate a timeout or an interrupted call are
    /// classified as [`StoreError::StorageUnavailable`] so that the retry
    /// policy picks them up.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
                Self::StorageUnavailable {
                    message: format!("{}: {}", path.display(), source),
                }
            }
            _ => Self::Storage { path, source },
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the retry policy may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::StorageUnavailable { .. }
        )
    }

    /// Whether this is one of the two conflict flavours.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::AlreadyExists { .. }
        )
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::storage(PathBuf::new(), err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Extension trait for best-effort steps.
///
/// Some steps (blob cleanup after remove, releasing a lock after a failed
/// payload write) must not mask the primary outcome. Failures are logged and
/// replaced with a fallback.
pub trait BestEffort<T> {
    /// Log the error as a warning and return the default value.
    fn best_effort_default(self, context: &str) -> T
    where
        T: Default;
}

impl<T> BestEffort<T> for Result<T> {
    fn best_effort_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (best effort: ignored)", context, err);
                T::default()
            }
        }
    }
}

/// Exit codes for the lockbox CLI.
pub mod exit_codes {
    /// The operation completed.
    pub const OK: i32 = 0;

    /// Generic failure.
    pub const FAILURE: i32 = 1;

    /// The session is currently held exclusively by someone else.
    pub const LOCKED: i32 = 2;

    /// No session exists under the given key.
    pub const NOT_FOUND: i32 = 3;
}
