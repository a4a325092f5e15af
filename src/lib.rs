//! lockbox - lock-coordinated session store
//!
//! A durable session store for request handlers running on many hosts.
//! Session metadata lives in a versioned metadata store and is only ever
//! changed through conditional writes; session contents are written as
//! immutable, uniquely named payload blobs. Exclusive access is coordinated
//! through a lock flag and token on the metadata record, never through an
//! in-process mutex.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod retry;
pub mod storage;

pub use config::Config;
pub use core::{
    LockToken, SessionActions, SessionData, SessionKey, SessionLookup, SessionManager,
    SessionProvider, SessionRecord, StaticObjects,
};
pub use error::{Result, StoreError};
pub use retry::RetryPolicy;
pub use storage::{
    BlobStore, FileBlobStore, FileMetadataStore, MemoryBlobStore, MemoryMetadataStore,
    MetadataStore,
};

// CLI commands
pub use cli::SessionCommand;
