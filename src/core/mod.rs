//! Core types and logic for lockbox.
//!
//! Session keys and records, in-memory session contents, the payload codec,
//! and the session manager that ties them to the storage adapters.

pub mod codec;
pub mod data;
pub mod key;
pub mod manager;
pub mod provider;
pub mod record;

pub use data::{SessionActions, SessionData, SessionItems, SessionLookup, StaticObjects};
pub use key::{validate_parameter, SessionKey};
pub use manager::SessionManager;
pub use provider::SessionProvider;
pub use record::{LockToken, SessionRecord, Version, Versioned};
