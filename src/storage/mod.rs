//! Storage adapters for lockbox.
//!
//! The session manager depends only on the [`MetadataStore`] and
//! [`BlobStore`] capabilities. Two adapter pairs are provided: in-memory
//! (tests, single process) and filesystem-backed (several processes sharing
//! one data directory).

pub mod file;
pub mod memory;
pub mod traits;

pub use file::{FileBlobStore, FileMetadataStore};
pub use memory::{MemoryBlobStore, MemoryMetadataStore};
pub use traits::{BlobStore, MetadataStore};
