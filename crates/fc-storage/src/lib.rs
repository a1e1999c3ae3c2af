//! # fc-storage
//!
//! Pluggable byte storage for attachments. A [`StorageBackend`] durably
//! stores, retrieves and deletes opaque byte blobs addressed by a
//! deterministic storage key; concrete backends cover the local filesystem,
//! S3-compatible object stores and a database blob table, plus an in-memory
//! double for tests.
//!
//! Backends are chosen once at configuration time through the
//! [`BackendRegistry`]; an unknown backend name is a configuration error, not
//! a runtime surprise.

pub mod backend;
pub mod db_blob;
pub mod file;
pub mod keys;
pub mod memory;
pub mod object;
pub mod registry;

pub use backend::{StorageBackend, StorageError, StorageResult};
pub use db_blob::DbBlobBackend;
pub use file::FileBackend;
pub use keys::{sanitize_filename, storage_key};
pub use memory::MemoryBackend;
pub use object::ObjectBackend;
pub use registry::{BackendFactory, BackendRegistry};
