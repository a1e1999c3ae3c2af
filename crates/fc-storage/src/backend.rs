//! Storage backend contract.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Unified interface over byte-storage backends.
///
/// Implementations must be safe for concurrent use; no per-call state is
/// shared between callers.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Store bytes under a key, overwriting any previous content.
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Retrieve the bytes stored under a key.
    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete the bytes stored under a key.
    ///
    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check whether a key holds content.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Compute the public URL or path for a key.
    fn public_locator(&self, key: &str) -> String;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}
