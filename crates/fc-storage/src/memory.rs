//! In-memory backend for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::backend::{StorageBackend, StorageError, StorageResult};

/// Keeps blobs in a map; no durability, intended for tests and examples.
#[derive(Debug)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let mut blobs = self.blobs.write().await;
        blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let blobs = self.blobs.read().await;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut blobs = self.blobs.write().await;
        blobs.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let blobs = self.blobs.read().await;
        Ok(blobs.contains_key(key))
    }

    fn public_locator(&self, key: &str) -> String {
        format!("/memory/{}", key)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
