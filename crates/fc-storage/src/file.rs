//! Local filesystem backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::backend::{StorageBackend, StorageError, StorageResult};

/// Stores attachment bytes as files under a root directory.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    /// Base URL for public locators.
    base_url: String,
}

impl FileBackend {
    pub fn new(root: impl AsRef<Path>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.into(),
        }
    }

    /// Resolve a key to a full path, rejecting traversal out of the root.
    fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.contains("..")
            || key.starts_with('/')
            || key.starts_with('\\')
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    #[instrument(skip(self, data), fields(backend = "file"))]
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.resolve_path(key)?;
        Self::ensure_parent(&path).await?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        debug!(path = ?path, size = data.len(), "file stored");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.resolve_path(key)?;

        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let mut file = fs::File::open(&path).await?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).await?;

        Ok(Bytes::from(buffer))
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve_path(key)?;

        if path.exists() {
            fs::remove_file(&path).await?;
            debug!(path = ?path, "file deleted");
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve_path(key)?;
        Ok(path.exists())
    }

    fn public_locator(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, FileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path(), "/attachments");
        (dir, backend)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, backend) = backend();
        let data = Bytes::from_static(b"hello bytes");

        backend.write("7/hello.txt", data.clone()).await.unwrap();
        let read = backend.read("7/hello.txt").await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn overwrite_replaces_content_at_same_key() {
        let (_dir, backend) = backend();

        backend
            .write("7/a.txt", Bytes::from_static(b"first"))
            .await
            .unwrap();
        backend
            .write("7/a.txt", Bytes::from_static(b"second"))
            .await
            .unwrap();

        assert_eq!(
            backend.read("7/a.txt").await.unwrap(),
            Bytes::from_static(b"second")
        );
    }

    #[tokio::test]
    async fn delete_of_absent_key_succeeds() {
        let (_dir, backend) = backend();
        backend.delete("does/not/exist.bin").await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_content() {
        let (_dir, backend) = backend();
        backend
            .write("7/bye.txt", Bytes::from_static(b"bye"))
            .await
            .unwrap();
        assert!(backend.exists("7/bye.txt").await.unwrap());

        backend.delete("7/bye.txt").await.unwrap();
        assert!(!backend.exists("7/bye.txt").await.unwrap());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_dir, backend) = backend();

        let result = backend.read("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = backend.write("/absolute", Bytes::new()).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn missing_key_reads_as_not_found() {
        let (_dir, backend) = backend();
        let result = backend.read("7/missing.txt").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn public_locator_joins_base_url_and_key() {
        let backend = FileBackend::new("/tmp/att", "/attachments/");
        assert_eq!(
            backend.public_locator("7/photo.jpg"),
            "/attachments/7/photo.jpg"
        );
    }
}
