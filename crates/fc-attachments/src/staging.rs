//! Temporary byte staging.
//!
//! Uploaded or derived bytes are held here between staging and persistence.
//! Sources are ordered most-recent-first; the current source feeds size
//! computation, validation, thumbnail derivation and the final backend
//! write. Temp files materialized by staging are deleted on clear, and
//! again on drop as a backstop, so failed pipelines never leak them.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use fc_storage::sanitize_filename;
use thiserror::Error;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// Staging errors.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nothing staged")]
    Empty,

    #[error("failed to release {} temp file(s): {}", failures.len(), failures.join("; "))]
    Release { failures: Vec<String> },
}

/// One staged byte source.
#[derive(Debug)]
pub enum StagedSource {
    /// A file on disk. `owned` sources were materialized by staging and are
    /// deleted on clear; borrowed ones belong to the caller.
    TempFile { path: PathBuf, owned: bool },
    /// An in-memory buffer, materialized to a file on demand.
    Buffer(Bytes),
}

/// Ordered staging list for one attachment's processing pass.
#[derive(Debug)]
pub struct TempStaging {
    dir: PathBuf,
    filename_hint: String,
    sources: VecDeque<StagedSource>,
}

impl TempStaging {
    /// Create an empty staging list. Without an explicit directory, temp
    /// files land under the system temp dir.
    pub fn new(dir: Option<&Path>, filename_hint: &str) -> Self {
        let dir = dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::env::temp_dir().join("filecab-staging"));
        Self {
            dir,
            filename_hint: sanitize_filename(filename_hint),
            sources: VecDeque::new(),
        }
    }

    /// Record an externally-owned file as the current source.
    pub fn stage_path(&mut self, path: impl Into<PathBuf>) {
        self.sources.push_front(StagedSource::TempFile {
            path: path.into(),
            owned: false,
        });
    }

    /// Materialize raw bytes into a uniquely-named temp file and make it
    /// the current source.
    pub async fn stage_bytes(&mut self, bytes: &[u8]) -> Result<PathBuf, StagingError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(self.temp_name());
        fs::write(&path, bytes).await?;

        self.sources.push_front(StagedSource::TempFile {
            path: path.clone(),
            owned: true,
        });
        Ok(path)
    }

    /// Record an in-memory buffer as the current source. It is written to
    /// disk only if a later step needs a path.
    pub fn stage_buffer(&mut self, bytes: Bytes) {
        self.sources.push_front(StagedSource::Buffer(bytes));
    }

    /// The most recently staged source.
    ///
    /// An empty list is not an error here: when a persisted attachment is
    /// re-processed without a fresh upload, the orchestrator restores a
    /// copy of the persisted bytes through [`Self::stage_bytes`] first.
    pub fn current(&self) -> Option<&StagedSource> {
        self.sources.front()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Path of the current source, materializing in-memory buffers.
    pub async fn current_path(&mut self) -> Result<PathBuf, StagingError> {
        match self.sources.front() {
            Some(StagedSource::TempFile { path, .. }) => Ok(path.clone()),
            Some(StagedSource::Buffer(_)) => {
                let Some(StagedSource::Buffer(bytes)) = self.sources.pop_front() else {
                    unreachable!();
                };
                self.stage_bytes(&bytes).await
            }
            None => Err(StagingError::Empty),
        }
    }

    /// Byte length of the current source without loading it.
    pub async fn byte_len(&self) -> Result<u64, StagingError> {
        match self.sources.front() {
            Some(StagedSource::TempFile { path, .. }) => Ok(fs::metadata(path).await?.len()),
            Some(StagedSource::Buffer(bytes)) => Ok(bytes.len() as u64),
            None => Err(StagingError::Empty),
        }
    }

    /// Load the full content of the current source.
    ///
    /// This is the only place staged bytes are read into memory whole, and
    /// callers invoke it only when they need the content itself (digest
    /// computation and the backend write).
    pub async fn read_all(&self) -> Result<Bytes, StagingError> {
        match self.sources.front() {
            Some(StagedSource::TempFile { path, .. }) => {
                Ok(Bytes::from(fs::read(path).await?))
            }
            Some(StagedSource::Buffer(bytes)) => Ok(bytes.clone()),
            None => Err(StagingError::Empty),
        }
    }

    /// Discard all sources, deleting every owned temp file.
    ///
    /// Every file is attempted even when one fails; failures are
    /// aggregated into a single error.
    pub async fn clear(&mut self) -> Result<(), StagingError> {
        let mut failures = Vec::new();
        while let Some(source) = self.sources.pop_front() {
            if let StagedSource::TempFile { path, owned: true } = source {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => failures.push(format!("{}: {}", path.display(), e)),
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StagingError::Release { failures })
        }
    }

    /// Unique temp-file name: submission time, a random component and the
    /// sanitized filename.
    fn temp_name(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            Utc::now().timestamp_millis(),
            &token[..8],
            self.filename_hint
        )
    }
}

impl Drop for TempStaging {
    fn drop(&mut self) {
        for source in &self.sources {
            if let StagedSource::TempFile { path, owned: true } = source {
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "leaked staging file"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging(dir: &Path) -> TempStaging {
        TempStaging::new(Some(dir), "photo.jpg")
    }

    #[tokio::test]
    async fn stage_bytes_materializes_a_named_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = staging(dir.path());

        let path = staging.stage_bytes(b"pixels").await.unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("photo.jpg"));
        assert_eq!(staging.read_all().await.unwrap(), Bytes::from_static(b"pixels"));
        assert_eq!(staging.byte_len().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn most_recently_staged_source_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = staging(dir.path());

        staging.stage_bytes(b"first").await.unwrap();
        staging.stage_bytes(b"second").await.unwrap();

        assert_eq!(staging.read_all().await.unwrap(), Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn distinct_stagings_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = staging(dir.path());

        let a = staging.stage_bytes(b"a").await.unwrap();
        let b = staging.stage_bytes(b"b").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn clear_deletes_owned_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let borrowed = dir.path().join("upload.bin");
        fs::write(&borrowed, b"caller-owned").await.unwrap();

        let mut staging = staging(dir.path());
        staging.stage_path(&borrowed);
        let owned = staging.stage_bytes(b"ours").await.unwrap();

        staging.clear().await.unwrap();
        assert!(staging.is_empty());
        assert!(!owned.exists());
        assert!(borrowed.exists());
    }

    #[tokio::test]
    async fn drop_is_a_cleanup_backstop() {
        let dir = tempfile::tempdir().unwrap();
        let owned = {
            let mut staging = staging(dir.path());
            staging.stage_bytes(b"pixels").await.unwrap()
        };
        assert!(!owned.exists());
    }

    #[tokio::test]
    async fn buffers_materialize_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = staging(dir.path());
        staging.stage_buffer(Bytes::from_static(b"in memory"));

        assert_eq!(staging.byte_len().await.unwrap(), 9);
        let path = staging.current_path().await.unwrap();
        assert!(path.exists());
        assert_eq!(staging.read_all().await.unwrap(), Bytes::from_static(b"in memory"));
    }

    #[tokio::test]
    async fn empty_staging_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging(dir.path());
        assert!(matches!(staging.read_all().await, Err(StagingError::Empty)));
        assert!(matches!(staging.byte_len().await, Err(StagingError::Empty)));
    }
}
