//! Attachment lifecycle orchestration.
//!
//! Sequences one attachment through stage -> validate -> commit -> derive ->
//! persist -> cleanup, and through cascade removal on deletion. Storage
//! backends and image engines are resolved once at configuration time and
//! shared by every attachment processed afterwards.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use fc_core::config::AttachmentConfig;
use fc_core::{ConfigError, Id, ValidationErrors};
use fc_imaging::{EngineRegistry, ImageEngine, ImagingError};
use fc_storage::{storage_key, BackendRegistry, StorageBackend, StorageError};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, instrument, warn};

use crate::datastore::{Datastore, DatastoreError};
use crate::model::{Attachment, InvalidTransition, LifecycleState};
use crate::staging::{StagingError, TempStaging};
use crate::thumbnails::{Derived, ThumbnailFailure};
use crate::validator::Validator;

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("thumbnail {label} failed: {source}")]
    Thumbnail {
        label: String,
        #[source]
        source: ImagingError,
    },

    #[error("image processing error: {0}")]
    Imaging(#[from] ImagingError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("datastore error: {0}")]
    Datastore(DatastoreError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("attachment not found: {0}")]
    NotFound(Id),

    #[error("no {label:?} thumbnail for attachment {id}")]
    MissingThumbnail { id: Id, label: String },

    #[error(transparent)]
    State(#[from] InvalidTransition),

    #[error("cleanup completed with {} failure(s): {}", failures.len(), failures.join("; "))]
    Cleanup { failures: Vec<String> },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for AttachmentError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<DatastoreError> for AttachmentError {
    fn from(e: DatastoreError) -> Self {
        match e {
            DatastoreError::Validation(errors) => Self::Validation(errors),
            DatastoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Datastore(other),
        }
    }
}

/// Source of uploaded bytes.
#[derive(Debug)]
pub enum UploadSource {
    Bytes(Bytes),
    /// An already-written file owned by the upload layer.
    Path(PathBuf),
}

/// One upload event.
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub source: UploadSource,
}

impl Upload {
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            source: UploadSource::Bytes(bytes.into()),
        }
    }

    pub fn from_path(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            source: UploadSource::Path(path.into()),
        }
    }
}

/// Result of a processed upload or re-derivation.
#[derive(Debug)]
pub struct ProcessedUpload {
    /// The persisted original.
    pub attachment: Attachment,
    /// Successfully derived thumbnails.
    pub thumbnails: Vec<Attachment>,
    /// Per-label failures; siblings of a failed label still derive.
    pub thumbnail_failures: Vec<ThumbnailFailure>,
}

/// Orchestrates the attachment state machine for one record type.
pub struct AttachmentLifecycle<D: Datastore> {
    pub(crate) config: Arc<AttachmentConfig>,
    pub(crate) datastore: Arc<D>,
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) engine: Option<Arc<dyn ImageEngine>>,
    pub(crate) validator: Validator,
}

impl<D: Datastore> std::fmt::Debug for AttachmentLifecycle<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentLifecycle")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("has_engine", &self.engine.is_some())
            .finish()
    }
}

impl<D: Datastore> AttachmentLifecycle<D> {
    /// Resolve backend and engine from the built-in registries and build
    /// the lifecycle.
    ///
    /// The engine is resolved only when thumbnails or metadata stripping
    /// are configured; resolution failures surface here, never at first
    /// use.
    pub async fn configure(
        config: AttachmentConfig,
        datastore: Arc<D>,
    ) -> Result<Self, ConfigError> {
        let backend = BackendRegistry::builtin().resolve(&config.storage).await?;
        let engine = if config.needs_engine() {
            Some(
                EngineRegistry::builtin()
                    .select(config.engine.as_deref(), &config.engine_order)?,
            )
        } else {
            None
        };
        Ok(Self::with_parts(config, datastore, backend, engine))
    }

    /// Build a lifecycle from already-resolved capabilities.
    pub fn with_parts(
        config: AttachmentConfig,
        datastore: Arc<D>,
        backend: Arc<dyn StorageBackend>,
        engine: Option<Arc<dyn ImageEngine>>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            validator: Validator::new(Arc::clone(&config)),
            config,
            datastore,
            backend,
            engine,
        }
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &AttachmentConfig {
        &self.config
    }

    /// Accept an upload and run it through the full lifecycle.
    ///
    /// Validation failures return the accumulated field errors; per-label
    /// thumbnail failures do not fail the upload and are reported in the
    /// result.
    #[instrument(skip(self, upload), fields(filename = %upload.filename))]
    pub async fn receive_upload(&self, upload: Upload) -> Result<ProcessedUpload, AttachmentError> {
        let mut attachment = Attachment::new(&upload.filename, upload.content_type);
        let mut staging =
            TempStaging::new(self.config.staging_dir.as_deref(), &attachment.filename);

        match upload.source {
            UploadSource::Bytes(bytes) => {
                staging.stage_bytes(&bytes).await?;
            }
            UploadSource::Path(path) => staging.stage_path(path),
        }
        attachment.transition_to(LifecycleState::Staged)?;

        let derived = self.process(&mut attachment, &mut staging).await?;
        Ok(ProcessedUpload {
            attachment,
            thumbnails: derived.thumbnails,
            thumbnail_failures: derived.failures,
        })
    }

    /// Re-stage a persisted attachment from its backend bytes and re-run
    /// the lifecycle, refreshing its thumbnails in place.
    #[instrument(skip(self))]
    pub async fn rederive_thumbnails(&self, id: Id) -> Result<ProcessedUpload, AttachmentError> {
        let mut attachment = self
            .datastore
            .find(id)
            .await?
            .ok_or(AttachmentError::NotFound(id))?;

        let key = self.key_for(&attachment)?;
        let bytes = self.backend.read(&key).await?;
        attachment.storage_key = Some(key);
        // The stored row may lag the final state; existing backend bytes
        // are what makes re-entry legal.
        attachment.state = LifecycleState::Persisted;

        let mut staging =
            TempStaging::new(self.config.staging_dir.as_deref(), &attachment.filename);
        staging.stage_bytes(&bytes).await?;
        attachment.transition_to(LifecycleState::Staged)?;

        let derived = self.process(&mut attachment, &mut staging).await?;
        Ok(ProcessedUpload {
            attachment,
            thumbnails: derived.thumbnails,
            thumbnail_failures: derived.failures,
        })
    }

    /// Delete an attachment: thumbnails first, then its backend bytes,
    /// then its row.
    ///
    /// Every step is attempted even when a sibling fails; failures are
    /// aggregated into one error.
    #[instrument(skip(self))]
    pub async fn delete_attachment(&self, id: Id) -> Result<(), AttachmentError> {
        let attachment = self
            .datastore
            .find(id)
            .await?
            .ok_or(AttachmentError::NotFound(id))?;

        let mut failures = Vec::new();
        self.delete_tree(&attachment, &mut failures).await;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AttachmentError::Cleanup { failures })
        }
    }

    /// Public URL or path for an attachment, or for one of its thumbnails.
    pub async fn public_url_for(
        &self,
        attachment: &Attachment,
        label: Option<&str>,
    ) -> Result<String, AttachmentError> {
        match label {
            None => Ok(self.backend.public_locator(&self.key_for(attachment)?)),
            Some(label) => {
                let id = attachment
                    .id
                    .ok_or_else(|| AttachmentError::Internal("attachment has no identity".into()))?;
                let child = self
                    .datastore
                    .children_of(id)
                    .await?
                    .into_iter()
                    .find(|c| c.thumbnail_label.as_deref() == Some(label))
                    .ok_or_else(|| AttachmentError::MissingThumbnail {
                        id,
                        label: label.to_string(),
                    })?;
                Ok(self.backend.public_locator(&self.key_for(&child)?))
            }
        }
    }

    /// Run a staged attachment through validation, commit, derivation and
    /// persistence. Thumbnail children recurse through this same machine,
    /// hence the boxed future.
    pub(crate) fn process<'a>(
        &'a self,
        attachment: &'a mut Attachment,
        staging: &'a mut TempStaging,
    ) -> Pin<Box<dyn Future<Output = Result<Derived, AttachmentError>> + Send + 'a>> {
        Box::pin(async move {
            if self.config.strip_metadata && attachment.is_image() {
                if let Some(engine) = self.engine.clone() {
                    match self.strip_staged(engine, staging).await {
                        Ok(()) => debug!("embedded metadata stripped"),
                        Err(e) => warn!(error = %e, "metadata strip failed, keeping original bytes"),
                    }
                }
            }

            // Size always reflects the bytes about to be validated.
            attachment.size = staging.byte_len().await?;

            let errors = self.validator.validate(attachment);
            if !errors.is_empty() {
                attachment.transition_to(LifecycleState::Invalid)?;
                if let Err(e) = staging.clear().await {
                    warn!(error = %e, "staging cleanup failed");
                }
                return Err(AttachmentError::Validation(errors));
            }
            attachment.transition_to(LifecycleState::Validated)?;

            if attachment.is_image() {
                if let Some(engine) = self.engine.clone() {
                    let path = staging.current_path().await?;
                    match task::spawn_blocking(move || {
                        fc_imaging::probe_dimensions(engine.as_ref(), &path)
                    })
                    .await
                    {
                        Ok(Ok((width, height))) => {
                            attachment.width = Some(width);
                            attachment.height = Some(height);
                        }
                        Ok(Err(e)) => warn!(error = %e, "dimension probe failed"),
                        Err(e) => warn!(error = %e, "dimension probe task failed"),
                    }
                }
            }

            let data = staging.read_all().await?;
            attachment.digest = Some(hex::encode(Sha256::digest(&data)));

            let id = self.datastore.commit(attachment).await?;
            attachment.id = Some(id);
            attachment.transition_to(LifecycleState::Committed)?;
            if attachment.storage_key.is_none() {
                attachment.storage_key = Some(storage_key(
                    &self.config.storage.path_prefix,
                    id,
                    &attachment.filename,
                ));
            }
            info!(id, filename = %attachment.filename, "attachment committed");

            let derived = if attachment.parent_id.is_none() {
                self.derive_thumbnails(attachment, staging).await?
            } else {
                Derived::default()
            };

            let key = attachment
                .storage_key
                .clone()
                .ok_or_else(|| AttachmentError::Internal("storage key missing after commit".into()))?;
            self.backend.write(&key, data).await?;
            attachment.transition_to(LifecycleState::Persisted)?;
            info!(id, key = %key, backend = self.backend.name(), "attachment persisted");

            self.datastore.after_attachment_processed(attachment).await?;

            if let Err(e) = staging.clear().await {
                warn!(id, error = %e, "staging cleanup failed");
            }

            Ok(derived)
        })
    }

    /// Re-encode the staged image without embedded metadata and restage.
    async fn strip_staged(
        &self,
        engine: Arc<dyn ImageEngine>,
        staging: &mut TempStaging,
    ) -> Result<(), AttachmentError> {
        let path = staging.current_path().await?;
        let stripped = task::spawn_blocking(move || {
            fc_imaging::strip_metadata(engine.as_ref(), &path)
        })
        .await
        .map_err(|e| AttachmentError::Internal(e.to_string()))??;

        staging.stage_bytes(&stripped).await?;
        Ok(())
    }

    /// Depth-first cascade removal; children go before their parent's row.
    fn delete_tree<'a>(
        &'a self,
        attachment: &'a Attachment,
        failures: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(id) = attachment.id else {
                return;
            };

            match self.datastore.children_of(id).await {
                Ok(children) => {
                    for child in &children {
                        self.delete_tree(child, failures).await;
                    }
                }
                Err(e) => failures.push(format!("children of {}: {}", id, e)),
            }

            match self.key_for(attachment) {
                Ok(key) => {
                    if let Err(e) = self.backend.delete(&key).await {
                        failures.push(format!("bytes {}: {}", key, e));
                    }
                }
                Err(e) => failures.push(e.to_string()),
            }

            if let Err(e) = self.datastore.delete_row(id).await {
                failures.push(format!("row {}: {}", id, e));
            }

            info!(id, "attachment deleted");
        })
    }

    /// Storage key for an attachment: the recorded key if present, the
    /// deterministic derivation otherwise.
    pub(crate) fn key_for(&self, attachment: &Attachment) -> Result<String, AttachmentError> {
        let id = attachment
            .id
            .ok_or_else(|| AttachmentError::Internal("attachment has no identity".into()))?;
        Ok(attachment.storage_key.clone().unwrap_or_else(|| {
            storage_key(&self.config.storage.path_prefix, id, &attachment.filename)
        }))
    }
}
