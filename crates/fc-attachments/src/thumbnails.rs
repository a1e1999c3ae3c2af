//! Thumbnail derivation.
//!
//! Each configured label yields one child attachment that recurses through
//! the full lifecycle. A label failing to derive never aborts its siblings;
//! failures are collected and surfaced after every label has been
//! attempted.

use std::path::Path;
use std::sync::Arc;

use fc_core::config::ThumbnailSpec;
use fc_core::Id;
use fc_imaging::{ImageEngine, OutputFormat};
use tokio::task;
use tracing::{debug, warn};

use crate::datastore::Datastore;
use crate::lifecycle::{AttachmentError, AttachmentLifecycle};
use crate::model::{Attachment, LifecycleState};
use crate::staging::TempStaging;

/// One label that failed to derive.
#[derive(Debug)]
pub struct ThumbnailFailure {
    pub label: String,
    pub error: AttachmentError,
}

/// Outcome of a derivation pass.
#[derive(Debug, Default)]
pub(crate) struct Derived {
    pub(crate) thumbnails: Vec<Attachment>,
    pub(crate) failures: Vec<ThumbnailFailure>,
}

impl<D: Datastore> AttachmentLifecycle<D> {
    /// Derive every configured thumbnail for a committed original.
    ///
    /// Runs only for thumbnailable parents; thumbnails of thumbnails are
    /// never derived.
    pub(crate) async fn derive_thumbnails(
        &self,
        parent: &Attachment,
        staging: &mut TempStaging,
    ) -> Result<Derived, AttachmentError> {
        let mut derived = Derived::default();

        if !parent.is_thumbnailable() || self.config.thumbnails.is_empty() {
            return Ok(derived);
        }
        let Some(engine) = self.engine.clone() else {
            return Ok(derived);
        };
        let parent_id = parent
            .id
            .ok_or_else(|| AttachmentError::Internal("derivation before commit".into()))?;

        let source_path = staging.current_path().await?;
        let force_png = parent.content_type == "image/gif" && !engine.supports_gif_output();

        for spec in &self.config.thumbnails {
            match self
                .derive_one(parent, parent_id, &source_path, &engine, spec, force_png)
                .await
            {
                Ok(child) => {
                    debug!(parent = parent_id, label = %spec.label, "thumbnail derived");
                    derived.thumbnails.push(child);
                }
                Err(error) => {
                    warn!(parent = parent_id, label = %spec.label, error = %error, "thumbnail derivation failed");
                    derived.failures.push(ThumbnailFailure {
                        label: spec.label.clone(),
                        error,
                    });
                }
            }
        }

        Ok(derived)
    }

    async fn derive_one(
        &self,
        parent: &Attachment,
        parent_id: Id,
        source_path: &Path,
        engine: &Arc<dyn ImageEngine>,
        spec: &ThumbnailSpec,
        force_png: bool,
    ) -> Result<Attachment, AttachmentError> {
        // Re-derivation updates the existing row instead of duplicating it.
        let mut child = self
            .datastore
            .find_or_create_child(parent_id, &spec.label)
            .await?;
        child.parent_id = Some(parent_id);
        child.thumbnail_label = Some(spec.label.clone());
        child.filename = parent.thumbnail_filename(&spec.label, force_png);
        child.content_type = if force_png {
            "image/png".to_string()
        } else {
            parent.content_type.clone()
        };

        let format = OutputFormat::from_extension(child.extension().unwrap_or("png"));
        let geometry = spec.geometry;
        let path = source_path.to_path_buf();
        let render_engine = Arc::clone(engine);
        let bytes = task::spawn_blocking(move || {
            fc_imaging::render_resized(render_engine.as_ref(), &path, &geometry, format)
        })
        .await
        .map_err(|e| AttachmentError::Internal(e.to_string()))?
        .map_err(|e| AttachmentError::Thumbnail {
            label: spec.label.clone(),
            source: e,
        })?;

        let mut child_staging =
            TempStaging::new(self.config.staging_dir.as_deref(), &child.filename);
        child_staging.stage_bytes(&bytes).await?;
        child.transition_to(LifecycleState::Staged)?;

        self.datastore.before_thumbnail_saved(&mut child).await?;

        self.process(&mut child, &mut child_staging).await?;
        Ok(child)
    }
}
