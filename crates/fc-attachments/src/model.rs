//! Attachment model and lifecycle states.

use chrono::{DateTime, Utc};
use fc_core::config::AttachmentConfig;
use fc_core::Id;
use fc_storage::sanitize_filename;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle states of an attachment.
///
/// `Invalid` and `Deleted` are terminal. A persisted attachment may be
/// staged again for re-processing without a fresh upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    New,
    Staged,
    Validated,
    Invalid,
    Committed,
    Persisted,
    Deleted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Staged => "staged",
            Self::Validated => "validated",
            Self::Invalid => "invalid",
            Self::Committed => "committed",
            Self::Persisted => "persisted",
            Self::Deleted => "deleted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Deleted)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (New, Staged)
                | (Staged, Staged)
                | (Staged, Validated)
                | (Staged, Invalid)
                | (Validated, Committed)
                | (Committed, Persisted)
                | (Committed, Deleted)
                | (Persisted, Staged)
                | (Persisted, Deleted)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Error)]
#[error("illegal lifecycle transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// One stored file: an uploaded original or a derived thumbnail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Identity assigned by the external datastore on commit.
    pub id: Option<Id>,
    /// Set for thumbnails; originals have no parent.
    pub parent_id: Option<Id>,
    /// Variant name for thumbnails, e.g. "thumb".
    pub thumbnail_label: Option<String>,
    /// Sanitized filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Byte length of the currently staged or persisted content.
    pub size: u64,
    /// Pixel width, images only.
    pub width: Option<u32>,
    /// Pixel height, images only.
    pub height: Option<u32>,
    /// Backend locator, stable once first persisted.
    pub storage_key: Option<String>,
    /// SHA-256 of the persisted bytes, hex-encoded.
    pub digest: Option<String>,
    /// Host-visible caption; hooks may set it.
    pub description: Option<String>,
    pub state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attachment {
    /// Create a new original attachment.
    ///
    /// The filename is sanitized; a blank content type is guessed from the
    /// filename extension.
    pub fn new(filename: impl AsRef<str>, content_type: impl Into<String>) -> Self {
        let filename = sanitize_filename(filename.as_ref());
        let content_type = content_type.into();
        let content_type = if content_type.trim().is_empty() {
            mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .to_string()
        } else {
            content_type
        };

        let now = Utc::now();
        Self {
            id: None,
            parent_id: None,
            thumbnail_label: None,
            filename,
            content_type,
            size: 0,
            width: None,
            height: None,
            storage_key: None,
            digest: None,
            description: None,
            state: LifecycleState::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a blank thumbnail entity for a parent; the deriver fills in
    /// filename, content type and bytes.
    pub fn child_of(parent_id: Id, label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            parent_id: Some(parent_id),
            thumbnail_label: Some(label.into()),
            filename: String::new(),
            content_type: String::new(),
            size: 0,
            width: None,
            height: None,
            storage_key: None,
            digest: None,
            description: None,
            state: LifecycleState::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the datastore has assigned an identity.
    pub fn has_identity(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the content type is in the recognized image set.
    pub fn is_image(&self) -> bool {
        AttachmentConfig::is_image_type(&self.content_type)
    }

    /// Whether this attachment is itself a derived thumbnail.
    pub fn is_thumbnail(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Thumbnails are derived for images only, and never from other
    /// thumbnails.
    pub fn is_thumbnailable(&self) -> bool {
        self.is_image() && self.parent_id.is_none()
    }

    /// Filename extension, if any.
    pub fn extension(&self) -> Option<&str> {
        match self.filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }

    /// Filename for a derived thumbnail: `_{label}` is inserted before the
    /// extension. `force_png` rewrites the extension to `.png`, used when
    /// the active engine cannot emit the source format.
    pub fn thumbnail_filename(&self, label: &str, force_png: bool) -> String {
        let (stem, ext) = match self.filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
            _ => (self.filename.as_str(), None),
        };
        let ext = if force_png { Some("png") } else { ext };
        match ext {
            Some(ext) => format!("{}_{}.{}", stem, label, ext),
            None => format!("{}_{}", stem, label),
        }
    }

    /// Move to the next lifecycle state.
    pub fn transition_to(&mut self, next: LifecycleState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sanitizes_filename_and_guesses_content_type() {
        let attachment = Attachment::new("my photo.jpg", "");
        assert_eq!(attachment.filename, "my_photo.jpg");
        assert_eq!(attachment.content_type, "image/jpeg");
        assert_eq!(attachment.state, LifecycleState::New);
    }

    #[test]
    fn blank_content_type_without_extension_falls_back_to_octet_stream() {
        let attachment = Attachment::new("blob", "");
        assert_eq!(attachment.content_type, "application/octet-stream");
    }

    #[test]
    fn thumbnailable_requires_image_type_and_no_parent() {
        let image = Attachment::new("photo.jpg", "image/jpeg");
        assert!(image.is_thumbnailable());

        let pdf = Attachment::new("doc.pdf", "application/pdf");
        assert!(!pdf.is_thumbnailable());

        let mut thumb = Attachment::new("photo_thumb.jpg", "image/jpeg");
        thumb.parent_id = Some(1);
        assert!(!thumb.is_thumbnailable());
    }

    #[test]
    fn thumbnail_filename_inserts_label_before_extension() {
        let attachment = Attachment::new("photo.jpg", "image/jpeg");
        assert_eq!(attachment.thumbnail_filename("thumb", false), "photo_thumb.jpg");
    }

    #[test]
    fn thumbnail_filename_forces_png_extension() {
        let attachment = Attachment::new("anim.gif", "image/gif");
        assert_eq!(attachment.thumbnail_filename("thumb", true), "anim_thumb.png");
    }

    #[test]
    fn thumbnail_filename_without_extension() {
        let attachment = Attachment::new("blob", "application/octet-stream");
        assert_eq!(attachment.thumbnail_filename("thumb", false), "blob_thumb");
        assert_eq!(attachment.thumbnail_filename("thumb", true), "blob_thumb.png");
    }

    #[test]
    fn extension_handles_dotted_and_bare_names() {
        assert_eq!(Attachment::new("a.tar.gz", "").extension(), Some("gz"));
        assert_eq!(Attachment::new("noext", "text/plain").extension(), None);
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        let mut attachment = Attachment::new("photo.jpg", "image/jpeg");
        for next in [
            LifecycleState::Staged,
            LifecycleState::Validated,
            LifecycleState::Committed,
            LifecycleState::Persisted,
        ] {
            attachment.transition_to(next).unwrap();
        }
        assert_eq!(attachment.state, LifecycleState::Persisted);

        // Re-entry for re-processing is allowed.
        attachment.transition_to(LifecycleState::Staged).unwrap();
    }

    #[test]
    fn invalid_is_terminal() {
        let mut attachment = Attachment::new("photo.jpg", "image/jpeg");
        attachment.transition_to(LifecycleState::Staged).unwrap();
        attachment.transition_to(LifecycleState::Invalid).unwrap();

        let err = attachment.transition_to(LifecycleState::Validated).unwrap_err();
        assert_eq!(err.from, LifecycleState::Invalid);
        assert!(attachment.state.is_terminal());
    }

    #[test]
    fn skipping_validation_is_illegal() {
        let mut attachment = Attachment::new("photo.jpg", "image/jpeg");
        attachment.transition_to(LifecycleState::Staged).unwrap();
        assert!(attachment.transition_to(LifecycleState::Committed).is_err());
    }
}
