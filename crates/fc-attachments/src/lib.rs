//! # fc-attachments
//!
//! Attachment lifecycle orchestration for Filecab: staging uploaded bytes,
//! validating them against configured constraints, deriving thumbnail
//! variants for images, persisting originals and derivatives through a
//! pluggable storage backend, and cascading cleanup on deletion.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use fc_attachments::{AttachmentLifecycle, MemoryDatastore, Upload};
//! use fc_core::config::{AttachmentConfig, Geometry, ThumbnailSpec};
//!
//! let config = AttachmentConfig {
//!     allowed_content_types: vec!["image".to_string()],
//!     thumbnails: vec![ThumbnailSpec::new("thumb", Geometry::fill(50, 50))],
//!     ..Default::default()
//! };
//!
//! let lifecycle = AttachmentLifecycle::configure(config, Arc::new(MemoryDatastore::new())).await?;
//! let processed = lifecycle
//!     .receive_upload(Upload::from_bytes("photo.jpg", "image/jpeg", file_data))
//!     .await?;
//!
//! println!("stored at {}", lifecycle.public_url_for(&processed.attachment, None).await?);
//! ```

pub mod datastore;
pub mod lifecycle;
pub mod model;
pub mod staging;
pub mod thumbnails;
pub mod validator;

pub use datastore::{Datastore, DatastoreError, MemoryDatastore};
pub use lifecycle::{
    AttachmentError, AttachmentLifecycle, ProcessedUpload, Upload, UploadSource,
};
pub use model::{Attachment, InvalidTransition, LifecycleState};
pub use staging::{StagedSource, StagingError, TempStaging};
pub use thumbnails::ThumbnailFailure;
pub use validator::Validator;
