//! # fc-core
//!
//! Shared primitives for the Filecab attachment system: identifiers,
//! field-level validation errors, configuration types and the
//! configuration-time error enum.

pub mod config;
pub mod error;

pub use config::{
    AttachmentConfig, DbBlobSettings, FileStoreSettings, Geometry, ObjectStoreSettings,
    ResizeMode, SizeRange, StorageSettings, ThumbnailSpec, IMAGE_CONTENT_TYPES,
};
pub use error::{ConfigError, ValidationErrors};

/// Primary key type assigned by the external datastore.
pub type Id = i64;
