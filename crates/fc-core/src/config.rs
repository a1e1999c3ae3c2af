//! Configuration types.
//!
//! All configuration is resolved once when a lifecycle is set up and is
//! immutable afterwards. Loading these from files or the environment is the
//! embedding application's job; everything here derives serde.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Content types recognized as images, used by the `"image"` allow-list
/// sentinel and the thumbnailable check.
pub const IMAGE_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/pjpeg",
    "image/jpg",
    "image/gif",
    "image/png",
    "image/x-png",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

/// Inclusive byte-size bounds for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: u64,
    pub max: u64,
}

impl SizeRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, size: u64) -> bool {
        size >= self.min && size <= self.max
    }
}

impl Default for SizeRange {
    fn default() -> Self {
        Self {
            min: 1,
            max: 256 * 1024 * 1024,
        }
    }
}

/// How a resize geometry maps source pixels onto the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Preserve aspect ratio, fit within the box.
    Fit,
    /// Fill the box exactly, cropping to center.
    Fill,
}

/// Target dimensions for a derived thumbnail.
///
/// Parses from the compact string form used in configuration files:
/// `"64x48"` fits within the box, `"64x48!"` fills it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
}

impl Geometry {
    pub fn fit(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ResizeMode::Fit,
        }
    }

    pub fn fill(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ResizeMode::Fill,
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedGeometry(s.to_string());

        let (dims, mode) = match s.strip_suffix('!') {
            Some(rest) => (rest, ResizeMode::Fill),
            None => (s, ResizeMode::Fit),
        };

        let (w, h) = dims.split_once('x').ok_or_else(malformed)?;
        let width: u32 = w.parse().map_err(|_| malformed())?;
        let height: u32 = h.parse().map_err(|_| malformed())?;
        if width == 0 || height == 0 {
            return Err(malformed());
        }

        Ok(Self {
            width,
            height,
            mode,
        })
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            ResizeMode::Fit => write!(f, "{}x{}", self.width, self.height),
            ResizeMode::Fill => write!(f, "{}x{}!", self.width, self.height),
        }
    }
}

impl TryFrom<String> for Geometry {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Geometry> for String {
    fn from(g: Geometry) -> Self {
        g.to_string()
    }
}

/// One named thumbnail variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    /// Variant name, e.g. "thumb"; becomes part of the derived filename.
    pub label: String,
    pub geometry: Geometry,
}

impl ThumbnailSpec {
    pub fn new(label: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            label: label.into(),
            geometry,
        }
    }
}

/// Settings for the file-system backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreSettings {
    /// Root directory for stored bytes.
    pub root: PathBuf,
    /// Base URL prepended to storage keys when building public locators.
    pub base_url: String,
}

impl Default for FileStoreSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./attachments"),
            base_url: "/attachments".to_string(),
        }
    }
}

/// Settings for the remote object-store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreSettings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Alternate content-delivery domain used for public locators.
    pub cdn_host: Option<String>,
}

/// Settings for the database blob backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbBlobSettings {
    /// Database connection URL, e.g. `sqlite://attachments.db`.
    pub url: String,
    /// Base URL prepended to storage keys when building public locators.
    pub base_url: String,
}

/// Storage backend selection and per-backend settings.
///
/// `backend` names an entry in the backend registry; the matching section
/// must be present or configuration fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Registry name of the backend: "file", "object", "db" or "memory".
    pub backend: String,
    /// Key prefix prepended to every storage key.
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub file: Option<FileStoreSettings>,
    #[serde(default)]
    pub object: Option<ObjectStoreSettings>,
    #[serde(default)]
    pub db: Option<DbBlobSettings>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            path_prefix: String::new(),
            file: Some(FileStoreSettings::default()),
            object: None,
            db: None,
        }
    }
}

/// Full configuration for one record type's attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Allowed content types. Empty allows everything; the literal entry
    /// `"image"` expands to [`IMAGE_CONTENT_TYPES`].
    #[serde(default)]
    pub allowed_content_types: Vec<String>,
    #[serde(default)]
    pub size: SizeRange,
    /// Thumbnail variants derived for image attachments.
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailSpec>,
    #[serde(default)]
    pub storage: StorageSettings,
    /// Explicitly chosen image engine. Unavailability of an explicit engine
    /// is a configuration error, not a fallthrough.
    #[serde(default)]
    pub engine: Option<String>,
    /// Probe order when no engine is configured explicitly.
    #[serde(default = "default_engine_order")]
    pub engine_order: Vec<String>,
    /// Re-encode image uploads to drop embedded metadata before persisting.
    #[serde(default)]
    pub strip_metadata: bool,
    /// Override for the staging directory; defaults to the system temp dir.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_engine_order() -> Vec<String> {
    vec!["magick".to_string(), "raster".to_string()]
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            allowed_content_types: Vec::new(),
            size: SizeRange::default(),
            thumbnails: Vec::new(),
            storage: StorageSettings::default(),
            engine: None,
            engine_order: default_engine_order(),
            strip_metadata: false,
            staging_dir: None,
        }
    }
}

impl AttachmentConfig {
    /// Check a content type against the allow-list.
    ///
    /// An empty allow-list accepts everything. The `"image"` sentinel entry
    /// expands to the built-in image content-type set.
    pub fn content_type_allowed(&self, content_type: &str) -> bool {
        if self.allowed_content_types.is_empty() {
            return true;
        }
        self.allowed_content_types.iter().any(|allowed| {
            if allowed == "image" {
                IMAGE_CONTENT_TYPES.contains(&content_type)
            } else {
                allowed == content_type
            }
        })
    }

    /// Whether the given content type is in the recognized image set.
    pub fn is_image_type(content_type: &str) -> bool {
        IMAGE_CONTENT_TYPES.contains(&content_type)
    }

    /// Whether this configuration requires an image engine at all.
    pub fn needs_engine(&self) -> bool {
        !self.thumbnails.is_empty() || self.strip_metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_parses_fit_and_fill() {
        assert_eq!(Geometry::parse("64x48").unwrap(), Geometry::fit(64, 48));
        assert_eq!(Geometry::parse("50x50!").unwrap(), Geometry::fill(50, 50));
    }

    #[test]
    fn geometry_rejects_malformed_strings() {
        for bad in ["", "64", "64x", "x48", "0x10", "64x48x2", "axb"] {
            assert!(
                matches!(Geometry::parse(bad), Err(ConfigError::MalformedGeometry(_))),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn geometry_round_trips_through_serde() {
        let spec = ThumbnailSpec::new("thumb", Geometry::fill(50, 50));
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("50x50!"));

        let back: ThumbnailSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn empty_allow_list_accepts_everything() {
        let config = AttachmentConfig::default();
        assert!(config.content_type_allowed("application/pdf"));
        assert!(config.content_type_allowed("image/png"));
    }

    #[test]
    fn image_sentinel_expands_to_builtin_set() {
        let config = AttachmentConfig {
            allowed_content_types: vec!["image".to_string()],
            ..Default::default()
        };
        assert!(config.content_type_allowed("image/png"));
        assert!(config.content_type_allowed("image/gif"));
        assert!(!config.content_type_allowed("application/pdf"));
        assert!(!config.content_type_allowed("image/svg+xml"));
    }

    #[test]
    fn explicit_allow_list_is_exact() {
        let config = AttachmentConfig {
            allowed_content_types: vec!["application/pdf".to_string()],
            ..Default::default()
        };
        assert!(config.content_type_allowed("application/pdf"));
        assert!(!config.content_type_allowed("image/png"));
    }

    #[test]
    fn size_range_bounds_are_inclusive() {
        let range = SizeRange::new(10, 100);
        assert!(!range.contains(9));
        assert!(range.contains(10));
        assert!(range.contains(100));
        assert!(!range.contains(101));
    }
}
