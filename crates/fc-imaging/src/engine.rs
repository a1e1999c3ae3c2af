//! Image engine contract.

use std::path::Path;

use fc_core::config::Geometry;
use thiserror::Error;

/// Image processing errors.
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("image engine {name} is not available: {reason}")]
    EngineUnavailable { name: &'static str, reason: String },

    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("image processing failed: {0}")]
    Process(String),

    #[error("engine {engine} cannot emit {format} output")]
    UnsupportedOutput {
        engine: &'static str,
        format: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoded output format for derived images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
}

impl OutputFormat {
    /// Pick the format matching a filename extension; unknown extensions
    /// fall back to PNG.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "gif" => Self::Gif,
            "webp" => Self::WebP,
            _ => Self::Png,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

/// An open image within a [`ImageEngine::with_image`] scope.
pub trait ImageHandle {
    /// Pixel dimensions (width, height).
    fn dimensions(&mut self) -> Result<(u32, u32), ImagingError>;

    /// Resize to the given geometry and encode.
    fn resize(&mut self, geometry: &Geometry, format: OutputFormat)
        -> Result<Vec<u8>, ImagingError>;

    /// Re-encode without embedded metadata, keeping the source format.
    fn strip_metadata(&mut self) -> Result<Vec<u8>, ImagingError>;
}

/// A pluggable image-processing engine.
///
/// Implementations must support concurrent independent invocations.
pub trait ImageEngine: Send + Sync + std::fmt::Debug {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Whether this engine can encode GIF thumbnails. Derivation rewrites
    /// GIF sources to PNG when the active engine cannot.
    fn supports_gif_output(&self) -> bool;

    /// Open the image at `path` and run `f` against its handle.
    ///
    /// Decode failures surface before `f` runs; every resource acquired for
    /// the handle is released when this returns, on success and on error.
    fn with_image(
        &self,
        path: &Path,
        f: &mut dyn FnMut(&mut dyn ImageHandle) -> Result<(), ImagingError>,
    ) -> Result<(), ImagingError>;
}

/// Resize the image at `path` in one scoped acquisition.
pub fn render_resized(
    engine: &dyn ImageEngine,
    path: &Path,
    geometry: &Geometry,
    format: OutputFormat,
) -> Result<Vec<u8>, ImagingError> {
    let mut out = None;
    engine.with_image(path, &mut |image| {
        out = Some(image.resize(geometry, format)?);
        Ok(())
    })?;
    out.ok_or_else(|| ImagingError::Process("resize produced no output".to_string()))
}

/// Read the dimensions of the image at `path` in one scoped acquisition.
pub fn probe_dimensions(
    engine: &dyn ImageEngine,
    path: &Path,
) -> Result<(u32, u32), ImagingError> {
    let mut out = None;
    engine.with_image(path, &mut |image| {
        out = Some(image.dimensions()?);
        Ok(())
    })?;
    out.ok_or_else(|| ImagingError::Process("dimension probe produced no output".to_string()))
}

/// Re-encode the image at `path` without embedded metadata.
pub fn strip_metadata(engine: &dyn ImageEngine, path: &Path) -> Result<Vec<u8>, ImagingError> {
    let mut out = None;
    engine.with_image(path, &mut |image| {
        out = Some(image.strip_metadata()?);
        Ok(())
    })?;
    out.ok_or_else(|| ImagingError::Process("strip produced no output".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_extension() {
        assert_eq!(OutputFormat::from_extension("png"), OutputFormat::Png);
        assert_eq!(OutputFormat::from_extension("JPG"), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_extension("jpeg"), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_extension("gif"), OutputFormat::Gif);
        assert_eq!(OutputFormat::from_extension("webp"), OutputFormat::WebP);
        assert_eq!(OutputFormat::from_extension("tiff"), OutputFormat::Png);
    }
}
