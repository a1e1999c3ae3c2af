//! In-process engine built on the `image` crate.
//!
//! Always available since it links no external library. Does not emit GIF
//! output; derivation rewrites GIF thumbnails to PNG when this engine is
//! active.

use std::io::Cursor;
use std::path::Path;

use fc_core::config::{Geometry, ResizeMode};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::engine::{ImageEngine, ImageHandle, ImagingError, OutputFormat};

/// Pure-Rust raster engine.
#[derive(Debug)]
pub struct RasterEngine;

impl RasterEngine {
    /// Probe for availability. In-process, so this always succeeds; the
    /// signature matches the registry's factory contract.
    pub fn probe() -> Result<Self, ImagingError> {
        Ok(Self)
    }
}

struct RasterHandle {
    image: DynamicImage,
    source_format: Option<ImageFormat>,
}

impl RasterHandle {
    fn encode(image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, ImagingError> {
        let target = match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Gif => {
                return Err(ImagingError::UnsupportedOutput {
                    engine: "raster",
                    format: "gif",
                })
            }
        };

        let mut buffer = Cursor::new(Vec::new());
        match target {
            // The JPEG encoder rejects alpha channels.
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
                .write_to(&mut buffer, target)
                .map_err(|e| ImagingError::Process(e.to_string()))?,
            _ => image
                .write_to(&mut buffer, target)
                .map_err(|e| ImagingError::Process(e.to_string()))?,
        }
        Ok(buffer.into_inner())
    }
}

impl ImageHandle for RasterHandle {
    fn dimensions(&mut self) -> Result<(u32, u32), ImagingError> {
        Ok((self.image.width(), self.image.height()))
    }

    fn resize(
        &mut self,
        geometry: &Geometry,
        format: OutputFormat,
    ) -> Result<Vec<u8>, ImagingError> {
        let resized = match geometry.mode {
            ResizeMode::Fit => {
                self.image
                    .resize(geometry.width, geometry.height, FilterType::Lanczos3)
            }
            ResizeMode::Fill => {
                self.image
                    .resize_to_fill(geometry.width, geometry.height, FilterType::Lanczos3)
            }
        };
        Self::encode(&resized, format)
    }

    fn strip_metadata(&mut self) -> Result<Vec<u8>, ImagingError> {
        // Re-encoding drops every ancillary chunk; the pixel data survives.
        let format = match self.source_format {
            Some(ImageFormat::Jpeg) => OutputFormat::Jpeg,
            Some(ImageFormat::WebP) => OutputFormat::WebP,
            Some(ImageFormat::Gif) => {
                return Err(ImagingError::UnsupportedOutput {
                    engine: "raster",
                    format: "gif",
                })
            }
            _ => OutputFormat::Png,
        };
        Self::encode(&self.image, format)
    }
}

impl ImageEngine for RasterEngine {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn supports_gif_output(&self) -> bool {
        false
    }

    fn with_image(
        &self,
        path: &Path,
        f: &mut dyn FnMut(&mut dyn ImageHandle) -> Result<(), ImagingError>,
    ) -> Result<(), ImagingError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let source_format = reader.format();
        let image = reader
            .decode()
            .map_err(|e| ImagingError::Decode(e.to_string()))?;

        let mut handle = RasterHandle {
            image,
            source_format,
        };
        f(&mut handle)
    }
}
