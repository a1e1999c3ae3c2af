//! # fc-imaging
//!
//! Pluggable image processing for attachment thumbnails. An [`ImageEngine`]
//! decodes, measures and resizes images through a scoped [`ImageHandle`]
//! whose resources are released on every exit path. Engines are probed and
//! selected once at configuration time via the [`EngineRegistry`]: an
//! explicitly configured engine that is unavailable is a configuration
//! error, while probing the default order silently falls through to the
//! next candidate.
//!
//! Engine calls are synchronous and CPU-bound; async callers should wrap
//! them in `tokio::task::spawn_blocking`.

pub mod engine;
pub mod magick;
pub mod raster;
pub mod registry;

pub use engine::{
    probe_dimensions, render_resized, strip_metadata, ImageEngine, ImageHandle, ImagingError,
    OutputFormat,
};
pub use magick::MagickEngine;
pub use raster::RasterEngine;
pub use registry::{EngineFactory, EngineRegistry};
