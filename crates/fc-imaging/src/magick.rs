//! ImageMagick CLI engine.
//!
//! Shells out to the ImageMagick v7 `magick` binary. Probing runs
//! `magick -version`; a missing or broken installation makes the probe fail
//! and the registry falls through to the next candidate.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use fc_core::config::{Geometry, ResizeMode};
use tracing::debug;

use crate::engine::{ImageEngine, ImageHandle, ImagingError, OutputFormat};

/// Engine backed by the `magick` command-line tool.
#[derive(Debug)]
pub struct MagickEngine {
    binary: PathBuf,
}

impl MagickEngine {
    /// Probe the `magick` binary.
    pub fn probe() -> Result<Self, ImagingError> {
        let binary = PathBuf::from("magick");
        match Command::new(&binary).arg("-version").output() {
            Ok(output) if output.status.success() => {
                debug!("magick binary probed successfully");
                Ok(Self { binary })
            }
            Ok(output) => Err(ImagingError::EngineUnavailable {
                name: "magick",
                reason: format!("probe exited with {}", output.status),
            }),
            Err(e) => Err(ImagingError::EngineUnavailable {
                name: "magick",
                reason: e.to_string(),
            }),
        }
    }

    fn run(binary: &Path, args: &[&str]) -> Result<Output, ImagingError> {
        let output = Command::new(binary).args(args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ImagingError::Process(format!(
                "magick {}: {}",
                args.first().copied().unwrap_or(""),
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

/// Resize arguments for one geometry.
fn resize_args(geometry: &Geometry) -> Vec<String> {
    let box_spec = format!("{}x{}", geometry.width, geometry.height);
    match geometry.mode {
        ResizeMode::Fit => vec!["-resize".to_string(), box_spec],
        ResizeMode::Fill => vec![
            "-resize".to_string(),
            format!("{}^", box_spec),
            "-gravity".to_string(),
            "center".to_string(),
            "-extent".to_string(),
            box_spec,
        ],
    }
}

struct MagickHandle<'a> {
    binary: &'a Path,
    source: &'a Path,
    dimensions: (u32, u32),
}

impl MagickHandle<'_> {
    /// Run a conversion into a scoped temp file and collect its bytes.
    /// The temp file is removed when it drops, on success and on error.
    fn convert(&self, extra_args: &[String], extension: &str) -> Result<Vec<u8>, ImagingError> {
        let out = tempfile::Builder::new()
            .prefix("fc-magick-")
            .suffix(&format!(".{}", extension))
            .tempfile()?;

        let source = self.source.to_string_lossy().into_owned();
        let target = out.path().to_string_lossy().into_owned();

        let mut args: Vec<&str> = vec![source.as_str()];
        args.extend(extra_args.iter().map(String::as_str));
        args.push(target.as_str());

        MagickEngine::run(self.binary, &args)?;
        Ok(std::fs::read(out.path())?)
    }

    fn source_extension(&self) -> String {
        self.source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "png".to_string())
    }
}

impl ImageHandle for MagickHandle<'_> {
    fn dimensions(&mut self) -> Result<(u32, u32), ImagingError> {
        Ok(self.dimensions)
    }

    fn resize(
        &mut self,
        geometry: &Geometry,
        format: OutputFormat,
    ) -> Result<Vec<u8>, ImagingError> {
        self.convert(&resize_args(geometry), format.extension())
    }

    fn strip_metadata(&mut self) -> Result<Vec<u8>, ImagingError> {
        let extension = self.source_extension();
        self.convert(&["-strip".to_string()], &extension)
    }
}

impl ImageEngine for MagickEngine {
    fn name(&self) -> &'static str {
        "magick"
    }

    fn supports_gif_output(&self) -> bool {
        true
    }

    fn with_image(
        &self,
        path: &Path,
        f: &mut dyn FnMut(&mut dyn ImageHandle) -> Result<(), ImagingError>,
    ) -> Result<(), ImagingError> {
        // identify doubles as the decode check; anything it rejects is not
        // an image we can process.
        let source = path.to_string_lossy().into_owned();
        let output = MagickEngine::run(
            &self.binary,
            &["identify", "-format", "%w:%h", source.as_str()],
        )
        .map_err(|e| ImagingError::Decode(e.to_string()))?;

        let text = String::from_utf8_lossy(&output.stdout);
        let dimensions = parse_dimensions(text.trim())
            .ok_or_else(|| ImagingError::Decode(format!("unexpected identify output: {}", text)))?;

        let mut handle = MagickHandle {
            binary: &self.binary,
            source: path,
            dimensions,
        };
        f(&mut handle)
    }
}

fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    // Multi-frame images print one w:h pair per frame; the first frame wins.
    let first = text.split_whitespace().next()?;
    let (w, h) = first.split_once(':')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}
