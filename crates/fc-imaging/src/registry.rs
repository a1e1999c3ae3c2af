//! Engine registry and configuration-time selection.

use std::collections::HashMap;
use std::sync::Arc;

use fc_core::ConfigError;
use tracing::debug;

use crate::engine::{ImageEngine, ImagingError};
use crate::magick::MagickEngine;
use crate::raster::RasterEngine;

/// Probes and constructs one engine.
pub type EngineFactory = Box<dyn Fn() -> Result<Arc<dyn ImageEngine>, ImagingError> + Send + Sync>;

/// Name-to-factory mapping for image engines.
pub struct EngineRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EngineRegistry {
    /// Registry with no entries.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the built-in engines: `magick` and `raster`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("magick", Box::new(|| MagickEngine::probe().map(arc)));
        registry.register("raster", Box::new(|| RasterEngine::probe().map(arc)));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: EngineFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Select an engine once, at configuration time.
    ///
    /// With an explicit name, an unknown or unavailable engine is an error:
    /// explicit configuration signals intent, so the failure is reported
    /// instead of silently falling through. Without one, the names in
    /// `order` are probed in sequence and unavailable engines are skipped.
    pub fn select(
        &self,
        explicit: Option<&str>,
        order: &[String],
    ) -> Result<Arc<dyn ImageEngine>, ConfigError> {
        if let Some(name) = explicit {
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| ConfigError::UnknownEngine(name.to_string()))?;
            return factory().map_err(|e| ConfigError::EngineUnavailable {
                name: name.to_string(),
                reason: e.to_string(),
            });
        }

        for name in order {
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| ConfigError::UnknownEngine(name.clone()))?;
            match factory() {
                Ok(engine) => {
                    debug!(engine = engine.name(), "image engine selected");
                    return Ok(engine);
                }
                Err(e) => {
                    debug!(engine = %name, error = %e, "image engine unavailable, trying next");
                }
            }
        }

        Err(ConfigError::NoEngineAvailable {
            tried: order.join(", "),
        })
    }
}

fn arc<E: ImageEngine + 'static>(engine: E) -> Arc<dyn ImageEngine> {
    Arc::new(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable_factory() -> EngineFactory {
        Box::new(|| {
            Err(ImagingError::EngineUnavailable {
                name: "broken",
                reason: "library missing".to_string(),
            })
        })
    }

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn explicit_raster_engine_is_selected() {
        let registry = EngineRegistry::builtin();
        let engine = registry.select(Some("raster"), &[]).unwrap();
        assert_eq!(engine.name(), "raster");
    }

    #[test]
    fn explicit_unknown_engine_is_an_error() {
        let registry = EngineRegistry::builtin();
        let err = registry.select(Some("daguerreotype"), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEngine(name) if name == "daguerreotype"));
    }

    #[test]
    fn explicit_unavailable_engine_is_reported_not_skipped() {
        let mut registry = EngineRegistry::builtin();
        registry.register("broken", unavailable_factory());

        let err = registry
            .select(Some("broken"), &order(&["broken", "raster"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EngineUnavailable { name, .. } if name == "broken"));
    }

    #[test]
    fn probe_order_skips_unavailable_engines() {
        let mut registry = EngineRegistry::builtin();
        registry.register("broken", unavailable_factory());

        let engine = registry
            .select(None, &order(&["broken", "raster"]))
            .unwrap();
        assert_eq!(engine.name(), "raster");
    }

    #[test]
    fn exhausted_probe_order_is_an_error() {
        let mut registry = EngineRegistry::empty();
        registry.register("broken", unavailable_factory());

        let err = registry.select(None, &order(&["broken"])).unwrap_err();
        assert!(matches!(err, ConfigError::NoEngineAvailable { .. }));
    }

    #[test]
    fn unknown_name_in_probe_order_is_an_error() {
        let registry = EngineRegistry::builtin();
        let err = registry
            .select(None, &order(&["daguerreotype", "raster"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEngine(_)));
    }
}
