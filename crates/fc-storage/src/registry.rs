//! Backend registry.
//!
//! Maps symbolic backend names to factories. Resolution happens exactly once
//! per record type when its lifecycle is configured; unknown names fail
//! immediately with a configuration error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fc_core::config::StorageSettings;
use fc_core::ConfigError;
use tracing::debug;

use crate::backend::StorageBackend;
use crate::db_blob::DbBlobBackend;
use crate::file::FileBackend;
use crate::memory::MemoryBackend;
use crate::object::ObjectBackend;

/// Produces a backend from storage settings.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn build(
        &self,
        settings: &StorageSettings,
    ) -> Result<Arc<dyn StorageBackend>, ConfigError>;
}

/// Name-to-factory mapping for storage backends.
pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BackendRegistry {
    /// Registry with no entries.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the built-in backends: `file`, `object`, `db`
    /// and `memory`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("file", Arc::new(FileFactory));
        registry.register("object", Arc::new(ObjectFactory));
        registry.register("db", Arc::new(DbBlobFactory));
        registry.register("memory", Arc::new(MemoryFactory));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Resolve the backend named by `settings.backend`.
    pub async fn resolve(
        &self,
        settings: &StorageSettings,
    ) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        let factory = self
            .factories
            .get(&settings.backend)
            .ok_or_else(|| ConfigError::UnknownBackend(settings.backend.clone()))?;

        let backend = factory.build(settings).await?;
        debug!(backend = backend.name(), "storage backend resolved");
        Ok(backend)
    }
}

struct FileFactory;

#[async_trait]
impl BackendFactory for FileFactory {
    async fn build(
        &self,
        settings: &StorageSettings,
    ) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        let file = settings
            .file
            .as_ref()
            .ok_or_else(|| ConfigError::MissingBackendSettings("file".to_string()))?;
        Ok(Arc::new(FileBackend::new(&file.root, &file.base_url)))
    }
}

struct ObjectFactory;

#[async_trait]
impl BackendFactory for ObjectFactory {
    async fn build(
        &self,
        settings: &StorageSettings,
    ) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        let object = settings
            .object
            .as_ref()
            .ok_or_else(|| ConfigError::MissingBackendSettings("object".to_string()))?;
        let backend = ObjectBackend::new(object).map_err(|e| ConfigError::InvalidValue {
            key: "storage.object".to_string(),
            message: e.to_string(),
        })?;
        Ok(Arc::new(backend))
    }
}

struct DbBlobFactory;

#[async_trait]
impl BackendFactory for DbBlobFactory {
    async fn build(
        &self,
        settings: &StorageSettings,
    ) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        let db = settings
            .db
            .as_ref()
            .ok_or_else(|| ConfigError::MissingBackendSettings("db".to_string()))?;
        let backend = DbBlobBackend::connect(db)
            .await
            .map_err(|e| ConfigError::InvalidValue {
                key: "storage.db".to_string(),
                message: e.to_string(),
            })?;
        Ok(Arc::new(backend))
    }
}

struct MemoryFactory;

#[async_trait]
impl BackendFactory for MemoryFactory {
    async fn build(
        &self,
        _settings: &StorageSettings,
    ) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        Ok(Arc::new(MemoryBackend::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_memory_backend() {
        let registry = BackendRegistry::builtin();
        let settings = StorageSettings {
            backend: "memory".to_string(),
            ..Default::default()
        };

        let backend = registry.resolve(&settings).await.unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[tokio::test]
    async fn resolves_file_backend_from_settings() {
        let registry = BackendRegistry::builtin();
        let settings = StorageSettings::default();

        let backend = registry.resolve(&settings).await.unwrap();
        assert_eq!(backend.name(), "file");
    }

    #[tokio::test]
    async fn unknown_backend_name_is_a_config_error() {
        let registry = BackendRegistry::builtin();
        let settings = StorageSettings {
            backend: "punchcards".to_string(),
            ..Default::default()
        };

        let err = registry.resolve(&settings).await.unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend(name) if name == "punchcards"));
    }

    #[tokio::test]
    async fn missing_settings_section_is_a_config_error() {
        let registry = BackendRegistry::builtin();
        let settings = StorageSettings {
            backend: "db".to_string(),
            db: None,
            ..Default::default()
        };

        let err = registry.resolve(&settings).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingBackendSettings(name) if name == "db"));
    }
}
