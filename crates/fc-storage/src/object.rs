//! Remote object-store backend built on Apache OpenDAL.

use async_trait::async_trait;
use bytes::Bytes;
use fc_core::config::ObjectStoreSettings;
use opendal::{services, ErrorKind, Operator};
use tracing::{debug, info, instrument};

use crate::backend::{StorageBackend, StorageError, StorageResult};

/// S3-compatible object storage.
#[derive(Debug)]
pub struct ObjectBackend {
    operator: Operator,
    settings: ObjectStoreSettings,
}

impl ObjectBackend {
    /// Build an operator from settings. Credentials come from the settings
    /// only; ambient environment and instance-metadata lookups are disabled.
    pub fn new(settings: &ObjectStoreSettings) -> StorageResult<Self> {
        let mut builder = services::S3::default()
            .bucket(&settings.bucket)
            .region(&settings.region)
            .access_key_id(&settings.access_key_id)
            .secret_access_key(&settings.secret_access_key)
            .disable_config_load()
            .disable_ec2_metadata();

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint(endpoint);
        }

        let operator = Operator::new(builder)
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .finish();

        info!(bucket = %settings.bucket, region = %settings.region, "object store initialized");

        Ok(Self {
            operator,
            settings: settings.clone(),
        })
    }

    fn map_err(key: &str, e: opendal::Error) -> StorageError {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Backend(e.to_string())
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectBackend {
    #[instrument(skip(self, data), fields(backend = "object"))]
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.operator
            .write(key, data)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_err(key, e))?;
        debug!(key = key, "object stored");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "object"))]
    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let buffer = self
            .operator
            .read(key)
            .await
            .map_err(|e| Self::map_err(key, e))?;
        Ok(buffer.to_bytes())
    }

    #[instrument(skip(self), fields(backend = "object"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        // OpenDAL's delete already succeeds for absent keys.
        self.operator
            .delete(key)
            .await
            .map_err(|e| Self::map_err(key, e))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.operator.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    fn public_locator(&self, key: &str) -> String {
        if let Some(cdn) = &self.settings.cdn_host {
            return format!("https://{}/{}", cdn.trim_end_matches('/'), key);
        }
        if let Some(endpoint) = &self.settings.endpoint {
            return format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.settings.bucket,
                key
            );
        }
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.settings.bucket, self.settings.region, key
        )
    }

    fn name(&self) -> &'static str {
        "object"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ObjectStoreSettings {
        ObjectStoreSettings {
            bucket: "attachments".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
            cdn_host: None,
        }
    }

    #[test]
    fn locator_defaults_to_virtual_hosted_url() {
        let backend = ObjectBackend::new(&settings()).unwrap();
        assert_eq!(
            backend.public_locator("7/photo.jpg"),
            "https://attachments.s3.us-east-1.amazonaws.com/7/photo.jpg"
        );
    }

    #[test]
    fn locator_uses_endpoint_when_configured() {
        let mut s = settings();
        s.endpoint = Some("http://localhost:9000".to_string());
        let backend = ObjectBackend::new(&s).unwrap();
        assert_eq!(
            backend.public_locator("7/photo.jpg"),
            "http://localhost:9000/attachments/7/photo.jpg"
        );
    }

    #[test]
    fn locator_prefers_cdn_host() {
        let mut s = settings();
        s.endpoint = Some("http://localhost:9000".to_string());
        s.cdn_host = Some("cdn.example.com".to_string());
        let backend = ObjectBackend::new(&s).unwrap();
        assert_eq!(
            backend.public_locator("7/photo.jpg"),
            "https://cdn.example.com/7/photo.jpg"
        );
    }
}
