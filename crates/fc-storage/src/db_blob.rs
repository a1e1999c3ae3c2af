//! Database blob backend.
//!
//! Stores attachment bytes in a single blob table, for deployments that
//! keep everything inside the database.

use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use fc_core::config::DbBlobSettings;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::backend::{StorageBackend, StorageError, StorageResult};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS attachment_blobs (
    storage_key TEXT PRIMARY KEY,
    data        BLOB NOT NULL,
    byte_size   INTEGER NOT NULL,
    updated_at  TEXT NOT NULL
)";

/// Blob-table storage.
#[derive(Debug)]
pub struct DbBlobBackend {
    pool: SqlitePool,
    base_url: String,
}

impl DbBlobBackend {
    /// Connect and ensure the blob table exists.
    pub async fn connect(settings: &DbBlobSettings) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .map_err(Self::db_err)?
            .create_if_missing(true);

        // An in-memory database lives and dies with its one connection.
        let max_connections = if settings.url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(Self::db_err)?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(Self::db_err)?;

        info!(url = %settings.url, "blob storage initialized");

        Ok(Self {
            pool,
            base_url: settings.base_url.clone(),
        })
    }

    fn db_err(e: impl std::fmt::Display) -> StorageError {
        StorageError::Backend(e.to_string())
    }
}

#[async_trait]
impl StorageBackend for DbBlobBackend {
    #[instrument(skip(self, data), fields(backend = "db"))]
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO attachment_blobs (storage_key, data, byte_size, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(storage_key) DO UPDATE SET
                 data = excluded.data,
                 byte_size = excluded.byte_size,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(data.as_ref())
        .bind(data.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;

        debug!(key = key, size = data.len(), "blob stored");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "db"))]
    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let row: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM attachment_blobs WHERE storage_key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::db_err)?;

        row.map(Bytes::from)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    #[instrument(skip(self), fields(backend = "db"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM attachment_blobs WHERE storage_key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let row: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM attachment_blobs WHERE storage_key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::db_err)?;
        Ok(row.is_some())
    }

    fn public_locator(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    fn name(&self) -> &'static str {
        "db"
    }
}
