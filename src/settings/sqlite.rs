use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, warn};

use super::{Confidence, SettingsStore, CONFIDENCE_KEY};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed settings store
#[derive(Clone)]
pub struct SqliteSettings {
    pool: SqlitePool,
}

impl SqliteSettings {
    /// Create a new SQLite settings store
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        let database_url = if config.path.as_os_str() == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            // Ensure parent directory exists
            if let Some(parent) = config.path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                    message: format!("Failed to create database directory: {}", e),
                })?;
            }
            format!("sqlite://{}?mode=rwc", config.path.display())
        };

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SettingsStore for SqliteSettings {
    async fn confidence(&self) -> StorageResult<Confidence> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT value FROM settings WHERE key = ?
            "#,
        )
        .bind(CONFIDENCE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let Some((raw,)) = row else {
            return Ok(Confidence::default());
        };

        // Corrupt stored values fall back to the default, matching reads
        // with no stored value at all
        match raw.parse::<f64>().ok().and_then(|v| Confidence::new(v).ok()) {
            Some(confidence) => Ok(confidence),
            None => {
                warn!(value = %raw, "Stored confidence is invalid, using default");
                Ok(Confidence::default())
            }
        }
    }

    async fn set_confidence(&self, value: Confidence) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(CONFIDENCE_KEY)
        .bind(value.value().to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(confidence = value.value(), "Confidence threshold updated");
        Ok(())
    }
}
