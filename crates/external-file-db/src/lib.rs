//! PostgreSQL provider for the database-backed external file store
//!
//! Each store name maps to one table holding one row per record name. The
//! write time is kept in `created_at` and reset on every overwrite, which is
//! what scavenging measures age against.

mod rows;

pub use rows::ArtifactRow;
pub use sqlx::postgres::PgPool;

use async_trait::async_trait;
use external_file_store::time_span::format_time_span;
use external_file_store::{Artifact, DbConnectionSettings, DbStoreProvider, Result, StoreError};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::{debug, info};

/// Longest identifier PostgreSQL keeps without truncating.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Check that `name` can be spliced into SQL as a table name.
///
/// Table names cannot be bound as parameters, so only lower-case ASCII
/// letters, digits and underscores are accepted, starting with a letter or
/// underscore.
pub fn validate_table_name(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid_start && valid_rest && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(name)
    } else {
        Err(StoreError::InvalidName(format!(
            "'{}' is not a valid table name",
            name
        )))
    }
}

/// [`DbStoreProvider`] backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStoreProvider {
    pool: PgPool,
}

impl PgStoreProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::UnableToCreateStore(e.to_string()))?;
        info!("Database connection established");
        Ok(Self { pool })
    }

    /// Resolve `settings` against the process environment and connect.
    pub async fn from_settings(settings: &DbConnectionSettings) -> Result<Self> {
        let url = settings.resolve(|name| std::env::var(name).ok())?;
        Self::connect(&url).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DbStoreProvider for PgStoreProvider {
    async fn init(&self, store: &str) -> Result<()> {
        let table = validate_table_name(store)?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                key TEXT NOT NULL,
                content_type TEXT NOT NULL,
                contents BYTEA NOT NULL,
                longevity TEXT NOT NULL,
                cache_for_time_period TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ))
        .execute(&self.pool)
        .await
        .map_err(StoreError::provider)?;

        info!(table = %table, "Ensured artifact table");
        Ok(())
    }

    async fn add_or_update(&self, store: &str, id: &str, artifact: &Artifact) -> Result<()> {
        let table = validate_table_name(store)?;
        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (id, key, content_type, contents, longevity, cache_for_time_period, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (id) DO UPDATE SET
                key = EXCLUDED.key,
                content_type = EXCLUDED.content_type,
                contents = EXCLUDED.contents,
                longevity = EXCLUDED.longevity,
                cache_for_time_period = EXCLUDED.cache_for_time_period,
                created_at = NOW()
            "#
        ))
        .bind(id)
        .bind(&artifact.key)
        .bind(&artifact.content_type)
        .bind(&artifact.contents)
        .bind(artifact.longevity.to_string())
        .bind(format_time_span(artifact.cache_for))
        .execute(&self.pool)
        .await
        .map_err(StoreError::provider)?;

        debug!(table = %table, id = %id, "Upserted artifact row");
        Ok(())
    }

    async fn get(&self, store: &str, id: &str) -> Result<Option<Artifact>> {
        let table = validate_table_name(store)?;
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT key, content_type, contents, longevity, cache_for_time_period, created_at FROM {table} WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::provider)?;

        row.map(ArtifactRow::into_artifact).transpose()
    }

    async fn get_all(&self, store: &str) -> Result<Vec<Artifact>> {
        let table = validate_table_name(store)?;
        let rows = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT key, content_type, contents, longevity, cache_for_time_period, created_at FROM {table} ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::provider)?;

        rows.into_iter().map(ArtifactRow::into_artifact).collect()
    }

    async fn delete(&self, store: &str, id: &str) -> Result<()> {
        let table = validate_table_name(store)?;
        sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::provider)?;
        Ok(())
    }

    async fn delete_store(&self, store: &str) -> Result<()> {
        let table = validate_table_name(store)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&self.pool)
            .await
            .map_err(StoreError::provider)?;

        info!(table = %table, "Dropped artifact table");
        Ok(())
    }

    async fn scavenge(&self, store: &str, threshold: Duration) -> Result<usize> {
        let table = validate_table_name(store)?;
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE created_at < NOW() - make_interval(secs => $1)"
        ))
        .bind(threshold.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(StoreError::provider)?;

        Ok(result.rows_affected() as usize)
    }
}
