//! Database-backed store delegating persistence to a provider
//!
//! The backend only enforces the lifecycle and forwards calls. Table layout,
//! timestamps and the scavenging query belong to the [`DbStoreProvider`].

use super::{require_store_name, Backend, BackendKind, Lifecycle, DEFAULT_STORE_NAME};
use crate::error::{Result, StoreError};
use crate::types::{record_name, Artifact};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Physical persistence for [`DatabaseBackend`].
///
/// `store` is the table (or collection) name; `id` is the record name derived
/// from the artifact key.
#[async_trait]
pub trait DbStoreProvider: Send + Sync {
    /// Create the table for `store` if it does not exist.
    async fn init(&self, store: &str) -> Result<()>;

    async fn add_or_update(&self, store: &str, id: &str, artifact: &Artifact) -> Result<()>;

    async fn get(&self, store: &str, id: &str) -> Result<Option<Artifact>>;

    async fn get_all(&self, store: &str) -> Result<Vec<Artifact>>;

    async fn delete(&self, store: &str, id: &str) -> Result<()>;

    /// Drop the table for `store` entirely.
    async fn delete_store(&self, store: &str) -> Result<()>;

    /// Delete rows older than `threshold`, returning how many went.
    async fn scavenge(&self, store: &str, threshold: Duration) -> Result<usize>;
}

/// Store whose records live in a database table.
pub struct DatabaseBackend {
    store_name: String,
    provider: Option<Arc<dyn DbStoreProvider>>,
    lifecycle: Lifecycle,
}

impl DatabaseBackend {
    /// Table names are lower-cased.
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into().to_lowercase(),
            provider: None,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn DbStoreProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn set_provider(&mut self, provider: Arc<dyn DbStoreProvider>) {
        self.provider = Some(provider);
    }

    fn provider(&self) -> Result<&Arc<dyn DbStoreProvider>> {
        self.provider.as_ref().ok_or_else(|| {
            StoreError::ConfigurationMissing(
                "no database provider has been configured on the database store".to_string(),
            )
        })
    }

    fn ready_provider(&self) -> Result<&Arc<dyn DbStoreProvider>> {
        self.lifecycle.ensure_ready()?;
        self.provider()
    }
}

impl Default for DatabaseBackend {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_NAME)
    }
}

#[async_trait]
impl Backend for DatabaseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Database
    }

    fn store_name(&self) -> &str {
        &self.store_name
    }

    fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    async fn init(&self) -> Result<()> {
        let provider = self.provider()?;
        require_store_name(&self.store_name)?;
        provider.init(&self.store_name).await?;
        self.lifecycle.mark_ready();
        info!(table = %self.store_name, "Database store initialized");
        Ok(())
    }

    async fn add_or_update(&self, artifact: &Artifact) -> Result<()> {
        let provider = self.ready_provider()?;
        let id = record_name(&artifact.key)?;
        provider.add_or_update(&self.store_name, &id, artifact).await
    }

    async fn get(&self, key: &str) -> Result<Option<Artifact>> {
        let provider = self.ready_provider()?;
        let id = record_name(key)?;
        provider.get(&self.store_name, &id).await
    }

    async fn get_all(&self) -> Result<Vec<Artifact>> {
        let provider = self.ready_provider()?;
        provider.get_all(&self.store_name).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let provider = self.ready_provider()?;
        let id = record_name(key)?;
        provider.delete(&self.store_name, &id).await
    }

    async fn empty(&self) -> Result<()> {
        let provider = self.ready_provider()?;
        provider.delete_store(&self.store_name).await?;
        provider.init(&self.store_name).await?;
        info!(table = %self.store_name, "Database store emptied");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        let provider = self.ready_provider()?;
        provider.delete_store(&self.store_name).await?;
        self.lifecycle.mark_uninitialized();
        info!(table = %self.store_name, "Database store removed");
        Ok(())
    }

    async fn scavenge(&self, threshold: Duration) -> Result<usize> {
        let provider = self.ready_provider()?;
        provider.scavenge(&self.store_name, threshold).await
    }
}

/// How a database provider finds its connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbConnectionSettings {
    /// Full connection string. Takes priority over the name.
    pub connection_string: Option<String>,
    /// Name of a connection string defined elsewhere.
    pub connection_string_name: Option<String>,
    /// Database name, only needed if it differs from or is absent in the
    /// connection string.
    pub db_name: Option<String>,
}

impl DbConnectionSettings {
    /// Resolve the final connection string. `lookup` maps a connection string
    /// name to its value.
    pub fn resolve<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let connection_string = if let Some(explicit) = non_blank(&self.connection_string) {
            explicit
        } else if let Some(name) = non_blank(&self.connection_string_name) {
            lookup(&name)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    StoreError::ConfigurationMissing(format!(
                        "connection string '{}' is not defined",
                        name
                    ))
                })?
        } else {
            return Err(StoreError::ConfigurationMissing(
                "either a connection string or a connection string name is required".to_string(),
            ));
        };

        match non_blank(&self.db_name) {
            Some(db_name) => {
                let mut url = url::Url::parse(&connection_string).map_err(|e| {
                    StoreError::UnableToCreateStore(format!("invalid connection string: {}", e))
                })?;
                url.set_path(&format!("/{}", db_name));
                Ok(url.to_string())
            }
            None => Ok(connection_string),
        }
    }
}
