//! Backend-agnostic façade over a single storage backend

use crate::backend::{Backend, BackendKind, DatabaseBackend, DbStoreProvider};
use crate::error::Result;
use crate::types::Artifact;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The handle producers, the retrieval protocol and the scavenger share.
///
/// Cloning is cheap; clones refer to the same backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
}

impl Store {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// A database store with its provider wired in before first use.
    pub fn database(store_name: impl Into<String>, provider: Arc<dyn DbStoreProvider>) -> Self {
        Self::new(DatabaseBackend::new(store_name).with_provider(provider))
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn store_name(&self) -> &str {
        self.backend.store_name()
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_ready()
    }

    pub async fn init(&self) -> Result<()> {
        self.backend.init().await
    }

    /// Initialize, then empty the namespace if asked to.
    pub async fn init_for_startup(&self, empty_on_startup: bool) -> Result<()> {
        self.backend.init().await?;
        if empty_on_startup {
            self.backend.empty().await?;
        }
        info!(
            backend = %self.kind(),
            store = %self.store_name(),
            emptied = empty_on_startup,
            "Store ready"
        );
        Ok(())
    }

    pub async fn add_or_update(&self, artifact: &Artifact) -> Result<()> {
        self.backend.add_or_update(artifact).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Artifact>> {
        self.backend.get(key).await
    }

    pub async fn get_all(&self) -> Result<Vec<Artifact>> {
        self.backend.get_all().await
    }

    pub async fn count(&self) -> Result<usize> {
        self.backend.count().await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    pub async fn empty(&self) -> Result<()> {
        self.backend.empty().await
    }

    pub async fn remove(&self) -> Result<()> {
        self.backend.remove().await
    }

    /// `remove` followed by `init`.
    pub async fn reinit(&self) -> Result<()> {
        self.backend.remove().await?;
        self.backend.init().await
    }

    pub async fn scavenge(&self, threshold: Duration) -> Result<usize> {
        self.backend.scavenge(threshold).await
    }
}
