//! Backend keeping records in a per-user, per-application container
//!
//! The container lives under the user's local data directory and is scoped by
//! an application and a domain segment, so two services on the same machine
//! never share a namespace unless they are configured to.

use super::records::RecordDirectory;
use super::{require_store_name, Backend, BackendKind, Lifecycle};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreError};
use crate::types::Artifact;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CONTAINER_DIR: &str = "isolated";

/// Identity a sandboxed container is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxScope {
    pub application: String,
    pub domain: String,
}

impl SandboxScope {
    pub fn new(application: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            domain: domain.into(),
        }
    }

    fn relative_path(&self) -> PathBuf {
        PathBuf::from(CONTAINER_DIR)
            .join(sanitize_segment(&self.application))
            .join(sanitize_segment(&self.domain))
    }
}

impl Default for SandboxScope {
    fn default() -> Self {
        Self::new("external-file", "default")
    }
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Stores artifacts inside a sandboxed container.
pub struct SandboxedBackend {
    store_name: String,
    scope: SandboxScope,
    records: RecordDirectory,
    lifecycle: Lifecycle,
}

impl SandboxedBackend {
    /// Container rooted in the current user's local data directory.
    pub fn new(scope: SandboxScope, store_name: impl Into<String>) -> Result<Self> {
        let base = dirs::data_local_dir().ok_or_else(|| {
            StoreError::UnableToCreateStore(
                "no per-user data directory is available on this platform".to_string(),
            )
        })?;
        Ok(Self::with_base(base, scope, store_name))
    }

    /// Container rooted under an explicit base directory.
    pub fn with_base(
        base: impl Into<PathBuf>,
        scope: SandboxScope,
        store_name: impl Into<String>,
    ) -> Self {
        let store_name = store_name.into();
        let path = base
            .into()
            .join(scope.relative_path())
            .join(sanitize_segment(&store_name));
        Self {
            store_name,
            scope,
            records: RecordDirectory::new(path, Arc::new(SystemClock)),
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.records.set_clock(clock);
        self
    }

    pub fn scope(&self) -> &SandboxScope {
        &self.scope
    }

    pub fn container(&self) -> &Path {
        self.records.path()
    }

    async fn ensure_usable(&self) -> Result<()> {
        self.lifecycle.ensure_ready()?;
        if !self.records.exists().await {
            return Err(StoreError::StorageDirectoryMissing(
                self.records.path().to_path_buf(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for SandboxedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sandboxed
    }

    fn store_name(&self) -> &str {
        &self.store_name
    }

    fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    async fn init(&self) -> Result<()> {
        require_store_name(&self.store_name)?;
        self.records.create().await?;
        self.lifecycle.mark_ready();
        info!(container = ?self.records.path(), "Sandboxed store initialized");
        Ok(())
    }

    async fn add_or_update(&self, artifact: &Artifact) -> Result<()> {
        self.ensure_usable().await?;
        self.records.write(artifact).await
    }

    async fn get(&self, key: &str) -> Result<Option<Artifact>> {
        self.ensure_usable().await?;
        self.records.read(key).await
    }

    async fn get_all(&self) -> Result<Vec<Artifact>> {
        self.ensure_usable().await?;
        self.records.read_all().await
    }

    async fn count(&self) -> Result<usize> {
        self.ensure_usable().await?;
        self.records.count().await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_usable().await?;
        self.records.delete(key).await
    }

    async fn empty(&self) -> Result<()> {
        self.lifecycle.ensure_ready()?;
        self.records.destroy().await?;
        self.records.create().await?;
        info!(container = ?self.records.path(), "Sandboxed store emptied");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.lifecycle.ensure_ready()?;
        // a container that is already gone needs no cleanup
        if self.records.exists().await {
            self.records.destroy().await?;
        }
        self.lifecycle.mark_uninitialized();
        info!(container = ?self.records.path(), "Sandboxed store removed");
        Ok(())
    }

    async fn scavenge(&self, threshold: Duration) -> Result<usize> {
        self.ensure_usable().await?;
        self.records.scavenge(threshold).await
    }
}
