//! Storage backends
//!
//! Every backend implements the same capability set over one physical
//! substrate and follows the same lifecycle: `Uninitialized --init()--> Ready`.
//! Everything except `init` fails with [`StoreError::NotInitialized`] until
//! `init` succeeds, and `remove` returns the backend to `Uninitialized`.
//!
//! Administrative calls (`empty`, `remove`) are not serialized against
//! concurrent reads and writes; a reader racing them may briefly observe a
//! partially emptied namespace.
//!
//! Scavenging is not serialized against writes either. A record rewritten
//! between the sweep reading its age and deleting it is deleted with the
//! stale age, so an `add_or_update` racing a sweep can be lost.

mod database;
mod file;
mod memory_provider;
mod records;
mod sandboxed;

pub use database::{DatabaseBackend, DbConnectionSettings, DbStoreProvider};
pub use file::FileBackend;
pub use memory_provider::MemoryDbProvider;
pub use sandboxed::{SandboxScope, SandboxedBackend};

use crate::error::{Result, StoreError};
use crate::types::Artifact;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default namespace name shared by all backends.
pub const DEFAULT_STORE_NAME: &str = "external_files";

/// The physical substrate behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    File,
    Sandboxed,
    Database,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::File => write!(f, "file"),
            BackendKind::Sandboxed => write!(f, "sandboxed"),
            BackendKind::Database => write!(f, "database"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "sandboxed" | "isolated" => Ok(BackendKind::Sandboxed),
            "database" | "db" => Ok(BackendKind::Database),
            other => Err(StoreError::ConfigurationMissing(format!(
                "unknown backend type '{}'",
                other
            ))),
        }
    }
}

/// Create/read/update/delete/list/purge over one namespace.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Name of the namespace (directory or table).
    fn store_name(&self) -> &str;

    fn is_ready(&self) -> bool;

    /// Create the namespace if absent and mark the backend ready.
    async fn init(&self) -> Result<()>;

    /// Store `artifact`, replacing any record with the same key.
    async fn add_or_update(&self, artifact: &Artifact) -> Result<()>;

    /// Look up an artifact. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Artifact>>;

    async fn get_all(&self) -> Result<Vec<Artifact>>;

    /// Number of stored artifacts.
    async fn count(&self) -> Result<usize> {
        Ok(self.get_all().await?.len())
    }

    /// Delete a single artifact. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Drop every artifact but keep the namespace ready.
    async fn empty(&self) -> Result<()>;

    /// Destroy the namespace. The backend must be initialized again before use.
    async fn remove(&self) -> Result<()>;

    /// Delete every artifact older than `threshold`, returning how many went.
    async fn scavenge(&self, threshold: Duration) -> Result<usize>;
}

/// Ready flag shared by the backend implementations.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    ready: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub(crate) fn mark_uninitialized(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

pub(crate) fn require_store_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::ConfigurationMissing(
            "the store name must be specified".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("file".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!(
            "Sandboxed".parse::<BackendKind>().unwrap(),
            BackendKind::Sandboxed
        );
        assert_eq!(
            "isolated".parse::<BackendKind>().unwrap(),
            BackendKind::Sandboxed
        );
        assert_eq!(
            " database ".parse::<BackendKind>().unwrap(),
            BackendKind::Database
        );
        assert!("s3".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_display_round_trips() {
        for kind in [BackendKind::File, BackendKind::Sandboxed, BackendKind::Database] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::default();
        assert!(matches!(
            lifecycle.ensure_ready(),
            Err(StoreError::NotInitialized)
        ));
        lifecycle.mark_ready();
        assert!(lifecycle.ensure_ready().is_ok());
        lifecycle.mark_uninitialized();
        assert!(!lifecycle.is_ready());
    }

    #[test]
    fn test_require_store_name() {
        assert!(require_store_name("files").is_ok());
        assert!(matches!(
            require_store_name("  "),
            Err(StoreError::ConfigurationMissing(_))
        ));
    }
}
