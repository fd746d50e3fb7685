//! Backend storing one record file per artifact under a configured directory

use super::records::RecordDirectory;
use super::{require_store_name, Backend, BackendKind, Lifecycle, DEFAULT_STORE_NAME};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::types::Artifact;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Stores artifacts as files in `<root>/<store name>`.
pub struct FileBackend {
    store_name: String,
    records: RecordDirectory,
    lifecycle: Lifecycle,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>, store_name: impl Into<String>) -> Self {
        let store_name = store_name.into();
        let path = root.into().join(&store_name);
        Self {
            store_name,
            records: RecordDirectory::new(path, Arc::new(SystemClock)),
            lifecycle: Lifecycle::default(),
        }
    }

    /// A backend using the default store name under `root`.
    pub fn in_root(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_STORE_NAME)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.records.set_clock(clock);
        self
    }

    /// The namespace directory.
    pub fn directory(&self) -> &Path {
        self.records.path()
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
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
        info!(directory = ?self.records.path(), "File store initialized");
        Ok(())
    }

    async fn add_or_update(&self, artifact: &Artifact) -> Result<()> {
        self.lifecycle.ensure_ready()?;
        self.records.write(artifact).await
    }

    async fn get(&self, key: &str) -> Result<Option<Artifact>> {
        self.lifecycle.ensure_ready()?;
        self.records.read(key).await
    }

    async fn get_all(&self) -> Result<Vec<Artifact>> {
        self.lifecycle.ensure_ready()?;
        self.records.read_all().await
    }

    async fn count(&self) -> Result<usize> {
        self.lifecycle.ensure_ready()?;
        self.records.count().await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lifecycle.ensure_ready()?;
        self.records.delete(key).await
    }

    async fn empty(&self) -> Result<()> {
        self.lifecycle.ensure_ready()?;
        self.records.destroy().await?;
        self.records.create().await?;
        info!(directory = ?self.records.path(), "File store emptied");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.lifecycle.ensure_ready()?;
        self.records.destroy().await?;
        self.lifecycle.mark_uninitialized();
        info!(directory = ?self.records.path(), "File store removed");
        Ok(())
    }

    async fn scavenge(&self, threshold: Duration) -> Result<usize> {
        self.lifecycle.ensure_ready()?;
        self.records.scavenge(threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::types::Longevity;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn artifact(key: &str, contents: &str) -> Artifact {
        Artifact::new(key, contents, "text/javascript")
    }

    #[tokio::test]
    async fn test_operations_fail_before_init() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());

        assert!(matches!(
            backend.add_or_update(&artifact("a.js", "1")).await,
            Err(StoreError::NotInitialized)
        ));
        assert!(matches!(backend.get("a.js").await, Err(StoreError::NotInitialized)));
        assert!(matches!(backend.get_all().await, Err(StoreError::NotInitialized)));
        assert!(matches!(backend.delete("a.js").await, Err(StoreError::NotInitialized)));
        assert!(matches!(backend.empty().await, Err(StoreError::NotInitialized)));
        assert!(matches!(backend.remove().await, Err(StoreError::NotInitialized)));
        assert!(matches!(
            backend.scavenge(Duration::from_secs(1)).await,
            Err(StoreError::NotInitialized)
        ));

        backend.init().await.unwrap();
        assert!(backend.get("a.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_init_requires_store_name() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path(), "");
        assert!(matches!(
            backend.init().await,
            Err(StoreError::ConfigurationMissing(_))
        ));
        assert!(!backend.is_ready());
    }

    #[tokio::test]
    async fn test_init_creates_directory() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path(), "scripts");
        backend.init().await.unwrap();
        assert!(dir.path().join("scripts").is_dir());
        assert_eq!(backend.directory(), dir.path().join("scripts"));
    }

    #[tokio::test]
    async fn test_round_trip_preserves_all_fields() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());
        backend.init().await.unwrap();

        let stored = artifact("bundle.js", "console.log('hi');")
            .with_longevity(Longevity::SingleUse)
            .with_cache_for(Duration::from_secs(86_400 + 2 * 3600 + 3 * 60 + 4));
        backend.add_or_update(&stored).await.unwrap();

        assert_eq!(backend.get("bundle.js").await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_record() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());
        backend.init().await.unwrap();

        backend.add_or_update(&artifact("a.js", "old")).await.unwrap();
        backend.add_or_update(&artifact("a.js", "new")).await.unwrap();

        let all = backend.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].contents, b"new");
    }

    #[tokio::test]
    async fn test_key_with_query_string() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());
        backend.init().await.unwrap();

        backend
            .add_or_update(&artifact("bundle.js?h=abc", "x"))
            .await
            .unwrap();

        assert!(backend.directory().join("bundle.jsh=abc").is_file());
        let found = backend.get("bundle.js?h=abc").await.unwrap().unwrap();
        assert_eq!(found.key, "bundle.js?h=abc");
    }

    #[tokio::test]
    async fn test_unsafe_key_is_rejected() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());
        backend.init().await.unwrap();

        assert!(matches!(
            backend.add_or_update(&artifact("../escape.js", "x")).await,
            Err(StoreError::InvalidName(_))
        ));
        assert!(!dir.path().join("escape.js").exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());
        backend.init().await.unwrap();

        backend.delete("missing.js").await.unwrap();
        backend.add_or_update(&artifact("a.js", "1")).await.unwrap();
        backend.delete("a.js").await.unwrap();
        backend.delete("a.js").await.unwrap();
        assert!(backend.get("a.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_keeps_store_ready() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());
        backend.init().await.unwrap();
        backend.add_or_update(&artifact("a.js", "1")).await.unwrap();
        backend.add_or_update(&artifact("b.js", "2")).await.unwrap();

        backend.empty().await.unwrap();

        assert!(backend.is_ready());
        assert!(backend.get_all().await.unwrap().is_empty());
        backend.add_or_update(&artifact("c.js", "3")).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_then_init() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());
        backend.init().await.unwrap();
        backend.add_or_update(&artifact("a.js", "1")).await.unwrap();

        backend.remove().await.unwrap();
        assert!(!backend.directory().exists());
        assert!(matches!(backend.get("a.js").await, Err(StoreError::NotInitialized)));

        backend.init().await.unwrap();
        assert!(backend.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scavenge_removes_only_expired() {
        let dir = tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let backend = FileBackend::in_root(dir.path()).with_clock(clock.clone());
        backend.init().await.unwrap();

        // t0 and t1 fall outside the threshold at sweep time, t2 inside it
        backend.add_or_update(&artifact("t0.js", "0")).await.unwrap();
        clock.advance(Duration::from_secs(10 * 60));
        backend.add_or_update(&artifact("t1.js", "1")).await.unwrap();
        clock.advance(Duration::from_secs(40 * 60));
        backend.add_or_update(&artifact("t2.js", "2")).await.unwrap();
        clock.advance(Duration::from_secs(20 * 60));

        let removed = backend.scavenge(Duration::from_secs(30 * 60)).await.unwrap();
        assert_eq!(removed, 2);

        let mut keys: Vec<String> = backend
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["t2.js".to_string()]);
    }

    #[tokio::test]
    async fn test_overwrite_resets_age() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = FileBackend::in_root(dir.path()).with_clock(clock.clone());
        backend.init().await.unwrap();

        backend.add_or_update(&artifact("a.js", "1")).await.unwrap();
        clock.advance(Duration::from_secs(7200));
        backend.add_or_update(&artifact("a.js", "2")).await.unwrap();

        assert_eq!(backend.scavenge(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(backend.get("a.js").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_writes_never_corrupt() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(FileBackend::in_root(dir.path()));
        backend.init().await.unwrap();

        let writers = (0..16).map(|i| {
            let backend = backend.clone();
            tokio::spawn(async move {
                let contents = format!("{}", i).repeat(4096);
                backend.add_or_update(&artifact("hot.js", &contents)).await
            })
        });
        for result in futures::future::join_all(writers).await {
            result.unwrap().unwrap();
        }

        let stored = backend.get("hot.js").await.unwrap().unwrap();
        let text = String::from_utf8(stored.contents).unwrap();
        assert_eq!(text.len() % 4096, 0);
        let first = &text[..text.len() / 4096];
        assert_eq!(text, first.repeat(4096));
    }

    #[tokio::test]
    async fn test_count_lists_records_only() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::in_root(dir.path());
        assert!(matches!(backend.count().await, Err(StoreError::NotInitialized)));

        backend.init().await.unwrap();
        backend.add_or_update(&artifact("a.js", "1")).await.unwrap();
        backend.add_or_update(&artifact("b.js", "2")).await.unwrap();
        std::fs::write(backend.directory().join(".c.js.1-0.tmp"), b"partial").unwrap();

        assert_eq!(backend.count().await.unwrap(), 2);
    }
}
