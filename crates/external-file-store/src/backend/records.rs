//! Flat directory of serialized artifact records
//!
//! Shared by the file and sandboxed backends. One JSON record per key lives
//! directly inside the namespace directory; there are never subdirectories
//! and listing/scavenging do not recurse. Writes go to a dot-prefixed
//! temporary file that is renamed over the target, so readers see either the
//! old record or the new one.

use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::types::{record_name, Artifact, ArtifactRecord};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) struct RecordDirectory {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl RecordDirectory {
    pub(crate) fn new(path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self { path, clock }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub(crate) async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory and verify it is there afterwards.
    pub(crate) async fn create(&self) -> Result<()> {
        if let Err(e) = fs::create_dir_all(&self.path).await {
            warn!(path = ?self.path, error = %e, "Failed to create storage directory");
        }
        if !self.exists().await {
            return Err(StoreError::StorageDirectoryCreationFailed(self.path.clone()));
        }
        Ok(())
    }

    /// Delete the directory and everything in it. A missing directory is fine.
    pub(crate) async fn destroy(&self) -> Result<()> {
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn write(&self, artifact: &Artifact) -> Result<()> {
        let name = record_name(&artifact.key)?;
        let record = ArtifactRecord::from_artifact(artifact, self.clock.now());
        let bytes = record.to_json()?;

        let temp = self.path.join(format!(
            ".{}.{}-{}.tmp",
            name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let target = self.path.join(&name);

        replace_file(&temp, &target, &bytes).await?;

        debug!(key = %artifact.key, size = bytes.len(), "Stored record");
        Ok(())
    }

    pub(crate) async fn read(&self, key: &str) -> Result<Option<Artifact>> {
        let name = record_name(key)?;
        match self.read_record(&self.path.join(name)).await? {
            Some(record) => Ok(Some(record.into_artifact()?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn read_all(&self) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        for path in self.record_paths().await? {
            let artifact = self
                .read_record(&path)
                .await
                .and_then(|r| r.map(ArtifactRecord::into_artifact).transpose());
            match artifact {
                Ok(Some(artifact)) => artifacts.push(artifact),
                // deleted between listing and reading
                Ok(None) => {}
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable record"),
            }
        }
        Ok(artifacts)
    }

    /// Number of record files, without reading them.
    pub(crate) async fn count(&self) -> Result<usize> {
        Ok(self.record_paths().await?.len())
    }

    pub(crate) async fn delete(&self, key: &str) -> Result<()> {
        let name = record_name(key)?;
        match fs::remove_file(self.path.join(name)).await {
            Ok(()) => {
                debug!(key = %key, "Deleted record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove records whose age is strictly greater than `threshold`.
    ///
    /// Records that disappear mid-sweep are skipped. Temp files left behind
    /// by interrupted writes are removed once they are older than `threshold`
    /// but are not counted.
    pub(crate) async fn scavenge(&self, threshold: Duration) -> Result<usize> {
        let now = self.clock.now();
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        let mut removed = 0;

        for path in self.temp_paths().await? {
            let Some(modified) = file_time(&path).await else {
                continue;
            };
            if now.signed_duration_since(modified) <= threshold {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = ?path, "Removed stale temp file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?path, error = %e, "Failed to remove stale temp file"),
            }
        }

        for path in self.record_paths().await? {
            let Some(created_at) = self.created_at(&path).await else {
                continue;
            };
            if now.signed_duration_since(created_at) <= threshold {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    debug!(path = ?path, created_at = %created_at, "Scavenged record");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }

    async fn read_record(&self, path: &Path) -> Result<Option<ArtifactRecord>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(ArtifactRecord::from_json(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // The write time stored in the record, or the file's own timestamps for
    // records written without one. None if the file vanished.
    async fn created_at(&self, path: &Path) -> Option<DateTime<Utc>> {
        match self.read_record(path).await {
            Ok(Some(record)) => {
                if let Some(at) = record.created_at {
                    return Some(at);
                }
            }
            Ok(None) => return None,
            Err(e) => warn!(path = ?path, error = %e, "Unreadable record, using file time"),
        }

        file_time(path).await
    }

    async fn record_paths(&self) -> Result<Vec<PathBuf>> {
        self.files_where(|name| !name.starts_with('.')).await
    }

    async fn temp_paths(&self) -> Result<Vec<PathBuf>> {
        self.files_where(|name| name.starts_with('.') && name.ends_with(".tmp")).await
    }

    // Regular files directly inside the directory whose name passes `keep`.
    async fn files_where(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut paths = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !keep(&entry.file_name().to_string_lossy()) {
                continue;
            }
            match entry.file_type().await {
                Ok(t) if t.is_file() => paths.push(entry.path()),
                _ => {}
            }
        }

        Ok(paths)
    }
}

// Write `bytes` to `temp` and rename it over `target`. The temp file is
// removed if either step fails.
async fn replace_file(temp: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let result = match fs::write(temp, bytes).await {
        Ok(()) => fs::rename(temp, target).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(temp).await {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!(path = ?temp, error = %cleanup, "Failed to remove temp file");
            }
        }
        return Err(e.into());
    }
    Ok(())
}

// Creation time where the platform records it, modification time otherwise.
async fn file_time(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = fs::metadata(path).await.ok()?;
    let time = metadata.created().or_else(|_| metadata.modified()).ok()?;
    Some(DateTime::<Utc>::from(time))
}
