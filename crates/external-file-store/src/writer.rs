//! Producer-side helper: name some content, store it, hand back its URL

use crate::error::Result;
use crate::naming::NamingStrategy;
use crate::store::Store;
use crate::types::{Artifact, Longevity};
use std::time::Duration;
use tracing::debug;

/// URL prefix of the retrieval route, with leading and trailing slashes.
pub const DEFAULT_HANDLER_PATH: &str = "/files/";

/// Writes generated content to a store and returns the URL it is served at.
///
/// Defaults suit emitted script bundles: `text/javascript`, `.js`, single use,
/// uncached and made unique by content hash.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    content_type: String,
    naming: NamingStrategy,
    longevity: Longevity,
    cache_for: Duration,
    handler_path: String,
}

impl ArtifactWriter {
    pub fn new() -> Self {
        Self {
            content_type: "text/javascript".to_string(),
            naming: NamingStrategy::default(),
            longevity: Longevity::SingleUse,
            cache_for: Duration::ZERO,
            handler_path: DEFAULT_HANDLER_PATH.to_string(),
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// `None` or an empty string leaves names without an extension.
    pub fn extension(mut self, extension: Option<&str>) -> Self {
        self.naming = NamingStrategy::new(extension, self.naming.make_unique());
        self
    }

    pub fn make_unique(mut self, make_unique: bool) -> Self {
        self.naming = NamingStrategy::new(self.naming.extension(), make_unique);
        self
    }

    pub fn longevity(mut self, longevity: Longevity) -> Self {
        self.longevity = longevity;
        self
    }

    pub fn cache_for(mut self, period: Duration) -> Self {
        self.cache_for = period;
        self
    }

    /// Path the retrieval handler is mapped to, e.g. `files` or `/assets/`.
    pub fn handler_path(mut self, path: &str) -> Self {
        self.handler_path = normalize_handler_path(path);
        self
    }

    pub fn naming(&self) -> &NamingStrategy {
        &self.naming
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.handler_path, key)
    }

    /// Store `contents` and return the URL to fetch it from.
    pub async fn write(
        &self,
        store: &Store,
        base_name: Option<&str>,
        contents: impl Into<Vec<u8>>,
    ) -> Result<String> {
        let contents = contents.into();
        let key = self.naming.key_for(base_name, &contents)?;

        let artifact = Artifact::new(key, contents, self.content_type.clone())
            .with_longevity(self.longevity)
            .with_cache_for(self.cache_for);
        store.add_or_update(&artifact).await?;

        let url = self.url_for(&artifact.key);
        debug!(key = %artifact.key, url = %url, "Wrote artifact");
        Ok(url)
    }
}

impl Default for ArtifactWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_handler_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches(|c| c == '/' || c == '\\');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
