use chrono::{DateTime, Utc};
use external_file_store::time_span::parse_time_span;
use external_file_store::{Artifact, Longevity, Result, StoreError};
use sqlx::FromRow;

/// One artifact as stored in its table.
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub key: String,
    pub content_type: String,
    pub contents: Vec<u8>,
    pub longevity: String,
    pub cache_for_time_period: String,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRow {
    pub fn into_artifact(self) -> Result<Artifact> {
        let longevity: Longevity = self.longevity.parse()?;
        let cache_for = parse_time_span(&self.cache_for_time_period)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Artifact::new(self.key, self.contents, self.content_type)
            .with_longevity(longevity)
            .with_cache_for(cache_for))
    }
}
