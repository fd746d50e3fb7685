//! Artifact model and its persisted record form

use crate::error::{Result, StoreError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Whether an artifact survives being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Longevity {
    /// Deleted right after the first successful retrieval.
    SingleUse,
    /// Kept until explicitly deleted or scavenged.
    Reuse,
}

impl fmt::Display for Longevity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Longevity::SingleUse => write!(f, "SingleUse"),
            Longevity::Reuse => write!(f, "Reuse"),
        }
    }
}

impl FromStr for Longevity {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SingleUse" => Ok(Longevity::SingleUse),
            "Reuse" => Ok(Longevity::Reuse),
            other => Err(StoreError::Serialization(format!(
                "unknown longevity '{}'",
                other
            ))),
        }
    }
}

/// One stored payload with the metadata needed to serve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: String,
    pub contents: Vec<u8>,
    pub content_type: String,
    /// Zero means "do not cache". Records keep whole seconds only, so set it
    /// through [`Artifact::with_cache_for`] to survive a store round trip.
    pub cache_for: Duration,
    pub longevity: Longevity,
}

impl Artifact {
    /// A reusable, uncached artifact.
    pub fn new(
        key: impl Into<String>,
        contents: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            contents: contents.into(),
            content_type: content_type.into(),
            cache_for: Duration::ZERO,
            longevity: Longevity::Reuse,
        }
    }

    pub fn with_longevity(mut self, longevity: Longevity) -> Self {
        self.longevity = longevity;
        self
    }

    /// Sub-second parts are dropped.
    pub fn with_cache_for(mut self, period: Duration) -> Self {
        self.cache_for = Duration::from_secs(period.as_secs());
        self
    }

    pub fn is_single_use(&self) -> bool {
        self.longevity == Longevity::SingleUse
    }
}

/// Map a logical key to the name of its physical record.
///
/// The query-string marker is dropped (`bundle.js?h=abc` is stored as
/// `bundle.jsh=abc`). Keys that would escape a flat namespace are rejected, as
/// are dot-prefixed names, which are reserved for in-flight writes.
pub fn record_name(key: &str) -> Result<String> {
    let name: String = key.chars().filter(|c| *c != '?').collect();

    if name.is_empty() {
        return Err(StoreError::InvalidName("key must not be empty".to_string()));
    }
    if name.contains(&['/', '\\', '\0'][..]) {
        return Err(StoreError::InvalidName(format!(
            "key '{}' contains a path separator",
            key
        )));
    }
    if name.starts_with('.') {
        return Err(StoreError::InvalidName(format!(
            "key '{}' must not start with '.'",
            key
        )));
    }

    Ok(name)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentsEncoding {
    #[default]
    Text,
    Base64,
}

impl ContentsEncoding {
    fn is_text(&self) -> bool {
        *self == ContentsEncoding::Text
    }
}

/// The self-contained serialized form of an artifact, one per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub key: String,
    pub content_type: String,
    pub contents: String,
    #[serde(default, skip_serializing_if = "ContentsEncoding::is_text")]
    pub contents_encoding: ContentsEncoding,
    pub longevity: Longevity,
    #[serde(with = "crate::time_span::serde_text")]
    pub cache_for_time_period: Duration,
    /// Write time. Older records without it fall back to filesystem metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ArtifactRecord {
    pub fn from_artifact(artifact: &Artifact, created_at: DateTime<Utc>) -> Self {
        let (contents, contents_encoding) = match std::str::from_utf8(&artifact.contents) {
            Ok(text) => (text.to_string(), ContentsEncoding::Text),
            Err(_) => (BASE64.encode(&artifact.contents), ContentsEncoding::Base64),
        };

        Self {
            key: artifact.key.clone(),
            content_type: artifact.content_type.clone(),
            contents,
            contents_encoding,
            longevity: artifact.longevity,
            cache_for_time_period: artifact.cache_for,
            created_at: Some(created_at),
        }
    }

    pub fn into_artifact(self) -> Result<Artifact> {
        let contents = match self.contents_encoding {
            ContentsEncoding::Text => self.contents.into_bytes(),
            ContentsEncoding::Base64 => BASE64
                .decode(self.contents.as_bytes())
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
        };

        Ok(Artifact {
            key: self.key,
            contents,
            content_type: self.content_type,
            cache_for: self.cache_for_time_period,
            longevity: self.longevity,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
