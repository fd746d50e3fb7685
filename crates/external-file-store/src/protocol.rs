//! Retrieval and administration requests against a store
//!
//! Transport-agnostic: a request goes in, a [`Response`] comes out carrying a
//! status, an optional payload and a caching directive. The HTTP binding lives
//! in the server crate.
//!
//! # Single-use consumption
//!
//! Serving a single-use artifact reads it and then deletes it. Under the
//! default [`ConsumptionGuarantee::AtLeastOnce`] the read and the delete are
//! independent calls, so two concurrent requests for the same key may both be
//! served before either deletes it. [`ConsumptionGuarantee::AtMostOnce`] holds
//! a per-key lock across the pair so only one of them sees the payload.

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::store::Store;
use crate::types::{record_name, Artifact};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Path segment that serves an artifact without consuming it.
pub const IGNORE_LONGEVITY_SEGMENT: &str = "ignorelgvty";

/// Upper bound on advertised cache lifetimes.
const MAX_CACHE_AGE: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get { key: String, ignore_longevity: bool },
    Delete { key: String },
    Init,
    Empty,
    Remove,
    ReInit,
}

impl Request {
    /// Build a retrieval request from the path below the handler segment and
    /// the raw query string. The query is part of the logical key.
    pub fn retrieval(path: &str, query: Option<&str>) -> Self {
        let path = path.trim_start_matches('/');
        let (path, ignore_longevity) = match path.strip_prefix(IGNORE_LONGEVITY_SEGMENT) {
            Some(rest) if rest.starts_with('/') => (rest.trim_start_matches('/'), true),
            _ => (path, false),
        };

        let key = match query.filter(|q| !q.is_empty()) {
            Some(query) => format!("{}?{}", path, query),
            None => path.to_string(),
        };

        Request::Get {
            key,
            ignore_longevity,
        }
    }

    pub fn is_admin(&self) -> bool {
        !matches!(self, Request::Get { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    Error,
}

/// Caching instructions for the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    /// Cacheable by anyone until `expires`.
    Public {
        max_age: Duration,
        expires: DateTime<Utc>,
    },
    NoCache,
    /// Administrative responses: never cached, never stored.
    NoStore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub cache: CacheDirective,
}

impl Response {
    fn empty(status: Status, cache: CacheDirective) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
            cache,
        }
    }
}

/// Delivery guarantee for single-use artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsumptionGuarantee {
    #[default]
    AtLeastOnce,
    AtMostOnce,
}

impl fmt::Display for ConsumptionGuarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumptionGuarantee::AtLeastOnce => write!(f, "at-least-once"),
            ConsumptionGuarantee::AtMostOnce => write!(f, "at-most-once"),
        }
    }
}

impl FromStr for ConsumptionGuarantee {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "at-least-once" => Ok(ConsumptionGuarantee::AtLeastOnce),
            "at-most-once" => Ok(ConsumptionGuarantee::AtMostOnce),
            other => Err(format!("unknown consumption guarantee '{}'", other)),
        }
    }
}

/// Async locks keyed by record name. Entries are dropped once no request
/// holds them.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, weak| weak.strong_count() > 0);
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(key.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|w| w.strong_count() > 0).count()
    }
}

/// Interprets requests against a store.
pub struct Protocol {
    clock: Arc<dyn Clock>,
    guarantee: ConsumptionGuarantee,
    key_locks: KeyLocks,
}

impl Protocol {
    pub fn new(guarantee: ConsumptionGuarantee) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            guarantee,
            key_locks: KeyLocks::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn guarantee(&self) -> ConsumptionGuarantee {
        self.guarantee
    }

    pub async fn handle(&self, store: &Store, request: Request) -> Response {
        match request {
            Request::Get {
                key,
                ignore_longevity,
            } => self.retrieve(store, &key, ignore_longevity).await,
            Request::Delete { key } => match store.delete(&key).await {
                // a key that cannot name a record has nothing to delete
                Err(StoreError::InvalidName(reason)) => {
                    debug!(key = %key, reason = %reason, "Delete of unnamable key ignored");
                    Response::empty(Status::Ok, CacheDirective::NoStore)
                }
                result => administered("delete", result),
            },
            Request::Init => administered("init", store.init().await),
            Request::Empty => administered("empty", store.empty().await),
            Request::Remove => administered("remove", store.remove().await),
            Request::ReInit => administered("reinit", store.reinit().await),
        }
    }

    async fn retrieve(&self, store: &Store, key: &str, ignore_longevity: bool) -> Response {
        let _guard = match self.guarantee {
            ConsumptionGuarantee::AtMostOnce if !ignore_longevity => {
                let lock_key = record_name(key).unwrap_or_else(|_| key.to_string());
                Some(self.key_locks.acquire(&lock_key).await)
            }
            _ => None,
        };

        let artifact = match store.get(key).await {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                debug!(key = %key, "Artifact not found");
                return Response::empty(Status::NotFound, CacheDirective::NoCache);
            }
            Err(StoreError::InvalidName(reason)) => {
                debug!(key = %key, reason = %reason, "No artifact can have this key");
                return Response::empty(Status::NotFound, CacheDirective::NoCache);
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to retrieve artifact");
                return Response::empty(Status::Error, CacheDirective::NoCache);
            }
        };

        let consume = artifact.is_single_use() && !ignore_longevity;
        let response = Response {
            status: Status::Ok,
            cache: self.cache_directive(&artifact),
            content_type: Some(artifact.content_type),
            body: artifact.contents,
        };

        if consume {
            // the payload is already in hand, so a failed delete only leaves
            // the artifact behind for the scavenger
            match store.delete(key).await {
                Ok(()) => debug!(key = %key, "Consumed single-use artifact"),
                Err(e) => warn!(key = %key, error = %e, "Failed to delete single-use artifact"),
            }
        }

        debug!(key = %key, size = response.body.len(), "Served artifact");
        response
    }

    fn cache_directive(&self, artifact: &Artifact) -> CacheDirective {
        if artifact.cache_for.is_zero() {
            return CacheDirective::NoCache;
        }

        let max_age = artifact.cache_for.min(MAX_CACHE_AGE);
        chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .map(|expires| CacheDirective::Public { max_age, expires })
            .unwrap_or(CacheDirective::NoCache)
    }
}

fn administered(request: &str, result: crate::error::Result<()>) -> Response {
    match result {
        Ok(()) => {
            debug!(request, "Administrative request completed");
            Response::empty(Status::Ok, CacheDirective::NoStore)
        }
        Err(e) => {
            error!(request, error = %e, "Administrative request failed");
            Response::empty(Status::Error, CacheDirective::NoStore)
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new(ConsumptionGuarantee::default())
    }
}
