//! Error types for the external file store

use std::fmt;
use std::path::PathBuf;

/// Failures raised by backends, the store façade and the naming strategy.
///
/// A missing artifact is not an error: lookups return `Ok(None)` so the
/// retrieval protocol can tell "not found" apart from genuine failures.
#[derive(Debug)]
pub enum StoreError {
    /// An operation other than `init` was invoked before the backend was ready.
    NotInitialized,
    /// A required setting (store name, provider, connection info) was absent.
    ConfigurationMissing(String),
    /// The namespace directory could not be created or verified during `init`.
    StorageDirectoryCreationFailed(PathBuf),
    /// The namespace directory disappeared after a successful `init`.
    StorageDirectoryMissing(PathBuf),
    /// A name could not be derived, or a key cannot be used as a record name.
    InvalidName(String),
    /// Generic creation failure not covered by a more specific kind.
    UnableToCreateStore(String),
    Io(Box<std::io::Error>),
    Serialization(String),
    /// Failure reported by a database provider.
    Provider(String),
}

impl StoreError {
    /// Wrap a lower-level database error.
    pub fn provider(err: impl fmt::Display) -> Self {
        StoreError::Provider(err.to_string())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotInitialized => write!(f, "Store has not been initialized"),
            StoreError::ConfigurationMissing(msg) => write!(f, "Configuration missing: {}", msg),
            StoreError::StorageDirectoryCreationFailed(path) => write!(
                f,
                "Storage directory cannot be created: {}",
                path.display()
            ),
            StoreError::StorageDirectoryMissing(path) => {
                write!(f, "Storage directory does not exist: {}", path.display())
            }
            StoreError::InvalidName(msg) => write!(f, "Invalid name: {}", msg),
            StoreError::UnableToCreateStore(msg) => write!(f, "Unable to create store: {}", msg),
            StoreError::Io(err) => write!(f, "IO error: {}", err),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            StoreError::Provider(msg) => write!(f, "Database provider error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
