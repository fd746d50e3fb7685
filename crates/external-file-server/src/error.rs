//! Error types for the external file server

use external_file_store::StoreError;
use std::fmt;

#[derive(Debug)]
pub enum ServerError {
    Store(StoreError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Store(err) => write!(f, "Store error: {}", err),
            ServerError::Io(err) => write!(f, "IO error: {}", err),
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Store(err) => Some(err),
            ServerError::Io(err) => Some(err.as_ref()),
            ServerError::Config(_) => None,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        ServerError::Store(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_store_error_display() {
        let err = ServerError::from(StoreError::NotInitialized);
        assert_eq!(
            format!("{}", err),
            "Store error: Store has not been initialized"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_config_error_display() {
        let err = ServerError::Config("unknown backend".to_string());
        assert_eq!(format!("{}", err), "Configuration error: unknown backend");
        assert!(err.source().is_none());
    }
}
