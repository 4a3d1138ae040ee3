//! Error types for the Voicefy core crate.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading configuration, the persona catalog, or touching the library.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Persona catalog error: {0}")]
    Catalog(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sled::transaction::TransactionError<()>> for CoreError {
    fn from(err: sled::transaction::TransactionError<()>) -> Self {
        match err {
            sled::transaction::TransactionError::Storage(e) => CoreError::Storage(e),
            sled::transaction::TransactionError::Abort(()) => {
                CoreError::Storage(sled::Error::Unsupported("transaction aborted".to_string()))
            }
        }
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::Catalog(err.to_string())
    }
}
