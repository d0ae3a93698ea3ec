//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid session key: {0}")]
    InvalidKey(String),
}
