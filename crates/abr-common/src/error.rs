//! Error types shared across the ABR loader crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, AbrError>;

/// Errors that are not specific to one pipeline stage
#[derive(Error, Debug)]
pub enum AbrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid business identifier: {0:?}")]
    InvalidIdentifier(String),
}
