//! Error types for codoc Core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Malformed delta: {0}")]
    MalformedDelta(String),
}

/// Result type alias for codoc Core operations
pub type Result<T> = std::result::Result<T, Error>;
