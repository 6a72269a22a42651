//! Protocol error types

use thiserror::Error;

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
