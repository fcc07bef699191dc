//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding wire types.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Failed to serialize or deserialize JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Empty payload received.
    #[error("empty message")]
    EmptyMessage,

    /// A required protobuf field was absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A protobuf timestamp outside the representable range.
    #[error("invalid timestamp in field {field}")]
    InvalidTimestamp { field: &'static str },
}
