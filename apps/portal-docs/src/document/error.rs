//! Document record error types

use thiserror::Error;

/// Errors raised while decoding or validating document records
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Collection name not recognised
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Identifier does not fit the collection's id kind
    #[error("Invalid record id: {0}")]
    InvalidId(String),

    /// Record failed validation
    #[error("Invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    /// Input was not valid record JSON
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type alias for document record operations
pub type Result<T> = std::result::Result<T, DocumentError>;
