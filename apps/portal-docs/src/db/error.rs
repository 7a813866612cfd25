//! Cache store error types

use thiserror::Error;

use crate::document::Collection;

/// Errors raised by cache store writes and schema management
///
/// Read paths swallow these and report an empty result instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Insert of an id that already exists
    #[error("Record {id} already exists in {collection}")]
    DuplicateId { collection: Collection, id: String },

    /// Collection not present at the opened schema version
    #[error("Collection {collection} does not exist at schema version {version}")]
    MissingCollection { collection: Collection, version: u32 },

    /// Store opened at an older version than the one on disk
    #[error("Store is at version {found}, cannot open at older version {requested}")]
    VersionDowngrade { found: u32, requested: u32 },

    #[error("Invalid schema version: {0}")]
    InvalidVersion(u32),

    /// Revision-checked replace presented a stale revision
    #[error("Collection {collection} was modified (expected revision {expected}, found {actual})")]
    ConcurrentModification {
        collection: Collection,
        expected: u64,
        actual: u64,
    },
}

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
