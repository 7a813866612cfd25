//! Document records
//!
//! The record model shared by every collection in the cache store:
//! identifiers, the record shape, processing state and display ordering.

mod error;
mod types;

pub use error::{DocumentError, Result};
pub use types::{
    sort_for_display, Collection, DocumentRecord, IdKind, IngestionMode, ProcessingState,
    RecordId,
};
