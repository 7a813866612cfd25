//! Rasterization error types

use thiserror::Error;

/// Errors raised while fetching or rendering a source document
///
/// Scoped to a single record: the ingestion coordinator logs these and moves
/// on to the next document.
#[derive(Debug, Error)]
pub enum RasterizeError {
    /// Source bytes could not be obtained
    #[error("Failed to fetch source {source_ref}: {message}")]
    Fetch { source_ref: String, message: String },

    /// Source is not a PDF
    #[error("Source is not a PDF document")]
    NotPdf,

    /// Document could not be opened or parsed
    #[error("Failed to load document: {0}")]
    Load(String),

    /// Page rendering failed
    #[error("Failed to render page {page}: {message}")]
    Render { page: usize, message: String },

    /// Cover requested from a document with no pages
    #[error("Document has no pages")]
    EmptyDocument,

    /// Image encoding failed
    #[error("Image encoding error: {0}")]
    Image(String),

    /// Render did not finish in time
    #[error("Rasterization timed out after {0} seconds")]
    Timeout(u64),

    /// Blocking task panicked or was dropped
    #[error("Task join error: {0}")]
    Join(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for rasterization
pub type RasterResult<T> = std::result::Result<T, RasterizeError>;

impl From<mupdf::Error> for RasterizeError {
    fn from(err: mupdf::Error) -> Self {
        RasterizeError::Load(err.to_string())
    }
}

impl From<image::ImageError> for RasterizeError {
    fn from(err: image::ImageError) -> Self {
        RasterizeError::Image(err.to_string())
    }
}
