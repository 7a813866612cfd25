//! PDF rasterization
//!
//! Turns a PDF (bytes or local path) into page images encoded for inline
//! storage. Every call re-renders from scratch; nothing is written to disk.
//!
//! # Usage
//!
//! ```rust,ignore
//! use portal_docs::raster::{DocumentSource, MuPdfRasterizer, RasterOptions, Rasterizer};
//!
//! let rasterizer = MuPdfRasterizer::new(RasterOptions::default());
//! let pages = rasterizer.render_all_pages(DocumentSource::from_bytes(pdf_bytes)).await?;
//! let cover = rasterizer.render_cover(DocumentSource::from_path("brochure.pdf")).await?;
//! ```

mod error;
mod renderer;
mod types;

use async_trait::async_trait;

pub use self::error::{RasterResult, RasterizeError};
pub use self::renderer::{MuPdfRasterizer, RenderStats};
pub use self::types::{
    DocumentSource, EncodedImage, ImageFormat, RasterOptions, UnknownImageFormat,
    DEFAULT_COVER_SCALE, DEFAULT_JPEG_QUALITY, DEFAULT_PAGE_SCALE,
};

/// Page rasterizer
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render every page in ascending order at the page scale.
    ///
    /// A zero-page document yields an empty vector, not an error.
    async fn render_all_pages(&self, source: DocumentSource) -> RasterResult<Vec<EncodedImage>>;

    /// Render only page 1 at the cover scale
    async fn render_cover(&self, source: DocumentSource) -> RasterResult<EncodedImage>;
}
