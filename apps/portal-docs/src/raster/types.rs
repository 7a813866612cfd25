//! Rasterizer input and output types

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default scale for full page renders
pub const DEFAULT_PAGE_SCALE: f32 = 1.5;
/// Default scale for cover thumbnails
pub const DEFAULT_COVER_SCALE: f32 = 1.0;
/// Default JPEG quality (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Source data for a document
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Document held in memory (fetched or uploaded)
    Bytes(Arc<Vec<u8>>),
    /// Document on local disk
    Path(PathBuf),
}

impl DocumentSource {
    /// Create source from bytes
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::Bytes(Arc::new(data))
    }

    /// Create source from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }
}

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown image format: {0}")]
pub struct UnknownImageFormat(String);

impl FromStr for ImageFormat {
    type Err = UnknownImageFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            _ => Err(UnknownImageFormat(s.to_string())),
        }
    }
}

/// A rendered page encoded for inline storage
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub format: ImageFormat,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    /// Encode as a `data:` URL suitable for a record's `cover`/`pages`
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            STANDARD.encode(&self.data)
        )
    }
}

/// Rendering parameters
#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// Scale factor for every page in a full render
    pub page_scale: f32,
    /// Scale factor for the page 1 thumbnail
    pub cover_scale: f32,
    pub format: ImageFormat,
    pub jpeg_quality: u8,
    /// Give up waiting on a render after this long (the render itself keeps running)
    pub timeout: Option<Duration>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            page_scale: DEFAULT_PAGE_SCALE,
            cover_scale: DEFAULT_COVER_SCALE,
            format: ImageFormat::Jpeg,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            timeout: None,
        }
    }
}
