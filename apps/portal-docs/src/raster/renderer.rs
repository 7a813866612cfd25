//! MuPDF-backed rasterizer
//!
//! MuPDF documents are not thread-safe and not `Send`, so every operation
//! opens a fresh document inside a blocking task and drops it before the
//! task returns. Only the source (bytes or path) crosses threads.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use mupdf::{Colorspace, Document, Matrix, Pixmap};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::error::{RasterResult, RasterizeError};
use super::types::{DocumentSource, EncodedImage, ImageFormat, RasterOptions};
use super::Rasterizer;

const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF";

/// Counters for rasterizer activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Documents fully rendered
    pub documents: u64,
    /// Cover thumbnails rendered
    pub covers: u64,
    /// Individual pages rendered
    pub pages: u64,
    /// Failed render calls
    pub failures: u64,
}

/// Rasterizer using MuPDF for rendering and `image` for encoding
#[derive(Clone)]
pub struct MuPdfRasterizer {
    options: RasterOptions,
    stats: Arc<Mutex<RenderStats>>,
}

impl MuPdfRasterizer {
    pub fn new(options: RasterOptions) -> Self {
        Self {
            options,
            stats: Arc::new(Mutex::new(RenderStats::default())),
        }
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> RenderStats {
        self.stats.lock().clone()
    }

    /// Wait on a blocking render, applying the configured timeout
    async fn finish<T>(&self, task: JoinHandle<RasterResult<T>>) -> RasterResult<T> {
        let joined = match self.options.timeout {
            Some(limit) => match timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => return Err(RasterizeError::Timeout(limit.as_secs())),
            },
            None => task.await,
        };

        joined.map_err(|e| RasterizeError::Join(e.to_string()))?
    }

    fn record_failure(&self, error: &RasterizeError) {
        self.stats.lock().failures += 1;
        tracing::debug!(error = %error, "Rasterization failed");
    }
}

impl Default for MuPdfRasterizer {
    fn default() -> Self {
        Self::new(RasterOptions::default())
    }
}

#[async_trait]
impl Rasterizer for MuPdfRasterizer {
    async fn render_all_pages(&self, source: DocumentSource) -> RasterResult<Vec<EncodedImage>> {
        let options = self.options.clone();

        let task = tokio::task::spawn_blocking(move || -> RasterResult<Vec<EncodedImage>> {
            let doc = open_document(&source)?;
            let page_count = doc.page_count()? as usize;

            // Strictly ascending page order
            let mut pages = Vec::with_capacity(page_count);
            for index in 0..page_count {
                pages.push(render_page(&doc, index, options.page_scale, &options)?);
            }
            Ok(pages)
        });

        match self.finish(task).await {
            Ok(pages) => {
                let mut stats = self.stats.lock();
                stats.documents += 1;
                stats.pages += pages.len() as u64;
                Ok(pages)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn render_cover(&self, source: DocumentSource) -> RasterResult<EncodedImage> {
        let options = self.options.clone();

        let task = tokio::task::spawn_blocking(move || -> RasterResult<EncodedImage> {
            let doc = open_document(&source)?;
            if doc.page_count()? < 1 {
                return Err(RasterizeError::EmptyDocument);
            }
            render_page(&doc, 0, options.cover_scale, &options)
        });

        match self.finish(task).await {
            Ok(cover) => {
                self.stats.lock().covers += 1;
                Ok(cover)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }
}

// Helper functions

fn open_document(source: &DocumentSource) -> RasterResult<Document> {
    match source {
        DocumentSource::Bytes(data) => {
            if !data.starts_with(PDF_MAGIC) {
                return Err(RasterizeError::NotPdf);
            }
            Ok(Document::from_bytes(&data[..], PDF_MIME)?)
        }
        DocumentSource::Path(path) => {
            if !path.is_file() {
                return Err(RasterizeError::Load(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            let path_str = path.to_string_lossy();
            Ok(Document::open(&*path_str)?)
        }
    }
}

fn render_page(
    doc: &Document,
    index: usize,
    scale: f32,
    options: &RasterOptions,
) -> RasterResult<EncodedImage> {
    let render_err = |e: mupdf::Error| RasterizeError::Render {
        page: index + 1,
        message: e.to_string(),
    };

    let page = doc.load_page(index as i32).map_err(render_err)?;
    let matrix = Matrix::new_scale(scale, scale);
    let colorspace = Colorspace::device_rgb();
    let pixmap = page
        .to_pixmap(&matrix, &colorspace, false, true)
        .map_err(render_err)?;

    encode_pixmap(&pixmap, options)
}

fn encode_pixmap(pixmap: &Pixmap, options: &RasterOptions) -> RasterResult<EncodedImage> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    // Drop alpha; JPEG has no alpha channel
    let mut rgb_buffer = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(0);
            let b = samples.get(offset + 2).copied().unwrap_or(0);
            rgb_buffer.extend_from_slice(&[r, g, b]);
        }
    }

    let img = RgbImage::from_raw(width, height, rgb_buffer)
        .ok_or_else(|| RasterizeError::Image("Failed to create image buffer".to_string()))?;
    let dynamic_img = DynamicImage::ImageRgb8(img);

    let mut data = Vec::new();
    match options.format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut data, options.jpeg_quality.clamp(1, 100));
            dynamic_img.write_with_encoder(encoder)?;
        }
        ImageFormat::Png => {
            dynamic_img.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)?;
        }
    }

    Ok(EncodedImage {
        format: options.format,
        data,
        width,
        height,
    })
}
