//! Source document fetching
//!
//! Resolves a record's `pdfPath`/`fileData`/`fileUrl` into something the
//! rasterizer can open: inline blobs are decoded, static paths are read from
//! disk or fetched over HTTP.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::raster::{DocumentSource, RasterResult, RasterizeError};

/// Base64 of "%PDF-", the start of every bare base64 PDF blob
const BASE64_PDF_PREFIX: &str = "JVBERi";

/// Default HTTP fetch timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns a source reference into document bytes or a local path
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> RasterResult<DocumentSource>;
}

/// Fetcher for uploaded blobs, a static file directory and HTTP
#[derive(Clone)]
pub struct StaticSourceFetcher {
    client: reqwest::Client,
    static_dir: Option<PathBuf>,
    base_url: Option<String>,
}

impl StaticSourceFetcher {
    pub fn new(
        static_dir: Option<PathBuf>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            static_dir,
            base_url,
        })
    }

    async fn fetch_http(&self, url: &str) -> RasterResult<DocumentSource> {
        let fetch_err = |message: String| RasterizeError::Fetch {
            source_ref: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status)));
        }

        let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        tracing::debug!(url = url, size = bytes.len(), "Fetched source document");

        Ok(DocumentSource::from_bytes(bytes.to_vec()))
    }
}

#[async_trait]
impl SourceFetcher for StaticSourceFetcher {
    async fn fetch(&self, source: &str) -> RasterResult<DocumentSource> {
        let source = source.trim();

        if let Some(encoded) = inline_payload(source) {
            let bytes = STANDARD.decode(encoded).map_err(|e| RasterizeError::Fetch {
                source_ref: "inline data".to_string(),
                message: e.to_string(),
            })?;
            return Ok(DocumentSource::from_bytes(bytes));
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            return self.fetch_http(source).await;
        }

        let relative = source.trim_start_matches('/');
        if !stays_inside(relative) {
            return Err(RasterizeError::Fetch {
                source_ref: source.to_string(),
                message: "path escapes the static directory".to_string(),
            });
        }

        if let Some(dir) = &self.static_dir {
            let path = dir.join(relative);
            if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                return Ok(DocumentSource::from_path(path));
            }
            if self.base_url.is_none() {
                return Err(RasterizeError::Fetch {
                    source_ref: source.to_string(),
                    message: format!("{} not found", path.display()),
                });
            }
        }

        match &self.base_url {
            Some(base) => {
                let url = format!("{}/{}", base.trim_end_matches('/'), relative);
                self.fetch_http(&url).await
            }
            None => Err(RasterizeError::Fetch {
                source_ref: source.to_string(),
                message: "no static directory or base URL configured".to_string(),
            }),
        }
    }
}

/// Whether a relative source path resolves under its root, both as a file
/// path and as a URL path. Backslashes and encoded dots count as escapes
/// because URL parsers normalize them into separators and `..` segments.
fn stays_inside(relative: &str) -> bool {
    if relative.contains('\\') || relative.to_ascii_lowercase().contains("%2e") {
        return false;
    }
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Base64 payload of a `data:...;base64,` URL or a bare base64 PDF
fn inline_payload(source: &str) -> Option<&str> {
    if let Some(rest) = source.strip_prefix("data:") {
        let (header, payload) = rest.split_once(',')?;
        return header.ends_with(";base64").then_some(payload);
    }

    source.starts_with(BASE64_PDF_PREFIX).then_some(source)
}
