//! Configuration management for the document portal server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::ingest::{DEFAULT_FETCH_TIMEOUT, DEFAULT_LEGACY_KEY, DEFAULT_MAX_CONCURRENT};
use crate::raster::{ImageFormat, RasterOptions, DEFAULT_COVER_SCALE, DEFAULT_JPEG_QUALITY, DEFAULT_PAGE_SCALE};

/// Highest schema version this build knows about
pub const LATEST_CACHE_VERSION: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sources: SourceConfig,
    pub raster: RasterConfig,
    pub legacy: LegacyConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    /// Store file name without extension
    pub name: String,
    pub version: u32,
    /// Optional JSON file overriding the built-in collection policies
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Directory static `pdfPath` values resolve against
    pub static_dir: Option<PathBuf>,
    /// Origin to fetch static paths from when not found locally
    pub base_url: Option<String>,
    pub fetch_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RasterConfig {
    pub page_scale: f32,
    pub cover_scale: f32,
    pub format: ImageFormat,
    pub jpeg_quality: u8,
    pub max_concurrent: usize,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct LegacyConfig {
    pub path: PathBuf,
    pub key: String,
}

impl RasterConfig {
    pub fn options(&self) -> RasterOptions {
        RasterOptions {
            page_scale: self.page_scale,
            cover_scale: self.cover_scale,
            format: self.format,
            jpeg_quality: self.jpeg_quality,
            timeout: self.timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");

        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                data_dir: data_dir.clone(),
                name: "portal-cache".to_string(),
                version: LATEST_CACHE_VERSION,
                manifest_path: None,
            },
            sources: SourceConfig {
                static_dir: Some(PathBuf::from("./public")),
                base_url: None,
                fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            },
            raster: RasterConfig {
                page_scale: DEFAULT_PAGE_SCALE,
                cover_scale: DEFAULT_COVER_SCALE,
                format: ImageFormat::Jpeg,
                jpeg_quality: DEFAULT_JPEG_QUALITY,
                max_concurrent: DEFAULT_MAX_CONCURRENT,
                timeout: None,
            },
            legacy: LegacyConfig {
                path: data_dir.join("legacy-storage.json"),
                key: DEFAULT_LEGACY_KEY.to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.database.data_dir);

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT")?.unwrap_or(defaults.server.port),
            },
            database: DatabaseConfig {
                name: env::var("CACHE_DB_NAME").unwrap_or(defaults.database.name),
                version: parse_var("CACHE_DB_VERSION")?.unwrap_or(defaults.database.version),
                manifest_path: env::var("MANIFEST_PATH").ok().map(PathBuf::from),
                data_dir: data_dir.clone(),
            },
            sources: SourceConfig {
                static_dir: env::var("STATIC_DIR")
                    .ok()
                    .map(PathBuf::from)
                    .or(defaults.sources.static_dir),
                base_url: env::var("SOURCE_BASE_URL").ok(),
                fetch_timeout: parse_var("SOURCE_FETCH_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.sources.fetch_timeout),
            },
            raster: RasterConfig {
                page_scale: parse_var("RASTER_PAGE_SCALE")?.unwrap_or(defaults.raster.page_scale),
                cover_scale: parse_var("RASTER_COVER_SCALE")?
                    .unwrap_or(defaults.raster.cover_scale),
                format: parse_var("RASTER_FORMAT")?.unwrap_or(defaults.raster.format),
                jpeg_quality: parse_var("RASTER_JPEG_QUALITY")?
                    .unwrap_or(defaults.raster.jpeg_quality),
                max_concurrent: parse_var("RASTER_MAX_CONCURRENT")?
                    .unwrap_or(defaults.raster.max_concurrent),
                timeout: parse_var("RASTER_TIMEOUT_SECS")?.map(Duration::from_secs),
            },
            legacy: LegacyConfig {
                path: env::var("LEGACY_STORE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_dir.join("legacy-storage.json")),
                key: env::var("LEGACY_KEY").unwrap_or(defaults.legacy.key),
            },
        })
    }
}

/// Parse an optional environment variable, rejecting malformed values
fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(None),
    }
}
