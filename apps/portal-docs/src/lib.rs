//! Portal Docs Library
//!
//! PDF ingestion and the local document cache behind the company portal.
//! The server binary is in main.rs.
//!
//! # Modules
//!
//! - `document`: Record model shared by every collection
//! - `db`: Versioned SQLite cache store
//! - `raster`: PDF page rasterization via MuPDF
//! - `ingest`: Source fetching, reconcile and legacy migration
//! - `routes`: HTTP API

pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod ingest;
pub mod manifest;
pub mod raster;
pub mod routes;
pub mod startup;
pub mod state;
