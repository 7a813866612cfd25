//! Document ingestion
//!
//! Fetching sources, reconciling collections against their policy and the
//! one-time legacy migration.

pub mod coordinator;
pub mod legacy;
pub mod migration;
pub mod source;

pub use coordinator::{
    FailedRecord, IngestionCoordinator, ReconcileReport, Rendered, DEFAULT_MAX_CONCURRENT,
};
pub use legacy::{JsonFileStore, KeyValueStore, LegacyError, DEFAULT_LEGACY_KEY};
pub use migration::{LegacyMigration, MigrationError, MigrationOutcome};
pub use source::{SourceFetcher, StaticSourceFetcher, DEFAULT_FETCH_TIMEOUT};
