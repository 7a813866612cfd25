//! Startup sequence
//!
//! Legacy migration runs first so its records are visible to the first
//! reconcile pass; every collection available at the store version is then
//! reconciled in turn.

use std::collections::BTreeMap;

use crate::db::{CollectionStore, DocumentStore};
use crate::document::Collection;
use crate::ingest::{
    IngestionCoordinator, KeyValueStore, LegacyMigration, MigrationOutcome, ReconcileReport,
};
use crate::manifest::CollectionPolicy;

/// What happened during startup
#[derive(Debug)]
pub struct StartupReport {
    pub migration: MigrationOutcome,
    pub reconciled: Vec<ReconcileReport>,
}

/// Migrate legacy data, then reconcile every available collection
///
/// Nothing here fails: migration and per-collection errors are logged and
/// the server starts with whatever state the store ends up in.
pub async fn initialize(
    store: &DocumentStore,
    coordinator: &IngestionCoordinator,
    policies: &BTreeMap<Collection, CollectionPolicy>,
    legacy: &dyn KeyValueStore,
    migration: &LegacyMigration,
) -> StartupReport {
    let newsletters = store.collection(Collection::Newsletters);
    let migration = migration.run_or_skip(legacy, &newsletters).await;

    let mut reconciled = Vec::new();
    for collection in store.collections() {
        let policy = policies
            .get(&collection)
            .cloned()
            .unwrap_or_else(|| CollectionPolicy::empty(collection));
        let handle = store.collection(collection);

        tracing::debug!(collection = %handle.collection(), "Reconciling collection");
        reconciled.push(coordinator.reconcile(&handle, &policy).await);
    }

    StartupReport {
        migration,
        reconciled,
    }
}
