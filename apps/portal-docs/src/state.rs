//! Application state management

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::DocumentStore;
use crate::document::Collection;
use crate::ingest::IngestionCoordinator;
use crate::manifest::CollectionPolicy;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: DocumentStore,
    coordinator: Arc<IngestionCoordinator>,
    policies: BTreeMap<Collection, CollectionPolicy>,
}

impl AppState {
    pub fn new(
        store: DocumentStore,
        coordinator: Arc<IngestionCoordinator>,
        policies: BTreeMap<Collection, CollectionPolicy>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                coordinator,
                policies,
            }),
        }
    }

    /// Get the cache store
    pub fn store(&self) -> &DocumentStore {
        &self.inner.store
    }

    pub fn coordinator(&self) -> &IngestionCoordinator {
        &self.inner.coordinator
    }

    /// Policy for a collection, falling back to an empty one
    pub fn policy(&self, collection: Collection) -> CollectionPolicy {
        self.inner
            .policies
            .get(&collection)
            .cloned()
            .unwrap_or_else(|| CollectionPolicy::empty(collection))
    }

    /// Close the cache store
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.store.close().await;
    }
}
