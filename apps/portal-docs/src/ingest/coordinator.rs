//! Ingestion coordinator
//!
//! Brings a collection in line with its policy and makes sure every record
//! that can be rendered has been:
//!
//! ```text
//! load_all ─► add missing manifest docs ─► drop deprecated titles
//!                                               │
//!            ┌──────────────────────────────────┘
//!            ▼
//!   UNPROCESSED records ──fetch──► rasterize ──► READY
//!            │ (bounded concurrency, per-record failure isolation)
//!            ▼
//!   write if anything became READY ─► sort for display
//! ```
//!
//! Every store write in a reconcile pass is best-effort: failures are logged
//! and the pass carries on with its in-memory view. Writes only land on the
//! revision the pass last saw; on a concurrent write the pass reloads and
//! reapplies its step.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::db::{CollectionStore, StoreError};
use crate::document::{
    sort_for_display, Collection, DocumentRecord, IngestionMode, ProcessingState, RecordId,
};
use crate::manifest::CollectionPolicy;
use crate::raster::{EncodedImage, RasterResult, Rasterizer};

use super::source::SourceFetcher;

/// Default number of documents rendered at once
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// A record that stayed unprocessed because rendering failed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    pub id: RecordId,
    pub error: String,
}

/// Outcome of one reconcile pass
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub collection: Collection,
    /// Manifest documents added because they were missing
    pub inserted: Vec<RecordId>,
    /// Records dropped by the deprecation list
    pub removed: Vec<RecordId>,
    /// Records that became READY
    pub rendered: Vec<RecordId>,
    /// Records whose source rendered to zero pages
    pub empty: Vec<RecordId>,
    pub failed: Vec<FailedRecord>,
    /// Store writes attempted
    pub writes: usize,
    /// Store writes that failed
    pub write_errors: usize,
    /// Collection after the pass, sorted for display
    #[serde(skip)]
    pub records: Vec<DocumentRecord>,
    pub total: usize,
}

impl ReconcileReport {
    fn new(collection: Collection) -> Self {
        Self {
            collection,
            inserted: Vec::new(),
            removed: Vec::new(),
            rendered: Vec::new(),
            empty: Vec::new(),
            failed: Vec::new(),
            writes: 0,
            write_errors: 0,
            records: Vec::new(),
            total: 0,
        }
    }

    /// Records still waiting on rasterization
    pub fn unprocessed(&self, mode: IngestionMode) -> usize {
        self.records
            .iter()
            .filter(|r| r.state(mode) == ProcessingState::Unprocessed)
            .count()
    }
}

/// Content produced for one record
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Pages(Vec<String>),
    Cover(String),
    Nothing,
}

impl Rendered {
    /// Write the rendered content into a record
    ///
    /// Returns false when there was nothing to apply (zero pages).
    pub fn apply_to(self, record: &mut DocumentRecord) -> bool {
        match self {
            Rendered::Pages(pages) if !pages.is_empty() => {
                record.cover = pages[0].clone();
                record.pages = pages;
                true
            }
            Rendered::Cover(cover) => {
                record.cover = cover;
                true
            }
            Rendered::Pages(_) | Rendered::Nothing => false,
        }
    }

    /// Whether applying this would change a record
    pub fn has_content(&self) -> bool {
        match self {
            Rendered::Pages(pages) => !pages.is_empty(),
            Rendered::Cover(_) => true,
            Rendered::Nothing => false,
        }
    }
}

/// Orchestrates fetching and rasterizing unprocessed records
pub struct IngestionCoordinator {
    rasterizer: Arc<dyn Rasterizer>,
    fetcher: Arc<dyn SourceFetcher>,
    max_concurrent: usize,
}

impl IngestionCoordinator {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            rasterizer,
            fetcher,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Fetch a source and render it according to the ingestion mode
    pub async fn render_source(&self, source: &str, mode: IngestionMode) -> RasterResult<Rendered> {
        if mode == IngestionMode::None {
            return Ok(Rendered::Nothing);
        }

        let document = self.fetcher.fetch(source).await?;

        match mode {
            IngestionMode::Pages => {
                let pages = self.rasterizer.render_all_pages(document).await?;
                Ok(Rendered::Pages(
                    pages.iter().map(EncodedImage::to_data_url).collect(),
                ))
            }
            IngestionMode::Cover => {
                let cover = self.rasterizer.render_cover(document).await?;
                Ok(Rendered::Cover(cover.to_data_url()))
            }
            IngestionMode::None => Ok(Rendered::Nothing),
        }
    }

    /// Render a freshly uploaded record in place so it is READY at creation
    pub async fn ingest_record(
        &self,
        record: &mut DocumentRecord,
        mode: IngestionMode,
    ) -> RasterResult<ProcessingState> {
        if record.state(mode) == ProcessingState::Ready {
            return Ok(ProcessingState::Ready);
        }

        if let Some(source) = record.source().map(str::to_string) {
            let rendered = self.render_source(&source, mode).await?;
            rendered.apply_to(record);
        }

        Ok(record.state(mode))
    }

    /// Run one reconcile pass over a collection
    pub async fn reconcile(
        &self,
        store: &dyn CollectionStore,
        policy: &CollectionPolicy,
    ) -> ReconcileReport {
        let collection = store.collection();
        let mode = policy.mode;
        let mut report = ReconcileReport::new(collection);
        let mut view = View::load(store).await;

        // Manifest documents that went missing
        let (inserted, _) = commit(store, &mut view, "manifest", &mut report, |records| {
            let missing: Vec<DocumentRecord> = {
                let present: HashSet<&RecordId> = records.iter().map(|r| &r.id).collect();
                policy
                    .manifest
                    .iter()
                    .filter(|doc| !present.contains(&doc.id))
                    .filter(|doc| !doc.title_matches_any(&policy.deprecated_titles))
                    .cloned()
                    .collect()
            };
            let ids: Vec<RecordId> = missing.iter().map(|r| r.id.clone()).collect();
            records.extend(missing);
            ids
        })
        .await;
        if !inserted.is_empty() {
            tracing::info!(
                collection = %collection,
                count = inserted.len(),
                "Added missing manifest documents"
            );
        }
        report.inserted = inserted;

        // Deprecated titles
        let (removed, _) = commit(store, &mut view, "deprecation", &mut report, |records| {
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(records)
                .into_iter()
                .partition(|r| r.title_matches_any(&policy.deprecated_titles));
            *records = kept;
            removed.into_iter().map(|r| r.id).collect()
        })
        .await;
        if !removed.is_empty() {
            tracing::info!(
                collection = %collection,
                removed = ?removed,
                "Removed deprecated documents"
            );
        }
        report.removed = removed;

        // Render everything still unprocessed
        let pending: Vec<(RecordId, String)> = view
            .records
            .iter()
            .filter(|r| r.state(mode) == ProcessingState::Unprocessed)
            .filter_map(|r| r.source().map(|s| (r.id.clone(), s.to_string())))
            .collect();

        if !pending.is_empty() {
            tracing::info!(
                collection = %collection,
                count = pending.len(),
                "Rasterizing unprocessed documents"
            );
        }

        let outcomes: Vec<(RecordId, String, RasterResult<Rendered>)> = stream::iter(pending)
            .map(|(id, source)| async move {
                let outcome = self.render_source(&source, mode).await;
                (id, source, outcome)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut ready = Vec::new();
        for (id, source, outcome) in outcomes {
            match outcome {
                Ok(rendered) if rendered.has_content() => {
                    tracing::debug!(collection = %collection, id = %id, "Document rendered");
                    ready.push((id, source, rendered));
                }
                Ok(_) => {
                    tracing::warn!(
                        collection = %collection,
                        id = %id,
                        "Source rendered to zero pages"
                    );
                    report.empty.push(id);
                }
                Err(e) => {
                    tracing::warn!(
                        collection = %collection,
                        id = %id,
                        error = %e,
                        "Failed to rasterize document, leaving it unprocessed"
                    );
                    report.failed.push(FailedRecord {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let (rendered, outcome) = commit(store, &mut view, "rasterization", &mut report, |records| {
            ready
                .iter()
                .filter(|(id, source, rendered)| {
                    records
                        .iter_mut()
                        .find(|r| &r.id == id)
                        .map_or(false, |record| apply_rendered(record, source, rendered, mode))
                })
                .map(|(id, _, _)| id.clone())
                .collect()
        })
        .await;
        let rendered = match outcome {
            WriteOutcome::Contended => {
                let rendered = update_each(store, &ready, mode, &mut report).await;
                view = View::load(store).await;
                rendered
            }
            WriteOutcome::Written | WriteOutcome::Failed => rendered,
        };
        report.rendered = rendered;

        let mut records = view.records;
        sort_for_display(&mut records);
        report.total = records.len();
        report.records = records;

        tracing::info!(
            collection = %collection,
            total = report.total,
            inserted = report.inserted.len(),
            removed = report.removed.len(),
            rendered = report.rendered.len(),
            failed = report.failed.len(),
            writes = report.writes,
            "Reconcile complete"
        );

        report
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Attempts per reconcile step before giving up on concurrent writers
const MAX_WRITE_ATTEMPTS: usize = 3;

/// The collection as this pass last read or wrote it
struct View {
    records: Vec<DocumentRecord>,
    /// Revision `records` corresponds to; `None` when the stamp is unreadable
    revision: Option<u64>,
}

impl View {
    async fn load(store: &dyn CollectionStore) -> Self {
        // Stamp before rows: a write in between only makes the stamp stale
        let revision = match store.revision().await {
            Ok(revision) => Some(revision),
            Err(e) => {
                tracing::warn!(
                    collection = %store.collection(),
                    error = %e,
                    "Failed to read collection revision, writes will be unchecked"
                );
                None
            }
        };
        let records = store.load_all().await;
        Self { records, revision }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    /// Written, or nothing to write
    Written,
    /// Store error; the change is kept in memory only
    Failed,
    /// Lost every attempt to a concurrent writer
    Contended,
}

/// Apply a step to the view and persist the result
///
/// Writes are conditional on the revision the view was read at. If another
/// writer got there first, the view is reloaded and the step applied again,
/// so the other writer's changes survive. Returns the ids the last
/// application of the step touched.
async fn commit<F>(
    store: &dyn CollectionStore,
    view: &mut View,
    step: &'static str,
    report: &mut ReconcileReport,
    mut apply: F,
) -> (Vec<RecordId>, WriteOutcome)
where
    F: FnMut(&mut Vec<DocumentRecord>) -> Vec<RecordId> + Send,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let touched = apply(&mut view.records);
        if touched.is_empty() {
            return (touched, WriteOutcome::Written);
        }

        report.writes += 1;
        let written = match view.revision {
            Some(expected) => store.replace_all_at(expected, &view.records).await.map(Some),
            None => store.replace_all(&view.records).await.map(|()| None),
        };

        match written {
            Ok(revision) => {
                view.revision = revision;
                return (touched, WriteOutcome::Written);
            }
            Err(StoreError::ConcurrentModification { expected, actual, .. })
                if attempt < MAX_WRITE_ATTEMPTS =>
            {
                tracing::debug!(
                    collection = %store.collection(),
                    step = step,
                    attempt = attempt,
                    expected = expected,
                    actual = actual,
                    "Collection changed during reconcile, reloading"
                );
                *view = View::load(store).await;
            }
            Err(e @ StoreError::ConcurrentModification { .. }) => {
                report.write_errors += 1;
                tracing::warn!(
                    collection = %store.collection(),
                    step = step,
                    error = %e,
                    "Gave up on reconcile step after repeated concurrent writes"
                );
                return (touched, WriteOutcome::Contended);
            }
            Err(e) => {
                report.write_errors += 1;
                tracing::warn!(
                    collection = %store.collection(),
                    step = step,
                    error = %e,
                    "Failed to persist reconcile step"
                );
                return (touched, WriteOutcome::Failed);
            }
        }
    }
}

/// Apply rendered content if the record still has the source it was
/// rendered from and is still waiting on it
fn apply_rendered(
    record: &mut DocumentRecord,
    source: &str,
    rendered: &Rendered,
    mode: IngestionMode,
) -> bool {
    record.source() == Some(source)
        && record.state(mode) == ProcessingState::Unprocessed
        && rendered.clone().apply_to(record)
}

/// Write rendered records one at a time, re-reading each first
async fn update_each(
    store: &dyn CollectionStore,
    ready: &[(RecordId, String, Rendered)],
    mode: IngestionMode,
    report: &mut ReconcileReport,
) -> Vec<RecordId> {
    let mut applied = Vec::new();
    for (id, source, rendered) in ready {
        let mut record = match store.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(
                    collection = %store.collection(),
                    id = %id,
                    error = %e,
                    "Failed to re-read record"
                );
                continue;
            }
        };
        if !apply_rendered(&mut record, source, rendered, mode) {
            continue;
        }

        report.writes += 1;
        match store.update(&record).await {
            Ok(()) => applied.push(id.clone()),
            Err(e) => {
                report.write_errors += 1;
                tracing::warn!(
                    collection = %store.collection(),
                    id = %id,
                    error = %e,
                    "Failed to persist rendered document"
                );
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64) -> DocumentRecord {
        DocumentRecord::numeric(id, "사내보", "2024-12-31").with_pdf_path("/pdfs/a.pdf")
    }

    #[test]
    fn test_apply_pages_sets_cover() {
        let mut r = record(1);
        let applied = Rendered::Pages(vec!["p1".into(), "p2".into()]).apply_to(&mut r);

        assert!(applied);
        assert_eq!(r.pages, vec!["p1", "p2"]);
        assert_eq!(r.cover, "p1");
    }

    #[test]
    fn test_apply_empty_pages_is_noop() {
        let mut r = record(1);
        assert!(!Rendered::Pages(Vec::new()).apply_to(&mut r));
        assert!(r.cover.is_empty());
        assert_eq!(r.state(IngestionMode::Pages), ProcessingState::Unprocessed);
    }

    #[test]
    fn test_apply_cover_only() {
        let mut r = record(1);
        assert!(Rendered::Cover("c".into()).apply_to(&mut r));
        assert_eq!(r.cover, "c");
        assert!(r.pages.is_empty());
        assert_eq!(r.state(IngestionMode::Cover), ProcessingState::Ready);
    }
}
