//! Shared fakes for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use portal_docs::db::{CollectionStore, SqliteCollection, StoreError, StoreResult};
use portal_docs::document::{Collection, DocumentRecord, RecordId};
use portal_docs::ingest::{IngestionCoordinator, SourceFetcher};
use portal_docs::raster::{
    DocumentSource, EncodedImage, ImageFormat, RasterResult, RasterizeError, Rasterizer,
};

/// Hands back the source reference itself as the document bytes
///
/// References containing `unreachable` fail to fetch.
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, source: &str) -> RasterResult<DocumentSource> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if source.contains("unreachable") {
            return Err(RasterizeError::Fetch {
                source_ref: source.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(DocumentSource::from_bytes(source.as_bytes().to_vec()))
    }
}

/// Renders `pages` fake pages per document
///
/// Documents whose bytes mention `corrupt` fail to load and those mentioning
/// `empty` have no pages. Tracks how many renders overlap.
pub struct FakeRasterizer {
    pub pages: usize,
    pub delay: Duration,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeRasterizer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            delay: Duration::from_millis(0),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn content(source: &DocumentSource) -> String {
        match source {
            DocumentSource::Bytes(data) => String::from_utf8_lossy(data).into_owned(),
            DocumentSource::Path(path) => path.display().to_string(),
        }
    }

    async fn render(&self, source: &DocumentSource, limit: usize) -> RasterResult<Vec<EncodedImage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let content = Self::content(source);
        if content.contains("corrupt") {
            return Err(RasterizeError::Load("xref table broken".to_string()));
        }
        let count = if content.contains("empty") { 0 } else { self.pages.min(limit) };

        Ok((1..=count)
            .map(|page| EncodedImage {
                format: ImageFormat::Png,
                data: format!("{}#{}", content, page).into_bytes(),
                width: 1,
                height: 1,
            })
            .collect())
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn render_all_pages(&self, source: DocumentSource) -> RasterResult<Vec<EncodedImage>> {
        self.render(&source, usize::MAX).await
    }

    async fn render_cover(&self, source: DocumentSource) -> RasterResult<EncodedImage> {
        self.render(&source, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(RasterizeError::EmptyDocument)
    }
}

/// Collection wrapper counting bulk writes, optionally failing them
///
/// While `conflicts` is above zero, each revision-checked write is refused as
/// a concurrent modification and the counter is decremented.
pub struct CountingStore {
    inner: SqliteCollection,
    pub replace_calls: AtomicUsize,
    pub fail_writes: AtomicBool,
    pub conflicts: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: SqliteCollection) -> Self {
        Self {
            inner,
            replace_calls: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            conflicts: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CollectionStore for CountingStore {
    fn collection(&self) -> Collection {
        self.inner.collection()
    }

    async fn load_all(&self) -> Vec<DocumentRecord> {
        self.inner.load_all().await
    }

    async fn get(&self, id: &RecordId) -> StoreResult<Option<DocumentRecord>> {
        self.inner.get(id).await
    }

    async fn insert(&self, record: &DocumentRecord) -> StoreResult<()> {
        self.check()?;
        self.inner.insert(record).await
    }

    async fn update(&self, record: &DocumentRecord) -> StoreResult<()> {
        self.check()?;
        self.inner.update(record).await
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete(id).await
    }

    async fn replace_all(&self, records: &[DocumentRecord]) -> StoreResult<()> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.replace_all(records).await
    }

    async fn revision(&self) -> StoreResult<u64> {
        self.inner.revision().await
    }

    async fn replace_all_at(
        &self,
        expected_revision: u64,
        records: &[DocumentRecord],
    ) -> StoreResult<u64> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let refused = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(StoreError::ConcurrentModification {
                collection: self.inner.collection(),
                expected: expected_revision,
                actual: expected_revision + 1,
            });
        }
        self.inner.replace_all_at(expected_revision, records).await
    }
}

pub fn coordinator(
    rasterizer: Arc<FakeRasterizer>,
    fetcher: Arc<FakeFetcher>,
    max_concurrent: usize,
) -> IngestionCoordinator {
    IngestionCoordinator::new(rasterizer, fetcher).with_max_concurrent(max_concurrent)
}
