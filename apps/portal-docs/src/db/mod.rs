//! Document cache store
//!
//! A versioned SQLite database holding the newsletter, brochure and
//! regulation collections, each keyed by record id.

mod collection;
mod error;
mod schema;

pub use collection::SqliteCollection;
pub use error::{StoreError, StoreResult};
pub use schema::{collections_at, current_version, existing_tables, upgrade};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};

use crate::document::{Collection, DocumentRecord, RecordId};

/// Operations on one collection
///
/// Reads never fail: `load_all` degrades to an empty result. Writes propagate
/// `StoreError` to the caller.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Which collection this handle writes to
    fn collection(&self) -> Collection;

    /// Every record, unordered; empty on storage failure
    async fn load_all(&self) -> Vec<DocumentRecord>;

    /// Point lookup by id
    async fn get(&self, id: &RecordId) -> StoreResult<Option<DocumentRecord>>;

    /// Add a record; fails if the id already exists
    async fn insert(&self, record: &DocumentRecord) -> StoreResult<()>;

    /// Insert or replace by id
    async fn update(&self, record: &DocumentRecord) -> StoreResult<()>;

    /// Remove a record; returns false if it was absent
    async fn delete(&self, id: &RecordId) -> StoreResult<bool>;

    /// Clear the collection and insert the given records
    async fn replace_all(&self, records: &[DocumentRecord]) -> StoreResult<()>;

    /// Revision stamp, bumped by every successful write (0 if never written)
    async fn revision(&self) -> StoreResult<u64>;

    /// `replace_all`, but only if the revision is still `expected_revision`
    ///
    /// Fails with `StoreError::ConcurrentModification` otherwise. Returns the
    /// new revision.
    async fn replace_all_at(
        &self,
        expected_revision: u64,
        records: &[DocumentRecord],
    ) -> StoreResult<u64>;
}

/// Handle to the versioned cache database
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    version: u32,
    path: PathBuf,
}

impl DocumentStore {
    /// Open (creating if missing) `{data_dir}/{name}.sqlite` at a schema version
    ///
    /// Opening at a higher version than recorded creates the collections the
    /// new version introduces. Existing collections are left untouched.
    pub async fn open(data_dir: impl AsRef<Path>, name: &str, version: u32) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir).await?;

        let path = data_dir.join(format!("{}.sqlite", name));
        let pool = create_pool(&path).await?;
        let previous = upgrade(&pool, version).await?;

        tracing::debug!(
            name = name,
            path = %path.display(),
            previous_version = previous,
            version = version,
            "Opened document cache store"
        );

        Ok(Self {
            pool,
            version,
            path,
        })
    }

    /// Repository for one collection
    pub fn collection(&self, collection: Collection) -> SqliteCollection {
        SqliteCollection::new(self.pool.clone(), collection, self.version)
    }

    /// Collections available at the opened version
    pub fn collections(&self) -> Vec<Collection> {
        collections_at(self.version).collect()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Create a new database connection pool for a SQLite file
pub async fn create_pool(path: &Path) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
