//! Per-collection record repository

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::document::{Collection, DocumentRecord, RecordId};

use super::error::{StoreError, StoreResult};
use super::CollectionStore;

/// SQLite-backed repository for one collection
#[derive(Clone)]
pub struct SqliteCollection {
    pool: SqlitePool,
    collection: Collection,
    /// Schema version the store was opened at
    version: u32,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    body: String,
}

impl SqliteCollection {
    pub(crate) fn new(pool: SqlitePool, collection: Collection, version: u32) -> Self {
        Self {
            pool,
            collection,
            version,
        }
    }

    fn table(&self) -> &'static str {
        self.collection.table_name()
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.collection.introduced_in() <= self.version {
            Ok(())
        } else {
            Err(StoreError::MissingCollection {
                collection: self.collection,
                version: self.version,
            })
        }
    }

    /// Load every record, propagating storage failures
    ///
    /// Rows whose body no longer decodes are skipped with a warning.
    pub async fn try_load_all(&self) -> StoreResult<Vec<DocumentRecord>> {
        self.ensure_available()?;

        let sql = format!("SELECT id, body FROM {}", self.table());
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_str::<DocumentRecord>(&row.body) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        collection = %self.collection,
                        id = %row.id,
                        error = %e,
                        "Skipping undecodable record"
                    );
                    None
                }
            })
            .collect();

        Ok(records)
    }

    async fn replace_rows(
        &self,
        conn: &mut SqliteConnection,
        records: &[DocumentRecord],
    ) -> StoreResult<()> {
        let sql = format!("DELETE FROM {}", self.table());
        sqlx::query(&sql).execute(&mut *conn).await?;

        for record in records {
            self.insert_row(conn, record).await?;
        }
        Ok(())
    }

    async fn insert_row(&self, conn: &mut SqliteConnection, record: &DocumentRecord) -> StoreResult<()> {
        let body = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO {} (id, title, sort_date, body, updated_at) VALUES (?, ?, ?, ?, ?)",
            self.table()
        );

        let result = sqlx::query(&sql)
            .bind(record.id.key())
            .bind(&record.title)
            .bind(&record.date)
            .bind(&body)
            .bind(&now)
            .execute(&mut *conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateId {
                    collection: self.collection,
                    id: record.id.key(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CollectionStore for SqliteCollection {
    fn collection(&self) -> Collection {
        self.collection
    }

    async fn load_all(&self) -> Vec<DocumentRecord> {
        match self.try_load_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    collection = %self.collection,
                    error = %e,
                    "Failed to load collection, returning empty result"
                );
                Vec::new()
            }
        }
    }

    async fn get(&self, id: &RecordId) -> StoreResult<Option<DocumentRecord>> {
        self.ensure_available()?;

        let sql = format!("SELECT body FROM {} WHERE id = ?", self.table());
        let body: Option<String> = sqlx::query_scalar(&sql)
            .bind(id.key())
            .fetch_optional(&self.pool)
            .await?;

        body.map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(Into::into)
    }

    async fn insert(&self, record: &DocumentRecord) -> StoreResult<()> {
        self.ensure_available()?;
        let mut tx = self.pool.begin().await?;

        self.insert_row(&mut tx, record).await?;
        bump_revision(&mut tx, self.collection).await?;
        tx.commit().await?;

        tracing::debug!(collection = %self.collection, id = %record.id, "Inserted record");
        Ok(())
    }

    async fn update(&self, record: &DocumentRecord) -> StoreResult<()> {
        self.ensure_available()?;
        let body = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            r#"
            INSERT INTO {} (id, title, sort_date, body, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                sort_date = excluded.sort_date,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
            self.table()
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql)
            .bind(record.id.key())
            .bind(&record.title)
            .bind(&record.date)
            .bind(&body)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        bump_revision(&mut tx, self.collection).await?;
        tx.commit().await?;

        tracing::debug!(collection = %self.collection, id = %record.id, "Updated record");
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<bool> {
        self.ensure_available()?;
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table());

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(&sql).bind(id.key()).execute(&mut *tx).await?;
        let removed = result.rows_affected() > 0;
        if removed {
            bump_revision(&mut tx, self.collection).await?;
        }
        tx.commit().await?;

        Ok(removed)
    }

    async fn revision(&self) -> StoreResult<u64> {
        self.ensure_available()?;
        let mut conn = self.pool.acquire().await?;
        read_revision(&mut conn, self.collection).await
    }

    async fn replace_all_at(
        &self,
        expected_revision: u64,
        records: &[DocumentRecord],
    ) -> StoreResult<u64> {
        self.ensure_available()?;
        let mut tx = self.pool.begin().await?;

        // Bump first so the transaction holds the write lock before the check
        let revision = bump_revision(&mut tx, self.collection).await?;
        let actual = revision - 1;
        if actual != expected_revision {
            return Err(StoreError::ConcurrentModification {
                collection: self.collection,
                expected: expected_revision,
                actual,
            });
        }

        self.replace_rows(&mut tx, records).await?;
        tx.commit().await?;

        tracing::debug!(
            collection = %self.collection,
            count = records.len(),
            revision,
            "Replaced collection at revision"
        );
        Ok(revision)
    }

    async fn replace_all(&self, records: &[DocumentRecord]) -> StoreResult<()> {
        self.ensure_available()?;

        // Clear and reinsert in one commit
        let mut tx = self.pool.begin().await?;
        self.replace_rows(&mut tx, records).await?;
        bump_revision(&mut tx, self.collection).await?;
        tx.commit().await?;

        tracing::debug!(
            collection = %self.collection,
            count = records.len(),
            "Replaced collection"
        );
        Ok(())
    }
}

async fn read_revision(conn: &mut SqliteConnection, collection: Collection) -> StoreResult<u64> {
    let revision: Option<i64> =
        sqlx::query_scalar("SELECT revision FROM collection_revisions WHERE collection = ?")
            .bind(collection.table_name())
            .fetch_optional(&mut *conn)
            .await?;

    Ok(revision.unwrap_or(0).max(0) as u64)
}

async fn bump_revision(conn: &mut SqliteConnection, collection: Collection) -> StoreResult<u64> {
    sqlx::query(
        r#"
        INSERT INTO collection_revisions (collection, revision)
        VALUES (?, 1)
        ON CONFLICT(collection) DO UPDATE SET revision = revision + 1
        "#,
    )
    .bind(collection.table_name())
    .execute(&mut *conn)
    .await?;

    read_revision(conn, collection).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DocumentStore;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir, version: u32) -> DocumentStore {
        DocumentStore::open(dir.path(), "portal-cache", version)
            .await
            .unwrap()
    }

    fn newsletter(id: i64, date: &str) -> DocumentRecord {
        DocumentRecord::numeric(id, format!("사보 {}", id), date)
            .with_pdf_path(format!("/pdfs/{}.pdf", id))
    }

    #[tokio::test]
    async fn test_insert_then_load() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3).await;
        let newsletters = store.collection(Collection::Newsletters);

        let record = newsletter(13, "2022-12-31");
        newsletters.insert(&record).await.unwrap();

        let loaded = newsletters.load_all().await;
        assert_eq!(loaded, vec![record.clone()]);
        let fetched = newsletters.get(&record.id).await.unwrap();
        assert_eq!(fetched, Some(record));
    }

    #[tokio::test]
    async fn test_insert_duplicate_fails() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3).await;
        let newsletters = store.collection(Collection::Newsletters);

        newsletters.insert(&newsletter(13, "2022-12-31")).await.unwrap();
        let result = newsletters.insert(&newsletter(13, "2023-01-01")).await;

        assert!(matches!(result, Err(StoreError::DuplicateId { .. })));
        assert_eq!(newsletters.load_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_is_idempotent_upsert() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3).await;
        let newsletters = store.collection(Collection::Newsletters);

        let original = newsletter(14, "2023-12-31");
        newsletters.insert(&original).await.unwrap();

        let mut renamed = original.clone();
        renamed.title = "2023 사보 (개정)".to_string();
        newsletters.update(&renamed).await.unwrap();
        newsletters.update(&renamed).await.unwrap();

        let loaded = newsletters.load_all().await;
        assert_eq!(loaded, vec![renamed]);

        // Update of an unknown id inserts it
        newsletters.update(&newsletter(99, "2020-01-01")).await.unwrap();
        assert_eq!(newsletters.load_all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3).await;
        let newsletters = store.collection(Collection::Newsletters);

        let record = newsletter(15, "2024-12-31");
        newsletters.insert(&record).await.unwrap();

        assert!(newsletters.delete(&record.id).await.unwrap());
        assert!(!newsletters.delete(&record.id).await.unwrap());
        assert!(newsletters.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_all_clears_previous() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3).await;
        let newsletters = store.collection(Collection::Newsletters);

        newsletters.insert(&newsletter(1, "2020-01-01")).await.unwrap();
        let replacement = vec![newsletter(13, "2022-12-31"), newsletter(14, "2023-12-31")];
        newsletters.replace_all(&replacement).await.unwrap();

        let mut ids: Vec<String> = newsletters.load_all().await.iter().map(|r| r.id.key()).collect();
        ids.sort();
        assert_eq!(ids, vec!["13", "14"]);
    }

    #[tokio::test]
    async fn test_replace_all_rolls_back_on_duplicate() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3).await;
        let newsletters = store.collection(Collection::Newsletters);

        newsletters.insert(&newsletter(1, "2020-01-01")).await.unwrap();
        let result = newsletters
            .replace_all(&[newsletter(2, "2021-01-01"), newsletter(2, "2021-01-01")])
            .await;

        assert!(result.is_err());
        let loaded = newsletters.load_all().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, RecordId::Numeric(1));
    }

    #[tokio::test]
    async fn test_collections_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3).await;

        store
            .collection(Collection::Newsletters)
            .insert(&newsletter(1, "2020-01-01"))
            .await
            .unwrap();
        store
            .collection(Collection::Regulations)
            .insert(&DocumentRecord::text("hr-01", "취업규칙", "2024-03-01"))
            .await
            .unwrap();

        assert_eq!(store.collection(Collection::Newsletters).load_all().await.len(), 1);
        assert!(store.collection(Collection::Brochures).load_all().await.is_empty());
        assert_eq!(store.collection(Collection::Regulations).load_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_revision_stamps() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3).await;
        let newsletters = store.collection(Collection::Newsletters);

        assert_eq!(newsletters.revision().await.unwrap(), 0);
        newsletters.insert(&newsletter(1, "2020-01-01")).await.unwrap();
        assert_eq!(newsletters.revision().await.unwrap(), 1);

        let rev = newsletters
            .replace_all_at(1, &[newsletter(2, "2021-01-01")])
            .await
            .unwrap();
        assert_eq!(rev, 2);

        let stale = newsletters.replace_all_at(1, &[]).await;
        assert!(matches!(
            stale,
            Err(StoreError::ConcurrentModification { expected: 1, actual: 2, .. })
        ));
        assert_eq!(newsletters.load_all().await.len(), 1);
        // A refused write leaves the stamp alone
        assert_eq!(newsletters.revision().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_collection_at_old_version() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 1).await;
        let regulations = store.collection(Collection::Regulations);

        assert!(regulations.load_all().await.is_empty());
        let result = regulations
            .insert(&DocumentRecord::text("hr-01", "취업규칙", "2024-03-01"))
            .await;
        assert!(matches!(result, Err(StoreError::MissingCollection { .. })));
    }
}
