//! One-time transfer of legacy flat-storage newsletters into the cache store

use thiserror::Error;

use crate::db::{CollectionStore, StoreError};
use crate::document::{DocumentError, DocumentRecord};

use super::legacy::{KeyValueStore, LegacyError, DEFAULT_LEGACY_KEY};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Legacy storage error: {0}")]
    Legacy(#[from] LegacyError),

    #[error("Legacy records do not decode: {0}")]
    Decode(#[from] DocumentError),

    #[error("Failed to write migrated records: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Key absent or holding an empty list
    NothingToMigrate,
    /// Records copied into the store and the legacy key removed
    Migrated(usize),
}

/// Moves the records under one legacy key into a collection
#[derive(Debug, Clone)]
pub struct LegacyMigration {
    key: String,
}

impl Default for LegacyMigration {
    fn default() -> Self {
        Self::new(DEFAULT_LEGACY_KEY)
    }
}

impl LegacyMigration {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Key under which records that failed to decode are parked
    pub fn rejected_key(&self) -> String {
        format!("{}.rejected", self.key)
    }

    /// Run the migration
    ///
    /// Elements that fail to decode or validate are parked under
    /// [`rejected_key`](Self::rejected_key) and the rest are migrated. The
    /// legacy key is removed only after the store write succeeded. If the
    /// value is not a list, or no element is usable, the key is left in
    /// place so a later start can retry.
    pub async fn run(
        &self,
        legacy: &dyn KeyValueStore,
        store: &dyn CollectionStore,
    ) -> Result<MigrationOutcome, MigrationError> {
        let Some(raw) = legacy.get(&self.key).await? else {
            return Ok(MigrationOutcome::NothingToMigrate);
        };

        let values: Vec<serde_json::Value> =
            serde_json::from_str(&raw).map_err(DocumentError::from)?;
        if values.is_empty() {
            tracing::debug!(key = %self.key, "Legacy key holds no records");
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let collection = store.collection();
        let mut records = Vec::with_capacity(values.len());
        let mut rejected = Vec::new();
        let mut first_error = None;
        for (index, value) in values.into_iter().enumerate() {
            match DocumentRecord::decode_value(collection, value.clone()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(key = %self.key, index, error = %e, "Rejected legacy record");
                    first_error.get_or_insert(e);
                    rejected.push(value);
                }
            }
        }

        if let (true, Some(e)) = (records.is_empty(), first_error) {
            return Err(MigrationError::Decode(e));
        }

        store.replace_all(&records).await?;
        let rejected_count = rejected.len();
        if rejected_count > 0 {
            let parked = serde_json::Value::Array(rejected).to_string();
            legacy.set(&self.rejected_key(), &parked).await?;
        }
        legacy.remove(&self.key).await?;

        tracing::info!(
            key = %self.key,
            collection = %collection,
            count = records.len(),
            rejected = rejected_count,
            "Migrated legacy records"
        );

        Ok(MigrationOutcome::Migrated(records.len()))
    }

    /// Run the migration, logging failures instead of returning them
    pub async fn run_or_skip(
        &self,
        legacy: &dyn KeyValueStore,
        store: &dyn CollectionStore,
    ) -> MigrationOutcome {
        match self.run(legacy, store).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    error = %e,
                    "Legacy migration failed, continuing without it"
                );
                MigrationOutcome::NothingToMigrate
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DocumentStore;
    use crate::document::{Collection, RecordId};
    use crate::ingest::legacy::JsonFileStore;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, DocumentStore, JsonFileStore) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path(), "portal-cache", 3).await.unwrap();
        let legacy = JsonFileStore::new(dir.path().join("legacy-storage.json"));
        (dir, store, legacy)
    }

    #[tokio::test]
    async fn test_migrates_and_removes_key() {
        let (_dir, store, legacy) = setup().await;
        legacy
            .set(
                "newsletters",
                r#"[{"id": 1, "title": "창간호", "date": "2020-01-01", "cover": ""}]"#,
            )
            .await
            .unwrap();

        let newsletters = store.collection(Collection::Newsletters);
        let outcome = LegacyMigration::default().run(&legacy, &newsletters).await.unwrap();

        assert_eq!(outcome, MigrationOutcome::Migrated(1));
        let records = newsletters.load_all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, RecordId::Numeric(1));
        assert_eq!(legacy.get("newsletters").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_absent_key_is_noop() {
        let (_dir, store, legacy) = setup().await;
        let newsletters = store.collection(Collection::Newsletters);

        let outcome = LegacyMigration::default().run(&legacy, &newsletters).await.unwrap();

        assert_eq!(outcome, MigrationOutcome::NothingToMigrate);
        assert!(newsletters.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_list_keeps_key() {
        let (_dir, store, legacy) = setup().await;
        legacy.set("newsletters", "[]").await.unwrap();
        let newsletters = store.collection(Collection::Newsletters);

        let outcome = LegacyMigration::default().run(&legacy, &newsletters).await.unwrap();

        assert_eq!(outcome, MigrationOutcome::NothingToMigrate);
        assert!(legacy.get("newsletters").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_undecodable_records_keep_key() {
        let (_dir, store, legacy) = setup().await;
        legacy.set("newsletters", r#"[{"id": "abc"}]"#).await.unwrap();
        let newsletters = store.collection(Collection::Newsletters);
        let migration = LegacyMigration::default();

        assert!(matches!(
            migration.run(&legacy, &newsletters).await,
            Err(MigrationError::Decode(_))
        ));
        assert_eq!(
            migration.run_or_skip(&legacy, &newsletters).await,
            MigrationOutcome::NothingToMigrate
        );
        assert!(legacy.get("newsletters").await.unwrap().is_some());
        assert!(newsletters.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_list_value_keeps_key() {
        let (_dir, store, legacy) = setup().await;
        legacy.set("newsletters", r#"{"id": 1}"#).await.unwrap();
        let newsletters = store.collection(Collection::Newsletters);

        assert!(matches!(
            LegacyMigration::default().run(&legacy, &newsletters).await,
            Err(MigrationError::Decode(_))
        ));
        assert!(legacy.get("newsletters").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bad_records_are_parked_and_the_rest_migrated() {
        let (_dir, store, legacy) = setup().await;
        legacy
            .set(
                "newsletters",
                r#"[
                    {"id": 1, "title": "창간호", "date": "2020-01-01"},
                    {"id": "abc", "title": "잘못된 id", "date": "2020-02-01"},
                    {"id": 3, "title": "셋째 호", "date": "어제"},
                    {"id": 4, "title": "넷째 호", "date": "2020-04-01"}
                ]"#,
            )
            .await
            .unwrap();
        let newsletters = store.collection(Collection::Newsletters);
        let migration = LegacyMigration::default();

        let outcome = migration.run(&legacy, &newsletters).await.unwrap();

        assert_eq!(outcome, MigrationOutcome::Migrated(2));
        let ids: Vec<_> = newsletters.load_all().await.into_iter().map(|r| r.id).collect();
        assert!(ids.contains(&RecordId::Numeric(1)));
        assert!(ids.contains(&RecordId::Numeric(4)));
        assert_eq!(ids.len(), 2);
        assert_eq!(legacy.get("newsletters").await.unwrap(), None);

        let parked = legacy.get(&migration.rejected_key()).await.unwrap().unwrap();
        let parked: Vec<serde_json::Value> = serde_json::from_str(&parked).unwrap();
        assert_eq!(parked.len(), 2);
        assert_eq!(parked[0]["id"], "abc");
        assert_eq!(parked[1]["id"], 3);
    }
}
