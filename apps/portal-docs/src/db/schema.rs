//! Versioned schema management
//!
//! The schema version lives in SQLite's `user_version`. Each collection is
//! introduced at a version; opening the store at a version creates every
//! collection introduced at or below it and leaves existing tables alone.

use sqlx::{SqliteConnection, SqlitePool};

use crate::document::Collection;

use super::error::{StoreError, StoreResult};

/// Read the schema version recorded on disk (0 for a fresh file)
pub async fn current_version(pool: &SqlitePool) -> StoreResult<u32> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    Ok(version.max(0) as u32)
}

/// Bring the schema up to `target`
///
/// Returns the version found before the upgrade.
pub async fn upgrade(pool: &SqlitePool, target: u32) -> StoreResult<u32> {
    if target == 0 {
        return Err(StoreError::InvalidVersion(target));
    }

    let found = current_version(pool).await?;
    if target < found {
        return Err(StoreError::VersionDowngrade {
            found,
            requested: target,
        });
    }

    let mut tx = pool.begin().await?;

    sqlx::query(REVISIONS_SQL).execute(&mut *tx).await?;

    for collection in collections_at(target) {
        create_collection(&mut *tx, collection).await?;
    }

    if target > found {
        let pragma = format!("PRAGMA user_version = {}", target);
        sqlx::query(&pragma).execute(&mut *tx).await?;
    }

    tx.commit().await?;

    if target > found {
        tracing::info!(from = found, to = target, "Upgraded document cache schema");
    }

    Ok(found)
}

/// Collections that exist at a schema version
pub fn collections_at(version: u32) -> impl Iterator<Item = Collection> {
    Collection::ALL
        .into_iter()
        .filter(move |c| c.introduced_in() <= version)
}

/// Names of collection tables actually present on disk
pub async fn existing_tables(pool: &SqlitePool) -> StoreResult<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(names
        .into_iter()
        .filter(|name| Collection::ALL.iter().any(|c| c.table_name() == name.as_str()))
        .collect())
}

async fn create_collection(conn: &mut SqliteConnection, collection: Collection) -> StoreResult<()> {
    let table = collection.table_name();
    let sql = format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    sort_date TEXT NOT NULL,
    -- Full record as JSON
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_{table}_sort_date ON {table}(sort_date);
"#
    );

    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

const REVISIONS_SQL: &str = r#"
-- Monotonic write counter per collection
CREATE TABLE IF NOT EXISTS collection_revisions (
    collection TEXT PRIMARY KEY,
    revision INTEGER NOT NULL DEFAULT 0
);
"#;
