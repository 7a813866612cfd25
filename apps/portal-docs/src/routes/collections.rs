//! Collection API endpoints
//!
//! CRUD over the newsletter, brochure and regulation collections plus an
//! on-demand reconcile. Uploaded documents are rasterized before they are
//! stored, so a created record is READY immediately.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{CollectionStore, SqliteCollection, StoreError, StoreResult};
use crate::document::{
    sort_for_display, Collection, DocumentError, DocumentRecord, IdKind, IngestionMode, RecordId,
};
use crate::error::{AppError, Result};
use crate::ingest::ReconcileReport;
use crate::state::AppState;

/// Uploads arrive as base64 inside JSON
const MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

/// Ids tried for one create before reporting a conflict
const MAX_ID_ATTEMPTS: usize = 5;

/// Body of a create request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub title: String,
    /// Defaults to today
    #[serde(default, alias = "lastUpdated")]
    pub date: Option<String>,
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub is_new: bool,
}

/// Body of a partial update
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub title: Option<String>,
    #[serde(alias = "lastUpdated")]
    pub date: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub is_new: Option<bool>,
}

impl DocumentPatch {
    fn apply(self, record: &mut DocumentRecord) {
        if let Some(title) = self.title {
            record.title = title;
        }
        if let Some(date) = self.date {
            record.date = date;
        }
        if self.description.is_some() {
            record.description = self.description;
        }
        if self.doc_type.is_some() {
            record.doc_type = self.doc_type;
        }
        if self.keywords.is_some() {
            record.keywords = self.keywords;
        }
        if let Some(is_new) = self.is_new {
            record.is_new = is_new;
        }
    }
}

/// Create the collections router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:collection", get(list_documents).post(create_document))
        .route("/:collection/reconcile", post(reconcile_collection))
        .route(
            "/:collection/:id",
            get(get_document)
                .put(update_document)
                .delete(delete_document),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
}

/// Resolve a path segment to a collection handle available at the store version
fn open_collection(state: &AppState, name: &str) -> Result<(Collection, SqliteCollection)> {
    let collection: Collection = name
        .parse()
        .map_err(|_| AppError::NotFound(format!("Unknown collection: {}", name)))?;

    if collection.introduced_in() > state.store().version() {
        return Err(StoreError::MissingCollection {
            collection,
            version: state.store().version(),
        }
        .into());
    }

    Ok((collection, state.store().collection(collection)))
}

fn parse_id(collection: Collection, raw: &str) -> Result<RecordId> {
    RecordId::parse_for(collection, raw).map_err(|e| match e {
        DocumentError::InvalidId(msg) => AppError::BadRequest(msg),
        other => other.into(),
    })
}

fn new_id(collection: Collection) -> RecordId {
    match collection.id_kind() {
        IdKind::Numeric => RecordId::Numeric(Utc::now().timestamp_millis()),
        IdKind::Text => RecordId::Text(uuid::Uuid::new_v4().to_string()),
    }
}

/// Id to try after `id` was taken
fn next_id(id: &RecordId) -> RecordId {
    match id {
        RecordId::Numeric(n) => RecordId::Numeric(n + 1),
        RecordId::Text(_) => RecordId::Text(uuid::Uuid::new_v4().to_string()),
    }
}

/// Insert a record under a generated id, moving on to the next id while the
/// current one is taken
async fn insert_new(store: &dyn CollectionStore, record: &mut DocumentRecord) -> StoreResult<()> {
    let mut attempt = 1;
    loop {
        match store.insert(record).await {
            Err(StoreError::DuplicateId { .. }) if attempt < MAX_ID_ATTEMPTS => {
                let next = next_id(&record.id);
                tracing::debug!(
                    collection = %store.collection(),
                    taken = %record.id,
                    next = %next,
                    "Generated id already in use"
                );
                record.id = next;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// List a collection sorted for display
async fn list_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<DocumentRecord>>> {
    let (_, handle) = open_collection(&state, &name)?;
    let mut records = handle.load_all().await;
    sort_for_display(&mut records);
    Ok(Json(records))
}

/// Get one record
async fn get_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<DocumentRecord>> {
    let (collection, handle) = open_collection(&state, &name)?;
    let id = parse_id(collection, &id)?;

    let record = handle
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document not found: {}", id)))?;
    Ok(Json(record))
}

/// Create a record, rasterizing uploaded content first
async fn create_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<NewDocument>,
) -> Result<(StatusCode, Json<DocumentRecord>)> {
    let (collection, handle) = open_collection(&state, &name)?;
    let date = body
        .date
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());

    let mut record = DocumentRecord {
        pdf_path: body.pdf_path,
        file_url: body.file_url,
        file_data: body.file_data,
        description: body.description,
        doc_type: body.doc_type,
        keywords: body.keywords,
        is_new: body.is_new,
        ..DocumentRecord::new(new_id(collection), body.title, date)
    };
    record.validate(collection)?;

    let mode = state.policy(collection).mode;
    let processing = state.coordinator().ingest_record(&mut record, mode).await?;

    // Rendered pages replace the upload; cover-only records keep it for viewing
    if mode == IngestionMode::Pages && !record.pages.is_empty() {
        record.file_data = None;
    }

    insert_new(&handle, &mut record).await?;

    tracing::info!(
        collection = %collection,
        id = %record.id,
        state = ?processing,
        pages = record.pages.len(),
        "Created document"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// Apply a partial update
async fn update_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(patch): Json<DocumentPatch>,
) -> Result<Json<DocumentRecord>> {
    let (collection, handle) = open_collection(&state, &name)?;
    let id = parse_id(collection, &id)?;

    let mut record = handle
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document not found: {}", id)))?;

    patch.apply(&mut record);
    record.validate(collection)?;
    handle.update(&record).await?;

    Ok(Json(record))
}

/// Delete a record; deleting an absent id is a no-op
async fn delete_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let (collection, handle) = open_collection(&state, &name)?;
    let id = parse_id(collection, &id)?;

    if !handle.delete(&id).await? {
        tracing::debug!(collection = %collection, id = %id, "Delete of absent document");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Reconcile a collection against its policy
async fn reconcile_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ReconcileReport>> {
    let (collection, handle) = open_collection(&state, &name)?;
    let policy = state.policy(collection);
    let report = state.coordinator().reconcile(&handle, &policy).await;
    Ok(Json(report))
}
