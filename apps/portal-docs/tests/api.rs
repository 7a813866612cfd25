//! HTTP API tests

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use portal_docs::db::DocumentStore;
use portal_docs::document::{DocumentRecord, RecordId};
use portal_docs::manifest::builtin_policies;
use portal_docs::routes;
use portal_docs::state::AppState;
use serde_json::{json, Value};
use tempfile::TempDir;

use common::{coordinator, FakeFetcher, FakeRasterizer};

async fn setup() -> (TempDir, TestServer) {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path(), "portal-cache", 3).await.unwrap();
    let coordinator = coordinator(
        Arc::new(FakeRasterizer::new(2)),
        Arc::new(FakeFetcher::default()),
        4,
    );

    let state = AppState::new(
        store,
        Arc::new(coordinator),
        builtin_policies(),
    );
    let server = TestServer::new(routes::app(state)).unwrap();
    (dir, server)
}

#[tokio::test]
async fn test_health() {
    let (_dir, server) = setup().await;

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cacheVersion"], 3);
}

#[tokio::test]
async fn test_create_newsletter_is_rasterized_immediately() {
    let (_dir, server) = setup().await;

    let response = server
        .post("/api/v1/collections/newsletters")
        .json(&json!({
            "title": "2025 사내보",
            "date": "2025-12-31",
            "fileData": "data:application/pdf;base64,JVBERi0xLjQ="
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created: DocumentRecord = response.json();
    assert!(matches!(created.id, RecordId::Numeric(_)));
    assert_eq!(created.pages.len(), 2);
    assert_eq!(created.cover, created.pages[0]);
    assert!(created.file_data.is_none());

    let fetched: DocumentRecord = server
        .get(&format!("/api/v1/collections/newsletters/{}", created.id))
        .await
        .json();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_create_regulation_gets_text_id() {
    let (_dir, server) = setup().await;

    let response = server
        .post("/api/v1/collections/regulations")
        .json(&json!({
            "title": "출장 규정",
            "lastUpdated": "2024-05-01",
            "fileUrl": "/pdfs/regulations/travel.pdf",
            "type": "규정",
            "keywords": ["출장", "경비"]
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created: DocumentRecord = response.json();
    match &created.id {
        RecordId::Text(id) => assert!(uuid::Uuid::parse_str(id).is_ok()),
        other => panic!("Expected text id, got {:?}", other),
    }
    assert!(created.pages.is_empty());
    assert_eq!(created.keywords, Some(vec!["출장".to_string(), "경비".to_string()]));
}

#[tokio::test]
async fn test_create_with_broken_upload_is_rejected() {
    let (_dir, server) = setup().await;

    let response = server
        .post("/api/v1/collections/newsletters")
        .json(&json!({
            "title": "손상된 파일",
            "date": "2025-01-01",
            "fileData": "data:application/pdf;base64,corrupt"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let listed: Vec<DocumentRecord> = server.get("/api/v1/collections/newsletters").await.json();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_create_rejects_invalid_date() {
    let (_dir, server) = setup().await;

    let response = server
        .post("/api/v1/collections/brochures")
        .json(&json!({ "title": "브로슈어", "date": "last tuesday" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_document");
}

#[tokio::test]
async fn test_unknown_collection_and_bad_ids() {
    let (_dir, server) = setup().await;

    let response = server.get("/api/v1/collections/users").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server.get("/api/v1/collections/newsletters/abc").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server.get("/api/v1/collections/newsletters/99").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reconcile_then_list_sorted() {
    let (_dir, server) = setup().await;

    let response = server.post("/api/v1/collections/newsletters/reconcile").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let report: Value = response.json();
    assert_eq!(report["collection"], "newsletters");
    assert_eq!(report["inserted"], json!([13, 14, 15]));
    assert_eq!(report["total"], 3);

    let listed: Vec<DocumentRecord> = server.get("/api/v1/collections/newsletters").await.json();
    let ids: Vec<_> = listed.iter().map(|r| r.id.clone()).collect();
    assert_eq!(
        ids,
        vec![RecordId::Numeric(15), RecordId::Numeric(14), RecordId::Numeric(13)]
    );
    assert!(listed.iter().all(|r| r.pages.len() == 2));
}

#[tokio::test]
async fn test_partial_update() {
    let (_dir, server) = setup().await;
    server.post("/api/v1/collections/newsletters/reconcile").await;

    let response = server
        .put("/api/v1/collections/newsletters/15")
        .json(&json!({ "isNew": false, "description": "연간 소식 모음" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let updated: DocumentRecord = response.json();
    assert!(!updated.is_new);
    assert_eq!(updated.title, "2024 사내보");
    assert_eq!(updated.description.as_deref(), Some("연간 소식 모음"));
    assert_eq!(updated.pages.len(), 2);

    let response = server
        .put("/api/v1/collections/newsletters/404")
        .json(&json!({ "title": "없음" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (_dir, server) = setup().await;
    server.post("/api/v1/collections/regulations/reconcile").await;

    let response = server.delete("/api/v1/collections/regulations/reg-security").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let response = server.get("/api/v1/collections/regulations/reg-security").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server.delete("/api/v1/collections/regulations/reg-security").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
}
