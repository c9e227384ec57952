//! HTTP API integration tests.
//!
//! Each test boots the router on an ephemeral port and drives it with a
//! real HTTP client.

use kombu_server::http::{router, AppState};
use kombu_server::metrics::ApiMetrics;
use kombu_store::{HashEmbedder, LibraryService, SnapshotFormat, StoreConfig};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn_server(data_dir: &std::path::Path) -> SocketAddr {
    let provider = Arc::new(HashEmbedder::new(8, 0));
    let service = Arc::new(LibraryService::new(provider, StoreConfig::default()));

    let state = AppState {
        service,
        metrics: Arc::new(ApiMetrics::new()),
        snapshot_path: data_dir.join("kombu.snapshot"),
        snapshot_format: SnapshotFormat::Json,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

async fn create_library(client: &reqwest::Client, base: &str, body: Value) -> Value {
    let resp = client
        .post(format!("{}/v1/libraries", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn library_document_chunk_crud() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path()).await;
    let base = format!("http://{}", addr);
    let client = reqwest::Client::new();

    // Create a brute-force library.
    let library = create_library(
        &client,
        &base,
        json!({
            "name": "notes",
            "description": "test library",
            "kind": "brute_force",
            "dimension": 8,
            "metadata": {"owner": "tests"},
        }),
    )
    .await;
    let library_id = library["id"].as_str().unwrap().to_string();
    assert_eq!(library["kind"], "brute_force");
    assert_eq!(library["dimension"], 8);

    // List shows it.
    let listed: Value = client
        .get(format!("{}/v1/libraries", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Create a document.
    let document: Value = {
        let resp = client
            .post(format!("{}/v1/libraries/{}/documents", base, library_id))
            .json(&json!({"name": "journal"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        resp.json().await.unwrap()
    };
    let document_id = document["id"].as_str().unwrap().to_string();

    // Add a chunk with an explicit vector.
    let chunk: Value = {
        let resp = client
            .post(format!(
                "{}/v1/libraries/{}/documents/{}/chunks",
                base, library_id, document_id
            ))
            .json(&json!({
                "content": "hello kombu",
                "metadata": {"lang": "en"},
                "embedding": [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        resp.json().await.unwrap()
    };
    let chunk_id = chunk["id"].as_str().unwrap().to_string();

    // Fetch it back through the nested path.
    let fetched: Value = client
        .get(format!(
            "{}/v1/libraries/{}/documents/{}/chunks/{}",
            base, library_id, document_id, chunk_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["content"], "hello kombu");
    assert_eq!(fetched["metadata"]["lang"], "en");

    // Delete it.
    let resp = client
        .delete(format!(
            "{}/v1/libraries/{}/documents/{}/chunks/{}",
            base, library_id, document_id, chunk_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let resp = client
        .get(format!(
            "{}/v1/libraries/{}/documents/{}/chunks/{}",
            base, library_id, document_id, chunk_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_with_filter() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path()).await;
    let base = format!("http://{}", addr);
    let client = reqwest::Client::new();

    let library = create_library(
        &client,
        &base,
        json!({"name": "multilang", "kind": "brute_force", "dimension": 8}),
    )
    .await;
    let library_id = library["id"].as_str().unwrap().to_string();

    let document: Value = client
        .post(format!("{}/v1/libraries/{}/documents", base, library_id))
        .json(&json!({"name": "doc"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let document_id = document["id"].as_str().unwrap().to_string();

    for (text, lang) in [
        ("the cat sat", "en"),
        ("le chat est assis", "fr"),
        ("the dog ran", "en"),
    ] {
        let resp = client
            .post(format!(
                "{}/v1/libraries/{}/documents/{}/chunks",
                base, library_id, document_id
            ))
            .json(&json!({"content": text, "metadata": {"lang": lang}}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    }

    let results: Value = client
        .post(format!("{}/v1/libraries/{}/search", base, library_id))
        .json(&json!({
            "query_text": "the cat sat",
            "k": 10,
            "filter": "lang == \"en\"",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    for result in results {
        assert_eq!(result["metadata"]["lang"], "en");
    }
    // Ranked: the exact text is first with score ~1.
    assert_eq!(results[0]["content"], "the cat sat");
    assert!(results[0]["score"].as_f64().unwrap() > 0.999);
}

#[tokio::test]
async fn error_status_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path()).await;
    let base = format!("http://{}", addr);
    let client = reqwest::Client::new();

    // Missing library -> 404.
    let resp = client
        .get(format!(
            "{}/v1/libraries/00000000-0000-0000-0000-000000000000",
            base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    // Invalid parameters -> 422.
    let resp = client
        .post(format!("{}/v1/libraries", base))
        .json(&json!({"name": "bad", "kind": "brute_force", "dimension": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    // Dimension mismatch on chunk insert -> 422.
    let library = create_library(
        &client,
        &base,
        json!({"name": "dims", "kind": "brute_force", "dimension": 4}),
    )
    .await;
    let library_id = library["id"].as_str().unwrap().to_string();
    let document: Value = client
        .post(format!("{}/v1/libraries/{}/documents", base, library_id))
        .json(&json!({"name": "doc"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let document_id = document["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!(
            "{}/v1/libraries/{}/documents/{}/chunks",
            base, library_id, document_id
        ))
        .json(&json!({"content": "short", "embedding": [1.0, 0.0, 0.0]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    // Bad filter expression -> 422.
    let resp = client
        .post(format!("{}/v1/libraries/{}/search", base, library_id))
        .json(&json!({"query_text": "x", "filter": "lang ="}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn rebuild_and_snapshot_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(dir.path()).await;
    let base = format!("http://{}", addr);
    let client = reqwest::Client::new();

    let library = create_library(
        &client,
        &base,
        json!({
            "name": "hnswlib",
            "kind": "hnsw",
            "dimension": 8,
            "hnsw": {"m": 4, "m_max0": 8, "ef_construction": 16, "ef_search": 16, "seed": 42},
        }),
    )
    .await;
    let library_id = library["id"].as_str().unwrap().to_string();

    let document: Value = client
        .post(format!("{}/v1/libraries/{}/documents", base, library_id))
        .json(&json!({"name": "doc"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let document_id = document["id"].as_str().unwrap().to_string();

    for i in 0..20 {
        client
            .post(format!(
                "{}/v1/libraries/{}/documents/{}/chunks",
                base, library_id, document_id
            ))
            .json(&json!({"content": format!("entry {}", i)}))
            .send()
            .await
            .unwrap();
    }

    let resp = client
        .post(format!("{}/v1/libraries/{}/index", base, library_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let resp = client
        .post(format!("{}/v1/admin/snapshot", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(dir.path().join("kombu.snapshot").exists());

    // Health and metrics endpoints respond.
    let health = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let metrics = client
        .get(format!("{}/metrics", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("kombu_http_requests"));
}
