//! `update-index` against a stub engine

use std::fs;
use std::sync::{Arc, Mutex};

use assert_cmd::assert::{Assert, OutputAssertExt};
use assert_cmd::Command;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::{Json, Router};
use predicates::prelude::*;
use serde_json::{json, Value};

/// Engine where `catalog` points at `catalog_1` with 100 records and every
/// new index reports `new_count` records
#[derive(Clone)]
struct Stub {
    new_count: u64,
    alias_updates: Arc<Mutex<Vec<String>>>,
}

async fn handle(
    State(stub): State<Stub>,
    method: Method,
    uri: Uri,
    body: String,
) -> (StatusCode, Json<Value>) {
    let path = uri.path().to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match (method.as_str(), segments.as_slice()) {
        ("GET", ["_alias", "catalog"]) => (
            StatusCode::OK,
            Json(json!({ "catalog_1": { "aliases": { "catalog": {} } } })),
        ),
        ("GET", ["catalog", "_count"]) => (StatusCode::OK, Json(json!({ "count": 100 }))),
        ("GET", [_, "_count"]) => (StatusCode::OK, Json(json!({ "count": stub.new_count }))),
        ("PUT", [_]) => (StatusCode::OK, Json(json!({ "acknowledged": true }))),
        ("POST", [_, "modelresult", "_bulk"]) => {
            (StatusCode::OK, Json(json!({ "errors": false, "items": [] })))
        }
        ("POST", [_, "_refresh"]) => (StatusCode::OK, Json(json!({}))),
        ("POST", ["_aliases"]) => {
            stub.alias_updates.lock().unwrap().push(body);
            (StatusCode::OK, Json(json!({ "acknowledged": true })))
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))),
    }
}

async fn spawn_stub(new_count: u64) -> (String, Stub) {
    let stub = Stub {
        new_count,
        alias_updates: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new().fallback(handle).with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), stub)
}

/// Run `update-index` off the runtime so the stub keeps serving
async fn update_index(url: &str, extra: &[&str]) -> Assert {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("discovery.toml");
    fs::write(&config, format!("[engine]\nurl = \"{}\"\ntimeout_secs = 5\n", url)).unwrap();
    let documents = dir.path().join("docs.ndjson");
    fs::write(
        &documents,
        concat!(
            r#"{"django_ct": "course_metadata.courserun", "django_id": 1, "title": "Intro"}"#,
            "\n",
            r#"{"django_ct": "course_metadata.courserun", "django_id": 2, "title": "Physics"}"#,
            "\n",
        ),
    )
    .unwrap();

    let extra: Vec<String> = extra.iter().map(|s| s.to_string()).collect();
    let output = tokio::task::spawn_blocking(move || {
        let output = Command::cargo_bin("discovery")
            .unwrap()
            .env_remove("DISCOVERY_CONFIG")
            .env_remove("RUST_LOG")
            .args(["update-index", "--documents"])
            .arg(&documents)
            .arg("--config")
            .arg(&config)
            .args(&extra)
            .output()
            .unwrap();
        drop(dir);
        output
    })
    .await
    .unwrap();
    output.assert()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_sanity_check_exits_non_zero() {
    let (url, stub) = spawn_stub(150).await;

    update_index(&url, &[])
        .await
        .failure()
        .stderr(predicate::str::contains("Sanity check failed"));

    assert!(stub.alias_updates.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_sanity_check_swaps_alias() {
    let (url, stub) = spawn_stub(150).await;

    update_index(&url, &["--sanity-check-disabled", "-f", "json"])
        .await
        .success()
        .stdout(predicate::str::contains("\"record_count\": 150"));

    let updates = stub.alias_updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    let body: Value = serde_json::from_str(&updates[0]).unwrap();
    assert_eq!(body["actions"][1], json!({ "remove": { "index": "catalog_1", "alias": "catalog" } }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_change_within_threshold_swaps_alias() {
    let (url, stub) = spawn_stub(105).await;

    update_index(&url, &[]).await.success();
    assert_eq!(stub.alias_updates.lock().unwrap().len(), 1);
}
