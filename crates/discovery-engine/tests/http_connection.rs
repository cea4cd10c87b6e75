//! HttpConnection against a stub Elasticsearch server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::{Json, Router};
use discovery_core::IndexDocument;
use discovery_engine::{AliasAction, EngineConnection, EngineError, HttpConnection};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Stub {
    requests: Arc<Mutex<Vec<(Method, String, String)>>>,
}

async fn handle(
    State(stub): State<Stub>,
    method: Method,
    uri: Uri,
    body: String,
) -> (StatusCode, Json<Value>) {
    let path = uri.path().to_string();
    stub.requests
        .lock()
        .unwrap()
        .push((method.clone(), uri.to_string(), body.clone()));

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["_cluster", "health"]) => (StatusCode::OK, Json(json!({ "status": "yellow" }))),
        ("POST", ["down", _, "_search"]) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no shards available" })),
        ),
        ("POST", [_, _, "_search"]) => (
            StatusCode::OK,
            Json(json!({ "hits": { "total": 1, "hits": [] }, "echo": serde_json::from_str::<Value>(&body).unwrap() })),
        ),
        ("GET", ["missing", "_count"]) => (StatusCode::NOT_FOUND, Json(json!({}))),
        ("GET", [_, "_count"]) => (StatusCode::OK, Json(json!({ "count": 42 }))),
        ("GET", ["_alias", "catalog"]) => (
            StatusCode::OK,
            Json(json!({ "catalog_20160621_000000": { "aliases": { "catalog": {} } } })),
        ),
        ("GET", ["_alias", _]) => (StatusCode::NOT_FOUND, Json(json!({}))),
        ("POST", ["_aliases"]) => (StatusCode::OK, Json(json!({ "acknowledged": true }))),
        ("PUT", ["existing"]) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "IndexAlreadyExistsException[[existing] already exists]" })),
        ),
        ("PUT", [_]) => (StatusCode::OK, Json(json!({ "acknowledged": true }))),
        ("POST", ["broken", _, "_bulk"]) => (
            StatusCode::OK,
            Json(json!({
                "errors": true,
                "items": [
                    { "index": { "_id": "a", "status": 201 } },
                    { "index": { "_id": "b", "status": 400, "error": "MapperParsingException" } },
                ]
            })),
        ),
        ("POST", [_, _, "_bulk"]) => (StatusCode::OK, Json(json!({ "errors": false, "items": [] }))),
        ("POST", [_, "_refresh"]) => (StatusCode::OK, Json(json!({}))),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "no route" }))),
    }
}

async fn spawn_stub() -> (HttpConnection, Stub) {
    let stub = Stub::default();
    let app = Router::new().fallback(handle).with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let conn = HttpConnection::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
    (conn, stub)
}

#[tokio::test]
async fn test_search_posts_body_to_doc_type() {
    let (conn, stub) = spawn_stub().await;
    let body = json!({ "query": { "match_all": {} }, "from": 0 });

    let response = conn.search("catalog", "modelresult", &body).await.unwrap();
    assert_eq!(response["hits"]["total"], 1);
    assert_eq!(response["echo"], body);

    let requests = stub.requests.lock().unwrap();
    let (method, uri, _) = &requests[0];
    assert_eq!(method, Method::POST);
    assert_eq!(uri, "/catalog/modelresult/_search?_source=true");
}

#[tokio::test]
async fn test_search_error_status() {
    let (conn, _) = spawn_stub().await;
    let err = conn
        .search("down", "modelresult", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_unreachable_engine() {
    let conn = HttpConnection::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
    let err = conn.count("catalog").await.unwrap_err();
    assert!(matches!(err, EngineError::Http(_)));
}

#[tokio::test]
async fn test_count() {
    let (conn, _) = spawn_stub().await;
    assert_eq!(conn.count("catalog").await.unwrap(), 42);
    assert!(matches!(
        conn.count("missing").await,
        Err(EngineError::IndexNotFound(_))
    ));
}

#[tokio::test]
async fn test_alias_targets() {
    let (conn, _) = spawn_stub().await;
    assert_eq!(
        conn.alias_targets("catalog").await.unwrap(),
        vec!["catalog_20160621_000000".to_string()]
    );
    assert!(conn.alias_targets("other").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_aliases_sends_actions() {
    let (conn, stub) = spawn_stub().await;
    conn.update_aliases(&[
        AliasAction::add("catalog_new", "catalog"),
        AliasAction::remove("catalog_old", "catalog"),
    ])
    .await
    .unwrap();

    let requests = stub.requests.lock().unwrap();
    let (_, uri, body) = &requests[0];
    assert_eq!(uri, "/_aliases");
    let body: Value = serde_json::from_str(body).unwrap();
    assert_eq!(
        body,
        json!({ "actions": [
            { "add": { "index": "catalog_new", "alias": "catalog" } },
            { "remove": { "index": "catalog_old", "alias": "catalog" } },
        ] })
    );
}

#[tokio::test]
async fn test_create_index() {
    let (conn, _) = spawn_stub().await;
    conn.create_index("catalog_new", &json!({ "settings": {} }))
        .await
        .unwrap();
    assert!(matches!(
        conn.create_index("existing", &json!({})).await,
        Err(EngineError::IndexExists(_))
    ));
}

#[tokio::test]
async fn test_bulk_index() {
    let (conn, stub) = spawn_stub().await;
    let docs = vec![
        IndexDocument::new("course_metadata.course", "1"),
        IndexDocument::new("course_metadata.course", "2"),
    ];

    conn.bulk_index("catalog_new", "modelresult", &docs)
        .await
        .unwrap();
    {
        let requests = stub.requests.lock().unwrap();
        let (_, uri, body) = &requests[0];
        assert_eq!(uri, "/catalog_new/modelresult/_bulk");
        assert_eq!(body.lines().count(), 4);
    }

    let err = conn
        .bulk_index("broken", "modelresult", &docs)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Bulk { failed: 1, total: 2 }));
}

#[tokio::test]
async fn test_health_and_refresh() {
    let (conn, _) = spawn_stub().await;
    assert!(conn.health_check().await.unwrap());
    conn.refresh("catalog_new").await.unwrap();
}
