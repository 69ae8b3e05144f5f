//! Integration tests for qms-records API endpoints
//!
//! Tests cover:
//! - Module catalog with counts
//! - Record CRUD preserving other records
//! - Search, field filters and pagination
//! - Whole-array and whole-store snapshots
//! - Malformed bodies and queries answered with the JSON error body
//! - Remote store client talking to a live server

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use qms_common::records::record_id;
use qms_common::store::{LocalStore, RecordStore, RemoteStore, SharedStore, TableStore};
use qms_records::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: app over a fresh local blob
fn setup_app() -> (TempDir, axum::Router) {
    let dir = TempDir::new().unwrap();
    let store: SharedStore = Arc::new(LocalStore::new(dir.path().join("qms_data.json")));
    (dir, build_router(AppState::new(store)))
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Test helper: send request, return status and JSON body
async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, body)
}

// =============================================================================
// Health and catalog
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app) = setup_app();
    let (status, body) = send(&app, request("GET", "/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "qms-records");
    assert_eq!(body["backend"], "local");
}

#[tokio::test]
async fn test_module_catalog_counts() {
    let (_dir, app) = setup_app();
    send(
        &app,
        request("POST", "/api/records/deviceLedger", Some(json!({"deviceName": "Lift"}))),
    )
    .await;

    let (status, body) = send(&app, request("GET", "/api/modules", None)).await;
    assert_eq!(status, StatusCode::OK);

    let modules = body.as_array().unwrap();
    let ledger = modules.iter().find(|m| m["key"] == "deviceLedger").unwrap();
    assert_eq!(ledger["label"], "Device Ledger");
    assert_eq!(ledger["count"], 1);
    let complaints = modules.iter().find(|m| m["key"] == "complaints").unwrap();
    assert_eq!(complaints["count"], 0);
}

// =============================================================================
// CRUD
// =============================================================================

#[tokio::test]
async fn test_crud_preserves_other_records() {
    let (_dir, app) = setup_app();

    let mut ids = Vec::new();
    for name in ["Zhang", "Li", "Wang"] {
        let (status, body) = send(
            &app,
            request("POST", "/api/records/complaints", Some(json!({"complainant": name}))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["createdAt"].is_string());
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    let (status, body) = send(
        &app,
        request(
            "PUT",
            &format!("/api/records/complaints/{}", ids[1]),
            Some(json!({"status": "resolved"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complainant"], "Li");
    assert_eq!(body["status"], "resolved");

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/records/complaints/{}", ids[0]), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, all) = send(&app, request("GET", "/api/data/complaints", None)).await;
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["id"], ids[1].as_str());
    assert_eq!(all[1]["id"], ids[2].as_str());
    assert_eq!(all[1]["complainant"], "Wang");
}

#[tokio::test]
async fn test_missing_record_is_404() {
    let (_dir, app) = setup_app();

    let (status, body) = send(&app, request("DELETE", "/api/records/complaints/123", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, request("GET", "/api/records/complaints/123", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request("PUT", "/api/records/complaints/123", Some(json!({"a": 1}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_module_is_400() {
    let (_dir, app) = setup_app();
    let (status, body) = send(&app, request("GET", "/api/records/pizzaOrders", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Unknown module"));
}

#[tokio::test]
async fn test_duplicate_client_id_is_409() {
    let (_dir, app) = setup_app();
    let record = json!({"id": "1700000000000", "title": "ISO 17020 refresher"});
    let (status, _) = send(
        &app,
        request("POST", "/api/records/trainingRecords", Some(record.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        request("POST", "/api/records/trainingRecords", Some(record)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_non_object_body_is_400() {
    let (_dir, app) = setup_app();
    let (status, _) = send(
        &app,
        request("POST", "/api/records/complaints", Some(json!([1, 2, 3]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_body_is_json_400() {
    let (_dir, app) = setup_app();
    let raw = |method: &str, uri: &str| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap()
    };

    for (method, uri) in [
        ("POST", "/api/records/complaints"),
        ("PUT", "/api/records/complaints/1"),
        ("PUT", "/api/data/complaints"),
        ("PUT", "/api/data"),
    ] {
        let (status, body) = send(&app, raw(method, uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, uri);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_missing_content_type_is_json_400() {
    let (_dir, app) = setup_app();
    let req = Request::builder()
        .method("POST")
        .uri("/api/records/complaints")
        .body(Body::from(r#"{"complainant": "Zhao"}"#))
        .unwrap();

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

// =============================================================================
// Search and pagination
// =============================================================================

#[tokio::test]
async fn test_search_keyword_filters_and_pages() {
    let (_dir, app) = setup_app();

    let records: Vec<Value> = (1..=25)
        .map(|i| {
            json!({
                "id": format!("{}", 1_700_000_000_000i64 + i),
                "deviceName": if i % 5 == 0 { format!("Exhaust analyzer {}", i) } else { format!("Brake tester {}", i) },
                "status": if i % 2 == 0 { "in use" } else { "retired" },
            })
        })
        .collect();
    let (status, _) = send(
        &app,
        request("PUT", "/api/data/deviceLedger", Some(Value::Array(records))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Default: newest first, 20 per page
    let (status, body) = send(&app, request("GET", "/api/records/deviceLedger", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 25);
    assert_eq!(body["page_size"], 20);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["records"].as_array().unwrap().len(), 20);
    assert_eq!(body["records"][0]["id"], "1700000000025");

    // Keyword plus field filter
    let (_, body) = send(
        &app,
        request(
            "GET",
            "/api/records/deviceLedger?keyword=exhaust&status=IN%20USE",
            None,
        ),
    )
    .await;
    assert_eq!(body["total"], 2); // 10 and 20
    let ids: Vec<_> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["1700000000020", "1700000000010"]);

    // Out-of-range page is clamped
    let (_, body) = send(
        &app,
        request("GET", "/api/records/deviceLedger?page=99&page_size=10", None),
    )
    .await;
    assert_eq!(body["page"], 3);
    assert_eq!(body["records"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_invalid_page_is_400() {
    let (_dir, app) = setup_app();
    let (status, _) = send(&app, request("GET", "/api/records/complaints?page=abc", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mentions_count() {
    let (_dir, app) = setup_app();
    for participants in ["Zhang Wei, Li Na", "Li Na", "Wang Fang"] {
        send(
            &app,
            request(
                "POST",
                "/api/records/trainingRecords",
                Some(json!({"title": "Brake testing", "participants": participants})),
            ),
        )
        .await;
    }

    let (status, body) = send(
        &app,
        request("GET", "/api/mentions/trainingRecords?name=Li%20Na", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["name"], "Li Na");
}

#[tokio::test]
async fn test_mentions_without_name_is_json_400() {
    let (_dir, app) = setup_app();
    let (status, body) = send(&app, request("GET", "/api/mentions/trainingRecords", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

// =============================================================================
// Snapshots
// =============================================================================

#[tokio::test]
async fn test_whole_store_snapshot() {
    let (_dir, app) = setup_app();
    let snapshot = json!({
        "complaints": [{"id": "1", "complainant": "A"}],
        "standardsTracking": [{"id": "2", "standardNo": "GB 7258-2017"}],
        "lastExport": "2024-03-01"
    });

    let (status, _) = send(&app, request("PUT", "/api/data", Some(snapshot))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("GET", "/api/data", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["standardsTracking"][0]["standardNo"], "GB 7258-2017");
    assert_eq!(body["lastExport"], "2024-03-01");

    let (status, _) = send(&app, request("PUT", "/api/data", Some(json!([1])))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Remote store client against a live server
// =============================================================================

#[tokio::test]
async fn test_remote_store_against_live_server() {
    let dir = TempDir::new().unwrap();
    let pool = qms_common::db::init_database(&dir.path().join("qms.db"))
        .await
        .unwrap();
    let table: SharedStore = Arc::new(TableStore::new(pool));
    let app = build_router(AppState::new(table));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let remote = RemoteStore::new(format!("http://{}", addr)).unwrap();

    let added = remote
        .add_item(
            "calibrationRecords",
            json!({"deviceName": "Speedometer tester", "agency": "Provincial Metrology"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .await
        .unwrap();
    let id = record_id(&added).unwrap().to_string();

    let fetched = remote.get_item("calibrationRecords", &id).await.unwrap();
    assert_eq!(fetched["agency"], "Provincial Metrology");

    let missing = remote.delete_item("calibrationRecords", "0").await;
    assert!(matches!(missing, Err(qms_common::Error::NotFound(_))));

    remote.delete_item("calibrationRecords", &id).await.unwrap();
    assert!(remote.get_data("calibrationRecords").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_store_ids_with_reserved_characters() {
    let dir = TempDir::new().unwrap();
    let pool = qms_common::db::init_database(&dir.path().join("qms.db"))
        .await
        .unwrap();
    let table: SharedStore = Arc::new(TableStore::new(pool));
    let app = build_router(AppState::new(table));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let remote = RemoteStore::new(format!("http://{}/", addr)).unwrap();
    let ids = ["QA/2024-01", "R#7", "a?b", "50% off"];
    for id in ids {
        remote
            .add_item(
                "internalAuditReports",
                json!({"id": id, "auditor": "Zhou"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
    }

    for id in ids {
        let fetched = remote.get_item("internalAuditReports", id).await.unwrap();
        assert_eq!(record_id(&fetched), Some(id));
    }

    let updated = remote
        .update_item(
            "internalAuditReports",
            "QA/2024-01",
            json!({"result": "pass"}).as_object().cloned().unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(updated["result"], "pass");

    remote.delete_item("internalAuditReports", "R#7").await.unwrap();
    let rest = remote.get_data("internalAuditReports").await.unwrap();
    let rest_ids: Vec<_> = rest.iter().filter_map(record_id).collect();
    assert_eq!(rest_ids, vec!["QA/2024-01", "a?b", "50% off"]);
}
