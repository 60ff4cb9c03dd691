use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use riskflow_core::{Field, FieldPayload};
use riskflow_sheets::{ApiKey, SheetsRecordStore};
use riskflow_store::{FetchError, RecordStore, UpdateError};
use serde_json::{Value, json};

const API_KEY: &str = "test-key";

#[derive(Clone, Default)]
struct Backend {
    read_response: Arc<Mutex<(u16, Value)>>,
    posted: Arc<Mutex<Vec<Value>>>,
}

impl Backend {
    fn answer_reads_with(&self, status: u16, body: Value) {
        *self.read_response.lock().expect("read response lock") = (status, body);
    }

    fn posted(&self) -> Vec<Value> {
        self.posted.lock().expect("posted lock").clone()
    }
}

async fn read(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if params.get("action").map(String::as_str) != Some("read")
        || params.get("key").map(String::as_str) != Some(API_KEY)
    {
        return (
            StatusCode::OK,
            Json(json!({"ok": false, "error": "unauthorized"})),
        );
    }

    let (status, body) = backend
        .read_response
        .lock()
        .expect("read response lock")
        .clone();
    (
        StatusCode::from_u16(status).expect("status code"),
        Json(body),
    )
}

async fn update(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    backend.posted.lock().expect("posted lock").push(body.clone());

    let touches_missing_column = body["fields"]
        .as_object()
        .is_some_and(|fields| fields.contains_key("residual_detail"));
    if touches_missing_column {
        return Json(json!({"ok": false, "error": "COLUMN_NOT_FOUND: residual_detail"}));
    }
    Json(json!({"ok": true}))
}

async fn slow(State(_backend): State<Backend>) -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"ok": true, "data": []}))
}

async fn not_json() -> &'static str {
    "<html>sign in</html>"
}

async fn spawn_backend(backend: Backend) -> String {
    let app = Router::new()
        .route("/exec", get(read).post(update))
        .route("/slow", get(slow))
        .route("/html", get(not_json))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve backend");
    });
    format!("http://{addr}")
}

fn store(base: &str, path: &str) -> SheetsRecordStore {
    SheetsRecordStore::new(
        format!("{base}{path}"),
        ApiKey::new(API_KEY),
        Duration::from_secs(5),
    )
    .expect("build store")
}

#[tokio::test]
async fn read_decodes_rows_and_legacy_columns() {
    let backend = Backend::default();
    backend.answer_reads_with(
        200,
        json!({
            "ok": true,
            "data": [
                {"code": "1.1.1.1", "domain": "관리체계", "vulnResult": "vulnerable", "reason": "no MFA"},
                {"code": "", "domain": "skipped"},
                {"code": "1.1.1.2", "type": "PIMS", "result": "good", "impact": 2}
            ]
        }),
    );
    let base = spawn_backend(backend).await;

    let records = store(&base, "/exec")
        .fetch_all("Checklist")
        .await
        .expect("fetch");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, "ISMS");
    assert_eq!(records[0].result, "취약");
    assert_eq!(records[0].result_detail, "no MFA");
    assert_eq!(records[1].kind, "PIMS");
    assert_eq!(records[1].result, "양호");
    assert_eq!(records[1].impact, "2");
}

#[tokio::test]
async fn non_array_data_reads_as_empty() {
    let backend = Backend::default();
    backend.answer_reads_with(200, json!({"ok": true, "data": {"rows": 3}}));
    let base = spawn_backend(backend).await;

    let records = store(&base, "/exec")
        .fetch_all("Checklist")
        .await
        .expect("fetch");
    assert!(records.is_empty());
}

#[tokio::test]
async fn ok_false_fails_even_with_error_status() {
    let backend = Backend::default();
    backend.answer_reads_with(500, json!({"ok": false, "message": "sheet not found"}));
    let base = spawn_backend(backend.clone()).await;
    let store = store(&base, "/exec");

    let err = store.fetch_all("Checklist").await.expect_err("remote error");
    assert!(matches!(err, FetchError::Remote(ref message) if message == "sheet not found"));

    backend.answer_reads_with(200, json!({"ok": false}));
    let err = store.fetch_all("Checklist").await.expect_err("remote error");
    assert_eq!(err.to_string(), "read failed");
}

#[tokio::test]
async fn update_posts_canonical_payload() {
    let backend = Backend::default();
    let base = spawn_backend(backend.clone()).await;

    let fields: FieldPayload = [
        (Field::TreatmentStrategy, "Accept".to_owned()),
        (Field::AcceptReason, "cost".to_owned()),
        (Field::TreatmentStatus, "Done".to_owned()),
    ]
    .into_iter()
    .collect();

    store(&base, "/exec")
        .update_fields("Checklist", "1.1.1.1", &fields)
        .await
        .expect("update");

    assert_eq!(
        backend.posted(),
        vec![json!({
            "action": "updateFields",
            "sheet": "Checklist",
            "key": API_KEY,
            "code": "1.1.1.1",
            "fields": {
                "treatment_strategy": "Accept",
                "treatment_status": "Done",
                "accept_reason": "cost"
            }
        })]
    );
}

#[tokio::test]
async fn column_not_found_is_distinguished() {
    let backend = Backend::default();
    let base = spawn_backend(backend).await;

    let fields: FieldPayload = [(Field::ResidualDetail, "patched".to_owned())]
        .into_iter()
        .collect();
    let err = store(&base, "/exec")
        .update_fields("Checklist", "1.1.1.1", &fields)
        .await
        .expect_err("missing column");

    assert!(matches!(err, UpdateError::ColumnNotFound(_)));
}

#[tokio::test]
async fn requests_time_out() {
    let backend = Backend::default();
    let base = spawn_backend(backend).await;
    let store = SheetsRecordStore::new(
        format!("{base}/slow"),
        ApiKey::new(API_KEY),
        Duration::from_millis(200),
    )
    .expect("build store");

    let err = store.fetch_all("Checklist").await.expect_err("timeout");
    assert!(matches!(err, FetchError::Transport(_)));
}

#[tokio::test]
async fn transport_and_decode_errors_never_carry_the_api_key() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let closed = format!("http://{}", listener.local_addr().expect("local addr"));
    drop(listener);

    let unreachable = store(&closed, "/exec");
    let err = unreachable
        .fetch_all("Checklist")
        .await
        .expect_err("nothing listens");
    assert!(matches!(err, FetchError::Transport(_)));
    assert!(!err.to_string().contains(API_KEY), "leaked key: {err}");

    let fields: FieldPayload = [(Field::Status, "x".to_owned())].into_iter().collect();
    let err = unreachable
        .update_fields("Checklist", "1.1", &fields)
        .await
        .expect_err("nothing listens");
    assert!(!err.to_string().contains(API_KEY), "leaked key: {err}");

    let base = spawn_backend(Backend::default()).await;
    let err = store(&base, "/html")
        .fetch_all("Checklist")
        .await
        .expect_err("html is not an envelope");
    assert!(matches!(err, FetchError::Decode(_)));
    assert!(!err.to_string().contains(API_KEY), "leaked key: {err}");
}
