//! In-process mock backend
//!
//! Serves the handful of endpoints the client talks to, records every
//! request, and keeps created or seeded records in memory so later searches
//! and fetches see them.

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_PASSWORD: &str = "secret";
pub const TEST_TOKEN: &str = "test-token";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub token: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
pub struct MockBackend {
    requests: Mutex<Vec<RecordedRequest>>,
    records: Mutex<BTreeMap<String, Value>>,
    batch_errors: Mutex<Option<Value>>,
    batch_status: Mutex<Option<u16>>,
    next_id: AtomicI64,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(100),
            ..Default::default()
        })
    }

    /// Bind to an ephemeral port and serve in the background; returns the base URI
    pub async fn start(self: &Arc<Self>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/users/:user/login", post(login))
            .fallback(dispatch)
            .with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Store a record under its `uri`
    pub fn seed(&self, record: Value) {
        let uri = record["uri"].as_str().expect("seeded record needs a uri").to_string();
        self.records.lock().unwrap().insert(uri, record);
    }

    pub fn record(&self, uri: &str) -> Option<Value> {
        self.records.lock().unwrap().get(uri).cloned()
    }

    /// Reject every batch import with these errors
    pub fn reject_batches(&self, errors: Value) {
        *self.batch_errors.lock().unwrap() = Some(errors);
    }

    /// Answer every batch import with this status
    pub fn fail_batches(&self, status: u16) {
        *self.batch_status.lock().unwrap() = Some(status);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path_prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path.starts_with(path_prefix))
            .collect()
    }

    pub fn batch_imports(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "POST" && r.path.ends_with("/batch_imports"))
            .collect()
    }

    fn mint_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

type Shared = Arc<MockBackend>;

async fn login(
    State(backend): State<Shared>,
    Path(user): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    backend.requests.lock().unwrap().push(RecordedRequest {
        method: "POST".to_string(),
        path: format!("/users/{}/login", user),
        query: Vec::new(),
        token: None,
        body: String::new(),
    });

    if form.get("password").map(String::as_str) == Some(TEST_PASSWORD) {
        Json(json!({"session": TEST_TOKEN, "user": {"username": user}})).into_response()
    } else {
        (StatusCode::FORBIDDEN, Json(json!({"error": "Login failed"}))).into_response()
    }
}

async fn dispatch(
    State(backend): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    let token = headers
        .get("X-ArchivesSpace-Session")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request = RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        query,
        token: token.clone(),
        body,
    };
    backend.requests.lock().unwrap().push(request.clone());

    if token.as_deref() != Some(TEST_TOKEN) {
        return (StatusCode::PRECONDITION_FAILED, Json(json!({"error": "Missing session"}))).into_response();
    }

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("POST", ["repositories", repo, "batch_imports"]) => batch_import(&backend, repo, &request),
        ("POST", ["plugins", "jsonmodel_from_format", "resource", "ead"]) => convert(&request),
        ("GET", ["search"]) | ("GET", ["search", "subjects"]) => search(&backend, &request),
        ("GET", ["repositories", _, _]) if request.param("all_ids") == Some("true") => {
            list_ids(&backend, &path)
        }
        ("GET", _) => match backend.record(&path) {
            Some(record) => Json(record).into_response(),
            None => (StatusCode::NOT_FOUND, Json(json!({"error": "Record not found"}))).into_response(),
        },
        ("POST", _) => update(&backend, &path, &request),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn permanent_uri(model: &str, repo: &str, id: i64) -> String {
    match model {
        "agent_person" => format!("/agents/people/{}", id),
        "agent_corporate_entity" => format!("/agents/corporate_entities/{}", id),
        "subject" => format!("/subjects/{}", id),
        "accession" => format!("/repositories/{}/accessions/{}", repo, id),
        "resource" => format!("/repositories/{}/resources/{}", repo, id),
        "classification" => format!("/repositories/{}/classifications/{}", repo, id),
        "classification_term" => format!("/repositories/{}/classification_terms/{}", repo, id),
        "event" => format!("/repositories/{}/events/{}", repo, id),
        other => format!("/repositories/{}/{}/{}", repo, other, id),
    }
}

fn batch_import(backend: &MockBackend, repo: &str, request: &RecordedRequest) -> Response {
    if let Some(status) = *backend.batch_status.lock().unwrap() {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, "backend exploded").into_response();
    }

    let records = match request.json() {
        Value::Array(records) => records,
        _ => return (StatusCode::BAD_REQUEST, Json(json!({"error": "expected array"}))).into_response(),
    };

    let mut statuses: Vec<Value> = records.iter().map(|_| json!({"status": "Created"})).collect();
    if let Some(errors) = backend.batch_errors.lock().unwrap().clone() {
        statuses.push(json!({"errors": errors}));
        return Json(Value::Array(statuses)).into_response();
    }

    let mut saved = Map::new();
    for mut record in records {
        let id = backend.mint_id();
        let model = record["jsonmodel_type"].as_str().unwrap_or("unknown").to_string();
        let uri = permanent_uri(&model, repo, id);
        let temp = record["uri"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("/import_{}", id));
        record["uri"] = Value::String(uri.clone());
        record["lock_version"] = json!(0);
        backend.records.lock().unwrap().insert(uri.clone(), record);
        saved.insert(temp, json!([uri, id]));
    }
    statuses.push(json!({"saved": saved}));
    Json(Value::Array(statuses)).into_response()
}

/// Documents containing `<malformed` fail; anything else yields a resource,
/// an event and a collection management record
fn convert(request: &RecordedRequest) -> Response {
    if request.body.contains("<malformed") {
        return Json(json!({"error": "Malformed EAD"})).into_response();
    }
    Json(json!([
        {
            "jsonmodel_type": "collection_management",
            "uri": "/repositories/import/collection_management/import_cm"
        },
        {
            "jsonmodel_type": "resource",
            "uri": "/repositories/import/resources/import_res",
            "title": "Converted finding aid",
            "id_0": "converted"
        },
        {
            "jsonmodel_type": "event",
            "uri": "/repositories/import/events/import_ev"
        }
    ]))
    .into_response()
}

fn searchable_text(record: &Value) -> String {
    let identifier: Vec<&str> = ["id_0", "id_1", "id_2", "id_3"]
        .iter()
        .map(|k| record[*k].as_str().unwrap_or(""))
        .collect();
    let identifier = identifier.join("-");
    format!("{} {}", identifier.trim_end_matches('-'), record)
}

fn unquote(q: &str) -> String {
    q.trim_matches('"').replace("\\\"", "\"").replace("\\\\", "\\")
}

fn search(backend: &MockBackend, request: &RecordedRequest) -> Response {
    let phrase = unquote(request.param("q").unwrap_or(""));
    let model = request.param("type[]").unwrap_or("");
    let page_size: usize = request
        .param("page_size")
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let results: Vec<Value> = backend
        .records
        .lock()
        .unwrap()
        .values()
        .filter(|r| r["jsonmodel_type"] == model)
        .filter(|r| searchable_text(r).contains(&phrase))
        .take(page_size)
        .map(|r| json!({"uri": r["uri"], "json": r.to_string()}))
        .collect();

    Json(json!({"total_hits": results.len(), "results": results})).into_response()
}

fn list_ids(backend: &MockBackend, path: &str) -> Response {
    let prefix = format!("{}/", path);
    let ids: Vec<i64> = backend
        .records
        .lock()
        .unwrap()
        .keys()
        .filter_map(|uri| uri.strip_prefix(&prefix))
        .filter_map(|tail| tail.parse().ok())
        .collect();
    Json(ids).into_response()
}

fn update(backend: &MockBackend, path: &str, request: &RecordedRequest) -> Response {
    let mut records = backend.records.lock().unwrap();
    let Some(existing) = records.get(path) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "Record not found"}))).into_response();
    };

    let mut incoming = request.json();
    if incoming["lock_version"] != existing["lock_version"] {
        return Json(json!({"error": {"lock_version": ["stale"]}, "errors": {"lock_version": ["stale"]}}))
            .into_response();
    }
    let lock_version = existing["lock_version"].as_i64().unwrap_or(0) + 1;
    incoming["lock_version"] = json!(lock_version);
    records.insert(path.to_string(), incoming);

    let id: i64 = path.rsplit('/').next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Json(json!({"status": "Updated", "id": id, "lock_version": lock_version})).into_response()
}
