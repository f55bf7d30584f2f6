use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use electra_core::{ElementKind, ElementRef, GridModel};
use electra_engine::{GridEngine, NativeEngine};
use electra_server::{router, AppState, ElectraConfig};
use electra_store::{
    CascadeSummary, ElementRow, GridRepository, GridRow, IngestSummary, MemoryRepository,
    StoreError, StoreResult,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "electra-test-boundary";

/// Repository whose database is unreachable.
struct OfflineRepository;

fn offline<T>() -> StoreResult<T> {
    Err(StoreError::Constraint("database unreachable".into()))
}

#[async_trait]
impl GridRepository for OfflineRepository {
    async fn ping(&self) -> StoreResult<()> {
        offline()
    }

    async fn save_grid(&self, _: &GridModel, _: Option<&str>) -> StoreResult<IngestSummary> {
        offline()
    }

    async fn list_grid_ids(&self) -> StoreResult<Vec<i32>> {
        offline()
    }

    async fn get_grid(&self, _: i32) -> StoreResult<Option<GridRow>> {
        offline()
    }

    async fn delete_grid(&self, _: i32) -> StoreResult<bool> {
        offline()
    }

    async fn list_elements(&self, _: ElementKind, _: Option<i32>) -> StoreResult<Vec<ElementRow>> {
        offline()
    }

    async fn get_element(&self, _: ElementKind, _: i32) -> StoreResult<Option<ElementRow>> {
        offline()
    }

    async fn set_active(&self, _: ElementKind, _: i32, _: bool) -> StoreResult<Option<ElementRef>> {
        offline()
    }

    async fn deactivate_bus_attachments(&self, _: i32, _: &str) -> StoreResult<CascadeSummary> {
        offline()
    }

    async fn deactivate_bus(&self, _: i32) -> StoreResult<Option<(ElementRef, CascadeSummary)>> {
        offline()
    }

    async fn active_flags(&self, _: ElementKind, _: i32) -> StoreResult<Vec<(String, bool)>> {
        offline()
    }
}

struct TestApp {
    app: Router,
    dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_repo(Arc::new(MemoryRepository::new()))
    }

    fn with_repo(repo: Arc<dyn GridRepository>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ElectraConfig::default();
        config.storage.circuit_dir = dir.path().join("circuits");
        let state = AppState::new(repo, Arc::new(NativeEngine), config);
        Self {
            app: router(state),
            dir,
        }
    }

    fn circuit_dir(&self) -> PathBuf {
        self.dir.path().join("circuits")
    }

    fn circuit_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.circuit_dir()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn patch_json(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::PATCH)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn upload(&self, filename: &str, content: &[u8]) -> (StatusCode, Value) {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post("/grid/files/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}

fn circuit() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "name": "two bus",
        "baseMVA": 100.0,
        "model_data": {
            "bus": [
                {"idtag": "b1", "name": "B1", "is_slack": true},
                {"idtag": "b2", "name": "B2"}
            ],
            "generator": [{"idtag": "g1", "bus": "b1", "P": 0.0, "Vset": 1.0}],
            "load": [{"idtag": "ld1", "bus": "b2", "P": 50.0, "Q": 20.0}],
            "shunt": [{"idtag": "sh1", "bus": "b2", "G": 0.0, "B": 5.0}],
            "line": [{
                "idtag": "l1", "bus_from": "b1", "bus_to": "b2",
                "R": 0.01, "X": 0.1, "B": 0.02, "rate": 100.0
            }]
        }
    }))
    .unwrap()
}

fn circuit_active(path: &Path, kind: ElementKind, idtag: &str) -> Option<bool> {
    NativeEngine.open_file(path).unwrap().is_active(kind, idtag)
}

#[tokio::test]
async fn upload_ingests_circuit() {
    let app = TestApp::new();
    let (status, body) = app.upload("two_bus.json", &circuit()).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body,
        json!({
            "message": "Grid saved",
            "grid_id": 1,
            "buses_saved": 2,
            "lines_saved": 1,
            "generators_saved": 1,
            "loads_saved": 1,
            "shunts_saved": 1,
            "transformers2w_saved": 0
        })
    );

    let files = app.circuit_files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().unwrap(), "json");

    let (status, ids) = app.get("/grid/ids").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids, json!([1]));
}

#[tokio::test]
async fn upload_rejects_empty_and_broken_files() {
    let app = TestApp::new();

    let (status, body) = app.upload("empty.json", b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Uploaded file is empty");

    let (status, body) = app.upload("broken.json", b"{ not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(app.circuit_files().is_empty());

    let (_, ids) = app.get("/grid/ids").await;
    assert_eq!(ids, json!([]));
}

#[tokio::test]
async fn upload_with_dangling_reference_is_a_storage_error() {
    let app = TestApp::new();
    let mut model: Value = serde_json::from_slice(&circuit()).unwrap();
    model["model_data"]["load"][0]["bus"] = json!("nowhere");

    let (status, body) = app
        .upload("dangling.json", &serde_json::to_vec(&model).unwrap())
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("nowhere"));
    assert!(app.circuit_files().is_empty());
}

#[tokio::test]
async fn grid_ids_are_newest_first() {
    let app = TestApp::new();
    for _ in 0..3 {
        app.upload("grid.json", &circuit()).await;
    }
    let (_, ids) = app.get("/grid/ids").await;
    assert_eq!(ids, json!([3, 2, 1]));
}

#[tokio::test]
async fn element_listing_and_lookup() {
    let app = TestApp::new();
    app.upload("a.json", &circuit()).await;
    app.upload("b.json", &circuit()).await;

    let (status, buses) = app.get("/bus/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(buses.as_array().unwrap().len(), 4);

    let (_, buses) = app.get("/bus?grid_id=2").await;
    let buses = buses.as_array().unwrap();
    assert_eq!(buses.len(), 2);
    assert!(buses.iter().all(|b| b["grid_id"] == 2));

    let (status, line) = app.get("/line/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(line["idtag"], "l1");

    let (status, body) = app.get("/transformer2w/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Transformer2W not found");

    let (status, _) = app.get("/generator/abc").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn status_update_reaches_database_and_circuit() {
    let app = TestApp::new();
    app.upload("grid.json", &circuit()).await;
    let file = app.circuit_files().remove(0);

    let (status, body) = app
        .patch_json("/load/1/status", r#"{"active": false}"#)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message": "Load status updated", "load_id": 1, "active": false})
    );

    let (_, load) = app.get("/load/1").await;
    assert_eq!(load["active"], false);
    assert_eq!(circuit_active(&file, ElementKind::Load, "ld1"), Some(false));

    let (status, body) = app
        .patch_json("/line/42/status", r#"{"active": false}"#)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Line not found");
}

#[tokio::test]
async fn status_update_rejects_bad_input() {
    let app = TestApp::new();
    app.upload("grid.json", &circuit()).await;

    let (status, _) = app.patch_json("/load/1/status", "{active: no").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.patch_json("/load/1/status", r#"{"enabled": true}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.patch_json("/load/x/status", r#"{"active": true}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn bus_deactivation_cascades_to_injections() {
    let app = TestApp::new();
    app.upload("grid.json", &circuit()).await;
    let file = app.circuit_files().remove(0);

    // b2 carries the load and the shunt
    let (status, body) = app.patch_json("/bus/2/status", r#"{"active": false}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bus_id"], 2);

    let (_, load) = app.get("/load/1").await;
    let (_, shunt) = app.get("/shunt/1").await;
    let (_, generator) = app.get("/generator/1").await;
    let (_, line) = app.get("/line/1").await;
    assert_eq!(load["active"], false);
    assert_eq!(shunt["active"], false);
    assert_eq!(generator["active"], true);
    assert_eq!(line["active"], true);

    assert_eq!(circuit_active(&file, ElementKind::Bus, "b2"), Some(false));
    assert_eq!(circuit_active(&file, ElementKind::Load, "ld1"), Some(false));
    assert_eq!(circuit_active(&file, ElementKind::Line, "l1"), Some(true));

    // switching the bus back on leaves its attachments off
    app.patch_json("/bus/2/status", r#"{"active": true}"#).await;
    let (_, load) = app.get("/load/1").await;
    assert_eq!(load["active"], false);
}

#[tokio::test]
async fn bus_missing_from_circuit_leaves_file_attachments_alone() {
    let app = TestApp::new();
    app.upload("grid.json", &circuit()).await;
    let file = app.circuit_files().remove(0);

    // the file no longer knows b2, but ld1 still points at it
    let mut model: Value = serde_json::from_slice(&circuit()).unwrap();
    model["model_data"]["bus"][1]["idtag"] = json!("b2-renamed");
    std::fs::write(&file, serde_json::to_vec(&model).unwrap()).unwrap();

    let (status, _) = app.patch_json("/bus/2/status", r#"{"active": false}"#).await;
    assert_eq!(status, StatusCode::OK);

    let (_, load) = app.get("/load/1").await;
    assert_eq!(load["active"], false);
    assert_eq!(circuit_active(&file, ElementKind::Load, "ld1"), Some(true));
    assert_eq!(circuit_active(&file, ElementKind::Shunt, "sh1"), Some(true));
}

#[tokio::test]
async fn power_flow_follows_database_flags() {
    let app = TestApp::new();
    app.upload("grid.json", &circuit()).await;

    let (status, report) = app.get("/grid/1/power-flow").await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["grid_id"], 1);
    assert_eq!(report["grid_name"], "two bus");
    assert_eq!(report["converged"], true);
    assert_eq!(report["bus_results"].as_array().unwrap().len(), 2);
    assert_eq!(report["branch_results"].as_array().unwrap().len(), 1);
    let loaded_p = report["bus_results"][1]["p"].as_f64().unwrap();
    assert!((loaded_p + 50.0).abs() < 1e-3);

    app.patch_json("/load/1/status", r#"{"active": false}"#).await;
    let (_, report) = app.get("/grid/1/power-flow").await;
    assert_eq!(report["converged"], true);
    let unloaded_p = report["bus_results"][1]["p"].as_f64().unwrap();
    assert!(unloaded_p.abs() < 1e-3);
}

#[tokio::test]
async fn power_flow_uses_only_its_own_grid_flags() {
    let app = TestApp::new();
    app.upload("first.json", &circuit()).await;
    app.upload("second.json", &circuit()).await;

    // load 2 is the second grid's copy of ld1
    let (status, _) = app.patch_json("/load/2/status", r#"{"active": false}"#).await;
    assert_eq!(status, StatusCode::OK);

    let (_, first) = app.get("/grid/1/power-flow").await;
    let (_, second) = app.get("/grid/2/power-flow").await;
    let first_p = first["bus_results"][1]["p"].as_f64().unwrap();
    let second_p = second["bus_results"][1]["p"].as_f64().unwrap();
    assert!((first_p + 50.0).abs() < 1e-3, "{first_p}");
    assert!(second_p.abs() < 1e-3, "{second_p}");
}

#[tokio::test]
async fn power_flow_needs_grid_and_file() {
    let app = TestApp::new();
    let (status, body) = app.get("/grid/7/power-flow").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Grid not found");

    app.upload("grid.json", &circuit()).await;
    for file in app.circuit_files() {
        std::fs::remove_file(file).unwrap();
    }
    let (status, body) = app.get("/grid/1/power-flow").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Circuit file not found");
}

#[tokio::test]
async fn delete_removes_grid_and_file() {
    let app = TestApp::new();
    app.upload("grid.json", &circuit()).await;

    let request = Request::delete("/grid/1").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deleted": true, "grid_id": 1}));
    assert!(app.circuit_files().is_empty());

    let (_, loads) = app.get("/load/").await;
    assert_eq!(loads, json!([]));

    let request = Request::delete("/grid/1").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Grid not found");
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new();
    let (status, body) = app.get("/health/db").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn health_reports_unreachable_database() {
    let app = TestApp::with_repo(Arc::new(OfflineRepository));
    let (status, body) = app.get("/health/db").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("database unreachable"));
}
