//! accio-client against an in-process fake gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;

use accio_client::thunks::{self, GetJob};
use accio_client::views::{self, LogTarget};
use accio_client::{Classifier, Client, ClientConfig, Credentials, Payload, RequestOptions};
use accio_core::models::RunMetadataPatch;
use accio_core::store::{LoadStatus, Store};

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    uri: String,
    auth: Option<String>,
}

#[derive(Clone, Default)]
struct Gateway {
    seen: Arc<Mutex<Vec<Seen>>>,
    bodies: Arc<Mutex<Vec<String>>>,
    watch_polls: Arc<AtomicUsize>,
}

impl Gateway {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn uris(&self) -> Vec<String> {
        self.seen().into_iter().map(|s| s.uri).collect()
    }
}

async fn record(State(gw): State<Gateway>, req: Request, next: Next) -> Response {
    gw.seen.lock().unwrap().push(Seen {
        method: req.method().to_string(),
        uri: req.uri().to_string(),
        auth: req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    });
    next.run(req).await
}

fn run_json(id: &str, parent: Option<&str>) -> Value {
    let notes = parent.is_none().then_some("sweep over epsilon");
    json!({
        "id": id,
        "parent": parent,
        "created_at": 1_600_000_000_000i64,
        "owner": {"name": "vincent"},
        "pkg": {"workflow_id": "geo_ind", "workflow_version": "1"},
        "seed": 1,
        "notes": notes,
        "state": {"status": "scheduled", "nodes": []}
    })
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::IM_A_TEAPOT)
}

async fn login(Json(body): Json<Value>) -> Json<Value> {
    if body["password"] == "s3cret" {
        Json(json!({"authenticated": true, "accessToken": "tok-1"}))
    } else {
        Json(json!({"authenticated": false}))
    }
}

async fn whoami(headers: HeaderMap) -> Json<Value> {
    let ok = headers.get(AUTHORIZATION).is_some_and(|v| v == "Bearer tok-1");
    Json(json!({"authenticated": ok}))
}

/// `watched` is running on the first poll and successful afterwards.
fn watched_run_json(poll: usize) -> Value {
    let mut run = run_json("watched", None);
    run["state"] = if poll == 0 {
        json!({
            "status": "running",
            "started_at": 1_000,
            "progress": 0.5,
            "nodes": [{"name": "a", "status": "running", "started_at": 1_000}]
        })
    } else {
        json!({
            "status": "success",
            "started_at": 1_000,
            "completed_at": 9_000,
            "progress": 1.0,
            "nodes": [{"name": "a", "status": "success", "started_at": 1_000, "completed_at": 9_000}]
        })
    };
    run
}

#[derive(Deserialize)]
struct Download {
    #[serde(default)]
    download: bool,
}

async fn get_run(
    State(gw): State<Gateway>,
    Path(id): Path<String>,
    Query(q): Query<Download>,
) -> Response {
    let run = if id == "watched" {
        watched_run_json(gw.watch_polls.fetch_add(1, Ordering::SeqCst))
    } else {
        let parent = (id == "child").then_some("parent");
        run_json(&id, parent)
    };
    if q.download {
        // Pretty-printed so that a re-encoded body would differ.
        return serde_json::to_string_pretty(&run).unwrap().into_response();
    }
    Json(run).into_response()
}

async fn list_runs(Query(q): Query<HashMap<String, String>>) -> Response {
    if q.get("parent").is_some_and(|p| p == "missing") {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "results": [run_json("r1", None), run_json("r2", None)],
        "total_count": 2
    }))
    .into_response()
}

async fn get_workflow(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "id": id,
        "version": "2",
        "name": "Geo-indistinguishability",
        "owner": {"name": "vincent"},
        "created_at": 1_600_000_000_000i64,
        "graph": [{"name": "geoind", "op": "GeoIndistinguishability"}]
    }))
}

async fn list_workflows() -> Json<Value> {
    Json(json!({"results": [], "total_count": 0}))
}

async fn artifacts() -> Json<Value> {
    Json(json!([{"name": "data", "value": {"kind": {"base": "dataset"}, "payload": "/tmp/data"}}]))
}

async fn metrics() -> Json<Value> {
    Json(json!([{"name": "count", "value": 42.0}]))
}

async fn patch_run(State(gw): State<Gateway>, body: String) -> &'static str {
    gw.bodies.lock().unwrap().push(body);
    "ok"
}

#[derive(Deserialize)]
struct LogsQuery {
    since: Option<String>,
    #[serde(default)]
    download: bool,
}

async fn logs(Query(q): Query<LogsQuery>) -> Response {
    if q.download {
        return "starting\nepsilon=0.01\ndone\n".into_response();
    }
    match q.since {
        None => Json(json!([
            {"created_at": 1000, "message": "starting"},
            {"created_at": 2000, "message": "epsilon=0.01"}
        ]))
        .into_response(),
        Some(_) => Json(json!([{"created_at": 3000, "message": "done"}])).into_response(),
    }
}

async fn jobs() -> Json<Value> {
    Json(json!({
        "jobs": [{"name": "j1", "status": {"state": "Successful", "time": 1}}],
        "totalCount": 1
    }))
}

async fn job(Path(name): Path<String>) -> Json<Value> {
    Json(json!({"name": name, "status": {"state": "Failed", "time": 5}}))
}

async fn spawn_gateway() -> (String, Gateway) {
    let gw = Gateway::default();
    let app = Router::new()
        .route("/status/{code}", get(status))
        .route("/empty", get(|| async { (StatusCode::OK, "") }))
        .route("/garbage", get(|| async { "<html>not json</html>" }))
        .route("/auth", get(whoami).post(login))
        .route("/api/v1/run", get(list_runs))
        .route("/api/v1/run/{id}", get(get_run).post(patch_run))
        .route("/api/v1/run/{id}/artifacts/{node}", get(artifacts))
        .route("/api/v1/run/{id}/metrics/{node}", get(metrics))
        .route("/api/v1/workflow", get(list_workflows))
        .route("/api/v1/workflow/{id}", get(get_workflow))
        .route(
            "/api/v1/run/{id}/kill",
            post(|| async { StatusCode::NO_CONTENT.into_response() }),
        )
        .route("/api/v1/run/{id}/logs/{node}/{classifier}", get(logs))
        .route("/api/v1/jobs", get(jobs))
        .route("/api/v1/jobs/{name}", get(job))
        .layer(middleware::from_fn_with_state(gw.clone(), record))
        .with_state(gw.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), gw)
}

fn client(server: &str, tmp: &TempDir) -> Client {
    Client::new(&ClientConfig {
        server: server.to_string(),
        token_path: tmp.path().join("token"),
        ..ClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_success_statuses_resolve_and_others_reject() {
    let (server, _gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    for path in ["/status/204", "/empty", "/garbage"] {
        let payload = c.xhr(path, RequestOptions::default()).await.unwrap().unwrap();
        assert_eq!(payload, Payload::Json(json!({})), "{path}");
    }

    for code in [400u16, 404, 500, 503] {
        let err = c
            .xhr(&format!("/status/{code}"), RequestOptions::default())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.status(), Some(code));
        assert_eq!(err.notice("run").status, Some(code));
    }
}

#[tokio::test]
async fn test_bearer_token_follows_credentials_policy() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);
    c.tokens().save("tok-1").unwrap();

    let other_origin = server.replace("127.0.0.1", "localhost") + "/empty";
    let requests = [
        ("/empty".to_string(), Credentials::SameOrigin),
        (other_origin.clone(), Credentials::SameOrigin),
        (other_origin, Credentials::Include),
        ("/empty".to_string(), Credentials::Omit),
    ];
    for (path, credentials) in &requests {
        let options = RequestOptions::default().credentials(*credentials);
        c.xhr(path, options).await.unwrap().unwrap();
    }

    let auth: Vec<Option<String>> = gw.seen().into_iter().map(|s| s.auth).collect();
    assert_eq!(
        auth,
        vec![
            Some("Bearer tok-1".to_string()),
            None,
            Some("Bearer tok-1".to_string()),
            None
        ]
    );
}

#[tokio::test]
async fn test_login_flow_persists_token() {
    let (server, _gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    assert!(!c.check_authenticated().await.unwrap().unwrap());
    assert!(!c.authenticate("wrong").await.unwrap().unwrap());
    assert_eq!(c.tokens().load(), None);

    assert!(c.authenticate("s3cret").await.unwrap().unwrap());
    assert_eq!(c.tokens().load().as_deref(), Some("tok-1"));
    assert!(c.check_authenticated().await.unwrap().unwrap());

    c.logout().unwrap();
    assert!(!c.check_authenticated().await.unwrap().unwrap());
}

#[tokio::test]
async fn test_fetch_jobs_builds_exact_url() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);
    let store = Mutex::new(Store::new());

    let status = thunks::fetch_jobs(&c, &store, 2, Some("env=prod".to_string())).await;
    assert_eq!(status, Ok(LoadStatus::Loaded));
    thunks::fetch_jobs(&c, &store, 1, None).await.unwrap();

    assert_eq!(
        gw.uris(),
        vec![
            "/api/v1/jobs?page=2&perPage=30&labels=env=prod",
            "/api/v1/jobs?page=1&perPage=30"
        ]
    );
}

#[tokio::test]
async fn test_get_job_skips_request_for_completed_job() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);
    let store = Mutex::new(Store::new());

    thunks::fetch_jobs(&c, &store, 1, None).await.unwrap();
    assert_eq!(thunks::get_job(&c, &store, "j1").await, GetJob::Cached);
    assert_eq!(thunks::get_job(&c, &store, "j2").await, GetJob::Fetched);
    assert_eq!(thunks::get_job(&c, &store, "j2").await, GetJob::Cached);

    assert_eq!(
        gw.uris(),
        vec!["/api/v1/jobs?page=1&perPage=30", "/api/v1/jobs/j2"]
    );
}

#[tokio::test]
async fn test_run_detail_resolves_parent_once() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let detail = c.get_run_detail("child").await.unwrap().unwrap();
    assert_eq!(detail.parent.as_ref().map(|p| p.id.as_str()), Some("parent"));
    assert_eq!(detail.effective_notes(), Some("sweep over epsilon"));

    let detail = c.get_run_detail("parent").await.unwrap().unwrap();
    assert!(detail.parent.is_none());
    assert_eq!(
        gw.uris(),
        vec!["/api/v1/run/child", "/api/v1/run/parent", "/api/v1/run/parent"]
    );
}

#[tokio::test]
async fn test_run_mutations() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let patch = RunMetadataPatch {
        name: Some("renamed".to_string()),
        ..RunMetadataPatch::default()
    };
    c.update_run("r1", &patch).await.unwrap().unwrap();
    c.kill_run("r1").await.unwrap().unwrap();

    assert_eq!(gw.bodies.lock().unwrap().clone(), vec![r#"{"name":"renamed"}"#]);
    let methods: Vec<String> = gw.seen().into_iter().map(|s| s.method).collect();
    assert_eq!(methods, vec!["POST", "POST"]);
    assert_eq!(gw.uris()[1], "/api/v1/run/r1/kill");
}

#[tokio::test]
async fn test_log_tail_asks_only_for_new_lines() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let target = LogTarget {
        run_id: "r1".to_string(),
        node: "geoind".to_string(),
        classifier: Classifier::Stdout,
        stream: true,
    };
    let tail = views::log_tail(&c, target, Duration::from_millis(50));
    let mut rx = tail.subscribe();
    let lines = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.data().is_some_and(|lines| lines.len() >= 3)),
    )
    .await
    .unwrap()
    .unwrap()
    .data()
    .cloned()
    .unwrap();
    tail.unmount().await;

    let messages: Vec<&str> = lines.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(&messages[..3], &["starting", "epsilon=0.01", "done"]);

    let uris = gw.uris();
    assert_eq!(uris[0], "/api/v1/run/r1/logs/geoind/stdout");
    assert_eq!(
        uris[1],
        "/api/v1/run/r1/logs/geoind/stdout?since=1970-01-01T00%3A00%3A02.000Z"
    );
}

#[tokio::test]
async fn test_failed_view_shows_notice() {
    let (server, _gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let mount = views::children(&c, "missing");
    let state = mount.settled().await;
    let notice = state.failure().unwrap();
    assert_eq!(notice.status, Some(404));
    assert_eq!(notice.message, "An error occurred while loading child runs.");
}

#[tokio::test]
async fn test_downloads_return_raw_bodies() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let logs = c
        .download_logs("r1", "geoind", Classifier::Stderr)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(logs, b"starting\nepsilon=0.01\ndone\n");

    let export = c.download_run("r1").await.unwrap().unwrap();
    let expected = serde_json::to_string_pretty(&run_json("r1", None)).unwrap();
    assert_eq!(String::from_utf8(export).unwrap(), expected);

    assert_eq!(
        gw.uris(),
        vec![
            "/api/v1/run/r1/logs/geoind/stderr?download=true",
            "/api/v1/run/r1?download=true"
        ]
    );
}

#[tokio::test]
async fn test_run_watch_stops_polling_once_completed() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let watch = views::run_watch(&c, "watched", Duration::from_millis(20));
    let mut rx = watch.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.data().is_some_and(|run| run.state.is_completed())),
    )
    .await
    .unwrap()
    .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(watch.is_finished());
    assert_eq!(gw.watch_polls.load(Ordering::SeqCst), 2);
    assert_eq!(gw.uris(), vec!["/api/v1/run/watched", "/api/v1/run/watched"]);
}

#[tokio::test]
async fn test_workflow_view_loads_latest_runs() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let view = views::workflow_view(&c, "geo_ind", Some("2".to_string()));
    let loaded = view.settled().await.data().cloned().unwrap();
    assert_eq!(loaded.workflow.version, "2");
    assert_eq!(loaded.workflow.graph.len(), 1);
    let ids: Vec<&str> = loaded.last_runs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2"]);

    assert_eq!(
        gw.uris(),
        vec![
            "/api/v1/workflow/geo_ind?version=2",
            "/api/v1/run?per_page=15&workflow=geo_ind"
        ]
    );
}

#[tokio::test]
async fn test_node_outputs_combines_artifacts_and_metrics() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let view = views::node_outputs(&c, "r1", "geo ind");
    let outputs = view.settled().await.data().cloned().unwrap();
    assert_eq!(outputs.artifacts[0].name, "data");
    assert_eq!(outputs.metrics[0].value, 42.0);

    assert_eq!(
        gw.uris(),
        vec![
            "/api/v1/run/r1/artifacts/geo%20ind",
            "/api/v1/run/r1/metrics/geo%20ind"
        ]
    );
}

#[tokio::test]
async fn test_list_workflows_sends_page_size() {
    let (server, gw) = spawn_gateway().await;
    let tmp = TempDir::new().unwrap();
    let c = client(&server, &tmp);

    let list = c.list_workflows(Some("geo ind"), 2).await.unwrap().unwrap();
    assert!(list.results.is_empty());
    assert_eq!(
        gw.uris(),
        vec!["/api/v1/workflow?q=geo%20ind&page=2&per_page=25"]
    );
}
