//! Shared test helpers: an in-process fake of the processing backend and the
//! spreadsheet endpoint, a scripted progress channel fed from the same state,
//! plus polling utilities.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use jobscan_client::config::ClientConfig;
use jobscan_client::models::SelectedFile;
use jobscan_client::services::{HttpBackend, ProgressChannel, ProgressStream};
use jobscan_client::{ClientContext, ClientError, ClientResult};
use jobscan_common::events::{ClientMessage, ProgressEvent};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

pub const MB: usize = 1024 * 1024;

/// Bytes served as the results archive
pub const ARCHIVE: &[u8] = b"PK\x03\x04fake-archive";

/// Session cookie handed out once a key is registered
const SESSION_COOKIE: &str = "session=key-registered";

/// How the scripted progress channel answers connects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Keep every stream open and forward published events
    Open,
    /// Refuse every connection attempt
    Unavailable,
    /// Close the first stream right away, keep later ones open
    CloseFirst,
}

pub struct FakeState {
    pub api_keys: Mutex<Vec<String>>,
    pub process_ids: Mutex<VecDeque<String>>,
    /// `/create_process_id` answers 500
    pub fail_allocation: AtomicBool,
    /// `/upload` redirects to the index page as if the form were invalid
    pub reject_uploads: AtomicBool,
    pub last_process_id: Mutex<Option<String>>,
    pub hold_uploads: AtomicBool,
    pub upload_release: Notify,
    pub uploads: Mutex<Vec<String>>,
    pub stream_mode: Mutex<StreamMode>,
    pub stream_connects: AtomicUsize,
    pub progress_tx: broadcast::Sender<ProgressEvent>,
    /// `(event name, process id)` for every room message received
    pub room_log: Mutex<Vec<(String, String)>>,
    pub export_reply: Mutex<(StatusCode, String)>,
    pub exports: Mutex<Vec<(String, Value)>>,
    pub sheet_reply: Mutex<(StatusCode, String)>,
    pub sheet_payloads: Mutex<Vec<Value>>,
    /// Raw query string of every archive download
    pub downloads: Mutex<Vec<String>>,
}

impl Default for FakeState {
    fn default() -> Self {
        let (progress_tx, _) = broadcast::channel(64);
        Self {
            api_keys: Mutex::new(Vec::new()),
            process_ids: Mutex::new(VecDeque::new()),
            fail_allocation: AtomicBool::new(false),
            reject_uploads: AtomicBool::new(false),
            last_process_id: Mutex::new(None),
            hold_uploads: AtomicBool::new(false),
            upload_release: Notify::new(),
            uploads: Mutex::new(Vec::new()),
            stream_mode: Mutex::new(StreamMode::Open),
            stream_connects: AtomicUsize::new(0),
            progress_tx,
            room_log: Mutex::new(Vec::new()),
            export_reply: Mutex::new((
                StatusCode::OK,
                json!({"success": true, "message": "Spreadsheet created", "jobs_sent": 2,
                       "spreadsheet_url": "https://sheets.example/d/1"})
                .to_string(),
            )),
            exports: Mutex::new(Vec::new()),
            sheet_reply: Mutex::new((
                StatusCode::OK,
                json!({"success": true, "spreadsheet_url": "https://sheets.example/d/2", "jobs_added": 2})
                    .to_string(),
            )),
            sheet_payloads: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }
}

impl FakeState {
    /// Push an event to every open progress connection
    pub fn publish(&self, process_id: &str, step: &str, progress: f64, description: &str) {
        let _ = self.progress_tx.send(ProgressEvent {
            process_id: process_id.to_string(),
            step: step.to_string(),
            progress,
            description: description.to_string(),
            retry: None,
        });
    }

    pub fn room_events(&self, event: &str, process_id: &str) -> usize {
        self.room_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, p)| e == event && p == process_id)
            .count()
    }

    pub fn connects(&self) -> usize {
        self.stream_connects.load(Ordering::SeqCst)
    }

    pub fn set_stream_mode(&self, mode: StreamMode) {
        *self.stream_mode.lock().unwrap() = mode;
    }

    pub fn set_export_reply(&self, status: StatusCode, body: Value) {
        *self.export_reply.lock().unwrap() = (status, body.to_string());
    }

    pub fn set_sheet_reply(&self, status: StatusCode, body: &str) {
        *self.sheet_reply.lock().unwrap() = (status, body.to_string());
    }
}

/// Fake backend served on an ephemeral local port
pub struct FakeServer {
    pub base_url: String,
    pub state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/", get(index))
            .route("/set_api_key", post(set_api_key))
            .route("/create_process_id", post(create_process_id))
            .route("/upload", post(upload))
            .route("/results/:process_id", get(results))
            .route("/download/:process_id", get(download))
            .route("/send_to_spreadsheet/:process_id", post(send_to_spreadsheet))
            .route("/exec", post(apps_script))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub fn apps_script_url(&self) -> String {
        format!("{}/exec", self.base_url)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn index() -> &'static str {
    "upload form"
}

/// Mirrors the backend: multipart `api_key`, JSON verdict, key kept in the session cookie
async fn set_api_key(State(state): State<Arc<FakeState>>, body: Bytes) -> Response {
    let body = String::from_utf8_lossy(&body);
    let key = body
        .split("name=\"api_key\"\r\n\r\n")
        .nth(1)
        .and_then(|rest| rest.split("\r\n").next())
        .unwrap_or_default()
        .trim()
        .to_string();

    if key.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "API key 不能為空"})),
        )
            .into_response();
    }

    state.api_keys.lock().unwrap().push(key);
    (
        [(header::SET_COOKIE, format!("{}; Path=/", SESSION_COOKIE))],
        Json(json!({"success": true, "message": "API key 已設定"})),
    )
        .into_response()
}

async fn create_process_id(State(state): State<Arc<FakeState>>) -> Response {
    if state.fail_allocation.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    let id = state
        .process_ids
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| "p1".to_string());
    *state.last_process_id.lock().unwrap() = Some(id.clone());
    Json(json!({ "process_id": id })).into_response()
}

/// Uploads without a registered key bounce back to the index page
async fn upload(State(state): State<Arc<FakeState>>, headers: HeaderMap, body: Bytes) -> Response {
    let has_key = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|cookies| cookies.contains(SESSION_COOKIE));
    if !has_key || state.reject_uploads.load(Ordering::SeqCst) {
        return Redirect::to("/").into_response();
    }

    state
        .uploads
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&body).into_owned());

    if state.hold_uploads.load(Ordering::SeqCst) {
        state.upload_release.notified().await;
    }

    let id = state.last_process_id.lock().unwrap().clone().unwrap_or_default();
    Redirect::to(&format!("/results/{}", id)).into_response()
}

async fn results(Path(process_id): Path<String>) -> String {
    format!("results for {}", process_id)
}

async fn download(
    State(state): State<Arc<FakeState>>,
    Path(process_id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    if process_id != "p1" {
        return (StatusCode::NOT_FOUND, "處理結果不存在").into_response();
    }
    state.downloads.lock().unwrap().push(query.unwrap_or_default());
    (
        [(header::CONTENT_TYPE, "application/zip")],
        ARCHIVE.to_vec(),
    )
        .into_response()
}

async fn send_to_spreadsheet(
    State(state): State<Arc<FakeState>>,
    Path(process_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.exports.lock().unwrap().push((process_id, body));
    let (status, text) = state.export_reply.lock().unwrap().clone();
    (status, [(header::CONTENT_TYPE, "application/json")], text).into_response()
}

async fn apps_script(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    state.sheet_payloads.lock().unwrap().push(body);
    let (status, text) = state.sheet_reply.lock().unwrap().clone();
    (status, text).into_response()
}

/// Progress channel driven by [`FakeState`] instead of a socket
pub struct ScriptedChannel {
    state: Arc<FakeState>,
}

impl ScriptedChannel {
    pub fn new(state: Arc<FakeState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ProgressChannel for ScriptedChannel {
    async fn connect(&self) -> ClientResult<ProgressStream> {
        let attempt = self.state.stream_connects.fetch_add(1, Ordering::SeqCst) + 1;
        let mode = *self.state.stream_mode.lock().unwrap();

        match mode {
            StreamMode::Unavailable => Err(ClientError::Connection("connection refused".to_string())),
            StreamMode::CloseFirst if attempt == 1 => Ok(futures::stream::empty().boxed()),
            _ => {
                // Subscribe before returning so nothing published after the
                // connect resolves is missed
                let mut rx = self.state.progress_tx.subscribe();
                let stream = async_stream::stream! {
                    while let Ok(event) = rx.recv().await {
                        yield Ok::<_, ClientError>(event);
                    }
                };
                Ok(stream.boxed())
            }
        }
    }

    async fn emit(&self, message: &ClientMessage) -> ClientResult<()> {
        self.state.room_log.lock().unwrap().push((
            message.event_name().to_string(),
            message.process_id().to_string(),
        ));
        Ok(())
    }
}

/// Client config pointing at `base_url` with short reconnect timings
pub fn test_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.server_url = base_url.to_string();
    config.api_key = Some("test-key".to_string());
    config.channel.connect_timeout_ms = 2_000;
    config.channel.max_reconnect_attempts = 2;
    config.channel.reconnect_delay_ms = 20;
    config.channel.reconnect_max_delay_ms = 50;
    config.channel.reconnect_multiplier = 1.0;
    config
}

/// Context using real HTTP against `server` and the scripted progress channel
pub fn context_for(server: &FakeServer) -> ClientContext<ScriptedChannel> {
    let backend = HttpBackend::new(&server.base_url).unwrap();
    ClientContext::with_parts(
        test_config(&server.base_url),
        Arc::new(backend),
        Arc::new(ScriptedChannel::new(server.state.clone())),
    )
}

pub fn png(name: &str, size: usize) -> SelectedFile {
    SelectedFile::in_memory(name, "image/png", vec![0u8; size])
}

/// Poll `condition` every 10 ms until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
