//! In-process stand-ins for the API backend and the edge stream host.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{Query, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream;
use serde_json::{json, Value};

pub const ADMIN_TOKEN: &str = "tok-admin";
pub const OPERATOR_TOKEN: &str = "tok-operator";

pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Poll `cond` every 20ms; panic after `timeout`.
pub async fn wait_until(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ── API backend ───────────────────────────────────────────────────────────────

pub struct Backend {
    pub rows: Mutex<Vec<Value>>,
    pub camera: Mutex<Value>,
    pub hits: AtomicUsize,
    pub camera_puts: AtomicUsize,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            camera: Mutex::new(json!({
                "id": 1, "name": "Front door", "rtsp_url": "rtsp://cam/1",
                "roi": [[100, 100], [500, 100], [500, 400], [100, 400]], "line": null
            })),
            hits: AtomicUsize::new(0),
            camera_puts: AtomicUsize::new(0),
        })
    }

    pub fn set_rows(&self, rows: Value) {
        *self.rows.lock().unwrap() = rows.as_array().cloned().unwrap_or_default();
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn role_of(headers: &HeaderMap) -> Option<&'static str> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    match auth.strip_prefix("Bearer ")? {
        ADMIN_TOKEN => Some("admin"),
        OPERATOR_TOKEN => Some("operator"),
        _ => None,
    }
}

pub async fn spawn_backend(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/me", get(me))
        .route("/api/stats/daily", get(daily))
        .route("/api/cameras/:id", get(get_camera).put(put_camera))
        .route("/api/reports/csv", get(report))
        .with_state(backend);
    serve(app).await
}

async fn login(State(b): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    b.hits.fetch_add(1, Ordering::SeqCst);
    match (body["username"].as_str(), body["password"].as_str()) {
        (Some("admin"), Some("admin123")) => {
            Json(json!({"access_token": ADMIN_TOKEN, "token_type": "bearer"})).into_response()
        }
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn me(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.hits.fetch_add(1, Ordering::SeqCst);
    match role_of(&headers) {
        Some(role) => Json(json!({"id": 1, "username": role, "role": role})).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn daily(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    b.hits.fetch_add(1, Ordering::SeqCst);
    if role_of(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let rows: Vec<Value> = b
        .rows
        .lock()
        .unwrap()
        .iter()
        .filter(|r| q.get("day").map_or(true, |d| r["day"] == d.as_str()))
        .cloned()
        .collect();
    Json(Value::Array(rows)).into_response()
}

async fn get_camera(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.hits.fetch_add(1, Ordering::SeqCst);
    if role_of(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(b.camera.lock().unwrap().clone()).into_response()
}

async fn put_camera(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    b.hits.fetch_add(1, Ordering::SeqCst);
    b.camera_puts.fetch_add(1, Ordering::SeqCst);
    match role_of(&headers) {
        Some("admin") => {}
        Some(_) => return StatusCode::FORBIDDEN.into_response(),
        None => return StatusCode::UNAUTHORIZED.into_response(),
    }
    let mut camera = b.camera.lock().unwrap();
    camera["rtsp_url"] = body["rtsp_url"].clone();
    camera["roi"] = body["roi"].clone();
    Json(camera.clone()).into_response()
}

async fn report(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    b.hits.fetch_add(1, Ordering::SeqCst);
    if role_of(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let from = q.get("from_day").cloned().unwrap_or_default();
    let to = q.get("to_day").cloned().unwrap_or_default();
    Json(json!({
        "filename": format!("report_{}_{}.csv", from, to),
        "csv": "day,camera_id,total_in,total_out,unique_estimate\n2024-05-01,1,12,9,7\n"
    }))
    .into_response()
}

// ── Edge stream host ──────────────────────────────────────────────────────────

pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0xFF, 0xD9];

pub struct StreamHost {
    pub healthy: AtomicBool,
    pub feed_up: AtomicBool,
    /// Frames sent per connection before the body stalls (kept open).
    pub frames_per_conn: usize,
    pub feed_queries: Mutex<Vec<Option<String>>>,
}

impl StreamHost {
    pub fn new(healthy: bool, feed_up: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(healthy),
            feed_up: AtomicBool::new(feed_up),
            frames_per_conn: 3,
            feed_queries: Mutex::new(Vec::new()),
        })
    }
}

pub async fn spawn_stream_host(host: Arc<StreamHost>) -> String {
    let app = Router::new()
        .route("/health", get(health))
        .route("/video_feed", get(video_feed))
        .with_state(host);
    serve(app).await
}

async fn health(State(h): State<Arc<StreamHost>>) -> Response {
    if h.healthy.load(Ordering::SeqCst) {
        Json(json!({"status": "ok", "camera": "/dev/video0"})).into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn video_feed(State(h): State<Arc<StreamHost>>, RawQuery(query): RawQuery) -> Response {
    h.feed_queries.lock().unwrap().push(query);
    if !h.feed_up.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let parts: Vec<Result<Bytes, std::io::Error>> = (0..h.frames_per_conn)
        .map(|_| {
            let mut part = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
            part.extend_from_slice(JPEG);
            part.extend_from_slice(b"\r\n");
            Ok(Bytes::from(part))
        })
        .collect();
    let body = stream::StreamExt::chain(stream::iter(parts), stream::pending());

    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        Body::from_stream(body),
    )
        .into_response()
}
