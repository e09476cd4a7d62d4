use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_NOTIFICATIONS: &str = "/webapi/notifications";
pub const PATH_COURSES: &str = "/webapi/courses";
pub const PATH_COURSE_ARCHIVE: &str = "/webapi/course/archive";
pub const PATH_COURSE_RESTORE: &str = "/webapi/course/restore";
pub const PATH_STATUS: &str = "/status/{code}";
pub const PATH_SLOW: &str = "/slow";

/// Token the mock expects in `x-csrf-token` on state-changing calls.
pub const CSRF_TOKEN: &str = "test-csrf";

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    archive_calls: Arc<AtomicU64>,
    saw_csrf_header: Arc<AtomicU64>,
    archived_course_ids: Arc<Mutex<BTreeSet<String>>>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_archive_calls(&self) {
        self.archive_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_saw_csrf_header(&self) {
        self.saw_csrf_header.fetch_add(1, Ordering::Relaxed);
    }

    fn note_archived_course(&self, course_id: &str) {
        self.archived_course_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(course_id.to_string());
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn archive_calls(&self) -> u64 {
        self.archive_calls.load(Ordering::Relaxed)
    }

    pub fn saw_csrf_header(&self) -> u64 {
        self.saw_csrf_header.load(Ordering::Relaxed)
    }

    /// Distinct `courseid` values seen by the archive endpoint.
    pub fn archived_course_ids(&self) -> BTreeSet<String> {
        self.archived_course_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub notifications: String,
    pub courses: String,
    pub course_archive: String,
    pub course_restore: String,
    pub slow: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            notifications: format!("{base_url}{PATH_NOTIFICATIONS}"),
            courses: format!("{base_url}{PATH_COURSES}"),
            course_archive: format!("{base_url}{PATH_COURSE_ARCHIVE}"),
            course_restore: format!("{base_url}{PATH_COURSE_RESTORE}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }
}

fn note_csrf(stats: &TestServerStats, headers: &HeaderMap) {
    if headers.get("x-csrf-token").and_then(|v| v.to_str().ok()) == Some(CSRF_TOKEN) {
        stats.inc_saw_csrf_header();
    }
}

async fn handle_notifications(State(stats): State<TestServerStats>) -> Json<Value> {
    stats.inc_requests_total();
    Json(json!({
        "notifications": [
            {"notificationId": "n-1", "title": "Welcome", "style": "INFO"},
            {"notificationId": "n-2", "title": "Maintenance", "style": "WARNING"},
        ]
    }))
}

/// Bare array, the way the instructor course list answers.
async fn handle_courses(State(stats): State<TestServerStats>) -> Json<Value> {
    stats.inc_requests_total();
    Json(json!([
        {"courseId": "CS101", "courseName": "Programming Methodology"},
        {"courseId": "CS102", "courseName": "Data Structures"},
        {"courseId": "CS103", "courseName": "Algorithms"},
    ]))
}

async fn handle_archive(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> (StatusCode, Json<Value>) {
    stats.inc_requests_total();
    stats.inc_archive_calls();
    note_csrf(&stats, &headers);

    let Some(course_id) = query.get("courseid") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "missing courseid"})),
        );
    };
    stats.note_archived_course(course_id);

    // `{"archiveStatus": false}` unarchives; anything else archives.
    let archive = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("archiveStatus").and_then(Value::as_bool))
        .unwrap_or(true);

    (StatusCode::OK, Json(json!({"isArchived": archive})))
}

/// Answers 200 with an empty object and no `restored` field.
async fn handle_restore(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
) -> Json<Value> {
    stats.inc_requests_total();
    note_csrf(&stats, &headers);
    Json(json!({}))
}

async fn handle_status(State(stats): State<TestServerStats>, Path(code): Path<u16>) -> StatusCode {
    stats.inc_requests_total();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn handle_slow(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    sleep(Duration::from_millis(50)).await;
    "slow"
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_NOTIFICATIONS, get(handle_notifications))
        .route(PATH_COURSES, get(handle_courses))
        .route(PATH_COURSE_ARCHIVE, put(handle_archive))
        .route(PATH_COURSE_RESTORE, put(handle_restore))
        .route(PATH_STATUS, get(handle_status))
        .route(PATH_SLOW, get(handle_slow))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
