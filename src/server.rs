use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use time::{format_description::well_known, OffsetDateTime};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    config::ScanConfig,
    scanner::{self, SharedProgress},
    types::ScanReport,
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug)]
struct ServerState {
    status: Status,
    results: Option<ScanReport>,
    progress: Option<SharedProgress>,
    cancel: Option<CancellationToken>,
    generation: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Status {
    pub total: u64,
    pub scanned: u64,
    pub open: u64,
    pub identified: u64,
    pub state: String, // "idle" | "running" | "done"
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState {
                status: Status {
                    state: "idle".into(),
                    ..Status::default()
                },
                results: None,
                progress: None,
                cancel: None,
                generation: 0,
            })),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/cancel", post(post_cancel))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str) -> Result<()> {
    let app = router(AppState::new());
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("serving scan API on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let mut out = s.status.clone();
    if let Some(p) = s.progress.as_ref() {
        out.total = p.total.load(Ordering::Relaxed);
        out.scanned = p.scanned_done.load(Ordering::Relaxed);
        out.open = p.open_count.load(Ordering::Relaxed);
        out.identified = p.identified.load(Ordering::Relaxed);
    }
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(res) = s.results.as_ref() {
        (StatusCode::OK, Json(res.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_cancel(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.cancel.as_ref() {
        Some(c) => {
            c.cancel();
            StatusCode::ACCEPTED
        }
        None => StatusCode::CONFLICT,
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanConfig>) -> impl IntoResponse {
    // Reject bad specs before touching any running scan.
    let plan = match req.validate() {
        Ok(plan) => plan,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let total = plan.total_probes();
    let progress = SharedProgress::new();
    let cancel = CancellationToken::new();
    let status = Status {
        total,
        state: "running".into(),
        started_at: Some(now_rfc3339()),
        ..Status::default()
    };

    let generation = {
        let mut s = app.inner.write().await;
        // Cancel any existing scan
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.generation += 1;
        s.status = status.clone();
        s.results = None;
        s.progress = Some(progress.clone());
        s.cancel = Some(cancel.clone());
        s.generation
    };

    info!(iprange = %req.iprange, ports = %req.ports, "scan requested");
    let app2 = app.clone();
    tokio::spawn(async move {
        let report = scanner::scan_plan(&plan, cancel, progress.clone()).await;

        let mut s = app2.inner.write().await;
        // A newer request replaced this scan; leave its state alone.
        if s.generation != generation {
            return;
        }
        s.status.scanned = progress.scanned_done.load(Ordering::Relaxed);
        s.status.open = progress.open_count.load(Ordering::Relaxed);
        s.status.identified = progress.identified.load(Ordering::Relaxed);
        s.status.state = "done".into();
        s.status.finished_at = Some(now_rfc3339());
        s.results = Some(report);
        s.progress = None;
        s.cancel = None;
    });

    (StatusCode::ACCEPTED, Json(status)).into_response()
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339).unwrap_or_else(|e| {
        error!("timestamp formatting failed: {e}");
        String::from("1970-01-01T00:00:00Z")
    })
}
