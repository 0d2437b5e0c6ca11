use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::{
    config::{ScanConfig, ScanOptions},
    progress::LiveState,
    scanner::Scanner,
    types::ScanReport,
};

#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug, Default)]
struct ServerState {
    state: RunState,
    generation: u64,
    total: u64,
    report: Option<ScanReport>,
    live: Option<Arc<LiveState>>,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Status {
    pub state: RunState,
    pub total: u64,
    pub scanned: u64,
    pub http: u64,
    pub kept: u64,
    pub current: String,
    pub elapsed_seconds: f64,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/cancel", post(post_cancel))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new().nest("/api", api).layer(SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    ))
}

pub async fn spawn_server(bind: &str) -> Result<()> {
    let app = router(AppState::default());
    log::info!("serving scan API on http://{bind}/api");
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let out = match s.live.as_ref() {
        Some(live) => {
            let snap = live.snapshot();
            Status {
                state: s.state,
                total: snap.total,
                scanned: snap.scanned,
                http: snap.http,
                kept: snap.kept,
                current: snap.current,
                elapsed_seconds: snap.elapsed.as_secs_f64(),
            }
        }
        None => Status {
            state: s.state,
            total: s.total,
            ..Status::default()
        },
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(report) = s.report.as_ref() {
        (StatusCode::OK, Json(report.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_cancel(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match (s.state, s.cancel.as_ref()) {
        (RunState::Running, Some(cancel)) => {
            cancel.cancel();
            StatusCode::ACCEPTED
        }
        _ => StatusCode::CONFLICT,
    }
}

async fn post_scan(State(app): State<AppState>, Json(opts): Json<ScanOptions>) -> impl IntoResponse {
    // Configuration problems are rejected before any socket is opened.
    let config = match ScanConfig::new(opts) {
        Ok(c) => c,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let scanner = match Scanner::new(config) {
        Ok(s) => s,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let live = scanner.live_state();
    let cancel = CancellationToken::new();
    let total = live.total();

    let generation = {
        let mut s = app.inner.write().await;
        // Cancel any existing scan
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.state = RunState::Running;
        s.total = total;
        s.report = None;
        s.live = Some(live.clone());
        s.cancel = Some(cancel.clone());
        s.generation += 1;
        s.generation
    };

    let app2 = app.clone();
    tokio::spawn(async move {
        let report = scanner.run(live, cancel).await;
        let mut s = app2.inner.write().await;
        // A newer scan replaced this one; its results win.
        if s.generation != generation {
            return;
        }
        s.state = if report.meta.cancelled {
            RunState::Cancelled
        } else {
            RunState::Done
        };
        s.report = Some(report);
        s.cancel = None;
    });

    (
        StatusCode::ACCEPTED,
        Json(Status {
            state: RunState::Running,
            total,
            ..Status::default()
        }),
    )
        .into_response()
}
