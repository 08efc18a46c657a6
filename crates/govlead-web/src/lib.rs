//! Axum ingress for the job runner: named events in, health and sync state out.

use std::net::SocketAddr;
use std::sync::Arc;

use askama::Template;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use govlead_core::{ContractSource, EventSink, PipelineEvent, SyncState, SyncStateStore};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "govlead-web";

pub const DEFAULT_WEB_PORT: u16 = 8000;

#[derive(Clone)]
pub struct AppState {
    pub events: Arc<dyn EventSink>,
    pub sync_states: Arc<dyn SyncStateStore>,
}

impl AppState {
    pub fn new(events: Arc<dyn EventSink>, sync_states: Arc<dyn SyncStateStore>) -> Self {
        Self { events, sync_states }
    }
}

#[derive(Debug, Clone)]
struct StatusRow {
    source: String,
    last_synced_at: String,
    fetched: u64,
    created: u64,
    updated: u64,
    failed: u64,
}

impl StatusRow {
    fn from_state(source: ContractSource, state: Option<&SyncState>) -> Self {
        let count = |key: &str| {
            state
                .and_then(|s| s.metadata.get(key))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0)
        };
        Self {
            source: source.to_string(),
            last_synced_at: state
                .and_then(|s| s.last_synced_at)
                .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never".to_string()),
            fetched: count("fetched"),
            created: count("created"),
            updated: count("updated"),
            failed: count("failed"),
        }
    }
}

#[derive(Template)]
#[template(path = "status.html")]
struct StatusTemplate {
    title: &'static str,
    rows: Vec<StatusRow>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/api/health", get(health_handler))
        .route("/api/events", post(events_handler))
        .route("/api/sync-state/{sync_type}", get(sync_state_handler))
        .with_state(Arc::new(state))
}

pub fn web_port_from_env() -> u16 {
    std::env::var("GOVLEAD_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WEB_PORT)
}

pub async fn serve(port: u16, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!(%port, "web ingress listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn events_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let event: PipelineEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "rejected event payload");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response();
        }
    };
    let name = event.name();
    match state.events.emit(event).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "queued": name }))).into_response(),
        Err(err) => {
            error!(event = name, error = %err, "could not queue event");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn sync_state_handler(State(state): State<Arc<AppState>>, Path(sync_type): Path<String>) -> Response {
    match state.sync_states.get_sync_state(&sync_type).await {
        Ok(Some(sync_state)) => Json(sync_state).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no sync state for {sync_type}") })),
        )
            .into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    let mut rows = Vec::with_capacity(ContractSource::ALL.len());
    for source in ContractSource::ALL {
        match state.sync_states.get_sync_state(source.as_str()).await {
            Ok(sync_state) => rows.push(StatusRow::from_state(source, sync_state.as_ref())),
            Err(err) => return server_error(err.into()),
        }
    }
    render_html(StatusTemplate {
        title: "Contract lead sync status",
        rows,
    })
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %format!("{err:#}"), "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
