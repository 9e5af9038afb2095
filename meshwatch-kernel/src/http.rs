/**
 * MESHWATCH HTTP API - front door of the kernel
 *
 * ROUTES :
 * - GET  /health               liveness, always "ok"
 * - GET  /system/health        kernel self-health (uptime, subscribers, jobs, mqtt)
 * - GET  /api/snapshot         fleet snapshot, 500 {"error":"db_error"} when the store is down
 * - GET  /api/events/charts    SSE, one `data: update` per regenerated chart set
 * - GET  /api/events/logs      SSE, one `data: {message, level, source, ts}` per log line
 * - POST /api/charts/updated   chart-regeneration trigger
 * - POST /api/ap/start|stop    access-point control jobs, acknowledged immediately
 * - GET  /api/jobs             latest run of every job
 *
 * Control requests never wait for the script: the outcome arrives later on
 * the log stream.
 */

use crate::aggregator::SnapshotAggregator;
use crate::config::KernelConfig;
use crate::events::{Channel, EventHub};
use crate::health::{HealthTracker, KernelHealth};
use crate::jobs::{JobRecord, JobRunner, AP_START, AP_STOP};
use crate::models::{BroadcastEvent, FleetSnapshot};
use crate::store::StoreError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<KernelConfig>,
    pub aggregator: SnapshotAggregator,
    pub hub: EventHub,
    pub jobs: JobRunner,
    pub health_tracker: HealthTracker,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Store(e) => {
                error!("snapshot failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "db_error" }))).into_response()
            }
        }
    }
}

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/events/charts", get(chart_events))
        .route("/api/events/logs", get(log_events))
        .route("/api/charts/updated", post(charts_updated))
        .route("/api/ap/start", post(ap_start))
        .route("/api/ap/stop", post(ap_stop))
        .route("/api/jobs", get(list_jobs))
        .with_state(app_state)
}

// GET /api/snapshot
async fn get_snapshot(State(app): State<AppState>) -> Result<Json<FleetSnapshot>, ApiError> {
    Ok(Json(app.aggregator.snapshot().await?))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(app.cfg.roster.len(), &app.hub, &app.jobs))
}

// GET /api/events/charts
async fn chart_events(State(app): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_stream(&app.hub, Channel::Charts)
}

// GET /api/events/logs
async fn log_events(State(app): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_stream(&app.hub, Channel::Logs)
}

/// The subscription lives inside the response stream: when the client goes
/// away axum drops the stream and the hub forgets the subscriber.
fn event_stream(hub: &EventHub, channel: Channel) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = hub.subscribe(channel).map(|ev| Ok(to_sse(ev)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
}

fn to_sse(ev: BroadcastEvent) -> Event {
    match ev {
        BroadcastEvent::ChartUpdate => Event::default().data("update"),
        BroadcastEvent::LogLine(line) => match serde_json::to_string(&line) {
            Ok(payload) => Event::default().data(payload),
            Err(e) => {
                warn!("unserializable log line: {e}");
                Event::default().comment("dropped log line")
            }
        },
    }
}

// POST /api/charts/updated
async fn charts_updated(State(app): State<AppState>) -> Json<serde_json::Value> {
    let delivered = app.hub.publish_chart_update();
    Json(json!({ "ok": true, "delivered": delivered }))
}

// POST /api/ap/start
async fn ap_start(State(app): State<AppState>) -> Json<serde_json::Value> {
    start_job(&app, AP_START, &app.cfg.jobs.ap_start_script)
}

// POST /api/ap/stop
async fn ap_stop(State(app): State<AppState>) -> Json<serde_json::Value> {
    start_job(&app, AP_STOP, &app.cfg.jobs.ap_stop_script)
}

fn start_job(app: &AppState, name: &str, script: &Path) -> Json<serde_json::Value> {
    // detached: the handle is dropped and the task keeps running
    let _ = app.jobs.run(name, script, app.cfg.jobs.use_elevated);
    Json(json!({ "ok": true, "job": name, "msg": "accepted" }))
}

// GET /api/jobs
async fn list_jobs(State(app): State<AppState>) -> Json<Vec<JobRecord>> {
    Json(app.jobs.records())
}
