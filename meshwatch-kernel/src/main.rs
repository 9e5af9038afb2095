/**
 * MESHWATCH KERNEL - entry point
 *
 * Wires config, sample store, event hub, job runner, optional MQTT chart
 * trigger and the HTTP API, then serves until the process is stopped.
 */

use anyhow::{Context, Result};
use meshwatch_kernel::config::load_config;
use meshwatch_kernel::health::HealthTracker;
use meshwatch_kernel::http::{build_router, AppState};
use meshwatch_kernel::store::PgSampleStore;
use meshwatch_kernel::{mqtt, EventHub, JobRunner, SnapshotAggregator};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meshwatch_kernel=info")),
        )
        .init();

    let cfg = Arc::new(load_config().await.context("failed to load configuration")?);

    let store = PgSampleStore::connect_lazy(&cfg.store).context("invalid database url")?;
    let aggregator = SnapshotAggregator::from_config(Arc::new(store), &cfg);

    let hub = EventHub::new(cfg.event_buffer);
    let jobs = JobRunner::new(hub.clone(), &cfg.jobs);
    let health_tracker = HealthTracker::new();

    match cfg.mqtt.clone() {
        Some(mqtt_conf) => {
            mqtt::spawn_chart_trigger_listener(mqtt_conf, hub.clone(), health_tracker.clone());
        }
        None => info!("MQTT chart trigger disabled (MESHWATCH_MQTT_HOST unset)"),
    }

    let app = build_router(AppState {
        cfg: cfg.clone(),
        aggregator,
        hub,
        jobs,
        health_tracker,
    });

    let listener = TcpListener::bind(cfg.bind).await.with_context(|| format!("cannot bind {}", cfg.bind))?;
    info!("listening on http://{}", cfg.bind);
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
