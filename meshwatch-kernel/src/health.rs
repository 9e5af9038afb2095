use crate::events::{Channel, EventHub};
use crate::jobs::JobRunner;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub roster_size: usize,
    pub chart_subscribers: usize,
    pub log_subscribers: usize,
    pub events_dropped: u64,
    pub jobs_running: usize,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

/// Self-health of the kernel process, served at `/system/health`.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<&'static str>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new("disabled")),
        }
    }

    pub fn mark_mqtt_connecting(&self) {
        *self.mqtt_status.lock() = "connecting";
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected";
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting";
    }

    pub fn get_health(&self, roster_size: usize, hub: &EventHub, jobs: &JobRunner) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            roster_size,
            chart_subscribers: hub.subscriber_count(Channel::Charts),
            log_subscribers: hub.subscriber_count(Channel::Logs),
            events_dropped: hub.dropped_events(),
            jobs_running: jobs.running_count(),
            mqtt_status: self.mqtt_status.lock().to_string(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }
}
