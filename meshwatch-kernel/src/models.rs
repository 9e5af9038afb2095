use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One network-quality observation as stored by the ingestion side.
///
/// `timestamp` is whatever the agent sent: seconds or milliseconds since
/// the epoch. See [`crate::classify::normalize_timestamp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetricSample {
    pub node_id: String,
    #[sqlx(rename = "latency")]
    pub latency_ms: f64,
    #[sqlx(rename = "jitter")]
    pub jitter_ms: f64,
    #[sqlx(rename = "packet_loss")]
    pub packet_loss_pct: f64,
    #[sqlx(rename = "bandwidth")]
    pub bandwidth_mbps: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodStatus {
    Online,
    Stale,
    Offline,
}

/// Derived health of one node, rebuilt on every snapshot request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodHealth {
    pub node_id: String,
    pub label: String,
    pub status: PodStatus,
    pub last_seen: Option<i64>,   // epoch seconds, normalized
    pub age_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PodMetrics>,
    pub alerts: Vec<String>,
}

/// Sample values as shown on a pod; the node is already identified by the pod.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodMetrics {
    pub latency_ms: f64,
    pub jitter_ms: f64,
    pub packet_loss_pct: f64,
    pub bandwidth_mbps: f64,
    pub timestamp: i64,
}

impl From<MetricSample> for PodMetrics {
    fn from(s: MetricSample) -> Self {
        Self {
            latency_ms: s.latency_ms,
            jitter_ms: s.jitter_ms,
            packet_loss_pct: s.packet_loss_pct,
            bandwidth_mbps: s.bandwidth_mbps,
            timestamp: s.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub pods: Vec<PodHealth>,
    pub generated_at_ms: i64,
    pub online_threshold_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Log line pushed to live observers. Serializes as `{message, level, source, ts}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub message: String,
    pub level: LogLevel,
    pub source: String,
    pub ts: i64, // unix millis
}

impl LogLine {
    pub fn new(level: LogLevel, source: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            source: source.to_string(),
            ts: unix_millis(OffsetDateTime::now_utc()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    ChartUpdate,
    LogLine(LogLine),
}

pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}
