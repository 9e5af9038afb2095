//! Kernel configuration, loaded once at startup and never mutated.
//!
//! Scalars come from the environment (optionally seeded by a `.env` file),
//! the node roster comes from a YAML file. Every value has a default so a
//! bare `meshwatch-kernel` starts against the lab compose setup.

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::{Path, PathBuf}, time::Duration};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("roster error: {0}")]
    Roster(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub bind: SocketAddr,
    pub store: StoreConf,
    pub roster: Roster,
    pub online_threshold_seconds: i64,
    pub alerts: AlertThresholds,
    pub jobs: JobsConf,
    pub probe: ProbeConf,
    /// Capacity of each subscriber queue in the event hub.
    pub event_buffer: usize,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Clone)]
pub struct StoreConf {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// Alert bounds. `None` disables the check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub max_latency_ms: Option<f64>,
    pub max_jitter_ms: Option<f64>,
    pub max_packet_loss_pct: Option<f64>,
    pub min_bandwidth_mbps: Option<f64>,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_latency_ms: Some(200.0),
            max_jitter_ms: Some(30.0),
            max_packet_loss_pct: Some(5.0),
            min_bandwidth_mbps: Some(5.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobsConf {
    pub ap_start_script: PathBuf,
    pub ap_stop_script: PathBuf,
    pub use_elevated: bool,
    pub elevate_command: Vec<String>, // ex: ["sudo", "-n"]
    pub shell: String,
    pub single_flight: bool,
}

impl Default for JobsConf {
    fn default() -> Self {
        Self {
            ap_start_script: PathBuf::from("scripts/ap_start.sh"),
            ap_stop_script: PathBuf::from("scripts/ap_stop.sh"),
            use_elevated: false,
            elevate_command: vec!["sudo".into(), "-n".into()],
            shell: "bash".into(),
            single_flight: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConf {
    pub hosts: Vec<String>,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for ProbeConf {
    fn default() -> Self {
        Self {
            hosts: vec!["192.168.4.1".into(), "127.0.0.1".into()],
            port: 50051,
            timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub chart_topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub label: String,
}

/// Known nodes in display order, plus the node allowed a TCP liveness fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub gateway: Option<String>,
    pub nodes: Vec<RosterEntry>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            gateway: Some("rpi4".into()),
            nodes: vec![
                RosterEntry { id: "rpi4".into(), label: "Raspberry Pi 4 (gateway)".into() },
                RosterEntry { id: "rpi3".into(), label: "Raspberry Pi 3".into() },
            ],
        }
    }
}

impl Roster {
    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        let roster: Roster = serde_yaml::from_str(txt).map_err(|e| ConfigError::Roster(e.to_string()))?;
        roster.validate()?;
        Ok(roster)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(ConfigError::Roster(format!("node #{i} has an empty id")));
            }
            if self.nodes[..i].iter().any(|n| n.id == node.id) {
                return Err(ConfigError::Roster(format!("duplicate node id {}", node.id)));
            }
        }
        if let Some(gw) = &self.gateway {
            if !self.contains(gw) {
                return Err(ConfigError::Roster(format!("gateway {gw} is not in nodes")));
            }
        }
        Ok(())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreConf {
                database_url: "postgres://admin:admin@db:5432/metrics".into(),
                max_connections: 5,
                acquire_timeout: Duration::from_millis(3000),
            },
            roster: Roster::default(),
            online_threshold_seconds: 30,
            alerts: AlertThresholds::default(),
            jobs: JobsConf::default(),
            probe: ProbeConf::default(),
            event_buffer: 100,
            mqtt: None,
        }
    }
}

impl KernelConfig {
    /// Builds the scalar part of the config from an arbitrary key lookup.
    /// The roster is left at its default; see [`load_config`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = KernelConfig::default();

        if let Some(v) = get("MESHWATCH_BIND") {
            cfg.bind = parse_value("MESHWATCH_BIND", &v)?;
        }
        if let Some(v) = get("MESHWATCH_DATABASE_URL").or_else(|| get("DATABASE_URL")) {
            cfg.store.database_url = v;
        }
        if let Some(v) = get("MESHWATCH_DB_MAX_CONNECTIONS") {
            cfg.store.max_connections = parse_value("MESHWATCH_DB_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("MESHWATCH_DB_ACQUIRE_TIMEOUT_MS") {
            cfg.store.acquire_timeout = Duration::from_millis(parse_value("MESHWATCH_DB_ACQUIRE_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("MESHWATCH_ONLINE_THRESHOLD_SECS") {
            cfg.online_threshold_seconds = parse_value("MESHWATCH_ONLINE_THRESHOLD_SECS", &v)?;
        }

        // alert thresholds: unset keeps the default, "" or "off" disables
        let threshold = |key: &str, default: Option<f64>| -> Result<Option<f64>, ConfigError> {
            match lookup(key).map(|v| v.trim().to_string()) {
                None => Ok(default),
                Some(v) if v.is_empty() || v.eq_ignore_ascii_case("off") => Ok(None),
                Some(v) => parse_value(key, &v).map(Some),
            }
        };
        let defaults = AlertThresholds::default();
        cfg.alerts = AlertThresholds {
            max_latency_ms: threshold("MESHWATCH_ALERT_MAX_LATENCY_MS", defaults.max_latency_ms)?,
            max_jitter_ms: threshold("MESHWATCH_ALERT_MAX_JITTER_MS", defaults.max_jitter_ms)?,
            max_packet_loss_pct: threshold("MESHWATCH_ALERT_MAX_LOSS_PCT", defaults.max_packet_loss_pct)?,
            min_bandwidth_mbps: threshold("MESHWATCH_ALERT_MIN_BANDWIDTH_MBPS", defaults.min_bandwidth_mbps)?,
        };

        if let Some(v) = get("MESHWATCH_AP_START_SCRIPT") {
            cfg.jobs.ap_start_script = PathBuf::from(v);
        }
        if let Some(v) = get("MESHWATCH_AP_STOP_SCRIPT") {
            cfg.jobs.ap_stop_script = PathBuf::from(v);
        }
        if let Some(v) = get("MESHWATCH_USE_ELEVATED") {
            cfg.jobs.use_elevated = parse_bool("MESHWATCH_USE_ELEVATED", &v)?;
        }
        if let Some(v) = get("MESHWATCH_ELEVATE_COMMAND") {
            cfg.jobs.elevate_command = shell_words::split(&v).map_err(|_| invalid("MESHWATCH_ELEVATE_COMMAND", &v))?;
        }
        if let Some(v) = get("MESHWATCH_SCRIPT_SHELL") {
            cfg.jobs.shell = v;
        }
        if let Some(v) = get("MESHWATCH_JOB_SINGLE_FLIGHT") {
            cfg.jobs.single_flight = parse_bool("MESHWATCH_JOB_SINGLE_FLIGHT", &v)?;
        }

        if let Some(v) = get("MESHWATCH_GATEWAY_PROBE_HOSTS") {
            cfg.probe.hosts = v.split(',').map(str::trim).filter(|h| !h.is_empty()).map(String::from).collect();
        }
        if let Some(v) = get("MESHWATCH_GATEWAY_PROBE_PORT") {
            cfg.probe.port = parse_value("MESHWATCH_GATEWAY_PROBE_PORT", &v)?;
        }
        if let Some(v) = get("MESHWATCH_GATEWAY_PROBE_TIMEOUT_MS") {
            cfg.probe.timeout = Duration::from_millis(parse_value("MESHWATCH_GATEWAY_PROBE_TIMEOUT_MS", &v)?);
        }

        if let Some(v) = get("MESHWATCH_EVENT_BUFFER") {
            let buffer: usize = parse_value("MESHWATCH_EVENT_BUFFER", &v)?;
            if buffer == 0 {
                return Err(invalid("MESHWATCH_EVENT_BUFFER", &v));
            }
            cfg.event_buffer = buffer;
        }

        if let Some(host) = get("MESHWATCH_MQTT_HOST") {
            let port = match get("MESHWATCH_MQTT_PORT") {
                Some(v) => parse_value("MESHWATCH_MQTT_PORT", &v)?,
                None => 1883,
            };
            let chart_topic = get("MESHWATCH_MQTT_CHART_TOPIC")
                .unwrap_or_else(|| "meshwatch/charts/updated@v1".into());
            cfg.mqtt = Some(MqttConf { host, port, chart_topic });
        }

        Ok(cfg)
    }
}

/// Loads the process configuration: environment scalars plus the roster file
/// named by `MESHWATCH_ROSTER` (default `roster.yaml`).
pub async fn load_config() -> Result<KernelConfig, ConfigError> {
    let mut cfg = KernelConfig::from_lookup(|key| std::env::var(key).ok())?;
    let roster_path = std::env::var("MESHWATCH_ROSTER").unwrap_or_else(|_| "roster.yaml".into());
    cfg.roster = load_roster(&roster_path).await?;
    info!(
        roster = %roster_path,
        nodes = cfg.roster.len(),
        gateway = ?cfg.roster.gateway,
        "configuration loaded"
    );
    Ok(cfg)
}

pub async fn load_roster<P: AsRef<Path>>(path: P) -> Result<Roster, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("no roster file at {}, using default roster", path.display());
        return Ok(Roster::default());
    }
    let txt = fs::read_to_string(path).await?;
    if txt.trim().is_empty() {
        warn!("roster file {} is empty, using default roster", path.display());
        return Ok(Roster::default());
    }
    Roster::from_yaml(&txt)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() }
}
