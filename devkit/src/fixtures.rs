/*!
Fixtures: samples, rosters and control scripts
*/

use meshwatch_kernel::config::RosterEntry;
use meshwatch_kernel::{MetricSample, Roster};
use std::fs;
use std::path::{Path, PathBuf};

/// Healthy sample by default (well inside every default alert threshold).
#[derive(Debug, Clone)]
pub struct SampleBuilder {
    sample: MetricSample,
}

impl SampleBuilder {
    pub fn new(node_id: &str) -> Self {
        Self {
            sample: MetricSample {
                node_id: node_id.to_string(),
                latency_ms: 12.0,
                jitter_ms: 1.5,
                packet_loss_pct: 0.0,
                bandwidth_mbps: 48.0,
                timestamp: 0,
            },
        }
    }

    /// Raw timestamp, seconds or milliseconds, stored untouched.
    pub fn at(mut self, timestamp: i64) -> Self {
        self.sample.timestamp = timestamp;
        self
    }

    pub fn latency(mut self, ms: f64) -> Self {
        self.sample.latency_ms = ms;
        self
    }

    pub fn jitter(mut self, ms: f64) -> Self {
        self.sample.jitter_ms = ms;
        self
    }

    pub fn packet_loss(mut self, pct: f64) -> Self {
        self.sample.packet_loss_pct = pct;
        self
    }

    pub fn bandwidth(mut self, mbps: f64) -> Self {
        self.sample.bandwidth_mbps = mbps;
        self
    }

    pub fn build(self) -> MetricSample {
        self.sample
    }
}

/// Roster whose labels are the upper-cased ids.
pub fn roster(gateway: Option<&str>, ids: &[&str]) -> Roster {
    Roster {
        gateway: gateway.map(str::to_string),
        nodes: ids
            .iter()
            .map(|id| RosterEntry { id: id.to_string(), label: id.to_uppercase() })
            .collect(),
    }
}

/// Writes a `sh` script into `dir` and returns its path.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let content = format!("#!/bin/sh\n{body}\n");
    // the runner invokes the interpreter explicitly, no exec bit needed
    if let Err(e) = fs::write(&path, content) {
        panic!("cannot write script fixture {}: {e}", path.display());
    }
    path
}
