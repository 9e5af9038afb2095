/*!
Test harness for kernel components

Owns an `EventHub`, a `JobRunner` wired to it, a scratch directory for
scripts and a log subscription opened before anything runs, so no event
published during a test is missed.
*/

use anyhow::Result;
use meshwatch_kernel::config::JobsConf;
use meshwatch_kernel::{BroadcastEvent, Channel, EventHub, JobRunner, LogLine, Subscription};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

pub struct TestHarness {
    pub hub: EventHub,
    pub jobs: JobRunner,
    logs: Subscription,
    dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_jobs_conf(JobsConf { shell: "sh".into(), ..JobsConf::default() })
    }

    pub fn with_jobs_conf(conf: JobsConf) -> Self {
        init_tracing();
        let hub = EventHub::new(256);
        let jobs = JobRunner::new(hub.clone(), &conf);
        let logs = hub.subscribe(Channel::Logs);
        let dir = TempDir::new().expect("cannot create scratch dir");
        Self { hub, jobs, logs, dir }
    }

    /// Next log line, or an error after `timeout_ms`.
    pub async fn next_log(&mut self, timeout_ms: u64) -> Result<LogLine> {
        match timeout(Duration::from_millis(timeout_ms), self.logs.recv()).await {
            Ok(Some(BroadcastEvent::LogLine(line))) => Ok(line),
            Ok(Some(other)) => anyhow::bail!("unexpected event on log channel: {other:?}"),
            Ok(None) => anyhow::bail!("log channel closed"),
            Err(_) => anyhow::bail!("no log line within {timeout_ms} ms"),
        }
    }

    /// Collects exactly `count` log lines, failing if they do not all arrive
    /// within `timeout_ms` in total.
    pub async fn collect_logs(&mut self, count: usize, timeout_ms: u64) -> Result<Vec<LogLine>> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        let mut lines = Vec::with_capacity(count);
        while lines.len() < count {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match timeout(left, self.logs.recv()).await {
                Ok(Some(BroadcastEvent::LogLine(line))) => lines.push(line),
                Ok(Some(_)) => {}
                Ok(None) => anyhow::bail!("log channel closed after {} lines", lines.len()),
                Err(_) => anyhow::bail!("got {} of {count} log lines within {timeout_ms} ms", lines.len()),
            }
        }
        Ok(lines)
    }

    /// Fails if another log line shows up within `quiet_ms`.
    pub async fn assert_no_more_logs(&mut self, quiet_ms: u64) -> Result<()> {
        match timeout(Duration::from_millis(quiet_ms), self.logs.recv()).await {
            Err(_) => Ok(()),
            Ok(ev) => anyhow::bail!("unexpected extra event: {ev:?}"),
        }
    }

    /// Writes a control script into the harness scratch directory.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        crate::fixtures::script(self.dir.path(), name, body)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Test logging, `RUST_LOG` aware. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
