//! Supervised execution of the access-point control scripts.
//!
//! A job is fire-and-forget from the caller's side: the outcome only reaches
//! observers through the log channel of the [`EventHub`]. Each invocation
//! runs in its own task and is never cancelled once started.
//!
//! Log events per run:
//! - one `info` line per output line (stdout and stderr, as they arrive)
//! - then exactly one terminal event: `success` on exit 0, `error` otherwise

use crate::config::JobsConf;
use crate::events::EventHub;
use crate::models::{unix_millis, LogLevel};
use crate::state::{new_map, SharedMap};
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const AP_START: &str = "ap_start";
pub const AP_STOP: &str = "ap_stop";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    NotFound,
    Running,
    Succeeded { code: i32 },
    Failed { code: i32 },
    Errored { reason: String },
}

/// Latest invocation of a named job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub name: String,
    pub run_id: Uuid,
    pub command: String,
    #[serde(flatten)]
    pub state: JobState,
    pub started_at_ms: i64,
    pub finished_at_ms: Option<i64>,
}

#[derive(Clone)]
pub struct JobRunner {
    hub: EventHub,
    elevate_command: Vec<String>,
    shell: String,
    single_flight: bool,
    records: SharedMap<String, JobRecord>,
}

impl JobRunner {
    pub fn new(hub: EventHub, conf: &JobsConf) -> Self {
        Self {
            hub,
            elevate_command: conf.elevate_command.clone(),
            shell: conf.shell.clone(),
            single_flight: conf.single_flight,
            records: new_map(),
        }
    }

    /// Starts `script_path` as job `name`. Returns the supervising task, or
    /// `None` when nothing was spawned (missing script, single-flight refusal).
    pub fn run(&self, name: &str, script_path: &Path, use_elevated: bool) -> Option<JoinHandle<()>> {
        let argv = self.command_line(script_path, use_elevated);
        let command = shell_words::join(&argv);
        let run_id = Uuid::new_v4();

        if !script_path.exists() {
            error!(job = name, "script not found: {}", script_path.display());
            self.hub.log(LogLevel::Error, name, format!("{name}: script not found: {}", script_path.display()));
            let mut records = self.records.lock();
            // a live run keeps its record until it finishes
            if !matches!(records.get(name), Some(r) if r.state == JobState::Running) {
                records.insert(name.to_string(), JobRecord {
                    name: name.to_string(),
                    run_id,
                    command,
                    state: JobState::NotFound,
                    started_at_ms: now_ms(),
                    finished_at_ms: Some(now_ms()),
                });
            }
            return None;
        }

        {
            let mut records = self.records.lock();
            if self.single_flight && matches!(records.get(name), Some(r) if r.state == JobState::Running) {
                warn!(job = name, "already running, start refused");
                drop(records);
                self.hub.log(LogLevel::Warning, name, format!("{name} is already running"));
                return None;
            }
            records.insert(name.to_string(), JobRecord {
                name: name.to_string(),
                run_id,
                command: command.clone(),
                state: JobState::Running,
                started_at_ms: now_ms(),
                finished_at_ms: None,
            });
        }

        info!(job = name, %run_id, "starting: {command}");
        let runner = self.clone();
        let name = name.to_string();
        Some(tokio::spawn(async move {
            let state = runner.supervise(&name, argv).await;
            runner.finish(&name, run_id, state);
        }))
    }

    /// `[elevation prefix...] <shell> <script>`
    pub fn command_line(&self, script_path: &Path, use_elevated: bool) -> Vec<String> {
        let mut argv = Vec::new();
        if use_elevated {
            argv.extend(self.elevate_command.iter().cloned());
        }
        argv.push(self.shell.clone());
        argv.push(script_path.display().to_string());
        argv
    }

    async fn supervise(&self, name: &str, argv: Vec<String>) -> JobState {
        let (program, args) = match argv.split_first() {
            Some(split) => split,
            None => return self.errored(name, "empty command line".into()),
        };

        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return self.errored(name, format!("failed to start: {e}")),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut read_error = None;
        while let Some(line) = rx.recv().await {
            match line {
                Ok(line) => {
                    self.hub.log(LogLevel::Info, name, line);
                }
                Err(e) => {
                    read_error.get_or_insert_with(|| format!("failed reading output: {e}"));
                }
            }
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => return self.errored(name, format!("failed waiting for exit: {e}")),
        };
        if let Some(reason) = read_error {
            return self.errored(name, reason);
        }

        match status.code() {
            Some(0) => {
                info!(job = name, "finished successfully");
                self.hub.log(LogLevel::Success, name, format!("{name} finished successfully"));
                JobState::Succeeded { code: 0 }
            }
            Some(code) => {
                warn!(job = name, code, "exited with nonzero code");
                self.hub.log(LogLevel::Error, name, format!("{name} exited with code {code}"));
                JobState::Failed { code }
            }
            None => self.errored(name, "terminated without an exit code".into()),
        }
    }

    fn errored(&self, name: &str, reason: String) -> JobState {
        error!(job = name, "{reason}");
        self.hub.log(LogLevel::Error, name, format!("{name}: {reason}"));
        JobState::Errored { reason }
    }

    fn finish(&self, name: &str, run_id: Uuid, state: JobState) {
        let mut records = self.records.lock();
        // a newer run of the same name owns the record now
        if let Some(record) = records.get_mut(name).filter(|r| r.run_id == run_id) {
            record.state = state;
            record.finished_at_ms = Some(now_ms());
        }
    }

    pub fn records(&self) -> Vec<JobRecord> {
        let mut list: Vec<JobRecord> = self.records.lock().values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub fn record(&self, name: &str) -> Option<JobRecord> {
        self.records.lock().get(name).cloned()
    }

    pub fn running_count(&self) -> usize {
        self.records.lock().values().filter(|r| r.state == JobState::Running).count()
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<std::io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
                if tx.send(Ok(line.to_string())).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

fn now_ms() -> i64 {
    unix_millis(OffsetDateTime::now_utc())
}
