use crate::config::ProbeConf;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Raw TCP liveness check used when the gateway has never reported a sample.
#[derive(Debug, Clone)]
pub struct ReachabilityProber {
    hosts: Vec<String>,
    port: u16,
    timeout: Duration,
}

impl ReachabilityProber {
    pub fn new(hosts: Vec<String>, port: u16, timeout: Duration) -> Self {
        Self { hosts, port, timeout }
    }

    pub fn from_conf(conf: &ProbeConf) -> Self {
        Self::new(conf.hosts.clone(), conf.port, conf.timeout)
    }

    /// Tries each candidate in order; true on the first accepted connection.
    /// Worst case is `hosts.len() * timeout`.
    pub async fn probe(&self) -> bool {
        probe(&self.hosts, self.port, self.timeout).await
    }
}

pub async fn probe(candidates: &[String], port: u16, per_attempt: Duration) -> bool {
    for host in candidates {
        // "host:port" candidates override the shared port
        let target = if host.contains(':') { host.clone() } else { format!("{host}:{port}") };
        match timeout(per_attempt, TcpStream::connect(&target)).await {
            Ok(Ok(_stream)) => {
                debug!("probe {target} reachable");
                return true;
            }
            Ok(Err(e)) => debug!("probe {target} failed: {e}"),
            Err(_) => debug!("probe {target} timed out after {per_attempt:?}"),
        }
    }
    false
}
