//! Fleet snapshot: roster nodes first (roster order), then any node the store
//! knows about that the roster does not, sorted by id.

use crate::classify::{classify, Verdict};
use crate::config::{AlertThresholds, KernelConfig, Roster};
use crate::models::{unix_millis, FleetSnapshot, MetricSample, PodHealth, PodMetrics, PodStatus};
use crate::probe::ReachabilityProber;
use crate::store::{SampleStore, StoreError};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Clone)]
pub struct SnapshotAggregator {
    store: Arc<dyn SampleStore>,
    roster: Roster,
    prober: Option<ReachabilityProber>,
    online_threshold_seconds: i64,
    thresholds: AlertThresholds,
}

impl SnapshotAggregator {
    pub fn new(store: Arc<dyn SampleStore>, roster: Roster, online_threshold_seconds: i64, thresholds: AlertThresholds) -> Self {
        Self { store, roster, prober: None, online_threshold_seconds, thresholds }
    }

    pub fn from_config(store: Arc<dyn SampleStore>, cfg: &KernelConfig) -> Self {
        Self::new(store, cfg.roster.clone(), cfg.online_threshold_seconds, cfg.alerts)
            .with_prober(ReachabilityProber::from_conf(&cfg.probe))
    }

    pub fn with_prober(mut self, prober: ReachabilityProber) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub async fn snapshot(&self) -> Result<FleetSnapshot, StoreError> {
        self.snapshot_at(OffsetDateTime::now_utc()).await
    }

    /// Store failures propagate; there is no cached fallback.
    pub async fn snapshot_at(&self, now: OffsetDateTime) -> Result<FleetSnapshot, StoreError> {
        let mut latest = self.store.latest_samples().await?;
        let now_secs = now.unix_timestamp();
        let mut pods = Vec::with_capacity(self.roster.len() + latest.len());

        for entry in &self.roster.nodes {
            let sample = latest.remove(&entry.id);
            let mut verdict = self.verdict(sample.as_ref(), now_secs);

            if sample.is_none() && self.roster.gateway.as_deref() == Some(entry.id.as_str()) {
                if let Some(prober) = &self.prober {
                    if prober.probe().await {
                        debug!("gateway {} has no samples but answers TCP", entry.id);
                        verdict = Verdict {
                            status: PodStatus::Online,
                            age_seconds: Some(0),
                            last_seen: Some(now_secs),
                            alerts: Vec::new(),
                        };
                    }
                }
            }

            pods.push(pod(&entry.id, &entry.label, verdict, sample));
        }

        // whatever is left in `latest` is unknown to the roster
        let mut unknown: Vec<MetricSample> = latest.into_values().collect();
        unknown.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        for sample in unknown {
            let verdict = self.verdict(Some(&sample), now_secs);
            let id = sample.node_id.clone();
            pods.push(pod(&id, &id, verdict, Some(sample)));
        }

        Ok(FleetSnapshot {
            pods,
            generated_at_ms: unix_millis(now),
            online_threshold_seconds: self.online_threshold_seconds,
        })
    }

    fn verdict(&self, sample: Option<&MetricSample>, now_secs: i64) -> Verdict {
        classify(sample, now_secs, self.online_threshold_seconds, &self.thresholds)
    }
}

fn pod(node_id: &str, label: &str, verdict: Verdict, sample: Option<MetricSample>) -> PodHealth {
    PodHealth {
        node_id: node_id.to_string(),
        label: label.to_string(),
        status: verdict.status,
        last_seen: verdict.last_seen,
        age_seconds: verdict.age_seconds,
        metrics: sample.map(PodMetrics::from),
        alerts: verdict.alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RosterEntry;
    use crate::store::LatestSamples;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct FixedStore(Vec<MetricSample>);

    #[async_trait]
    impl SampleStore for FixedStore {
        async fn latest_samples(&self) -> Result<LatestSamples, StoreError> {
            Ok(crate::store::latest_by_node(self.0.clone()))
        }
    }

    fn sample(node: &str, ts: i64) -> MetricSample {
        MetricSample {
            node_id: node.into(),
            latency_ms: 10.0,
            jitter_ms: 1.0,
            packet_loss_pct: 0.0,
            bandwidth_mbps: 40.0,
            timestamp: ts,
        }
    }

    fn roster(gateway: Option<&str>, ids: &[&str]) -> Roster {
        Roster {
            gateway: gateway.map(String::from),
            nodes: ids.iter().map(|id| RosterEntry { id: id.to_string(), label: id.to_uppercase() }).collect(),
        }
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_100).unwrap()
    }

    #[tokio::test]
    async fn test_gateway_probe_overrides_offline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let agg = SnapshotAggregator::new(
            Arc::new(FixedStore(vec![])),
            roster(Some("gw"), &["gw", "leaf"]),
            30,
            AlertThresholds::default(),
        )
        .with_prober(ReachabilityProber::new(vec!["127.0.0.1".into()], port, Duration::from_millis(500)));

        let snap = agg.snapshot_at(now()).await.unwrap();
        assert_eq!(snap.pods[0].status, PodStatus::Online);
        assert_eq!(snap.pods[0].age_seconds, Some(0));
        assert_eq!(snap.pods[0].last_seen, Some(1_700_000_100));
        assert!(snap.pods[0].metrics.is_none());
        // the override is reserved for the gateway identity
        assert_eq!(snap.pods[1].status, PodStatus::Offline);
    }

    #[tokio::test]
    async fn test_gateway_with_sample_skips_probe() {
        let agg = SnapshotAggregator::new(
            Arc::new(FixedStore(vec![sample("gw", 1_700_000_090)])),
            roster(Some("gw"), &["gw"]),
            30,
            AlertThresholds::default(),
        )
        .with_prober(ReachabilityProber::new(vec![], 1, Duration::from_millis(10)));

        let snap = agg.snapshot_at(now()).await.unwrap();
        assert_eq!(snap.pods[0].age_seconds, Some(10));
        assert!(snap.pods[0].metrics.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_stays_offline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap().port();
        drop(listener);

        let agg = SnapshotAggregator::new(
            Arc::new(FixedStore(vec![])),
            roster(Some("gw"), &["gw"]),
            30,
            AlertThresholds::default(),
        )
        .with_prober(ReachabilityProber::new(vec!["127.0.0.1".into()], closed, Duration::from_millis(300)));

        let snap = agg.snapshot_at(now()).await.unwrap();
        assert_eq!(snap.pods[0].status, PodStatus::Offline);
        assert_eq!(snap.pods[0].age_seconds, None);
        assert_eq!(snap.pods[0].last_seen, None);
    }

    #[tokio::test]
    async fn test_stale_gateway_is_not_probed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let agg = SnapshotAggregator::new(
            Arc::new(FixedStore(vec![sample("gw", 1_700_000_000)])),
            roster(Some("gw"), &["gw"]),
            30,
            AlertThresholds::default(),
        )
        .with_prober(ReachabilityProber::new(vec!["127.0.0.1".into()], port, Duration::from_millis(500)));

        let snap = agg.snapshot_at(now()).await.unwrap();
        assert_eq!(snap.pods[0].status, PodStatus::Stale);
        assert_eq!(snap.pods[0].age_seconds, Some(100));
        assert!(tokio::time::timeout(Duration::from_millis(100), listener.accept()).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_nodes_get_id_as_label() {
        let agg = SnapshotAggregator::new(
            Arc::new(FixedStore(vec![sample("zz", 1_700_000_000), sample("mm", 1_700_000_000)])),
            roster(None, &[]),
            30,
            AlertThresholds::default(),
        );
        let snap = agg.snapshot_at(now()).await.unwrap();
        let ids: Vec<_> = snap.pods.iter().map(|p| (p.node_id.as_str(), p.label.as_str())).collect();
        assert_eq!(ids, vec![("mm", "mm"), ("zz", "zz")]);
        assert_eq!(snap.generated_at_ms, 1_700_000_100_000);
    }
}
