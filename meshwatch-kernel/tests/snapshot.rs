use meshwatch_devkit::{roster, FailingStore, MemoryStore, SampleBuilder};
use meshwatch_kernel::config::AlertThresholds;
use meshwatch_kernel::{PodStatus, SnapshotAggregator, StoreError};
use std::sync::Arc;
use time::OffsetDateTime;

const NOW: i64 = 1_700_000_000;

fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(NOW).unwrap()
}

fn aggregator(store: MemoryStore, ids: &[&str]) -> SnapshotAggregator {
    SnapshotAggregator::new(Arc::new(store), roster(None, ids), 30, AlertThresholds::default())
}

#[tokio::test]
async fn roster_nodes_come_first_then_unknown_nodes_by_id() {
    let store = MemoryStore::with_rows([
        SampleBuilder::new("b").at(NOW - 5).build(),
        SampleBuilder::new("a").at(NOW - 5).build(),
        SampleBuilder::new("z").at(NOW - 5).build(),
        SampleBuilder::new("c").at(NOW - 5).build(),
    ]);
    let snap = aggregator(store, &["b", "a"]).snapshot_at(now()).await.unwrap();

    let ids: Vec<&str> = snap.pods.iter().map(|p| p.node_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a", "c", "z"]);
    assert_eq!(snap.pods[0].label, "B");
    assert_eq!(snap.pods[2].label, "c");
    assert_eq!(snap.online_threshold_seconds, 30);
    assert_eq!(snap.generated_at_ms, NOW * 1000);
}

#[tokio::test]
async fn unknown_node_follows_roster_order() {
    let store = MemoryStore::with_rows([
        SampleBuilder::new("B").at(NOW).build(),
        SampleBuilder::new("A").at(NOW).build(),
        SampleBuilder::new("C").at(NOW).build(),
    ]);
    let snap = aggregator(store, &["A", "B"]).snapshot_at(now()).await.unwrap();

    let ids: Vec<&str> = snap.pods.iter().map(|p| p.node_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn empty_store_reports_every_roster_node_offline() {
    let snap = aggregator(MemoryStore::new(), &["rpi4", "rpi3"]).snapshot_at(now()).await.unwrap();

    assert_eq!(snap.pods.len(), 2);
    for pod in &snap.pods {
        assert_eq!(pod.status, PodStatus::Offline);
        assert_eq!(pod.last_seen, None);
        assert_eq!(pod.age_seconds, None);
        assert!(pod.metrics.is_none());
        assert!(pod.alerts.is_empty());
    }
}

#[tokio::test]
async fn only_the_latest_sample_per_node_counts() {
    let store = MemoryStore::with_rows([
        SampleBuilder::new("rpi3").at(NOW - 100).latency(900.0).build(),
        SampleBuilder::new("rpi3").at(NOW - 3).latency(20.0).build(),
    ]);
    let snap = aggregator(store, &["rpi3"]).snapshot_at(now()).await.unwrap();

    let pod = &snap.pods[0];
    assert_eq!(pod.status, PodStatus::Online);
    assert_eq!(pod.age_seconds, Some(3));
    assert_eq!(pod.metrics.as_ref().map(|m| m.latency_ms), Some(20.0));
    assert!(pod.alerts.is_empty());
}

#[tokio::test]
async fn millisecond_timestamps_are_normalized() {
    let store = MemoryStore::with_rows([SampleBuilder::new("rpi3").at((NOW - 10) * 1000).build()]);
    let snap = aggregator(store, &["rpi3"]).snapshot_at(now()).await.unwrap();

    assert_eq!(snap.pods[0].last_seen, Some(NOW - 10));
    assert_eq!(snap.pods[0].age_seconds, Some(10));
    assert_eq!(snap.pods[0].status, PodStatus::Online);
}

#[tokio::test]
async fn stale_node_keeps_metrics_and_alerts() {
    let store = MemoryStore::with_rows([SampleBuilder::new("rpi3").at(NOW - 120).packet_loss(12.0).build()]);
    let snap = aggregator(store, &["rpi3"]).snapshot_at(now()).await.unwrap();

    let pod = &snap.pods[0];
    assert_eq!(pod.status, PodStatus::Stale);
    assert!(pod.metrics.is_some());
    assert_eq!(pod.alerts, vec!["packet loss 12.0 % exceeds 5.0 %".to_string()]);
}

#[tokio::test]
async fn store_failure_is_not_a_snapshot() {
    let agg = SnapshotAggregator::new(Arc::new(FailingStore::default()), roster(None, &["rpi3"]), 30, AlertThresholds::default());
    let err = agg.snapshot_at(now()).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[tokio::test]
async fn snapshots_are_rebuilt_from_the_store_each_time() {
    let store = MemoryStore::new();
    let agg = aggregator(store.clone(), &["rpi3"]);

    let first = agg.snapshot_at(now()).await.unwrap();
    assert_eq!(first.pods[0].status, PodStatus::Offline);

    store.insert(SampleBuilder::new("rpi3").at(NOW - 1).build());
    let second = agg.snapshot_at(now()).await.unwrap();
    assert_eq!(second.pods[0].status, PodStatus::Online);
    assert_eq!(store.query_count(), 2);
}
