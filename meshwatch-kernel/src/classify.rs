//! Health classification of a node from its latest sample.
//!
//! Pure and clock-free: callers pass `now`, so every rule here is unit
//! testable without a store.

use crate::config::AlertThresholds;
use crate::models::{MetricSample, PodStatus};

/// Timestamps above this magnitude are taken as milliseconds.
///
/// Agents have sent both units over time and the store does not record
/// which; the magnitude heuristic stays until the ingestion contract fixes
/// a unit.
pub const MILLIS_CUTOFF: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: PodStatus,
    pub age_seconds: Option<i64>,
    pub last_seen: Option<i64>,
    pub alerts: Vec<String>,
}

impl Verdict {
    pub fn offline() -> Self {
        Self { status: PodStatus::Offline, age_seconds: None, last_seen: None, alerts: Vec::new() }
    }
}

pub fn normalize_timestamp(ts: i64) -> i64 {
    if ts.unsigned_abs() > MILLIS_CUTOFF as u64 {
        ts / 1000
    } else {
        ts
    }
}

pub fn classify(
    sample: Option<&MetricSample>,
    now_secs: i64,
    online_threshold_seconds: i64,
    thresholds: &AlertThresholds,
) -> Verdict {
    let Some(sample) = sample else {
        return Verdict::offline();
    };

    let last_seen = normalize_timestamp(sample.timestamp);
    // clock skew can make this negative; reported as-is
    let age = now_secs - last_seen;
    let status = if age <= online_threshold_seconds { PodStatus::Online } else { PodStatus::Stale };

    Verdict {
        status,
        age_seconds: Some(age),
        last_seen: Some(last_seen),
        alerts: evaluate_alerts(sample, thresholds),
    }
}

pub fn evaluate_alerts(sample: &MetricSample, thresholds: &AlertThresholds) -> Vec<String> {
    let mut alerts = Vec::new();

    if let Some(max) = thresholds.max_latency_ms {
        if sample.latency_ms > max {
            alerts.push(format!("latency {:.1} ms exceeds {:.1} ms", sample.latency_ms, max));
        }
    }
    if let Some(max) = thresholds.max_jitter_ms {
        if sample.jitter_ms > max {
            alerts.push(format!("jitter {:.1} ms exceeds {:.1} ms", sample.jitter_ms, max));
        }
    }
    if let Some(max) = thresholds.max_packet_loss_pct {
        if sample.packet_loss_pct > max {
            alerts.push(format!("packet loss {:.1} % exceeds {:.1} %", sample.packet_loss_pct, max));
        }
    }
    if let Some(min) = thresholds.min_bandwidth_mbps {
        if sample.bandwidth_mbps < min {
            alerts.push(format!("bandwidth {:.1} Mbps below {:.1} Mbps", sample.bandwidth_mbps, min));
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_100;

    fn sample(ts: i64) -> MetricSample {
        MetricSample {
            node_id: "rpi3".into(),
            latency_ms: 20.0,
            jitter_ms: 2.0,
            packet_loss_pct: 0.0,
            bandwidth_mbps: 80.0,
            timestamp: ts,
        }
    }

    #[test]
    fn test_no_sample_is_offline() {
        let v = classify(None, NOW, 30, &AlertThresholds::default());
        assert_eq!(v.status, PodStatus::Offline);
        assert_eq!(v.age_seconds, None);
        assert!(v.alerts.is_empty());
    }

    #[test]
    fn test_threshold_boundary_is_online() {
        let t = AlertThresholds::default();
        assert_eq!(classify(Some(&sample(NOW - 30)), NOW, 30, &t).status, PodStatus::Online);
        assert_eq!(classify(Some(&sample(NOW - 31)), NOW, 30, &t).status, PodStatus::Stale);
        assert_eq!(classify(Some(&sample(NOW)), NOW, 30, &t).status, PodStatus::Online);
    }

    #[test]
    fn test_seconds_and_millis_give_same_age() {
        let t = AlertThresholds::default();
        let secs = classify(Some(&sample(1_700_000_000)), NOW, 30, &t);
        let millis = classify(Some(&sample(1_700_000_000_000)), NOW, 30, &t);
        assert_eq!(secs.age_seconds, Some(100));
        assert_eq!(secs.age_seconds, millis.age_seconds);
        assert_eq!(secs.last_seen, millis.last_seen);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        assert_eq!(normalize_timestamp(i64::MIN), i64::MIN / 1000);
        assert_eq!(normalize_timestamp(i64::MAX), i64::MAX / 1000);
        assert_eq!(normalize_timestamp(-MILLIS_CUTOFF), -MILLIS_CUTOFF);
        let v = classify(Some(&sample(i64::MIN)), NOW, 30, &AlertThresholds::default());
        assert_eq!(v.status, PodStatus::Stale);
    }

    #[test]
    fn test_future_sample_keeps_negative_age() {
        let v = classify(Some(&sample(NOW + 5)), NOW, 30, &AlertThresholds::default());
        assert_eq!(v.age_seconds, Some(-5));
        assert_eq!(v.status, PodStatus::Online);
    }

    #[test]
    fn test_alerts_in_fixed_order() {
        let bad = MetricSample {
            latency_ms: 250.0,
            jitter_ms: 45.5,
            packet_loss_pct: 12.0,
            bandwidth_mbps: 1.2,
            ..sample(NOW)
        };
        let v = classify(Some(&bad), NOW, 30, &AlertThresholds::default());
        assert_eq!(
            v.alerts,
            vec![
                "latency 250.0 ms exceeds 200.0 ms",
                "jitter 45.5 ms exceeds 30.0 ms",
                "packet loss 12.0 % exceeds 5.0 %",
                "bandwidth 1.2 Mbps below 5.0 Mbps",
            ]
        );
    }

    #[test]
    fn test_disabled_threshold_never_alerts() {
        let t = AlertThresholds { max_latency_ms: None, ..AlertThresholds::default() };
        let slow = MetricSample { latency_ms: 10_000.0, ..sample(NOW) };
        assert!(classify(Some(&slow), NOW, 30, &t).alerts.is_empty());
    }

    #[test]
    fn test_raising_threshold_only_removes_its_own_alerts() {
        let s = MetricSample { latency_ms: 150.0, jitter_ms: 40.0, bandwidth_mbps: 3.0, ..sample(NOW) };
        let base = AlertThresholds {
            max_latency_ms: Some(100.0),
            max_jitter_ms: Some(30.0),
            max_packet_loss_pct: Some(5.0),
            min_bandwidth_mbps: Some(5.0),
        };
        let before = evaluate_alerts(&s, &base);

        for raised in [
            AlertThresholds { max_latency_ms: Some(1000.0), ..base },
            AlertThresholds { max_jitter_ms: Some(1000.0), ..base },
            AlertThresholds { max_packet_loss_pct: Some(1000.0), ..base },
            // a lower bound is "raised" in the permissive direction by lowering it
            AlertThresholds { min_bandwidth_mbps: Some(0.0), ..base },
        ] {
            let after = evaluate_alerts(&s, &raised);
            assert!(after.len() <= before.len());
            assert!(after.iter().all(|a| before.contains(a)));
        }
    }
}
