//! Read-only view over the sample store.
//!
//! The ingestion service owns the `metrics` table; the kernel only ever asks
//! for the newest row per node. Failures are surfaced as-is, never retried.

use crate::config::StoreConf;
use crate::models::MetricSample;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sample store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid sample row: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
                StoreError::Decode(e.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Latest sample per node, keyed by node id.
pub type LatestSamples = HashMap<String, MetricSample>;

#[async_trait]
pub trait SampleStore: Send + Sync {
    /// For every distinct node id, the sample with the greatest timestamp.
    async fn latest_samples(&self) -> Result<LatestSamples, StoreError>;
}

const LATEST_PER_NODE: &str = r#"
    SELECT DISTINCT ON (node_id)
           node_id,
           latency::float8     AS latency,
           jitter::float8      AS jitter,
           packet_loss::float8 AS packet_loss,
           bandwidth::float8   AS bandwidth,
           "timestamp"::int8   AS "timestamp"
      FROM metrics
     ORDER BY node_id, "timestamp" DESC
"#;

/// Postgres-backed store. The pool connects lazily so the kernel starts
/// (and reports `db_error`) while the database is still coming up.
#[derive(Clone)]
pub struct PgSampleStore {
    pool: PgPool,
}

impl PgSampleStore {
    pub fn connect_lazy(conf: &StoreConf) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(conf.max_connections)
            .acquire_timeout(conf.acquire_timeout)
            .connect_lazy(&conf.database_url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SampleStore for PgSampleStore {
    async fn latest_samples(&self) -> Result<LatestSamples, StoreError> {
        let rows: Vec<MetricSample> = sqlx::query_as(LATEST_PER_NODE)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!("latest-per-node query failed: {e}");
                StoreError::from(e)
            })?;

        Ok(latest_by_node(rows))
    }
}

/// Keeps the greatest-timestamp sample per node. Ties keep the first seen.
pub fn latest_by_node<I>(samples: I) -> LatestSamples
where
    I: IntoIterator<Item = MetricSample>,
{
    let mut latest = LatestSamples::new();
    for sample in samples {
        match latest.get(&sample.node_id) {
            Some(current) if current.timestamp >= sample.timestamp => {}
            _ => {
                latest.insert(sample.node_id.clone(), sample);
            }
        }
    }
    latest
}
