/*!
Sample store stubs

`MemoryStore` behaves like the `metrics` table: rows are appended and the
latest-per-node view is computed on every query. `FailingStore` always
reports the store as unreachable.
*/

use async_trait::async_trait;
use meshwatch_kernel::store::{latest_by_node, LatestSamples, SampleStore, StoreError};
use meshwatch_kernel::MetricSample;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<Vec<MetricSample>>>,
    queries: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = MetricSample>) -> Self {
        let store = Self::new();
        store.rows.lock().extend(rows);
        store
    }

    /// Same effect as one successful ingestion call.
    pub fn insert(&self, sample: MetricSample) {
        self.rows.lock().push(sample);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn latest_samples(&self) -> Result<LatestSamples, StoreError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let rows = self.rows.lock().clone();
        Ok(latest_by_node(rows))
    }
}

#[derive(Clone)]
pub struct FailingStore {
    reason: String,
}

impl FailingStore {
    pub fn new(reason: &str) -> Self {
        Self { reason: reason.to_string() }
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new("connection refused")
    }
}

#[async_trait]
impl SampleStore for FailingStore {
    async fn latest_samples(&self) -> Result<LatestSamples, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}
