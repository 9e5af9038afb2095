//! Meshwatch kernel: fleet health snapshots over the mesh sample store, a
//! live event hub for dashboards, and supervised access-point control jobs.

pub mod aggregator;
pub mod classify;
pub mod config;
pub mod events;
pub mod health;
pub mod http;
pub mod jobs;
pub mod models;
pub mod mqtt;
pub mod probe;
pub mod state;
pub mod store;

pub use aggregator::SnapshotAggregator;
pub use config::{KernelConfig, Roster};
pub use events::{Channel, EventHub, Subscription};
pub use jobs::{JobRunner, JobState};
pub use models::{BroadcastEvent, FleetSnapshot, LogLevel, LogLine, MetricSample, PodHealth, PodMetrics, PodStatus};
pub use store::{SampleStore, StoreError};
