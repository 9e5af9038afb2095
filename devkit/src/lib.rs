/*!
# Meshwatch DevKit - stubs and helpers for kernel tests

- in-memory and failing sample stores (no Postgres needed)
- sample / roster builders and throwaway control scripts
- a harness that owns an event hub and collects what it publishes
*/

pub mod store_stub;
pub mod fixtures;
pub mod test_utils;

pub use store_stub::{FailingStore, MemoryStore};
pub use fixtures::{roster, script, SampleBuilder};
pub use test_utils::TestHarness;
