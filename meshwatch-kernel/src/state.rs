//! Process-lifetime shared state. Locks are `parking_lot` and are never held
//! across an `.await`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

/// Keyed registry guarded by a single lock (subscriber queues, job records).
pub type SharedMap<K, V> = Shared<HashMap<K, V>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

pub fn new_map<K, V>() -> SharedMap<K, V> {
    new_state(HashMap::new())
}
