//! In-process stage caches
//!
//! Provides:
//! - Capacity-bounded key/value store with first-in-first-out eviction
//! - Get-or-compute as one atomic unit under a per-cache lock
//! - Hit/miss/eviction metrics per cache name
//!
//! Reads never refresh an entry's eviction priority: the oldest insertion
//! is always the next to go, however often it is read.

use shopsage_common::errors::Result;
use shopsage_common::metrics;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::Mutex;
use tracing::debug;

/// Default entries per cache
pub const DEFAULT_CAPACITY: usize = 1000;

struct CacheState<K, V> {
    entries: HashMap<K, V>,
    insertion_order: VecDeque<K>,
}

/// Capacity-bounded FIFO cache
pub struct BoundedCache<K, V> {
    name: &'static str,
    capacity: usize,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Create an empty cache; a zero capacity is raised to one
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                insertion_order: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            }),
        }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// The lock is held for the whole call, so concurrent callers with any
    /// key wait for an in-flight computation instead of racing it. A failed
    /// computation stores nothing and its error reaches the caller as is.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let mut state = self.state.lock().await;

        if let Some(value) = state.entries.get(&key) {
            debug!(cache = self.name, key = ?key, "Cache hit");
            metrics::record_cache(true, self.name);
            return Ok(value.clone());
        }

        debug!(cache = self.name, key = ?key, "Cache miss");
        metrics::record_cache(false, self.name);

        let value = compute().await?;

        state.insertion_order.push_back(key.clone());
        state.entries.insert(key, value.clone());

        if state.entries.len() > self.capacity {
            if let Some(oldest) = state.insertion_order.pop_front() {
                state.entries.remove(&oldest);
                debug!(cache = self.name, key = ?oldest, "Cache eviction");
                metrics::record_eviction(self.name);
            }
        }

        Ok(value)
    }

    /// Check for a key without computing anything
    pub async fn contains(&self, key: &K) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }

    /// Number of entries currently held
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
