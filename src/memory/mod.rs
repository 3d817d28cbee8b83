mod lru_list;

use crate::events::HostEvent;
use crate::metrics::Metrics;
use lru_list::LruList;

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use log::debug;
use parking_lot::Mutex;

/// A value held by the memory tier. Each key may hold a different concrete
/// type; `get` recovers it by downcast.
pub type SharedValue = Arc<dyn Any + Send + Sync>;

/// Configuration for the memory tier.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
  /// Maximum total cost of resident entries. 0 disables cost trimming.
  pub cost_limit: u64,
  /// Maximum number of resident entries. 0 disables count trimming.
  pub count_limit: u64,
  /// Clear the tier when the host reports memory pressure.
  pub auto_purge_on_memory_warning: bool,
  /// Clear the tier when the application moves to the background.
  pub auto_purge_on_background: bool,
}

impl Default for MemoryConfig {
  fn default() -> Self {
    Self {
      cost_limit: 200 * 1024 * 1024,
      count_limit: 0,
      auto_purge_on_memory_warning: true,
      auto_purge_on_background: true,
    }
  }
}

pub(crate) struct MemoryShared {
  list: Mutex<LruList<SharedValue>>,
  config: MemoryConfig,
  metrics: Arc<Metrics>,
}

/// The in-memory tier: a mutex-wrapped recency list with cost and count
/// limits.
///
/// All operations are synchronous, block only for the duration of the list
/// mutation, and never fail; operations on missing keys are no-ops. Writes
/// move an entry to the head of the recency order; reads deliberately do
/// not, so eviction removes the least-recently-written entry.
#[derive(Clone)]
pub struct MemoryCache {
  shared: Arc<MemoryShared>,
}

impl MemoryCache {
  pub fn new(config: MemoryConfig) -> Self {
    Self::with_metrics(config, Arc::new(Metrics::new()))
  }

  pub(crate) fn with_metrics(config: MemoryConfig, metrics: Arc<Metrics>) -> Self {
    Self {
      shared: Arc::new(MemoryShared {
        list: Mutex::new(LruList::new()),
        config,
        metrics,
      }),
    }
  }

  pub(crate) fn downgrade(&self) -> Weak<MemoryShared> {
    Arc::downgrade(&self.shared)
  }

  pub(crate) fn from_weak(weak: &Weak<MemoryShared>) -> Option<Self> {
    weak.upgrade().map(|shared| Self { shared })
  }

  /// Stores `value` under `key` with the given cost, then trims the tier
  /// back under its count and cost limits.
  ///
  /// An existing entry is overwritten in place and moved to the head of the
  /// recency order.
  pub fn set<T: Any + Send + Sync>(&self, key: &str, value: T, cost: u64) {
    self.set_shared(key, Arc::new(value), cost);
  }

  /// Like [`set`](Self::set), for a value that is already shared.
  pub fn set_shared(&self, key: &str, value: SharedValue, cost: u64) {
    let mut list = self.shared.list.lock();
    list.push_front(key, value, cost);
    self.trim_count(&mut list);
    self.trim_cost(&mut list);
  }

  /// Returns the value under `key` without touching its recency.
  ///
  /// Returns `None` when the key is absent or holds a different type than
  /// `T`.
  pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
    let list = self.shared.list.lock();
    let value = match list.get(key) {
      Some(node) => node.value.clone(),
      None => {
        self.shared.metrics.memory_misses.fetch_add(1, Ordering::Relaxed);
        return None;
      }
    };
    drop(list);

    match value.downcast::<T>() {
      Ok(typed) => {
        self.shared.metrics.memory_hits.fetch_add(1, Ordering::Relaxed);
        Some(typed)
      }
      Err(_) => {
        // The key exists but under a different type; treat as a miss.
        self.shared.metrics.memory_misses.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  pub fn contains(&self, key: &str) -> bool {
    self.shared.list.lock().contains(key)
  }

  pub fn remove(&self, key: &str) {
    self.shared.list.lock().remove(key);
  }

  pub fn clear(&self) {
    self.shared.list.lock().clear();
  }

  pub fn total_cost(&self) -> u64 {
    self.shared.list.lock().total_cost()
  }

  pub fn total_count(&self) -> usize {
    self.shared.list.lock().total_count()
  }

  /// Applies a host transition, clearing the tier when the matching
  /// auto-purge flag is set.
  pub fn handle_event(&self, event: HostEvent) {
    let purge = match event {
      HostEvent::MemoryWarning => self.shared.config.auto_purge_on_memory_warning,
      HostEvent::DidEnterBackground => self.shared.config.auto_purge_on_background,
    };
    if purge {
      debug!("purging memory tier after {event}");
      self.clear();
    }
  }

  /// Drops tail entries until the count limit holds. A limit of 0 disables
  /// the check.
  fn trim_count(&self, list: &mut LruList<SharedValue>) {
    let limit = self.shared.config.count_limit;
    if limit == 0 {
      return;
    }
    while list.total_count() as u64 > limit {
      if list.pop_back().is_none() {
        break;
      }
      self
        .shared
        .metrics
        .memory_evictions
        .fetch_add(1, Ordering::Relaxed);
    }
  }

  /// Drops tail entries until the cost limit holds. A limit of 0 disables
  /// the check.
  fn trim_cost(&self, list: &mut LruList<SharedValue>) {
    let limit = self.shared.config.cost_limit;
    if limit == 0 {
      return;
    }
    while list.total_cost() > limit {
      if list.pop_back().is_none() {
        break;
      }
      self
        .shared
        .metrics
        .memory_evictions
        .fetch_add(1, Ordering::Relaxed);
    }
  }
}

impl std::fmt::Debug for MemoryCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let list = self.shared.list.lock();
    f.debug_struct("MemoryCache")
      .field("total_cost", &list.total_cost())
      .field("total_count", &list.total_count())
      .field("cost_limit", &self.shared.config.cost_limit)
      .field("count_limit", &self.shared.config.count_limit)
      .finish()
  }
}
