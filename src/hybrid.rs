use crate::codec::{Codec, JsonCodec};
use crate::digest::{KeyDigest, Sha256Digest};
use crate::disk::DiskCache;
use crate::memory::MemoryCache;
use crate::metrics::{Metrics, MetricsSnapshot};

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The two-tier cache: a memory tier over a disk tier.
///
/// Writes go to memory synchronously and then to disk; reads probe memory
/// first and fall back to disk, promoting disk hits back into memory so the
/// next read is cheap. Values therefore survive process restarts and
/// memory-pressure purges as long as the disk copy is still there.
///
/// The tiers hold independent locks and are never locked together; the
/// composition is not transactional. Promotion on read is best-effort: two
/// concurrent readers that both miss memory may both promote, and the last
/// write wins.
///
/// Build instances with [`HybridCacheBuilder`](crate::HybridCacheBuilder).
pub struct HybridCache<C: Codec = JsonCodec, D: KeyDigest = Sha256Digest> {
  memory: MemoryCache,
  disk: DiskCache<C, D>,
  metrics: Arc<Metrics>,
}

impl<C: Codec, D: KeyDigest> Clone for HybridCache<C, D> {
  fn clone(&self) -> Self {
    Self {
      memory: self.memory.clone(),
      disk: self.disk.clone(),
      metrics: self.metrics.clone(),
    }
  }
}

impl<C: Codec, D: KeyDigest> HybridCache<C, D> {
  pub(crate) fn from_parts(
    memory: MemoryCache,
    disk: DiskCache<C, D>,
    metrics: Arc<Metrics>,
  ) -> Self {
    Self {
      memory,
      disk,
      metrics,
    }
  }

  /// The memory tier. Useful for tier-specific operations such as purging
  /// memory without touching disk.
  pub fn memory(&self) -> &MemoryCache {
    &self.memory
  }

  /// The disk tier.
  pub fn disk(&self) -> &DiskCache<C, D> {
    &self.disk
  }

  /// Stores `value` in both tiers. Blocks for the memory write and the
  /// disk write; use [`set_with`](Self::set_with) to move the disk write
  /// off the calling thread.
  pub fn set<T>(&self, key: &str, value: T, cost: u64)
  where
    T: Serialize + Any + Send + Sync,
  {
    let value = Arc::new(value);
    self.memory.set_shared(key, value.clone(), cost);
    self.disk.set(key, &*value, cost);
  }

  /// Stores `value` in the memory tier now and the disk tier on a worker.
  /// The completion runs on the worker once the disk write has finished.
  pub fn set_with<T, F>(&self, key: impl Into<String>, value: T, cost: u64, on_done: F)
  where
    T: Serialize + Any + Send + Sync,
    F: FnOnce(String) + Send + 'static,
  {
    let key = key.into();
    let value = Arc::new(value);
    self.memory.set_shared(&key, value.clone(), cost);
    self.disk.set_arc_with(key, value, cost, on_done);
  }

  /// Returns the value under `key`, probing memory first and disk second.
  /// A disk hit is promoted into the memory tier with cost 0.
  pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
  where
    T: DeserializeOwned + Any + Send + Sync,
  {
    if let Some(value) = self.memory.get::<T>(key) {
      return Some(value);
    }

    let value: T = self.disk.get(key)?;
    let value = Arc::new(value);
    self.memory.set_shared(key, value.clone(), 0);
    self.metrics.promotions.fetch_add(1, Ordering::Relaxed);
    Some(value)
  }

  /// Like [`get`](Self::get), but performed on a worker. The completion
  /// receives the value that was found, if any.
  pub fn get_with<T, F>(&self, key: impl Into<String>, on_done: F)
  where
    T: DeserializeOwned + Any + Send + Sync,
    F: FnOnce(String, Option<Arc<T>>) + Send + 'static,
  {
    let key = key.into();
    let this = self.clone();
    self.disk.execute(move || {
      let value = this.get::<T>(&key);
      on_done(key, value);
    });
  }

  /// True when either tier holds `key`.
  pub fn contains(&self, key: &str) -> bool {
    self.memory.contains(key) || self.disk.contains(key)
  }

  pub fn contains_with<F>(&self, key: impl Into<String>, on_done: F)
  where
    F: FnOnce(String, bool) + Send + 'static,
  {
    let key = key.into();
    let this = self.clone();
    self.disk.execute(move || {
      let present = this.contains(&key);
      on_done(key, present);
    });
  }

  /// Removes `key` from both tiers.
  pub fn remove(&self, key: &str) {
    self.memory.remove(key);
    self.disk.remove(key);
  }

  pub fn remove_with<F>(&self, key: impl Into<String>, on_done: F)
  where
    F: FnOnce(String) + Send + 'static,
  {
    let key = key.into();
    let this = self.clone();
    self.disk.execute(move || {
      this.remove(&key);
      on_done(key);
    });
  }

  /// Empties both tiers.
  pub fn clear(&self) {
    self.memory.clear();
    self.disk.clear();
  }

  pub fn clear_with<F>(&self, on_done: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let this = self.clone();
    self.disk.execute(move || {
      this.clear();
      on_done();
    });
  }

  /// Total payload bytes held by the disk tier.
  pub fn total_cost(&self) -> u64 {
    self.disk.total_size().max(0) as u64
  }

  /// Number of entries held by the disk tier.
  pub fn total_count(&self) -> i64 {
    self.disk.total_count()
  }

  /// A point-in-time snapshot of the cache's counters.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }
}

impl<C: Codec, D: KeyDigest> std::fmt::Debug for HybridCache<C, D> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HybridCache")
      .field("memory", &self.memory)
      .field("disk", &self.disk)
      .finish_non_exhaustive()
  }
}
