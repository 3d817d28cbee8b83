mod executor;
pub(crate) mod maintenance;
pub(crate) mod store;

pub use store::StoredItemInfo;

use crate::codec::{Codec, JsonCodec};
use crate::digest::{KeyDigest, Sha256Digest};
use crate::error::StoreError;
use crate::metrics::Metrics;
use crate::time;
use executor::Executor;
use maintenance::{Maintenance, MaintenanceContext};
use store::DiskStore;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Configuration for the disk tier.
#[derive(Debug, Clone)]
pub struct DiskConfig {
  /// Maximum total payload bytes on disk. 0 disables cost trimming.
  pub cost_limit: u64,
  /// Maximum number of stored entries. 0 disables count trimming.
  pub count_limit: u64,
  /// Cost boundary above which a payload is stored as a sidecar file
  /// instead of an inline blob.
  pub inline_threshold: u64,
  /// Entries not accessed for this long are removed by maintenance.
  pub max_cache_period: Duration,
  /// How often the maintenance pass runs.
  pub auto_interval: Duration,
}

impl Default for DiskConfig {
  fn default() -> Self {
    Self {
      cost_limit: 500 * 1024 * 1024,
      count_limit: 0,
      inline_threshold: 20 * 1024,
      max_cache_period: Duration::from_secs(7 * 24 * 60 * 60),
      auto_interval: Duration::from_secs(120),
    }
  }
}

pub(crate) struct DiskShared<C: Codec, D: KeyDigest> {
  store: Arc<Mutex<DiskStore>>,
  codec: C,
  digest: D,
  config: DiskConfig,
  metrics: Arc<Metrics>,
  executor: Executor,
  maintenance: Option<Maintenance>,
}

impl<C: Codec, D: KeyDigest> Drop for DiskShared<C, D> {
  fn drop(&mut self) {
    if let Some(maintenance) = self.maintenance.take() {
      maintenance.stop();
    }
  }
}

/// The durable tier: a mutex-wrapped [`DiskStore`] plus a worker pool for
/// callback-based operations and a periodic maintenance thread.
///
/// Values cross this tier as bytes; the [`Codec`] translates them. Entries
/// whose cost exceeds [`DiskConfig::inline_threshold`] are written to
/// sidecar files named by the [`KeyDigest`]; smaller ones are stored inline
/// in the database row.
///
/// Synchronous operations hold the tier mutex for the duration of the disk
/// work. Callback variants enqueue onto the pool and invoke the completion
/// on a worker; completions for operations submitted together may run in
/// any order.
pub struct DiskCache<C: Codec = JsonCodec, D: KeyDigest = Sha256Digest> {
  shared: Arc<DiskShared<C, D>>,
}

impl<C: Codec, D: KeyDigest> Clone for DiskCache<C, D> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl DiskCache<JsonCodec, Sha256Digest> {
  /// Opens (or creates) a disk tier named `name` under `root`, with the
  /// default codec and digest.
  pub fn open(root: impl AsRef<Path>, name: &str, config: DiskConfig) -> Result<Self, StoreError> {
    Self::open_with(root, name, config, JsonCodec, Sha256Digest)
  }
}

impl<C: Codec, D: KeyDigest> DiskCache<C, D> {
  /// Opens (or creates) a disk tier with an explicit codec and digest.
  pub fn open_with(
    root: impl AsRef<Path>,
    name: &str,
    config: DiskConfig,
    codec: C,
    digest: D,
  ) -> Result<Self, StoreError> {
    Self::open_internal(root, name, config, codec, digest, Arc::new(Metrics::new()))
  }

  pub(crate) fn open_internal(
    root: impl AsRef<Path>,
    name: &str,
    config: DiskConfig,
    codec: C,
    digest: D,
    metrics: Arc<Metrics>,
  ) -> Result<Self, StoreError> {
    let store = Arc::new(Mutex::new(DiskStore::open(root.as_ref(), name)?));
    let maintenance = Maintenance::spawn(
      MaintenanceContext {
        store: store.clone(),
        config: config.clone(),
        metrics: metrics.clone(),
      },
      config.auto_interval,
    );

    Ok(Self {
      shared: Arc::new(DiskShared {
        store,
        codec,
        digest,
        config,
        metrics,
        executor: Executor::new(name),
        maintenance: Some(maintenance),
      }),
    })
  }

  /// Encodes `value` and persists it under `key`. Returns `false` when the
  /// encode or the disk write failed; the previous entry, if any, is then
  /// left untouched.
  pub fn set<T: Serialize>(&self, key: &str, value: &T, cost: u64) -> bool {
    self.shared.write_value(key, value, cost)
  }

  /// Reads and decodes the value under `key`. Absent keys and failed reads
  /// are both `None`; reading refreshes the entry's access time.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.shared.read_value(key)
  }

  pub fn contains(&self, key: &str) -> bool {
    let store = self.shared.store.lock();
    match store.contains(key) {
      Ok(present) => present,
      Err(err) => {
        warn!("disk contains for {key:?} failed: {err}");
        self.shared.metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        false
      }
    }
  }

  /// Removes the entry under `key`, sidecar file included. Returns `false`
  /// only when the store reported a failure.
  pub fn remove(&self, key: &str) -> bool {
    let store = self.shared.store.lock();
    match store.remove(key) {
      Ok(()) => true,
      Err(err) => {
        warn!("disk remove for {key:?} failed: {err}");
        self.shared.metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        false
      }
    }
  }

  /// Drops every entry and resets the cache directory.
  pub fn clear(&self) -> bool {
    let mut store = self.shared.store.lock();
    match store.remove_all() {
      Ok(()) => true,
      Err(err) => {
        error!("disk clear failed: {err}");
        self.shared.metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        false
      }
    }
  }

  /// Total payload bytes on disk; 0 when the store cannot be read.
  pub fn total_size(&self) -> i64 {
    let store = self.shared.store.lock();
    match store.total_size() {
      Ok(total) => total,
      Err(err) => {
        warn!("disk total_size failed: {err}");
        self.shared.metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        0
      }
    }
  }

  /// Number of entries on disk; 0 when the store cannot be read.
  pub fn total_count(&self) -> i64 {
    let store = self.shared.store.lock();
    match store.total_count() {
      Ok(count) => count,
      Err(err) => {
        warn!("disk total_count failed: {err}");
        self.shared.metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        0
      }
    }
  }

  /// Trims the oldest entries until total payload bytes fit the configured
  /// cost limit. Also runs periodically on the maintenance thread.
  pub fn trim_cost(&self) {
    let store = self.shared.store.lock();
    maintenance::trim_to_cost_limit(&store, self.shared.config.cost_limit, &self.shared.metrics);
  }

  /// Trims the oldest entries until the entry count fits the configured
  /// count limit. Also runs periodically on the maintenance thread.
  pub fn trim_count(&self) {
    let store = self.shared.store.lock();
    maintenance::trim_to_count_limit(&store, self.shared.config.count_limit, &self.shared.metrics);
  }

  /// Removes every entry whose last access is older than the configured
  /// maximum cache period. Also runs periodically on the maintenance
  /// thread.
  pub fn remove_expired(&self) {
    let cutoff = time::now_epoch_secs() - self.shared.config.max_cache_period.as_secs() as i64;
    let store = self.shared.store.lock();
    maintenance::remove_expired_before(&store, cutoff, &self.shared.metrics);
  }

  /// The directory holding the database and sidecar files.
  pub fn directory(&self) -> PathBuf {
    self.shared.store.lock().directory().to_path_buf()
  }

  // Backdates an entry's access time so expiry and trim-order tests do not
  // have to sleep real time away.
  #[doc(hidden)]
  pub fn set_last_access_time(&self, key: &str, epoch_secs: i64) -> bool {
    let store = self.shared.store.lock();
    match store.set_last_access_time(key, epoch_secs) {
      Ok(()) => true,
      Err(err) => {
        warn!("backdating {key:?} failed: {err}");
        false
      }
    }
  }

  // --- Callback variants ---
  // Each enqueues onto the worker pool and invokes the completion there.

  pub fn set_with<T, F>(&self, key: impl Into<String>, value: T, cost: u64, on_done: F)
  where
    T: Serialize + Send + 'static,
    F: FnOnce(String) + Send + 'static,
  {
    let key = key.into();
    let shared = self.shared.clone();
    self.shared.executor.execute(move || {
      shared.write_value(&key, &value, cost);
      on_done(key);
    });
  }

  pub fn get_with<T, F>(&self, key: impl Into<String>, on_done: F)
  where
    T: DeserializeOwned + Send + 'static,
    F: FnOnce(String, Option<T>) + Send + 'static,
  {
    let key = key.into();
    let shared = self.shared.clone();
    self.shared.executor.execute(move || {
      let value = shared.read_value(&key);
      on_done(key, value);
    });
  }

  pub fn contains_with<F>(&self, key: impl Into<String>, on_done: F)
  where
    F: FnOnce(String, bool) + Send + 'static,
  {
    let key = key.into();
    let this = self.clone();
    self.shared.executor.execute(move || {
      let present = this.contains(&key);
      on_done(key, present);
    });
  }

  pub fn remove_with<F>(&self, key: impl Into<String>, on_done: F)
  where
    F: FnOnce(String) + Send + 'static,
  {
    let key = key.into();
    let this = self.clone();
    self.shared.executor.execute(move || {
      this.remove(&key);
      on_done(key);
    });
  }

  pub fn clear_with<F>(&self, on_done: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let this = self.clone();
    self.shared.executor.execute(move || {
      this.clear();
      on_done();
    });
  }

  /// Write variant for a value that is already shared; the hybrid tier
  /// hands the same `Arc` to both tiers.
  pub(crate) fn set_arc_with<T, F>(&self, key: String, value: Arc<T>, cost: u64, on_done: F)
  where
    T: Serialize + Send + Sync + 'static,
    F: FnOnce(String) + Send + 'static,
  {
    let shared = self.shared.clone();
    self.shared.executor.execute(move || {
      shared.write_value(&key, &*value, cost);
      on_done(key);
    });
  }

  /// Runs `job` on the tier's worker pool.
  pub(crate) fn execute(&self, job: impl FnOnce() + Send + 'static) {
    self.shared.executor.execute(job);
  }
}

impl<C: Codec, D: KeyDigest> DiskShared<C, D> {
  fn write_value<T: Serialize>(&self, key: &str, value: &T, cost: u64) -> bool {
    let bytes = match self.codec.encode(value) {
      Ok(bytes) => bytes,
      Err(err) => {
        error!("could not encode value for {key:?}: {err}");
        self.metrics.codec_failures.fetch_add(1, Ordering::Relaxed);
        debug_assert!(false, "could not encode value for {key:?}: {err}");
        return false;
      }
    };

    let sidecar = (cost > self.config.inline_threshold).then(|| self.digest.digest(key));
    let store = self.store.lock();
    match store.write(key, &bytes, sidecar.as_deref()) {
      Ok(()) => true,
      Err(err) => {
        warn!("disk write for {key:?} failed: {err}");
        self.metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        false
      }
    }
  }

  fn read_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let bytes = {
      let store = self.store.lock();
      match store.read(key) {
        Ok(bytes) => bytes,
        Err(err) => {
          warn!("disk read for {key:?} failed: {err}");
          self.metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
          None
        }
      }
    };

    let Some(bytes) = bytes else {
      self.metrics.disk_misses.fetch_add(1, Ordering::Relaxed);
      return None;
    };

    match self.codec.decode(&bytes) {
      Ok(value) => {
        self.metrics.disk_hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
      }
      Err(err) => {
        error!("could not decode value for {key:?}: {err}");
        self.metrics.codec_failures.fetch_add(1, Ordering::Relaxed);
        debug_assert!(false, "could not decode value for {key:?}: {err}");
        None
      }
    }
  }
}

impl<C: Codec, D: KeyDigest> std::fmt::Debug for DiskCache<C, D> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DiskCache")
      .field("directory", &self.directory())
      .field("cost_limit", &self.shared.config.cost_limit)
      .field("count_limit", &self.shared.config.count_limit)
      .field("inline_threshold", &self.shared.config.inline_threshold)
      .finish_non_exhaustive()
  }
}
