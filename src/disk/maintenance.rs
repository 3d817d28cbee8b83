use crate::disk::store::DiskStore;
use crate::disk::DiskConfig;
use crate::metrics::Metrics;
use crate::time;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;

/// How many of the oldest rows a trim pass fetches per round.
const TRIM_BATCH: usize = 16;
/// Sleep granularity between ticks, so a stop request is honored promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// The thread-safe parts of the disk tier that the maintenance thread
/// needs.
pub(crate) struct MaintenanceContext {
  pub(crate) store: Arc<Mutex<DiskStore>>,
  pub(crate) config: DiskConfig,
  pub(crate) metrics: Arc<Metrics>,
}

/// The background thread that periodically trims the disk tier by cost,
/// count, and age.
pub(crate) struct Maintenance {
  _handle: JoinHandle<()>,
  stop_flag: Arc<AtomicBool>,
}

impl Maintenance {
  pub(crate) fn spawn(context: MaintenanceContext, tick_interval: Duration) -> Self {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop = stop_flag.clone();

    let handle = thread::Builder::new()
      .name("strata-maintenance".to_string())
      .spawn(move || {
        while !stop.load(Ordering::Relaxed) {
          let tick_start = Instant::now();
          Self::tick(&context);

          while tick_start.elapsed() < tick_interval {
            if stop.load(Ordering::Relaxed) {
              return;
            }
            let remaining = tick_interval - tick_start.elapsed();
            thread::sleep(remaining.min(SLEEP_SLICE));
          }
        }
      })
      .expect("failed to spawn maintenance thread");

    Self {
      _handle: handle,
      stop_flag,
    }
  }

  /// One full maintenance pass under the tier lock.
  fn tick(context: &MaintenanceContext) {
    let store = context.store.lock();
    trim_to_cost_limit(&store, context.config.cost_limit, &context.metrics);
    trim_to_count_limit(&store, context.config.count_limit, &context.metrics);
    let cutoff = time::now_epoch_secs() - context.config.max_cache_period.as_secs() as i64;
    remove_expired_before(&store, cutoff, &context.metrics);
  }

  /// Signals the thread to stop. It exits within one sleep slice.
  pub(crate) fn stop(self) {
    self.stop_flag.store(true, Ordering::Relaxed);
  }
}

/// Removes the oldest entries until total payload bytes fit under `limit`,
/// or no further progress can be made. A limit of 0 disables the pass.
pub(crate) fn trim_to_cost_limit(store: &DiskStore, limit: u64, metrics: &Metrics) {
  if limit == 0 {
    return;
  }
  let mut total = match store.total_size() {
    Ok(total) => total,
    Err(err) => {
      warn!("cost trim could not read totals: {err}");
      metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
      return;
    }
  };

  let mut removed = 0u64;
  'trim: while total.max(0) as u64 > limit {
    let batch = match store.oldest_items(TRIM_BATCH) {
      Ok(batch) => batch,
      Err(err) => {
        warn!("cost trim could not list oldest items: {err}");
        metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        break;
      }
    };
    if batch.is_empty() {
      break;
    }

    let mut progressed = false;
    for item in batch {
      if total.max(0) as u64 <= limit {
        break 'trim;
      }
      match store.remove(&item.key) {
        Ok(()) => {
          total -= item.size;
          removed += 1;
          progressed = true;
        }
        Err(err) => {
          warn!("cost trim failed to remove {:?}: {err}", item.key);
          metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        }
      }
    }
    if !progressed {
      break;
    }
  }

  if removed > 0 {
    debug!("cost trim removed {removed} entries, {total} bytes remain");
    metrics.disk_trimmed.fetch_add(removed, Ordering::Relaxed);
    if let Err(err) = store.checkpoint() {
      warn!("checkpoint after cost trim failed: {err}");
    }
  }
}

/// Removes the oldest entries until the row count fits under `limit`, or no
/// further progress can be made. A limit of 0 disables the pass.
pub(crate) fn trim_to_count_limit(store: &DiskStore, limit: u64, metrics: &Metrics) {
  if limit == 0 {
    return;
  }
  let mut total = match store.total_count() {
    Ok(total) => total,
    Err(err) => {
      warn!("count trim could not read totals: {err}");
      metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
      return;
    }
  };

  let mut removed = 0u64;
  'trim: while total.max(0) as u64 > limit {
    let batch = match store.oldest_items(TRIM_BATCH) {
      Ok(batch) => batch,
      Err(err) => {
        warn!("count trim could not list oldest items: {err}");
        metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        break;
      }
    };
    if batch.is_empty() {
      break;
    }

    let mut progressed = false;
    for item in batch {
      if total.max(0) as u64 <= limit {
        break 'trim;
      }
      match store.remove(&item.key) {
        Ok(()) => {
          total -= 1;
          removed += 1;
          progressed = true;
        }
        Err(err) => {
          warn!("count trim failed to remove {:?}: {err}", item.key);
          metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
        }
      }
    }
    if !progressed {
      break;
    }
  }

  if removed > 0 {
    debug!("count trim removed {removed} entries, {total} remain");
    metrics.disk_trimmed.fetch_add(removed, Ordering::Relaxed);
    if let Err(err) = store.checkpoint() {
      warn!("checkpoint after count trim failed: {err}");
    }
  }
}

/// Deletes every entry last accessed before `cutoff`, sidecar files first
/// so no orphans remain.
pub(crate) fn remove_expired_before(store: &DiskStore, cutoff: i64, metrics: &Metrics) {
  let filenames = match store.expired_filenames(cutoff) {
    Ok(filenames) => filenames,
    Err(err) => {
      warn!("expiry pass could not list payload files: {err}");
      metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
      return;
    }
  };
  for filename in &filenames {
    store.delete_payload_file(filename);
  }

  match store.delete_expired(cutoff) {
    Ok(0) => {}
    Ok(deleted) => {
      debug!("expiry pass removed {deleted} entries");
      metrics.disk_expired.fetch_add(deleted as u64, Ordering::Relaxed);
      if let Err(err) = store.checkpoint() {
        warn!("checkpoint after expiry pass failed: {err}");
      }
    }
    Err(err) => {
      warn!("expiry pass could not delete rows: {err}");
      metrics.disk_failures.fetch_add(1, Ordering::Relaxed);
    }
  }
}
