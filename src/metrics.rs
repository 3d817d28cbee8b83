use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// Thread-safe counters shared by both tiers.
/// All fields are atomic to allow lock-free updates from any operation.
#[derive(Debug)]
pub(crate) struct Metrics {
  pub(crate) memory_hits: CachePadded<AtomicU64>,
  pub(crate) memory_misses: CachePadded<AtomicU64>,
  pub(crate) memory_evictions: CachePadded<AtomicU64>,

  pub(crate) disk_hits: CachePadded<AtomicU64>,
  pub(crate) disk_misses: CachePadded<AtomicU64>,
  pub(crate) disk_failures: CachePadded<AtomicU64>,

  /// Disk entries removed by cost/count trimming.
  pub(crate) disk_trimmed: CachePadded<AtomicU64>,
  /// Disk entries removed because their last access aged out.
  pub(crate) disk_expired: CachePadded<AtomicU64>,

  /// Disk hits copied back into the memory tier.
  pub(crate) promotions: CachePadded<AtomicU64>,
  pub(crate) codec_failures: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      memory_hits: CachePadded::new(AtomicU64::new(0)),
      memory_misses: CachePadded::new(AtomicU64::new(0)),
      memory_evictions: CachePadded::new(AtomicU64::new(0)),
      disk_hits: CachePadded::new(AtomicU64::new(0)),
      disk_misses: CachePadded::new(AtomicU64::new(0)),
      disk_failures: CachePadded::new(AtomicU64::new(0)),
      disk_trimmed: CachePadded::new(AtomicU64::new(0)),
      disk_expired: CachePadded::new(AtomicU64::new(0)),
      promotions: CachePadded::new(AtomicU64::new(0)),
      codec_failures: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current counters.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let memory_hits = self.memory_hits.load(Ordering::Relaxed);
    let memory_misses = self.memory_misses.load(Ordering::Relaxed);
    let disk_hits = self.disk_hits.load(Ordering::Relaxed);
    let disk_misses = self.disk_misses.load(Ordering::Relaxed);
    let lookups = memory_hits + memory_misses;

    MetricsSnapshot {
      memory_hits,
      memory_misses,
      memory_evictions: self.memory_evictions.load(Ordering::Relaxed),
      disk_hits,
      disk_misses,
      disk_failures: self.disk_failures.load(Ordering::Relaxed),
      disk_trimmed: self.disk_trimmed.load(Ordering::Relaxed),
      disk_expired: self.disk_expired.load(Ordering::Relaxed),
      promotions: self.promotions.load(Ordering::Relaxed),
      codec_failures: self.codec_failures.load(Ordering::Relaxed),
      hit_ratio: if lookups == 0 {
        0.0
      } else {
        (memory_hits + disk_hits) as f64 / lookups as f64
      },
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
  /// Lookups answered by the memory tier.
  pub memory_hits: u64,
  /// Lookups that fell through the memory tier.
  pub memory_misses: u64,
  /// Entries evicted from the memory tier by cost/count trimming.
  pub memory_evictions: u64,
  /// Memory misses answered by the disk tier.
  pub disk_hits: u64,
  /// Lookups absent from both tiers.
  pub disk_misses: u64,
  /// Disk operations that failed and were reported as absent/no-op.
  pub disk_failures: u64,
  /// Disk entries removed by cost/count trimming.
  pub disk_trimmed: u64,
  /// Disk entries removed by age.
  pub disk_expired: u64,
  /// Disk hits promoted into the memory tier.
  pub promotions: u64,
  /// Encode/decode failures (programmer errors, treated as no-ops).
  pub codec_failures: u64,
  /// Fraction of lookups answered by either tier.
  pub hit_ratio: f64,
  /// Seconds since the cache was built.
  pub uptime_secs: u64,
}
