use crate::codec::{Codec, JsonCodec};
use crate::digest::{KeyDigest, Sha256Digest};
use crate::disk::{DiskCache, DiskConfig};
use crate::error::BuildError;
use crate::events::EventSource;
use crate::hybrid::HybridCache;
use crate::memory::{MemoryCache, MemoryConfig};
use crate::metrics::Metrics;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use core::fmt;

/// A builder for [`HybridCache`] instances.
///
/// `name` becomes part of the on-disk directory
/// (`<root>/diskcache.<name>/`), so two caches with distinct names can
/// share a root. All limits default to the values in [`MemoryConfig`] and
/// [`DiskConfig`].
pub struct HybridCacheBuilder<C: Codec = JsonCodec, D: KeyDigest = Sha256Digest> {
  name: String,
  root: PathBuf,
  memory: MemoryConfig,
  disk: DiskConfig,
  codec: C,
  digest: D,
  event_source: Option<Arc<dyn EventSource>>,
}

impl HybridCacheBuilder<JsonCodec, Sha256Digest> {
  pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      root: root.into(),
      memory: MemoryConfig::default(),
      disk: DiskConfig::default(),
      codec: JsonCodec,
      digest: Sha256Digest,
      event_source: None,
    }
  }
}

impl<C: Codec, D: KeyDigest> HybridCacheBuilder<C, D> {
  /// Maximum total cost of memory-resident entries. 0 disables the limit.
  pub fn memory_cost_limit(mut self, limit: u64) -> Self {
    self.memory.cost_limit = limit;
    self
  }

  /// Maximum number of memory-resident entries. 0 disables the limit.
  pub fn memory_count_limit(mut self, limit: u64) -> Self {
    self.memory.count_limit = limit;
    self
  }

  /// Whether a memory-warning event clears the memory tier.
  pub fn auto_purge_on_memory_warning(mut self, purge: bool) -> Self {
    self.memory.auto_purge_on_memory_warning = purge;
    self
  }

  /// Whether a background-entry event clears the memory tier.
  pub fn auto_purge_on_background(mut self, purge: bool) -> Self {
    self.memory.auto_purge_on_background = purge;
    self
  }

  /// Maximum total payload bytes on disk. 0 disables the limit.
  pub fn disk_cost_limit(mut self, limit: u64) -> Self {
    self.disk.cost_limit = limit;
    self
  }

  /// Maximum number of entries on disk. 0 disables the limit.
  pub fn disk_count_limit(mut self, limit: u64) -> Self {
    self.disk.count_limit = limit;
    self
  }

  /// Cost boundary above which a disk payload is stored as a sidecar file.
  pub fn inline_threshold(mut self, threshold: u64) -> Self {
    self.disk.inline_threshold = threshold;
    self
  }

  /// Disk entries not accessed for this long are removed by maintenance.
  pub fn max_cache_period(mut self, period: Duration) -> Self {
    self.disk.max_cache_period = period;
    self
  }

  /// How often the disk maintenance pass runs.
  pub fn auto_interval(mut self, interval: Duration) -> Self {
    self.disk.auto_interval = interval;
    self
  }

  /// Replaces the whole memory configuration at once.
  pub fn memory_config(mut self, config: MemoryConfig) -> Self {
    self.memory = config;
    self
  }

  /// Replaces the whole disk configuration at once.
  pub fn disk_config(mut self, config: DiskConfig) -> Self {
    self.disk = config;
    self
  }

  /// Sets the codec used to encode values for the disk tier.
  pub fn codec<C2: Codec>(self, codec: C2) -> HybridCacheBuilder<C2, D> {
    HybridCacheBuilder {
      name: self.name,
      root: self.root,
      memory: self.memory,
      disk: self.disk,
      codec,
      digest: self.digest,
      event_source: self.event_source,
    }
  }

  /// Sets the digest used to derive sidecar filenames from keys.
  pub fn digest<D2: KeyDigest>(self, digest: D2) -> HybridCacheBuilder<C, D2> {
    HybridCacheBuilder {
      name: self.name,
      root: self.root,
      memory: self.memory,
      disk: self.disk,
      codec: self.codec,
      digest,
      event_source: self.event_source,
    }
  }

  /// Wires the memory tier to a host event source, so memory-warning and
  /// background-entry notifications can purge it.
  pub fn event_source(mut self, source: Arc<dyn EventSource>) -> Self {
    self.event_source = Some(source);
    self
  }

  /// Builds the cache, opening (or creating) its on-disk directory.
  pub fn build(self) -> Result<HybridCache<C, D>, BuildError> {
    self.validate()?;

    let metrics = Arc::new(Metrics::new());
    let memory = MemoryCache::with_metrics(self.memory, metrics.clone());

    if let Some(source) = &self.event_source {
      // Hold the tier weakly so a registered handler cannot keep a dropped
      // cache alive.
      let weak = memory.downgrade();
      source.register(Box::new(move |event| {
        if let Some(tier) = MemoryCache::from_weak(&weak) {
          tier.handle_event(event);
        }
      }));
    }

    let disk = DiskCache::open_internal(
      &self.root,
      &self.name,
      self.disk,
      self.codec,
      self.digest,
      metrics.clone(),
    )?;

    Ok(HybridCache::from_parts(memory, disk, metrics))
  }

  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.name.is_empty() {
      return Err(BuildError::EmptyName);
    }
    let safe = self
      .name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !safe {
      return Err(BuildError::InvalidName(self.name.clone()));
    }
    Ok(())
  }
}

impl<C: Codec, D: KeyDigest> fmt::Debug for HybridCacheBuilder<C, D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HybridCacheBuilder")
      .field("name", &self.name)
      .field("root", &self.root)
      .field("memory", &self.memory)
      .field("disk", &self.disk)
      .field("has_event_source", &self.event_source.is_some())
      .finish_non_exhaustive()
  }
}
