use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use strata::{DiskCache, DiskConfig, KeyDigest, Sha256Digest};
use tempfile::TempDir;

fn now_secs() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap()
    .as_secs() as i64
}

fn open(dir: &TempDir, config: DiskConfig) -> DiskCache {
  DiskCache::open(dir.path(), "app", config).unwrap()
}

// A value whose JSON encoding is exactly `len` bytes (quotes included).
fn payload_of(len: usize, fill: char) -> String {
  fill.to_string().repeat(len - 2)
}

#[test]
fn cost_trim_removes_the_oldest_entries_first() {
  let dir = TempDir::new().unwrap();
  let cache = open(
    &dir,
    DiskConfig {
      cost_limit: 100,
      ..DiskConfig::default()
    },
  );

  let now = now_secs();
  for (key, fill, age) in [("A", 'a', 30), ("B", 'b', 20), ("C", 'c', 10)] {
    cache.set(key, &payload_of(60, fill), 0);
    assert!(cache.set_last_access_time(key, now - age));
  }
  assert_eq!(cache.total_size(), 180);

  cache.trim_cost();

  assert!(cache.total_size() <= 100);
  assert!(!cache.contains("A"), "oldest access must be trimmed first");
  assert!(cache.contains("C"), "newest access must survive");
}

#[test]
fn cost_trim_without_a_limit_is_a_no_op() {
  let dir = TempDir::new().unwrap();
  let cache = open(
    &dir,
    DiskConfig {
      cost_limit: 0,
      ..DiskConfig::default()
    },
  );

  cache.set("a", &payload_of(60, 'a'), 0);
  cache.trim_cost();
  assert_eq!(cache.total_count(), 1);
}

#[test]
fn count_trim_removes_down_to_the_limit() {
  let dir = TempDir::new().unwrap();
  let cache = open(
    &dir,
    DiskConfig {
      count_limit: 2,
      ..DiskConfig::default()
    },
  );

  let now = now_secs();
  for (i, key) in ["one", "two", "three", "four"].iter().enumerate() {
    cache.set(*key, &i, 0);
    assert!(cache.set_last_access_time(key, now - 100 + i as i64));
  }

  cache.trim_count();

  assert_eq!(cache.total_count(), 2);
  assert!(!cache.contains("one"));
  assert!(!cache.contains("two"));
  assert!(cache.contains("three"));
  assert!(cache.contains("four"));
}

#[test]
fn expired_entries_and_their_files_are_removed() {
  let dir = TempDir::new().unwrap();
  let cache = open(
    &dir,
    DiskConfig {
      inline_threshold: 8,
      max_cache_period: Duration::from_secs(1000),
      ..DiskConfig::default()
    },
  );

  cache.set("stale", &"sidecar sized payload".to_string(), 64);
  cache.set("fresh", &"ok".to_string(), 1);
  let stale_file = cache.directory().join(Sha256Digest.digest("stale"));
  assert!(stale_file.exists());

  // Last touched well past the cache period; "fresh" stays current.
  assert!(cache.set_last_access_time("stale", now_secs() - 2000));

  cache.remove_expired();

  assert!(!cache.contains("stale"));
  assert!(!stale_file.exists(), "expired payload file must not linger");
  assert!(cache.contains("fresh"));

  // Nothing but the database files remains in the directory.
  let leftovers: Vec<_> = std::fs::read_dir(cache.directory())
    .unwrap()
    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
    .filter(|name| !name.starts_with("diskcache.sqlite"))
    .collect();
  assert!(leftovers.is_empty(), "orphan files: {leftovers:?}");
}

#[test]
fn expiry_leaves_recent_entries_alone() {
  let dir = TempDir::new().unwrap();
  let cache = open(
    &dir,
    DiskConfig {
      max_cache_period: Duration::from_secs(1000),
      ..DiskConfig::default()
    },
  );

  cache.set("a", &1u8, 1);
  cache.set("b", &2u8, 1);
  cache.remove_expired();
  assert_eq!(cache.total_count(), 2);
}

#[test]
fn the_maintenance_thread_trims_on_its_own() {
  let dir = TempDir::new().unwrap();
  let cache = open(
    &dir,
    DiskConfig {
      count_limit: 2,
      auto_interval: Duration::from_millis(100),
      ..DiskConfig::default()
    },
  );

  let now = now_secs();
  for (i, key) in ["one", "two", "three", "four"].iter().enumerate() {
    cache.set(*key, &i, 0);
    assert!(cache.set_last_access_time(key, now - 100 + i as i64));
  }

  // The next tick must bring the tier back under its count limit.
  let deadline = Instant::now() + Duration::from_secs(10);
  while cache.total_count() > 2 {
    assert!(
      Instant::now() < deadline,
      "maintenance never trimmed: {} entries left",
      cache.total_count()
    );
    std::thread::sleep(Duration::from_millis(25));
  }
  assert!(cache.contains("four"));
}
