use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata::{HostEvent, HybridCache, HybridCacheBuilder, ManualEventSource};
use tempfile::TempDir;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn build(dir: &TempDir) -> HybridCache {
  HybridCacheBuilder::new("app", dir.path()).build().unwrap()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Profile {
  id: u64,
  name: String,
}

#[test]
fn set_then_get_round_trips_through_memory() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  cache.set("a", "hello".to_string(), 5);
  assert_eq!(
    cache.get::<String>("a").as_deref().map(String::as_str),
    Some("hello")
  );
}

#[test]
fn structs_round_trip_like_any_other_value() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  let profile = Profile {
    id: 9,
    name: "nine".into(),
  };
  cache.set("profile", profile.clone(), 1);

  // Also via disk: drop the memory copy first.
  cache.memory().clear();
  assert_eq!(cache.get::<Profile>("profile").as_deref(), Some(&profile));
}

#[test]
fn a_disk_hit_promotes_back_into_memory() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  cache.set("a", "hello".to_string(), 5);
  cache.memory().clear();
  assert!(!cache.memory().contains("a"));

  let value = cache.get::<String>("a");
  assert_eq!(value.as_deref().map(String::as_str), Some("hello"));
  assert!(
    cache.memory().contains("a"),
    "disk hits must be promoted into the memory tier"
  );
  assert!(cache.metrics().promotions >= 1);
}

#[test]
fn contains_consults_both_tiers() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  cache.set("k", 1u32, 1);
  assert!(cache.contains("k"));

  cache.memory().clear();
  assert!(cache.contains("k"), "key is still on disk");

  assert!(!cache.contains("missing"));
}

#[test]
fn remove_fans_out_to_both_tiers() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  cache.set("k", 1u32, 1);
  cache.remove("k");

  assert!(!cache.contains("k"));
  assert!(!cache.memory().contains("k"));
  assert!(!cache.disk().contains("k"));
}

#[test]
fn clear_fans_out_to_both_tiers() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  cache.set("a", 1u32, 1);
  cache.set("b", 2u32, 1);
  cache.clear();

  assert_eq!(cache.memory().total_count(), 0);
  assert_eq!(cache.disk().total_count(), 0);
  assert!(cache.get::<u32>("a").is_none());
}

#[test]
fn values_survive_a_rebuild_over_the_same_directory() {
  let dir = TempDir::new().unwrap();
  {
    let cache = build(&dir);
    cache.set("persisted", "still here".to_string(), 1);
  }

  let cache = build(&dir);
  assert_eq!(
    cache.get::<String>("persisted").as_deref().map(String::as_str),
    Some("still here")
  );
}

#[test]
fn totals_are_aggregated_from_the_disk_tier() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  cache.set("a", "aa".to_string(), 1); // encodes to 4 bytes
  cache.set("b", "bb".to_string(), 1);

  assert_eq!(cache.total_count(), 2);
  assert_eq!(cache.total_cost(), 8);
}

#[test]
fn callback_set_reports_the_key_after_the_disk_write() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);
  let (tx, rx) = mpsc::channel();

  cache.set_with("k", "value".to_string(), 1, move |key| {
    let _ = tx.send(key);
  });

  assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), "k");
  // The memory write happened synchronously, the disk write by now.
  assert!(cache.memory().contains("k"));
  assert!(cache.disk().contains("k"));
}

#[test]
fn callback_get_receives_the_value_read_from_disk() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  cache.set("k", "from disk".to_string(), 1);
  cache.memory().clear();

  let (tx, rx) = mpsc::channel();
  cache.get_with::<String, _>("k", move |key, value| {
    let _ = tx.send((key, value.map(|v| (*v).clone())));
  });

  let (key, value) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(key, "k");
  assert_eq!(value.as_deref(), Some("from disk"));
}

#[test]
fn callback_get_reports_absence_as_none() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  let (tx, rx) = mpsc::channel();
  cache.get_with::<String, _>("nothing", move |_, value| {
    let _ = tx.send(value.is_none());
  });
  assert!(rx.recv_timeout(RECV_TIMEOUT).unwrap());
}

#[test]
fn callback_remove_and_clear_fan_out() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);
  cache.set("a", 1u32, 1);
  cache.set("b", 2u32, 1);

  let (tx, rx) = mpsc::channel();
  cache.remove_with("a", move |key| {
    let _ = tx.send(key);
  });
  rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert!(!cache.contains("a"));

  let (tx, rx) = mpsc::channel();
  cache.clear_with(move || {
    let _ = tx.send(());
  });
  rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert!(!cache.contains("b"));
}

#[test]
fn a_memory_warning_purges_memory_but_not_disk() {
  let dir = TempDir::new().unwrap();
  let events = Arc::new(ManualEventSource::new());
  let cache = HybridCacheBuilder::new("app", dir.path())
    .event_source(events.clone())
    .build()
    .unwrap();

  cache.set("k", "kept on disk".to_string(), 1);
  events.emit(HostEvent::MemoryWarning);

  assert_eq!(cache.memory().total_count(), 0);
  assert!(cache.disk().contains("k"));

  // And the value comes back through promotion.
  assert_eq!(
    cache.get::<String>("k").as_deref().map(String::as_str),
    Some("kept on disk")
  );
  assert!(cache.memory().contains("k"));
}

#[test]
fn purge_events_can_be_opted_out() {
  let dir = TempDir::new().unwrap();
  let events = Arc::new(ManualEventSource::new());
  let cache = HybridCacheBuilder::new("app", dir.path())
    .auto_purge_on_memory_warning(false)
    .auto_purge_on_background(false)
    .event_source(events.clone())
    .build()
    .unwrap();

  cache.set("k", 1u32, 1);
  events.emit(HostEvent::MemoryWarning);
  events.emit(HostEvent::DidEnterBackground);

  assert!(cache.memory().contains("k"));
}

#[test]
fn memory_limits_apply_through_the_hybrid_surface() {
  let dir = TempDir::new().unwrap();
  let cache = HybridCacheBuilder::new("app", dir.path())
    .memory_count_limit(2)
    .build()
    .unwrap();

  cache.set("k1", 1u32, 0);
  cache.set("k2", 2u32, 0);
  cache.set("k3", 3u32, 0);

  assert_eq!(cache.memory().total_count(), 2);
  assert!(!cache.memory().contains("k1"));
  // The evicted key is still readable through the disk tier.
  assert_eq!(cache.get::<u32>("k1").as_deref(), Some(&1));
}

#[test]
fn metrics_reflect_tier_traffic() {
  let dir = TempDir::new().unwrap();
  let cache = build(&dir);

  cache.set("k", 1u32, 1);
  let _ = cache.get::<u32>("k"); // memory hit
  cache.memory().clear();
  let _ = cache.get::<u32>("k"); // disk hit + promotion
  let _ = cache.get::<u32>("absent"); // full miss

  let metrics = cache.metrics();
  assert!(metrics.memory_hits >= 1);
  assert!(metrics.disk_hits >= 1);
  assert!(metrics.promotions >= 1);
  assert!(metrics.disk_misses >= 1);
}
