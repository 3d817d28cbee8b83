//! A two-tier key-value object cache.
//!
//! Strata keeps hot entries in an in-memory recency list and spills every
//! write to a SQLite-backed disk tier, so values survive process restarts
//! and memory-pressure purges. Small payloads are stored inline in the
//! database; large ones become sidecar files next to it. A background
//! maintenance thread trims the disk tier by total size, entry count, and
//! age.
//!
//! Serialization, sidecar naming, and host notifications are pluggable
//! through the [`Codec`], [`KeyDigest`], and [`EventSource`] traits;
//! defaults built on `serde_json` and SHA-256 are included.
//!
//! # Example
//!
//! ```
//! use strata::HybridCacheBuilder;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let cache = HybridCacheBuilder::new("demo", dir.path()).build().unwrap();
//!
//! cache.set("greeting", "hello".to_string(), 5);
//! let value = cache.get::<String>("greeting").unwrap();
//! assert_eq!(*value, "hello");
//! ```

pub mod builder;
pub mod codec;
pub mod digest;
pub mod disk;
pub mod error;
pub mod events;
pub mod hybrid;
pub mod memory;
pub mod metrics;

mod time;

pub use builder::HybridCacheBuilder;
pub use codec::{Codec, JsonCodec};
pub use digest::{KeyDigest, Sha256Digest};
pub use disk::{DiskCache, DiskConfig, StoredItemInfo};
pub use error::{BuildError, CodecError, StoreError};
pub use events::{EventHandler, EventSource, HostEvent, ManualEventSource};
pub use hybrid::HybridCache;
pub use memory::{MemoryCache, MemoryConfig, SharedValue};
pub use metrics::MetricsSnapshot;
