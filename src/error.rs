use thiserror::Error;

/// Errors that can occur when building a cache.
#[derive(Debug, Error)]
pub enum BuildError {
  /// The cache name is empty. The name becomes part of the on-disk
  /// directory, so it must be present.
  #[error("cache name cannot be empty")]
  EmptyName,

  /// The cache name contains characters that cannot appear in a directory
  /// name.
  #[error("cache name {0:?} is not filesystem-safe")]
  InvalidName(String),

  /// The disk tier could not be opened.
  #[error("failed to open disk tier: {0}")]
  Store(#[from] StoreError),
}

/// Errors produced inside the disk store. These never cross the public API:
/// the tier logs them and reports the operation as failed or absent.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("database handle is closed")]
  Closed,

  #[error("database close kept failing after {attempts} attempts")]
  CloseFailed { attempts: u32 },
}

/// Errors produced by a [`Codec`](crate::codec::Codec) implementation.
///
/// A codec failure is a programmer error (the wrong type was requested, or a
/// value that cannot be serialized was stored); the cache logs it and treats
/// the operation as a no-op for that key.
#[derive(Debug, Error)]
pub enum CodecError {
  #[error("encode failed: {0}")]
  Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("decode failed: {0}")]
  Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A specialized `Result` for disk-store operations.
pub(crate) type StoreResult<T> = Result<T, StoreError>;
