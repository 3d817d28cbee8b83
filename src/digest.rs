use sha2::{Digest, Sha256};

/// Derives a filesystem-safe name from a cache key.
///
/// The disk tier names sidecar payload files after the digest of their key,
/// so the digest must only produce characters that are valid in a bare
/// filename.
pub trait KeyDigest: Send + Sync + 'static {
  /// Hex digest of `key`.
  fn digest(&self, key: &str) -> String;
}

/// The default digest: SHA-256, hex-encoded.
///
/// A filename collision would require a second preimage of SHA-256, so
/// colliding keys are not handled at runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Digest;

impl KeyDigest for Sha256Digest {
  fn digest(&self, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
  }
}
