use crate::error::CodecError;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts caller values to and from the byte payloads the disk tier
/// stores.
///
/// The cache itself never inspects payload bytes; any serde-compatible
/// format works. Implementations must be pure: `decode(encode(v))` returns a
/// value equal to `v` for every type the codec accepts.
pub trait Codec: Send + Sync + 'static {
  fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;
  fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// The default codec: JSON via `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
  fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|err| CodecError::Encode(Box::new(err)))
  }

  fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|err| CodecError::Decode(Box::new(err)))
  }
}
