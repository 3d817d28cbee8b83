use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in whole seconds since the UNIX epoch.
///
/// Access times in the disk store are second-granular, matching the
/// `last_access_time` column.
#[inline]
pub(crate) fn now_epoch_secs() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs() as i64
}
