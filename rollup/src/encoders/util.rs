// Utility functions for encoders.

use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Writes `timestamp` as RFC 3339 with millisecond precision, e.g. `2023-10-26T14:30:05.123Z`.
pub fn write_timestamp(buf: &mut String, timestamp: &DateTime<Utc>) {
  let _ = write!(
    buf,
    "{}",
    timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
  );
}

/// Writes `timestamp` using a chrono `strftime`-style format string.
pub fn write_timestamp_with_format(buf: &mut String, timestamp: &DateTime<Utc>, format: &str) {
  let _ = write!(buf, "{}", timestamp.format(format));
}
