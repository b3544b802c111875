//! Time and id helpers.

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Returns current unix epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Generates a new ULID.
pub fn new_ulid() -> Ulid {
    Ulid::new()
}

/// Formats epoch milliseconds as `yyyy-MM-dd HH:mm:ss` (UTC).
///
/// Out-of-range timestamps render as an empty string.
pub fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_start() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
    }

    #[test]
    fn formats_millis_truncated() {
        // 2019-01-15 12:30:45.999 UTC
        assert_eq!(format_timestamp(1_547_555_445_999), "2019-01-15 12:30:45");
    }

    #[test]
    fn out_of_range_is_empty() {
        assert_eq!(format_timestamp(i64::MAX), "");
    }
}
