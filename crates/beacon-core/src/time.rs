//! Server timestamps.
//!
//! All journal and wire timestamps are UTC ISO-8601 strings with millisecond
//! precision and a trailing `Z` (`2026-02-11T08:17:02.123Z`). The format is
//! fixed so that lexicographic comparison of two server-issued timestamps is
//! equivalent to chronological comparison, which `poll?since=` relies on.

use chrono::{DateTime, Duration, Utc};

/// The fixed timestamp format shared by every server-issued timestamp.
const ISO_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format an instant as a millisecond ISO-8601 UTC string.
#[must_use]
pub fn format_iso(instant: DateTime<Utc>) -> String {
    instant.format(ISO_MILLIS).to_string()
}

/// The current time as a millisecond ISO-8601 UTC string.
#[must_use]
pub fn now_iso() -> String {
    format_iso(Utc::now())
}

/// A timestamp `offset_ms` milliseconds after `base`.
///
/// Used for synthetic batch timestamps: items submitted in one request get
/// `base + index` so their relative order survives wall-clock ties.
#[must_use]
pub fn offset_iso(base: DateTime<Utc>, offset_ms: i64) -> String {
    format_iso(base + Duration::milliseconds(offset_ms))
}

/// A filesystem-safe variant of [`now_iso`] for backup filenames.
///
/// Colons and dots are replaced with dashes; the result still sorts
/// lexicographically in chronological order.
#[must_use]
pub fn now_file_stamp() -> String {
    now_iso().replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_has_millis_and_zulu() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        // 2026-02-11T08:17:02.123Z → 24 chars
        assert_eq!(ts.len(), 24);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }

    #[test]
    fn lexicographic_order_is_chronological() {
        let base = Utc.with_ymd_and_hms(2026, 2, 11, 8, 17, 2).unwrap();
        let a = format_iso(base);
        let b = offset_iso(base, 1);
        let c = offset_iso(base, 1000);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn offset_zero_equals_base() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_iso(base), offset_iso(base, 0));
    }

    #[test]
    fn offset_crosses_second_boundary() {
        let base = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .unwrap()
            .checked_add_signed(Duration::milliseconds(999))
            .unwrap();
        let next = offset_iso(base, 1);
        assert!(next.contains("T00:00:01.000Z"));
    }

    #[test]
    fn file_stamp_has_no_reserved_chars() {
        let stamp = now_file_stamp();
        assert!(!stamp.contains(':'));
        assert!(!stamp.contains('.'));
        assert_eq!(stamp.len(), 24);
    }
}
