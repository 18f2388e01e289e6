//! Parsing for IFTTT's `CreatedAt` date strings.
//!
//! IFTTT forwards timestamps like `September 08, 2025 at 02:39PM`. The
//! `" at "` infix is dropped and the remainder tried against a short list of
//! formats; RFC 3339 input (e.g. from a re-imported CSV) is accepted as-is.
//! Unparseable input is `None`, stored as NULL rather than rejected.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Formats attempted after normalizing the `" at "` infix, in order.
const FORMATS: &[&str] = &[
    "%B %d, %Y %I:%M%p",    // September 08, 2025 02:39PM
    "%B %d, %Y %H:%M",      // September 08, 2025 14:39
    "%Y-%m-%d %H:%M:%S",    // 2025-09-08 14:39:00
];

/// Parse an IFTTT `CreatedAt` value into a UTC timestamp.
///
/// Returns `None` for empty or unparseable input.
#[must_use]
pub fn parse_ifttt_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let normalized = value.replace(" at ", " ");
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(naive.and_utc());
        }
    }

    // Date-only fallback: midnight UTC.
    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%B %d, %Y") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    None
}
