// 🪪 Swipe Event - the unit of attendance
// One decoded badge swipe, as stored by every sink and shipped to the recorder

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Column headers of every attendance file, in storage order.
pub const ATTENDANCE_HEADER: [&str; 5] = [
    "Identity ID",
    "Badge ID",
    "Raw Swipe Data",
    "Swipe Timestamp",
    "Location",
];

/// A single badge swipe.
///
/// Built by the decoder (station side) or by the recorder from a remote
/// request. Never mutated after creation; `captured_at` is always UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeEvent {
    #[serde(rename = "Identity ID")]
    pub identity_id: String,

    #[serde(rename = "Badge ID")]
    pub badge_id: String,

    /// Track data exactly as read. Empty when the recorder received an
    /// event without it.
    #[serde(rename = "Raw Swipe Data")]
    pub raw_track_data: String,

    #[serde(rename = "Swipe Timestamp")]
    pub captured_at: DateTime<Utc>,

    #[serde(rename = "Location")]
    pub location: Option<String>,
}

impl SwipeEvent {
    pub fn new(
        identity_id: String,
        badge_id: String,
        raw_track_data: String,
        captured_at: DateTime<Utc>,
    ) -> Self {
        SwipeEvent {
            identity_id,
            badge_id,
            raw_track_data,
            captured_at,
            location: None,
        }
    }

    /// Builder pattern: tag the station the swipe came from
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location.filter(|l| !l.is_empty());
        self
    }
}

/// Canonical text form of a capture timestamp.
///
/// Fixed precision keeps lexical order equal to chronological order, which
/// the SQLite store relies on for range queries.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_canonical_timestamp_sorts_lexically() {
        let early = Utc.with_ymd_and_hms(2026, 3, 2, 9, 5, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();

        let a = canonical_timestamp(&early);
        let b = canonical_timestamp(&late);

        assert_eq!(a, "2026-03-02T09:05:00.000000Z");
        assert!(a < b);
    }

    #[test]
    fn test_empty_location_is_dropped() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 9, 5, 0).unwrap();
        let event = SwipeEvent::new("1234567".into(), "B1".into(), String::new(), ts)
            .with_location(Some(String::new()));

        assert_eq!(event.location, None);
    }
}
