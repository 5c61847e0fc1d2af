//! Message entity definitions

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::types::StoreError;

/// A persisted chat message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    /// Insertion sequence, used to break timestamp ties.
    pub id: i64,
    pub public_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Fixed-width UTC form used in storage and on the wire.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formatted_timestamps_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);

        let (a, b) = (format_timestamp(&earlier), format_timestamp(&later));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }

    #[test]
    fn parse_round_trips_formatted_value() {
        let now = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(&now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(StoreError::Corrupt(_))
        ));
    }
}
