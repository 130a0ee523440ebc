//! Canonical instants.
//!
//! Clients report time as epoch milliseconds, as an ISO-8601 string with an
//! offset, or as a bare ISO-8601 string. Everything is folded into a single
//! `DateTime<Utc>` before it reaches the store.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// An instant as sent by a client. Naive values are taken to be UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientInstant {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ClientInstant {
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            ClientInstant::Aware(dt) => dt.with_timezone(&Utc),
            ClientInstant::Naive(naive) => naive.and_utc(),
        }
    }
}

impl From<DateTime<Utc>> for ClientInstant {
    fn from(value: DateTime<Utc>) -> Self {
        ClientInstant::Aware(value.fixed_offset())
    }
}

/// Instants outside years 0..=9999 have no fixed-width text form.
pub fn is_storable(instant: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&instant.year())
}

/// Picks the canonical instant: epoch milliseconds first, then the explicit
/// instant, then `now`. A source that is unrepresentable or outside the
/// storable year range is skipped.
pub fn normalize(
    ts_ms: Option<i64>,
    instant: Option<ClientInstant>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    ts_ms
        .and_then(DateTime::from_timestamp_millis)
        .filter(is_storable)
        .or_else(|| instant.map(ClientInstant::to_utc).filter(is_storable))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap()
    }

    #[test]
    fn epoch_millis_win_over_explicit_instant() {
        let explicit = ClientInstant::from(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let resolved = normalize(Some(1_700_000_000_123), Some(explicit), now());
        assert_eq!(resolved.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn aware_instant_is_converted_to_utc() {
        let aware: ClientInstant = serde_json::from_str("\"2024-05-01T12:00:00+02:00\"").unwrap();
        assert_eq!(
            normalize(None, Some(aware), now()),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn naive_instant_is_read_as_utc() {
        let naive: ClientInstant = serde_json::from_str("\"2024-05-01T12:00:00.250\"").unwrap();
        assert!(matches!(naive, ClientInstant::Naive(_)));
        assert_eq!(
            normalize(None, Some(naive), now()),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn falls_back_to_now() {
        assert_eq!(normalize(None, None, now()), now());
        assert_eq!(normalize(Some(i64::MAX), None, now()), now());
    }

    #[test]
    fn years_past_9999_fall_through() {
        let far_future = 253_402_300_800_000;
        let explicit = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            normalize(Some(far_future), Some(ClientInstant::from(explicit)), now()),
            explicit
        );

        let too_late = ClientInstant::from(Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(normalize(None, Some(too_late), now()), now());
        assert_eq!(normalize(Some(-62_167_219_200_001), None, now()), now());
    }
}
