use chrono::{DateTime, NaiveDate, Utc};

/// Version-snapshot timestamp, e.g. `20260115T093000.123456Z` — matches the
/// file-naming convention used for contract history snapshots.
pub fn version_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}

/// Today's UTC date as `YYYYMMDD`, used for suggestion id generation and
/// daily-cap bookkeeping.
pub fn today_compact(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}

/// Parse a bare `YYYY-MM-DD` date (as used for `agreed_date` fields) into a
/// UTC midnight timestamp.
pub fn parse_date_utc(s: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0)?, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn version_timestamp_has_expected_shape() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap();
        let ts = version_timestamp(now);
        assert!(ts.starts_with("20260115T093000."));
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn parse_date_roundtrips() {
        let parsed = parse_date_utc("2025-06-01").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2025-06-01");
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date_utc("not-a-date").is_none());
    }
}
