//! Fixed wall-clock fire times for the weekly digest, coverage scan, and
//! thread GC tasks. The reminder pass is a plain interval and needs none
//! of this.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Next UTC instant at `hour:minute`, strictly after `from`.
pub fn next_daily_utc(hour: u32, minute: u32, from: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = Utc
        .with_ymd_and_hms(from.year(), from.month(), from.day(), hour, minute, 0)
        .single()
        .expect("valid hour/minute");
    if candidate > from {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// Next UTC instant on ISO weekday `day` (0=Monday … 6=Sunday) at
/// `hour:minute`, strictly after `from`.
pub fn next_weekly_utc(day: u32, hour: u32, minute: u32, from: DateTime<Utc>) -> DateTime<Utc> {
    let today_dow = from.weekday().num_days_from_monday() as i64;
    let target_dow = (day as i64).clamp(0, 6);
    let mut days_ahead = target_dow - today_dow;

    let candidate_day = if days_ahead < 0 { from + Duration::days(7 + days_ahead) } else { from + Duration::days(days_ahead) };

    let candidate = Utc
        .with_ymd_and_hms(candidate_day.year(), candidate_day.month(), candidate_day.day(), hour, minute, 0)
        .single()
        .expect("valid hour/minute");

    if candidate > from {
        candidate
    } else {
        days_ahead = if days_ahead <= 0 { 7 } else { 7 - days_ahead };
        candidate + Duration::days(days_ahead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_advances_to_tomorrow_once_the_time_has_passed() {
        let from = Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap();
        let next = next_daily_utc(3, 0, from);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 3, 3, 0, 0).unwrap());
    }

    #[test]
    fn daily_fires_later_today_when_still_ahead() {
        let from = Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).unwrap();
        let next = next_daily_utc(3, 0, from);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap());
    }

    #[test]
    fn weekly_picks_the_next_matching_weekday() {
        // 2026-03-02 is a Monday (day 0).
        let from = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let next = next_weekly_utc(4, 17, 0, from); // Friday
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 6, 17, 0, 0).unwrap());
    }

    #[test]
    fn weekly_wraps_to_following_week_once_past() {
        // 2026-03-06 is a Friday after 17:00.
        let from = Utc.with_ymd_and_hms(2026, 3, 6, 18, 0, 0).unwrap();
        let next = next_weekly_utc(4, 17, 0, from);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 13, 17, 0, 0).unwrap());
    }
}
