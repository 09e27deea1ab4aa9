//! Tenant wall-clock ⇄ UTC conversion.
//!
//! Uses real IANA timezone data via chrono-tz. The predecessor system carried
//! a fixed-offset table with no DST awareness; that behavior was a migration
//! baseline, not a contract, so events scheduled across DST boundaries convert
//! correctly here.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Convert a tenant-local date and wall-clock time to UTC.
///
/// Ambiguous local times (fall-back hour) resolve to the earlier instant;
/// non-existent local times (spring-forward gap) shift forward one hour.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + chrono::Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                LocalResult::None => Utc.from_utc_datetime(&naive),
            }
        }
    }
}

/// Split a UTC instant into the tenant-local date and "HH:MM" wall-clock time.
pub fn utc_to_local(instant: DateTime<Utc>, tz: Tz) -> (NaiveDate, String) {
    let local = instant.with_timezone(&tz);
    (local.date_naive(), local.format("%H:%M").to_string())
}

/// Parse a normalized "HH:MM" value.
pub fn parse_hhmm(time: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(time, "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::{New_York, Phoenix};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        parse_hhmm(s).unwrap()
    }

    #[test]
    fn winter_eastern_time_is_utc_minus_five() {
        let utc = local_to_utc(d("2025-01-10"), t("14:00"), New_York);
        assert_eq!(utc.to_rfc3339(), "2025-01-10T19:00:00+00:00");
    }

    #[test]
    fn summer_eastern_time_is_utc_minus_four() {
        let utc = local_to_utc(d("2025-07-10"), t("14:00"), New_York);
        assert_eq!(utc.to_rfc3339(), "2025-07-10T18:00:00+00:00");
    }

    #[test]
    fn phoenix_has_no_dst() {
        let winter = local_to_utc(d("2025-01-10"), t("08:00"), Phoenix);
        let summer = local_to_utc(d("2025-07-10"), t("08:00"), Phoenix);
        assert_eq!(winter.to_rfc3339(), "2025-01-10T15:00:00+00:00");
        assert_eq!(summer.to_rfc3339(), "2025-07-10T15:00:00+00:00");
    }

    #[test]
    fn spring_forward_gap_shifts_ahead() {
        // 02:30 does not exist on 2025-03-09 in New York.
        let utc = local_to_utc(d("2025-03-09"), t("02:30"), New_York);
        assert_eq!(utc.to_rfc3339(), "2025-03-09T07:30:00+00:00");
    }

    #[test]
    fn roundtrip_through_local() {
        let utc = local_to_utc(d("2025-01-10"), t("14:00"), New_York);
        let (date, time) = utc_to_local(utc, New_York);
        assert_eq!(date, d("2025-01-10"));
        assert_eq!(time, "14:00");
    }
}
