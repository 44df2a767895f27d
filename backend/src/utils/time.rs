//! Civil/absolute time conversion.
//!
//! Every conversion is anchored to the configured application timezone, never
//! the host machine's local zone. All other modules work with absolute
//! `DateTime<Utc>` instants; this is the only place civil time touches them.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::AppError;

/// Returns the current time in the configured timezone.
pub fn now_in_timezone(tz: &Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(tz)
}

/// Returns today's date in the configured timezone.
pub fn today_local(tz: &Tz) -> NaiveDate {
    now_in_timezone(tz).date_naive()
}

/// Parses a civil date string (`YYYY-MM-DD`).
pub fn parse_civil_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Format(format!("not a civil date: {}", raw)))
}

/// Parses a civil time string (`HH:MM:SS`, seconds optional).
pub fn parse_civil_time(raw: &str) -> Result<NaiveTime, AppError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| AppError::Format(format!("not a civil time: {}", raw)))
}

/// Converts a civil date and time in `tz` to an absolute instant.
///
/// Civil times that do not map to exactly one instant in the zone (skipped or
/// repeated by an offset transition) are rejected rather than guessed at.
pub fn to_absolute(date: NaiveDate, time: NaiveTime, tz: &Tz) -> Result<DateTime<Utc>, AppError> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(local) => Ok(local.with_timezone(&Utc)),
        LocalResult::Ambiguous(_, _) | LocalResult::None => Err(AppError::Format(format!(
            "{} {} does not name a unique instant in {}",
            date, time, tz
        ))),
    }
}

/// Offsets an absolute instant by a signed number of minutes.
pub fn add_minutes(instant: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    instant + Duration::minutes(minutes)
}

/// Renders an absolute instant as civil text in `tz`, for reminder bodies.
pub fn format_in_zone(instant: DateTime<Utc>, tz: &Tz) -> String {
    instant
        .with_timezone(tz)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Returns the first date on or after `date` that falls on `weekday`
/// (0 = Sunday .. 6 = Saturday).
pub fn align_weekday_on_or_after(date: NaiveDate, weekday: u32) -> NaiveDate {
    let current = date.weekday().num_days_from_sunday();
    let diff = (weekday + 7 - current) % 7;
    date + Duration::days(diff as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Tokyo;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn to_absolute_applies_zone_offset() {
        let time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let instant = to_absolute(date(2024, 1, 15), time, &Tokyo).unwrap();
        // 08:00 JST is 23:00 UTC the previous day.
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap());
    }

    #[test]
    fn to_absolute_is_not_utc_passthrough() {
        let time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let instant = to_absolute(date(2024, 1, 15), time, &Tokyo).unwrap();
        assert_ne!(instant, Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap());
    }

    #[test]
    fn parse_civil_date_accepts_iso_and_rejects_garbage() {
        assert_eq!(parse_civil_date("2024-01-15").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_civil_date(" 2024-01-15 ").unwrap(), date(2024, 1, 15));
        assert!(matches!(
            parse_civil_date("15/01/2024"),
            Err(AppError::Format(_))
        ));
        assert!(matches!(
            parse_civil_date("2024-13-40"),
            Err(AppError::Format(_))
        ));
    }

    #[test]
    fn parse_civil_time_seconds_optional() {
        assert_eq!(
            parse_civil_time("08:00:00").unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        assert_eq!(
            parse_civil_time("08:00").unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        assert!(matches!(parse_civil_time("8 am"), Err(AppError::Format(_))));
        assert!(matches!(parse_civil_time("25:00"), Err(AppError::Format(_))));
    }

    #[test]
    fn add_minutes_goes_both_ways() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(
            add_minutes(instant, 30),
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 0).unwrap()
        );
        assert_eq!(
            add_minutes(instant, -30),
            Utc.with_ymd_and_hms(2024, 1, 15, 11, 30, 0).unwrap()
        );
    }

    #[test]
    fn format_in_zone_renders_civil_text() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap();
        assert_eq!(format_in_zone(instant, &Tokyo), "2024-01-15 08:00");
    }

    #[test]
    fn align_weekday_same_day() {
        // 2024-01-08 is a Monday (weekday 1).
        assert_eq!(align_weekday_on_or_after(date(2024, 1, 8), 1), date(2024, 1, 8));
    }

    #[test]
    fn align_weekday_future_day() {
        assert_eq!(align_weekday_on_or_after(date(2024, 1, 8), 3), date(2024, 1, 10));
    }

    #[test]
    fn align_weekday_wraps_to_next_week() {
        assert_eq!(align_weekday_on_or_after(date(2024, 1, 8), 0), date(2024, 1, 14));
    }
}
