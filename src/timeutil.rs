use chrono::{Datelike, NaiveDate};

pub const DAY_MINUTES: i64 = 24 * 60;

// Indexed 0 = Sunday .. 6 = Saturday, matching the calendar's day-of-week.
pub const ORDERED_DAYS: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Parses "HH:MM" into minutes since midnight. `None` stands in for any
/// malformed value and must never close a slot on its own.
pub fn to_minutes(value: &str) -> Option<i64> {
    let (hours, minutes) = value.trim().split_once(':')?;
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if !(0..=24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    // "24:00" is a valid closing time; anything past it is not.
    if hours == 24 && minutes != 0 {
        return None;
    }
    Some(hours * 60 + minutes)
}

pub fn to_clock(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn weekday_key(date: NaiveDate) -> &'static str {
    ORDERED_DAYS[date.weekday().num_days_from_sunday() as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wall_clock() {
        assert_eq!(to_minutes("09:00"), Some(540));
        assert_eq!(to_minutes("00:00"), Some(0));
        assert_eq!(to_minutes("23:59"), Some(1439));
        assert_eq!(to_minutes("24:00"), Some(1440));
        assert_eq!(to_minutes(" 10:30 "), Some(630));
    }

    #[test]
    fn malformed_clock_is_none() {
        assert_eq!(to_minutes(""), None);
        assert_eq!(to_minutes("930"), None);
        assert_eq!(to_minutes("ab:cd"), None);
        assert_eq!(to_minutes("25:00"), None);
        assert_eq!(to_minutes("24:30"), None);
        assert_eq!(to_minutes("10:75"), None);
    }

    #[test]
    fn formats_zero_padded() {
        assert_eq!(to_clock(540), "09:00");
        assert_eq!(to_clock(0), "00:00");
        assert_eq!(to_clock(605), "10:05");
        assert_eq!(to_clock(1439), "23:59");
    }

    #[test]
    fn clock_round_trips() {
        for raw in ["00:00", "09:30", "12:45", "23:59"] {
            let minutes = to_minutes(raw).unwrap();
            assert_eq!(to_clock(minutes), raw);
        }
    }

    #[test]
    fn weekday_is_calendar_indexed() {
        // 2025-01-05 was a Sunday.
        assert_eq!(weekday_key(NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()), "sunday");
        assert_eq!(weekday_key(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()), "monday");
        // Leap day 2024 fell on a Thursday.
        assert_eq!(weekday_key(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()), "thursday");
    }

    #[test]
    fn parses_iso_dates_only() {
        assert!(parse_date("2025-03-02").is_some());
        assert!(parse_date("03/02/2025").is_none());
        assert!(parse_date("2025-13-01").is_none());
        assert!(parse_date("").is_none());
    }
}
