use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

const SECONDS_PER_DAY: i64 = 86_400;

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next.map_or(NaiveDate::MAX, |d| d - Duration::days(1))
}

/// Get the quarter (1-4) for a given date.
pub fn quarter_of(d: NaiveDate) -> u8 {
    ((d.month() - 1) / 3 + 1) as u8
}

/// Whole days elapsed from `from` to `to`, floored.
///
/// A visit 36 hours ago counts as 1 day; a timestamp in the future yields a
/// negative count rather than rounding toward zero.
pub fn whole_days_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Round to a fixed number of decimal places, half away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Monetary outputs are reported to the cent.
pub fn round_money(value: f64) -> f64 {
    round_to(value, 2)
}

/// Percentages and day averages are reported to one decimal.
pub fn round_tenth(value: f64) -> f64 {
    round_to(value, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 1),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
        assert_eq!(
            last_day_of_month(2025, 2),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        ); // Leap year
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_quarter_of() {
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()), 1);
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()), 2);
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2025, 9, 30).unwrap()), 3);
        assert_eq!(
            quarter_of(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
            4
        );
    }

    #[test]
    fn test_whole_days_floors_partial_days() {
        assert_eq!(whole_days_between(at(2025, 3, 1, 12), at(2025, 3, 2, 11)), 0);
        assert_eq!(whole_days_between(at(2025, 3, 1, 12), at(2025, 3, 2, 12)), 1);
        assert_eq!(whole_days_between(at(2025, 3, 1, 0), at(2025, 3, 31, 23)), 30);
    }

    #[test]
    fn test_whole_days_future_is_negative() {
        assert_eq!(whole_days_between(at(2025, 3, 2, 12), at(2025, 3, 2, 0)), -1);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_money(46.004), 46.0);
        assert_eq!(round_money(12.345_6), 12.35);
        assert_eq!(round_tenth(66.666_7), 66.7);
        assert_eq!(round_tenth(0.0), 0.0);
    }
}
