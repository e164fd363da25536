//! Calendar helpers.
//!
//! Dates are stored as `YYYY-MM-DD` strings and compared lexically. Month
//! queries use the inclusive range `[YYYY-MM-01, YYYY-MM-31]`: the upper
//! bound is a literal `31` for every month, which works for short months
//! only because the comparison is a string comparison.

use chrono::{Local, Months, NaiveDate};

/// Format of event dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format of month identifiers.
pub const MONTH_FORMAT: &str = "%Y-%m";

/// Format of the `lastSyncDate` setting.
pub const SYNC_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Range used to approximate "all time" for event listings.
pub const ALL_TIME_RANGE: (&str, &str) = ("2000-01", "2100-31");

/// Range used by full exports.
pub const EXPORT_RANGE: (&str, &str) = ("2000-01-01", "2100-12-31");

/// Returns `true` if `date` is a real calendar date in `YYYY-MM-DD` form.
pub fn is_valid_date(date: &str) -> bool {
    NaiveDate::parse_from_str(date, DATE_FORMAT).is_ok()
}

/// Today's local date, `YYYY-MM-DD`.
pub fn today() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// Today's local date.
pub fn local_date() -> NaiveDate {
    Local::now().date_naive()
}

/// The current local month, `YYYY-MM`.
pub fn current_month() -> String {
    Local::now().format(MONTH_FORMAT).to_string()
}

/// Current local time formatted for `lastSyncDate`.
pub fn sync_timestamp() -> String {
    Local::now().format(SYNC_DATE_FORMAT).to_string()
}

/// Inclusive lexical date range covering `month` (`YYYY-MM`).
pub fn month_range(month: &str) -> (String, String) {
    (format!("{month}-01"), format!("{month}-31"))
}

/// Returns the month after the one containing `today`, `YYYY-MM`.
pub fn next_month(today: NaiveDate) -> String {
    today
        .checked_add_months(Months::new(1))
        .unwrap_or(today)
        .format(MONTH_FORMAT)
        .to_string()
}

/// Returns `true` if `month` lies after the month following `today`.
///
/// Month navigation allows looking one month ahead and no further.
pub fn is_beyond_next_month(month: &str, today: NaiveDate) -> bool {
    month > next_month(today).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_calendar_dates() {
        assert!(is_valid_date("2024-02-29"));
        assert!(!is_valid_date("2023-02-29"));
        assert!(!is_valid_date("yesterday"));
        assert!(!is_valid_date(""));
    }

    #[test]
    fn month_range_uses_literal_31() {
        let (from, to) = month_range("2024-02");
        assert_eq!(from, "2024-02-01");
        assert_eq!(to, "2024-02-31");
        assert!("2024-02-29" <= to.as_str());
        assert!("2024-03-01" > to.as_str());
    }

    #[test]
    fn next_month_rolls_over_year() {
        let dec = NaiveDate::from_ymd_opt(2024, 12, 15).unwrap();
        assert_eq!(next_month(dec), "2025-01");
    }

    #[test]
    fn navigation_limit_is_next_month() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert!(!is_beyond_next_month("2024-04", today));
        assert!(!is_beyond_next_month("2023-01", today));
        assert!(is_beyond_next_month("2024-05", today));
    }

    #[test]
    fn today_is_valid() {
        assert!(is_valid_date(&today()));
    }
}
