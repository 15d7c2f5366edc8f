//! Date normalisation for form exports.
//!
//! Form exports mix US-style and ISO dates, sometimes with a time part. All of
//! them collapse to a calendar date here and are written back out as
//! `MM/DD/YYYY`.

use chrono::{NaiveDate, NaiveDateTime};

/// Format used for persistence and spreadsheet export.
pub const OUTPUT_FORMAT: &str = "%m/%d/%Y";

// `%y` goes first: `%Y` would happily read "24" as the year 0024.
const DATE_FORMATS: &[&str] = &["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// The end date given to rows whose handover is still open.
pub fn open_ended() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

pub fn is_open_ended(date: NaiveDate) -> bool {
    date == open_ended()
}

/// Parses a free-text date cell. Returns `None` for blank or unparsable input.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Some(datetime.date());
        }
    }

    None
}

pub fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(OUTPUT_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_common_export_forms() {
        assert_eq!(parse_date("7/22/2024"), Some(ymd(2024, 7, 22)));
        assert_eq!(parse_date("07/22/24"), Some(ymd(2024, 7, 22)));
        assert_eq!(parse_date("2024-07-22"), Some(ymd(2024, 7, 22)));
        assert_eq!(parse_date(" 2024-07-22 17:57:50 "), Some(ymd(2024, 7, 22)));
        assert_eq!(parse_date("7/22/2024 5:57 PM"), Some(ymd(2024, 7, 22)));
    }

    #[test]
    fn unparsable_dates_become_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("next tuesday"), None);
        assert_eq!(parse_date("13/45/2024"), None);
    }

    #[test]
    fn open_ended_sentinel_formats_as_year_9999() {
        assert_eq!(format_date(Some(open_ended())).as_deref(), Some("12/31/9999"));
        assert_eq!(format_date(Some(ymd(2024, 1, 1))).as_deref(), Some("01/01/2024"));
        assert_eq!(format_date(None), None);
    }
}
