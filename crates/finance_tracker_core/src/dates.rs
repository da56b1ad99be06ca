//! crates/finance_tracker_core/src/dates.rs
//!
//! Parses receipt dates coming back from the extraction service, which emits
//! whatever format the underlying PDF used.

use chrono::NaiveDate;

/// Formats tried in priority order. Day-first formats come before
/// month-first on purpose: the primary receipt sources use European date
/// order, so an ambiguous "03/04/2024" must read as 3 April. Do not reorder
/// this list without a business-level decision.
pub const SUPPORTED_FORMATS: [&str; 5] = [
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
];

#[derive(Debug, thiserror::Error)]
#[error("unrecognized date format: '{0}'")]
pub struct InvalidFormat(pub String);

/// Tries each supported format in order and returns the first that parses.
pub fn parse_receipt_date(date_str: &str) -> Result<NaiveDate, InvalidFormat> {
    let trimmed = date_str.trim();
    SUPPORTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| InvalidFormat(date_str.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_first_slash_format_wins() {
        let date = parse_receipt_date("17/09/2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 9, 17).unwrap());
    }

    #[test]
    fn ambiguous_date_reads_as_day_month() {
        let date = parse_receipt_date("03/04/2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 4, 3).unwrap());
    }

    #[test]
    fn iso_format_accepted() {
        let date = parse_receipt_date("2024-09-17").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 9, 17).unwrap());
    }

    #[test]
    fn day_first_dash_format_accepted() {
        let date = parse_receipt_date("17-09-2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 9, 17).unwrap());
    }

    #[test]
    fn month_first_only_as_fallback() {
        // Day 25 cannot be a month, so %d-%m-%Y fails and %m-%d-%Y catches it.
        let date = parse_receipt_date("12-25-2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 12, 25).unwrap());
    }

    #[test]
    fn unparseable_string_reports_invalid_format() {
        let err = parse_receipt_date("31/31/2024").unwrap_err();
        assert!(err.to_string().contains("31/31/2024"));
    }

    #[test]
    fn garbage_rejected() {
        assert!(parse_receipt_date("not a date").is_err());
        assert!(parse_receipt_date("").is_err());
    }

    #[test]
    fn surrounding_whitespace_tolerated() {
        assert!(parse_receipt_date(" 17/09/2024 ").is_ok());
    }
}
