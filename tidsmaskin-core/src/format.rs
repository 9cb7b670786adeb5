//! Timestamp format shared by configuration values and persisted state:
//! `yyyyMMdd'T'HHmmss` in the host's local time zone.

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::error::ClockError;

pub const DATE_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Parses a timestamp into milliseconds since the Unix epoch.
pub fn parse_date(input: &str) -> Result<i64, ClockError> {
    let trimmed = input.trim();
    let naive = NaiveDateTime::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| ClockError::DateFormat(trimmed.to_string()))?;
    // Local times skipped by a DST transition do not exist; repeated ones resolve to the earlier instant.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.timestamp_millis())
        .ok_or_else(|| ClockError::DateFormat(trimmed.to_string()))
}

/// Formats milliseconds since the Unix epoch, truncating to whole seconds.
pub fn format_date(millis: i64) -> Result<String, ClockError> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|at| at.format(DATE_FORMAT).to_string())
        .ok_or_else(|| ClockError::DateFormat(millis.to_string()))
}

/// Formats milliseconds since the Unix epoch, rounding up to the next whole second.
pub fn format_date_ceil(millis: i64) -> Result<String, ClockError> {
    let rounded = millis
        .checked_add(999)
        .map(|m| m.div_euclid(1000) * 1000)
        .ok_or_else(|| ClockError::DateFormat(millis.to_string()))?;
    format_date(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_then_format_is_stable() {
        let millis = parse_date("20240229T235959").unwrap();
        assert_eq!(millis % 1000, 0);
        assert_eq!(format_date(millis).unwrap(), "20240229T235959");
        assert_eq!(format_date(millis + 999).unwrap(), "20240229T235959");
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        assert_eq!(
            parse_date(" 20200101T120000\n").unwrap(),
            parse_date("20200101T120000").unwrap()
        );
    }

    #[test]
    fn rejects_malformed_dates() {
        for bad in ["", "2020-01-01T12:00:00", "20201301T000000", "20200101"] {
            assert!(matches!(parse_date(bad), Err(ClockError::DateFormat(_))), "{bad}");
        }
    }

    #[test]
    fn ceil_rounds_partial_seconds_up() {
        let base = parse_date("20230615T080000").unwrap();
        assert_eq!(format_date_ceil(base).unwrap(), "20230615T080000");
        assert_eq!(format_date_ceil(base + 1).unwrap(), "20230615T080001");
        assert_eq!(format_date_ceil(base + 1000).unwrap(), "20230615T080001");
    }
}
