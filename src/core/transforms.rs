//! Scalar transforms shared by the loaders, processors and writers.
//!
//! Depths are millimetres (position minus calibration zero). Site identity
//! uses depths rounded to three decimals, represented as whole micrometres so
//! keys can be hashed and ordered exactly.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::loaders::Hemisphere;

/// Decimal places used for site identity and file names.
pub const SITE_DECIMALS: u32 = 3;

/// Timestamp formats accepted for the block table datetime column.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Formats with a UTC offset, e.g. `2020-02-01 10:30:00+00:00`.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Depth below the calibration zero.
#[inline]
pub fn depth(position: f64, zero: f64) -> f64 {
    position - zero
}

/// Round half away from zero to `decimals` places, normalising `-0.0`.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Site key for a depth: the depth rounded to micrometres.
///
/// Floating noise below half a micrometre around a three-decimal depth maps
/// to the same key.
#[inline]
pub fn depth_key(depth: f64) -> i64 {
    (depth * 1000.0).round() as i64
}

/// Inverse of [`depth_key`].
#[inline]
pub fn key_depth(key: i64) -> f64 {
    key as f64 / 1000.0
}

/// Fixed-precision rendering used in file names and tables.
pub fn format_depth(depth: f64) -> String {
    format!("{:.3}", round_to(depth, SITE_DECIMALS))
}

/// Midnight of a calendar date, `None` for impossible dates.
pub fn date_from_ymd(year: i32, month: u32, day: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
}

/// Parse an ISO-like session timestamp. A bare date resolves to midnight.
///
/// Timestamps carrying a UTC offset keep their wall-clock time; the offset is
/// discarded.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.naive_local());
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Some(ts.naive_local());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Table rendering of a timestamp.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Human-readable `ctime` form, e.g. `Wed Jan  1 00:00:00 2020`.
pub fn format_ctime(ts: &NaiveDateTime) -> String {
    ts.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Extended table column holding the depth of one channel, e.g. `L5`.
pub fn depth_column_name(hemisphere: Hemisphere, channel: usize) -> String {
    format!("{}{}", hemisphere.letter(), channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_and_rounding() {
        assert!((depth(3.25, 1.0) - 2.25).abs() < 1e-12);
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(-0.0001, 3), 0.0);
        assert_eq!(format_depth(-0.0001), "0.000");
        assert_eq!(format_depth(2.0), "2.000");
    }

    #[test]
    fn test_close_depths_share_a_key() {
        let base = 2.5;
        assert_eq!(depth_key(base), depth_key(base + 0.0004));
        assert_eq!(depth_key(base), depth_key(base - 0.0004));
        assert_eq!(depth_key(0.1 + 0.2), depth_key(0.3));
        assert_ne!(depth_key(base), depth_key(base + 0.001));
        assert_eq!(key_depth(depth_key(1.234)), 1.234);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = date_from_ymd(2020, 2, 1)
            .unwrap()
            .date()
            .and_hms_opt(10, 30, 5)
            .unwrap();
        assert_eq!(parse_timestamp("2020-02-01 10:30:05"), Some(expected));
        assert_eq!(parse_timestamp("2020-02-01T10:30:05"), Some(expected));
        assert_eq!(parse_timestamp(" 2020-02-01 10:30:05.000 "), Some(expected));
        assert_eq!(parse_timestamp("2020-02-01"), date_from_ymd(2020, 2, 1));
        assert_eq!(parse_timestamp("01/02/2020"), None);
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let expected = date_from_ymd(2020, 2, 1)
            .unwrap()
            .date()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2020-02-01 10:30:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-02-01T10:30:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-02-01T10:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2020-02-01 10:30:00.000-0500"), Some(expected));
        assert_eq!(date_from_ymd(2020, 2, 30), None);
    }

    #[test]
    fn test_ctime_and_column_names() {
        let ts = date_from_ymd(2020, 1, 1).unwrap();
        assert_eq!(format_ctime(&ts), "Wed Jan  1 00:00:00 2020");
        assert_eq!(format_timestamp(&ts), "2020-01-01 00:00:00");
        assert_eq!(depth_column_name(Hemisphere::Left, 5), "L5");
        assert_eq!(depth_column_name(Hemisphere::Right, 31), "R31");
    }
}
