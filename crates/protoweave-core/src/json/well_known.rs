//! String forms of Duration, Timestamp and FieldMask.

use crate::error::{Error, Result};
use crate::schema::naming::{camel_to_snake_case, is_reversible_snake_case, to_lower_camel_case};
use chrono::{DateTime, Utc};

/// Largest absolute Duration, in seconds (10,000 years)
pub const DURATION_MAX_SECONDS: i64 = 315_576_000_000;

/// Seconds of `0001-01-01T00:00:00Z`
pub const TIMESTAMP_MIN_SECONDS: i64 = -62_135_596_800;

/// Seconds of `9999-12-31T23:59:59Z`
pub const TIMESTAMP_MAX_SECONDS: i64 = 253_402_300_799;

const MAX_NANOS: i32 = 999_999_999;

const DURATION: &str = "google.protobuf.Duration";
const TIMESTAMP: &str = "google.protobuf.Timestamp";
const FIELD_MASK: &str = "google.protobuf.FieldMask";

fn check_duration(seconds: i64, nanos: i32) -> std::result::Result<(), String> {
    if !(-DURATION_MAX_SECONDS..=DURATION_MAX_SECONDS).contains(&seconds) {
        return Err(format!("seconds {} out of range", seconds));
    }
    if !(-MAX_NANOS..=MAX_NANOS).contains(&nanos) {
        return Err(format!("nanos {} out of range", nanos));
    }
    if (seconds > 0 && nanos < 0) || (seconds < 0 && nanos > 0) {
        return Err(format!("seconds {} and nanos {} differ in sign", seconds, nanos));
    }
    Ok(())
}

/// Formats nanoseconds as 0, 3, 6 or 9 fractional digits
fn fraction(nanos: u32) -> String {
    if nanos == 0 {
        String::new()
    } else if nanos % 1_000_000 == 0 {
        format!(".{:03}", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!(".{:06}", nanos / 1_000)
    } else {
        format!(".{:09}", nanos)
    }
}

/// Parses up to nine fractional digits into nanoseconds
fn parse_fraction(digits: &str) -> Option<u32> {
    if digits.is_empty() || digits.len() > 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = digits.parse().ok()?;
    Some(value * 10u32.pow(9 - digits.len() as u32))
}

/// Formats a Duration as `[-]S[.fff]s`
pub fn format_duration(seconds: i64, nanos: i32) -> Result<String> {
    check_duration(seconds, nanos).map_err(|details| Error::well_known_encode(DURATION, details))?;
    let sign = if seconds < 0 || nanos < 0 { "-" } else { "" };
    Ok(format!(
        "{}{}{}s",
        sign,
        seconds.unsigned_abs(),
        fraction(nanos.unsigned_abs())
    ))
}

/// Parses a Duration string into seconds and nanos
pub fn parse_duration(text: &str) -> Result<(i64, i32)> {
    let invalid = || Error::well_known_decode(DURATION, format!("'{}' is not a duration", text));

    let body = text.strip_suffix('s').ok_or_else(invalid)?;
    let (negative, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let (whole, nanos) = match body.split_once('.') {
        Some((whole, digits)) => (whole, parse_fraction(digits).ok_or_else(invalid)?),
        None => (body, 0),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let seconds: i64 = whole
        .parse()
        .map_err(|_| Error::well_known_decode(DURATION, format!("seconds out of range in '{}'", text)))?;

    let (seconds, nanos) = if negative {
        (-seconds, -(nanos as i32))
    } else {
        (seconds, nanos as i32)
    };
    check_duration(seconds, nanos).map_err(|details| Error::well_known_decode(DURATION, details))?;
    Ok((seconds, nanos))
}

/// Formats a Timestamp as RFC 3339 in UTC with a `Z` suffix
pub fn format_timestamp(seconds: i64, nanos: i32) -> Result<String> {
    if !(TIMESTAMP_MIN_SECONDS..=TIMESTAMP_MAX_SECONDS).contains(&seconds) {
        return Err(Error::well_known_encode(
            TIMESTAMP,
            format!("seconds {} out of range", seconds),
        ));
    }
    if !(0..=MAX_NANOS).contains(&nanos) {
        return Err(Error::well_known_encode(
            TIMESTAMP,
            format!("nanos {} out of range", nanos),
        ));
    }
    let time = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| {
        Error::well_known_encode(TIMESTAMP, format!("seconds {} out of range", seconds))
    })?;
    Ok(format!(
        "{}{}Z",
        time.format("%Y-%m-%dT%H:%M:%S"),
        fraction(nanos as u32)
    ))
}

/// Parses an RFC 3339 Timestamp into seconds and nanos
pub fn parse_timestamp(text: &str) -> Result<(i64, i32)> {
    let time = DateTime::parse_from_rfc3339(text)
        .map_err(|e| Error::well_known_decode(TIMESTAMP, format!("'{}': {}", text, e)))?;
    let seconds = time.timestamp();
    let nanos = time.timestamp_subsec_nanos();
    if !(TIMESTAMP_MIN_SECONDS..=TIMESTAMP_MAX_SECONDS).contains(&seconds) {
        return Err(Error::well_known_decode(
            TIMESTAMP,
            format!("'{}' is outside years 1 to 9999", text),
        ));
    }
    if nanos > MAX_NANOS as u32 {
        return Err(Error::well_known_decode(
            TIMESTAMP,
            format!("'{}' is a leap second", text),
        ));
    }
    Ok((seconds, nanos as i32))
}

/// Joins FieldMask paths as comma-separated lowerCamel paths
pub fn format_field_mask<'a, I>(paths: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for path in paths {
        let mut segments = Vec::new();
        for segment in path.split('.') {
            if !is_reversible_snake_case(segment) {
                return Err(Error::well_known_encode(
                    FIELD_MASK,
                    format!("path '{}' has no JSON spelling", path),
                ));
            }
            segments.push(to_lower_camel_case(segment));
        }
        out.push(segments.join("."));
    }
    Ok(out.join(","))
}

/// Splits a FieldMask string into snake_case paths
pub fn parse_field_mask(text: &str) -> Result<Vec<String>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|path| {
            path.split('.')
                .map(|segment| {
                    camel_to_snake_case(segment).ok_or_else(|| {
                        Error::well_known_decode(
                            FIELD_MASK,
                            format!("path '{}' is not lowerCamelCase", path),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(|segments| segments.join("."))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_duration_format() {
        assert_eq!(format_duration(1, 0).unwrap(), "1s");
        assert_eq!(format_duration(1, 500_000_000).unwrap(), "1.500s");
        assert_eq!(format_duration(1, 123_456_000).unwrap(), "1.123456s");
        assert_eq!(format_duration(1, 123_456_789).unwrap(), "1.123456789s");
        assert_eq!(format_duration(0, -500_000_000).unwrap(), "-0.500s");
        assert_eq!(format_duration(-2, -1).unwrap(), "-2.000000001s");
        assert_eq!(format_duration(0, 0).unwrap(), "0s");
    }

    #[test]
    fn test_duration_format_rejects_invalid() {
        assert!(format_duration(DURATION_MAX_SECONDS + 1, 0).unwrap_err().is_encode());
        assert!(format_duration(1, -1).is_err());
        assert!(format_duration(0, 1_000_000_000).is_err());
        assert!(format_duration(-DURATION_MAX_SECONDS, -MAX_NANOS).is_ok());
    }

    #[test]
    fn test_duration_parse() {
        assert_eq!(parse_duration("1.123456789s").unwrap(), (1, 123_456_789));
        assert_eq!(parse_duration("-0.5s").unwrap(), (0, -500_000_000));
        assert_eq!(parse_duration("315576000000s").unwrap(), (315_576_000_000, 0));
        assert!(parse_duration("315576000001s").unwrap_err().is_decode());
        for bad in ["1", "s", "-s", "1.s", "1.0000000001s", "+1s", " 1s", "1,5s", "a.1s"] {
            assert!(parse_duration(bad).is_err(), "{} should fail", bad);
        }
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(0, 0).unwrap(), "1970-01-01T00:00:00Z");
        assert_eq!(
            format_timestamp(1_000_000_000, 10_000_000).unwrap(),
            "2001-09-09T01:46:40.010Z"
        );
        assert_eq!(
            format_timestamp(TIMESTAMP_MIN_SECONDS, 0).unwrap(),
            "0001-01-01T00:00:00Z"
        );
        assert_eq!(
            format_timestamp(TIMESTAMP_MAX_SECONDS, MAX_NANOS).unwrap(),
            "9999-12-31T23:59:59.999999999Z"
        );
        assert!(format_timestamp(TIMESTAMP_MAX_SECONDS + 1, 0).is_err());
        assert!(format_timestamp(0, -1).is_err());
    }

    #[test]
    fn test_timestamp_parse() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:00Z").unwrap(), (0, 0));
        assert_eq!(
            parse_timestamp("1970-01-01T01:00:00.5+01:00").unwrap(),
            (0, 500_000_000)
        );
        assert_eq!(
            parse_timestamp("0001-01-01T00:00:00Z").unwrap(),
            (TIMESTAMP_MIN_SECONDS, 0)
        );
        assert!(parse_timestamp("0001-01-01T00:00:00+01:00").is_err());
        assert!(parse_timestamp("not a time").is_err());
    }

    #[test]
    fn test_field_mask() {
        assert_eq!(
            format_field_mask(["foo_bar.baz", "qux"]).unwrap(),
            "fooBar.baz,qux"
        );
        assert!(format_field_mask(["fooBar"]).is_err());
        assert!(format_field_mask(["foo__bar"]).is_err());
        assert_eq!(
            parse_field_mask("fooBar.baz,qux").unwrap(),
            vec!["foo_bar.baz".to_string(), "qux".to_string()]
        );
        assert!(parse_field_mask("").unwrap().is_empty());
        assert!(parse_field_mask("foo_bar").is_err());
    }
}
