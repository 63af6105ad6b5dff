//! Text-to-value parsers shared by declarative fields
//!
//! Listing sites print numbers with thousands separators and currency
//! prefixes ("R$ 1.250.000", "85,5 m²", "3 quartos"); these helpers pull the
//! first numeric token out of such text.

use crate::extract::{FieldError, FieldResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Fallback formats tried for timestamps when no explicit format is set
const TIMESTAMP_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

/// Collapses runs of whitespace into single spaces and trims the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses the first integer in `text`, ignoring thousands separators
///
/// A decimal part is truncated, so "85,9 m²" yields 85.
pub fn parse_integer(text: &str) -> FieldResult<i64> {
    let value = parse_decimal(text)?;
    if value.abs() > i64::MAX as f64 {
        return Err(FieldError::Value(format!("'{text}' is out of range")));
    }
    Ok(value.trunc() as i64)
}

/// Parses the first decimal number in `text`
///
/// Separator rules:
/// - both `.` and `,` present: the last one is the decimal separator
/// - only `.`: groups of exactly three digits are thousands ("1.250.000")
/// - only `,`: several three-digit groups are thousands ("1,250,000"),
///   otherwise it is the decimal separator ("85,50")
pub fn parse_decimal(text: &str) -> FieldResult<f64> {
    let token = numeric_token(text)
        .ok_or_else(|| FieldError::Value(format!("no number in '{}'", text.trim())))?;

    let has_dot = token.contains('.');
    let has_comma = token.contains(',');

    let canonical = match (has_dot, has_comma) {
        (true, true) => {
            let last_dot = token.rfind('.').unwrap_or(0);
            let last_comma = token.rfind(',').unwrap_or(0);
            if last_comma > last_dot {
                token.replace('.', "").replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        (true, false) => {
            if is_thousands_grouping(token, '.') {
                token.replace('.', "")
            } else {
                token.to_string()
            }
        }
        (false, true) => {
            let groups = token.split(',').count();
            if groups > 2 && is_thousands_grouping(token, ',') {
                token.replace(',', "")
            } else {
                token.replace(',', ".")
            }
        }
        (false, false) => token.to_string(),
    };

    canonical
        .parse::<f64>()
        .map_err(|e| FieldError::Value(format!("'{token}' is not a number: {e}")))
}

/// Parses yes/no style text in Portuguese or English
pub fn parse_flag(text: &str) -> FieldResult<bool> {
    let normalized = normalize_whitespace(text).to_lowercase();
    match normalized.as_str() {
        "sim" | "yes" | "true" | "1" | "possui" | "com" => Ok(true),
        "não" | "nao" | "no" | "false" | "0" | "sem" | "não possui" => Ok(false),
        _ => Err(FieldError::Value(format!("'{normalized}' is not a yes/no value"))),
    }
}

/// Parses a timestamp, interpreting naive values as UTC
///
/// With `format` set, only that chrono format (date-time or date-only) is
/// tried; otherwise RFC 3339 and a few common listing formats are attempted.
pub fn parse_timestamp(text: &str, format: Option<&str>) -> FieldResult<DateTime<Utc>> {
    let text = normalize_whitespace(text);

    if let Some(format) = format {
        return parse_with(&text, &[format], &[format])
            .ok_or_else(|| FieldError::Value(format!("'{text}' does not match '{format}'")));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(&text) {
        return Ok(ts.with_timezone(&Utc));
    }

    parse_with(&text, TIMESTAMP_FORMATS, DATE_FORMATS)
        .ok_or_else(|| FieldError::Value(format!("'{text}' is not a recognised timestamp")))
}

fn parse_with(text: &str, datetime_formats: &[&str], date_formats: &[&str]) -> Option<DateTime<Utc>> {
    for format in datetime_formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }
    }
    None
}

/// Returns the first run of digits, including separators between digits
fn numeric_token(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_digit() {
            end += 1;
        } else if (b == b'.' || b == b',') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
            end += 1;
        } else {
            break;
        }
    }
    Some(&text[start..end])
}

fn is_thousands_grouping(token: &str, separator: char) -> bool {
    let mut groups = token.split(separator);
    let head_ok = groups
        .next()
        .is_some_and(|head| !head.is_empty() && head.len() <= 3);
    head_ok && groups.all(|g| g.len() == 3)
}
