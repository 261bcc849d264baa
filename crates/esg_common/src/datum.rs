use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Canonical textual form used when a timestamp is rendered back out.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single scalar value, as coerced from a dump field or read from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int64(v) => Some(*v),
            Datum::Float64(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Datum::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int64(v) => Some(*v as f64),
            Datum::Float64(v) => Some(*v),
            Datum::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert this value into a timestamp, the way timestamp slots are filled.
    ///
    /// Integers are epoch milliseconds; strings accept `YYYY-MM-DD HH:MM:SS[.fff]`,
    /// RFC 3339 and bare dates. Returns `None` for anything else, including `Null`.
    pub fn to_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Datum::Timestamp(ts) => Some(*ts),
            Datum::Int64(ms) => DateTime::from_timestamp_millis(*ms).map(|d| d.naive_utc()),
            Datum::Float64(ms) if ms.is_finite() => {
                DateTime::from_timestamp_millis(*ms as i64).map(|d| d.naive_utc())
            }
            Datum::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// JSON rendering used for overflow columns and outbound payloads.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Datum::Null => JsonValue::Null,
            Datum::Boolean(b) => JsonValue::Bool(*b),
            Datum::Int64(v) => JsonValue::from(*v),
            Datum::Float64(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Datum::Text(s) => JsonValue::String(s.clone()),
            Datum::Timestamp(ts) => JsonValue::String(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Inverse of [`Datum::to_json`] for scalar JSON values; nested values are kept as text.
    pub fn from_json(value: &JsonValue) -> Datum {
        match value {
            JsonValue::Null => Datum::Null,
            JsonValue::Bool(b) => Datum::Boolean(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Datum::Int64(i),
                None => n.as_f64().map(Datum::Float64).unwrap_or(Datum::Null),
            },
            JsonValue::String(s) => Datum::Text(s.clone()),
            other => Datum::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// Parse the timestamp spellings found in SQL dumps.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mysql_datetime() {
        let ts = parse_timestamp("2024-03-01 08:15:30").unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-01 08:15:30");
    }

    #[test]
    fn test_parse_fractional_and_rfc3339() {
        assert!(parse_timestamp("2024-03-01 08:15:30.250").is_some());
        let ts = parse_timestamp("2024-03-01T08:15:30+02:00").unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-01 06:15:30");
    }

    #[test]
    fn test_parse_bare_date_is_midnight() {
        let ts = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-01 00:00:00");
    }

    #[test]
    fn test_integer_timestamp_is_epoch_millis() {
        let ts = Datum::Int64(86_400_000).to_timestamp().unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "1970-01-02 00:00:00");
    }

    #[test]
    fn test_garbage_is_not_a_timestamp() {
        assert!(Datum::Text("yesterday".into()).to_timestamp().is_none());
        assert!(Datum::Null.to_timestamp().is_none());
        assert!(Datum::Boolean(true).to_timestamp().is_none());
    }

    #[test]
    fn test_json_rendering() {
        assert_eq!(Datum::Int64(7).to_json(), serde_json::json!(7));
        assert_eq!(Datum::Float64(f64::NAN).to_json(), JsonValue::Null);
        assert_eq!(Datum::Text("x".into()).to_json(), serde_json::json!("x"));
        assert_eq!(Datum::from_json(&serde_json::json!(2.5)), Datum::Float64(2.5));
        assert_eq!(Datum::from_json(&serde_json::json!(null)), Datum::Null);
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Datum::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(Datum::Float64(3.0).as_i64(), Some(3));
        assert_eq!(Datum::Float64(3.5).as_i64(), None);
        assert_eq!(Datum::Int64(3).as_f64(), Some(3.0));
    }
}
