//! Scalar cell values and their ordering

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::schema::LogicalType;

/// Accepted timestamp layouts, tried in order
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single cell of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// Errors raised while decoding values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("cannot decode {found} as {expected}")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid {expected} literal '{text}'")]
    InvalidLiteral { expected: String, text: String },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Compare two values in the incremental-column domain.
    ///
    /// Integers and floats compare numerically, a date compares as midnight
    /// against a timestamp. `Null` and values of unrelated kinds yield `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Timestamp(b)) => a.and_hms_opt(0, 0, 0).map(|a| a.cmp(b)),
            (Self::Timestamp(a), Self::Date(b)) => b.and_hms_opt(0, 0, 0).map(|b| a.cmp(&b)),
            _ => None,
        }
    }

    /// Decode a JSON cell according to the column's logical type
    pub fn from_json(json: &serde_json::Value, logical_type: &LogicalType) -> Result<Self, ValueError> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Ok(Self::Null);
        }

        match (logical_type, json) {
            (_, Json::String(text)) => Self::parse(text, logical_type),

            (LogicalType::Bool, Json::Bool(b)) => Ok(Self::Bool(*b)),

            (LogicalType::Int, Json::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral_f64))
                .map(Self::Int)
                .ok_or_else(|| ValueError::InvalidLiteral {
                    expected: logical_type.to_string(),
                    text: n.to_string(),
                }),

            (LogicalType::Float | LogicalType::Decimal { .. }, Json::Number(n)) => n
                .as_f64()
                .map(Self::Float)
                .ok_or_else(|| ValueError::InvalidLiteral {
                    expected: logical_type.to_string(),
                    text: n.to_string(),
                }),

            (LogicalType::Json, other) => Ok(Self::Text(other.to_string())),

            (LogicalType::Unknown, Json::Bool(b)) => Ok(Self::Bool(*b)),
            (LogicalType::Unknown, Json::Number(n)) => Ok(match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            (LogicalType::Unknown, other) => Ok(Self::Text(other.to_string())),

            (expected, found) => Err(ValueError::TypeMismatch {
                expected: expected.to_string(),
                found: json_kind(found).to_string(),
            }),
        }
    }

    /// Parse the textual rendering of a value (as produced by a warehouse
    /// `::text` / `TO_VARCHAR` cast or a JSON string cell)
    pub fn parse(text: &str, logical_type: &LogicalType) -> Result<Self, ValueError> {
        let invalid = || ValueError::InvalidLiteral {
            expected: logical_type.to_string(),
            text: text.to_string(),
        };
        let trimmed = text.trim();

        match logical_type {
            LogicalType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Ok(Self::Bool(true)),
                "false" | "f" | "0" | "no" => Ok(Self::Bool(false)),
                _ => Err(invalid()),
            },
            LogicalType::Int => parse_integer(trimmed).map(Self::Int).ok_or_else(invalid),
            LogicalType::Float | LogicalType::Decimal { .. } => {
                trimmed.parse().map(Self::Float).map_err(|_| invalid())
            }
            LogicalType::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .map(Self::Date)
                .map_err(|_| invalid()),
            LogicalType::Timestamp | LogicalType::TimestampTz => parse_timestamp(trimmed).map(Self::Timestamp).ok_or_else(invalid),
            LogicalType::String | LogicalType::Json | LogicalType::Unknown => {
                Ok(Self::Text(text.to_string()))
            }
        }
    }

    /// Render as a JSON cell; dates and timestamps become ISO-8601 strings
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Text(s) => Json::String(s.clone()),
            Self::Date(d) => Json::String(d.format(DATE_FORMAT).to_string()),
            Self::Timestamp(ts) => Json::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Parse a zone-less timestamp, accepting RFC 3339 input (converted to UTC)
/// and bare dates (midnight)
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse an integer, allowing an all-zero fraction since NUMBER(p,0) may
/// still render a trailing ".0". Values outside `i64` are rejected.
fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(i) = text.parse() {
        return Some(i);
    }
    let (whole, fraction) = text.split_once('.')?;
    if fraction.bytes().all(|b| b == b'0') {
        whole.parse().ok()
    } else {
        None
    }
}

/// Integral float to `i64`; `None` when fractional or out of range
fn integral_f64(f: f64) -> Option<i64> {
    // 2^63, exactly representable
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
