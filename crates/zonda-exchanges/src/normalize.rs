//! Field extraction helpers for raw exchange payloads.
//!
//! Adapters read every monetary value through [`decimal_field`] /
//! [`opt_decimal_field`], which parse the JSON literal (string or number)
//! directly into a [`Decimal`] — values never pass through an `f64`.
//! Failures are per-item: the adapter logs and skips the item, and the page
//! keeps going.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use zonda_types::EventTime;

/// A raw item field that cannot be normalized. Affects only that item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// A required field is absent or null.
    #[error("missing field `{0}`")]
    Missing(&'static str),

    /// A field holds a different JSON type than expected.
    #[error("field `{field}` is not a {expected}")]
    Kind {
        /// Field name in the raw payload.
        field: &'static str,
        /// Expected JSON type.
        expected: &'static str,
    },

    /// A field cannot be parsed as a decimal number.
    #[error("field `{field}` is not a decimal: `{value}`")]
    Decimal {
        /// Field name in the raw payload.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// A field cannot be parsed as a UTC timestamp.
    #[error("field `{field}` is not a recognized timestamp: `{value}`")]
    Timestamp {
        /// Field name in the raw payload.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

fn field<'a>(item: &'a Value, name: &'static str) -> Result<&'a Value, NormalizeError> {
    item.get(name)
        .filter(|value| !value.is_null())
        .ok_or(NormalizeError::Missing(name))
}

/// Required string field.
pub fn str_field<'a>(item: &'a Value, name: &'static str) -> Result<&'a str, NormalizeError> {
    field(item, name)?.as_str().ok_or(NormalizeError::Kind {
        field: name,
        expected: "string",
    })
}

/// Optional string field; absent, null, and empty values are `None`.
#[must_use]
pub fn opt_str_field<'a>(item: &'a Value, name: &str) -> Option<&'a str> {
    item.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Required identifier field: a string, or a number rendered verbatim.
pub fn string_field(item: &Value, name: &'static str) -> Result<String, NormalizeError> {
    match field(item, name)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(NormalizeError::Kind {
            field: name,
            expected: "string or number",
        }),
    }
}

/// Required monetary field, parsed exactly from the JSON literal.
pub fn decimal_field(item: &Value, name: &'static str) -> Result<Decimal, NormalizeError> {
    match field(item, name)? {
        Value::String(s) => parse_decimal(s, name),
        Value::Number(n) => parse_decimal(&n.to_string(), name),
        other => Err(NormalizeError::Decimal {
            field: name,
            value: other.to_string(),
        }),
    }
}

/// Optional monetary field; absent, null, and empty-string values are
/// `None`. A present value that does not parse is an error, not `None`.
pub fn opt_decimal_field(
    item: &Value,
    name: &'static str,
) -> Result<Option<Decimal>, NormalizeError> {
    match item.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => parse_decimal(s, name).map(Some),
        Some(Value::Number(n)) => parse_decimal(&n.to_string(), name).map(Some),
        Some(other) => Err(NormalizeError::Decimal {
            field: name,
            value: other.to_string(),
        }),
    }
}

fn parse_decimal(literal: &str, name: &'static str) -> Result<Decimal, NormalizeError> {
    Decimal::from_str(literal)
        .or_else(|_| Decimal::from_scientific(literal))
        .map_err(|_| NormalizeError::Decimal {
            field: name,
            value: literal.to_string(),
        })
}

/// Required epoch-milliseconds field: a JSON integer, or an integer string
/// (several venues report `ts` fields as strings).
pub fn ms_field(item: &Value, name: &'static str) -> Result<i64, NormalizeError> {
    let value = field(item, name)?;
    parse_ms(value).ok_or_else(|| NormalizeError::Timestamp {
        field: name,
        value: value.to_string(),
    })
}

/// Like [`ms_field`], with a documented datetime string format as fallback
/// (e.g. Binance withdrawal `applyTime`, `%Y-%m-%d %H:%M:%S`, UTC).
pub fn ms_field_with_format(
    item: &Value,
    name: &'static str,
    format: &str,
) -> Result<i64, NormalizeError> {
    let value = field(item, name)?;
    if let Some(ms) = parse_ms(value) {
        return Ok(ms);
    }
    value
        .as_str()
        .and_then(|s| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| NormalizeError::Timestamp {
            field: name,
            value: value.to_string(),
        })
}

fn parse_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Converts validated epoch milliseconds into an [`EventTime`].
pub fn event_time_ms(ms: i64, name: &'static str) -> Result<EventTime, NormalizeError> {
    EventTime::from_ms(ms).ok_or_else(|| NormalizeError::Timestamp {
        field: name,
        value: ms.to_string(),
    })
}

/// Pulls a named array out of a response envelope by value; a missing,
/// null, or non-array field is an empty result.
pub(crate) fn take_array(body: Value, key: &str) -> Vec<Value> {
    match body {
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
