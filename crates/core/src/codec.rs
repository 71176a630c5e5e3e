//! Storage codecs for attribute kinds
//!
//! | Kind | Encoding | Placeholder for null |
//! |------|----------|----------------------|
//! | char | the text itself | `""` |
//! | integer | base-10 | `"0"` |
//! | float | shortest round-trip base-10 | `"0"` |
//! | boolean | `"0"` / `"1"` | `"0"` |
//! | datetime | `"<unix-secs>.<micros>"` (UTC) | `""` |
//! | date | unix seconds of midnight UTC | `""` |
//! | timedelta | whole seconds | `"0"` |
//! | list | JSON text | `"[]"` |
//! | json | JSON text | `"{}"` |
//!
//! Decoding a datetime/date that cannot be parsed yields `Value::Null`;
//! an undecodable list/json yields an empty collection. Numeric kinds
//! fail with `Error::Codec`.

use chrono::{DateTime, NaiveDate, TimeDelta};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::attribute::Kind;
use crate::error::{Error, Result};
use crate::value::Value;

const MICROS_PER_SEC: i64 = 1_000_000;

/// Encode `value` for storage under attribute `field` of kind `kind`
pub fn encode(kind: Kind, field: &str, value: &Value) -> Result<String> {
    match (kind, value) {
        (Kind::Char, Value::Null) => Ok(String::new()),
        (Kind::Char, Value::String(s)) => Ok(s.clone()),

        (Kind::Integer, Value::Null) => Ok("0".to_string()),
        (Kind::Integer, Value::Int(i)) => Ok(i.to_string()),

        (Kind::Float, Value::Null) => Ok("0".to_string()),
        (Kind::Float, Value::Float(f)) => Ok(f.to_string()),

        (Kind::Boolean, Value::Null) => Ok("0".to_string()),
        (Kind::Boolean, Value::Bool(b)) => Ok(if *b { "1" } else { "0" }.to_string()),

        (Kind::DateTime, Value::Null) => Ok(String::new()),
        (Kind::DateTime, Value::DateTime(dt)) => Ok(format_micros(dt.timestamp_micros())),

        (Kind::Date, Value::Null) => Ok(String::new()),
        (Kind::Date, Value::Date(d)) => Ok(date_to_secs(*d).to_string()),

        (Kind::TimeDelta, Value::Null) => Ok("0".to_string()),
        (Kind::TimeDelta, Value::Duration(d)) => Ok(d.num_seconds().to_string()),

        (Kind::List, Value::Null) => Ok("[]".to_string()),
        (Kind::List, Value::List(items)) => Ok(serde_json::to_string(items)?),

        (Kind::Json, Value::Null) => Ok("{}".to_string()),
        (Kind::Json, v) if kind.accepts(v) => match v.to_json() {
            Some(json) => Ok(serde_json::to_string(&json)?),
            None => Err(Error::field(field, "is not JSON serializable")),
        },

        (kind, other) => Err(Error::field(
            field,
            format!(
                "Must be one of {} not a {}",
                kind.acceptable_types().join("/"),
                other.type_name()
            ),
        )),
    }
}

/// Decode a storage string under attribute `field` of kind `kind`
pub fn decode(kind: Kind, field: &str, raw: &str) -> Result<Value> {
    match kind {
        Kind::Char => Ok(Value::String(raw.to_string())),
        Kind::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| Error::codec(field, format!("'{}': {}", raw, e))),
        Kind::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| Error::codec(field, format!("'{}': {}", raw, e))),
        Kind::Boolean => raw
            .trim()
            .parse::<i64>()
            .map(|i| Value::Bool(i != 0))
            .map_err(|e| Error::codec(field, format!("'{}': {}", raw, e))),
        Kind::DateTime => Ok(parse_micros(raw)
            .and_then(DateTime::from_timestamp_micros)
            .map_or(Value::Null, Value::DateTime)),
        Kind::Date => Ok(parse_micros(raw)
            .and_then(|micros| DateTime::from_timestamp_micros(micros))
            .map_or(Value::Null, |dt| Value::Date(dt.date_naive()))),
        Kind::TimeDelta => {
            if raw.trim().is_empty() {
                return Ok(Value::Duration(TimeDelta::zero()));
            }
            Ok(parse_micros(raw)
                .map(TimeDelta::microseconds)
                .map_or(Value::Null, Value::Duration))
        }
        Kind::List => {
            if raw.is_empty() {
                return Ok(Value::List(Vec::new()));
            }
            match serde_json::from_str::<Vec<JsonValue>>(raw) {
                Ok(items) => Ok(Value::List(items)),
                Err(e) => {
                    warn!(target: "kvmodel::codec", field, error = %e, "Undecodable list, using empty list");
                    Ok(Value::List(Vec::new()))
                }
            }
        }
        Kind::Json => {
            if raw.is_empty() {
                return Ok(Value::Json(JsonValue::Object(Default::default())));
            }
            match serde_json::from_str::<JsonValue>(raw) {
                Ok(json) => Ok(Value::Json(json)),
                Err(e) => {
                    warn!(target: "kvmodel::codec", field, error = %e, "Undecodable json, using empty object");
                    Ok(Value::Json(JsonValue::Object(Default::default())))
                }
            }
        }
    }
}

/// Sorted-set score for a sortable kind; `None` for null
///
/// The score is the numeric reading of the storage encoding.
pub fn score(kind: Kind, field: &str, value: &Value) -> Result<Option<f64>> {
    if !kind.is_sortable() {
        return Err(Error::schema(format!(
            "{}: {} attributes cannot be scored",
            field, kind
        )));
    }
    if value.is_null() {
        return Ok(None);
    }
    let encoded = encode(kind, field, value)?;
    encoded
        .parse::<f64>()
        .map(Some)
        .map_err(|e| Error::codec(field, format!("'{}': {}", encoded, e)))
}

fn date_to_secs(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn format_micros(total: i64) -> String {
    let sign = if total < 0 { "-" } else { "" };
    let abs = total.unsigned_abs();
    let per_sec = MICROS_PER_SEC as u64;
    format!("{}{}.{:06}", sign, abs / per_sec, abs % per_sec)
}

/// Parse `"[-]<secs>[.<fraction>]"` into microseconds without float rounding
fn parse_micros(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (negative, body) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (secs_part, frac_part) = match body.split_once('.') {
        Some((s, f)) => (s, f),
        None => (body, ""),
    };
    if secs_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let secs: i64 = if secs_part.is_empty() {
        0
    } else {
        secs_part.parse().ok()?
    };
    if !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut digits: String = frac_part.chars().take(6).collect();
    while digits.len() < 6 {
        digits.push('0');
    }
    let frac: i64 = digits.parse().ok()?;
    let total = secs.checked_mul(MICROS_PER_SEC)?.checked_add(frac)?;
    Some(if negative { -total } else { total })
}
