//! Value types for kvmodel
//!
//! `Value` is the native (decoded) form of an attribute. Every attribute
//! kind accepts a specific subset of variants; the codec turns a value into
//! its storage string and back.
//!
//! ## Timezone policy
//!
//! Datetimes are always `DateTime<Utc>`. A naive wall-clock time has no
//! meaning on its own, so it can only become a `Value` through
//! [`Value::from_local_naive`], which attaches the local zone explicitly.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde_json::Value as JsonValue;

/// Native attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// UTC-aware datetime
    DateTime(DateTime<Utc>),
    /// Calendar date
    Date(NaiveDate),
    /// Signed duration
    Duration(TimeDelta),
    /// Ordered list of JSON values
    List(Vec<JsonValue>),
    /// Arbitrary JSON document
    Json(JsonValue),
}

impl Value {
    /// Attach the local timezone to a naive datetime and normalize to UTC
    ///
    /// A local time that falls in a DST gap does not exist; it is read as UTC.
    pub fn from_local_naive(naive: NaiveDateTime) -> Self {
        let utc = match Local.from_local_datetime(&naive).earliest() {
            Some(local) => local.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&naive),
        };
        Value::DateTime(utc)
    }

    /// True for `Value::Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Duration(_) => "duration",
            Value::List(_) => "list",
            Value::Json(_) => "json",
        }
    }

    /// Borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Read as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Read as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Read as datetime
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Read as date
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Read as duration
    pub fn as_duration(&self) -> Option<TimeDelta> {
        match self {
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }

    /// Borrow as list
    pub fn as_list(&self) -> Option<&[JsonValue]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as JSON document
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    /// JSON form of this value, if it has one
    ///
    /// Floats that JSON cannot represent (NaN, infinities) yield `None`.
    pub fn to_json(&self) -> Option<JsonValue> {
        match self {
            Value::Null => Some(JsonValue::Null),
            Value::Bool(b) => Some(JsonValue::Bool(*b)),
            Value::Int(i) => Some(JsonValue::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
            Value::String(s) => Some(JsonValue::String(s.clone())),
            Value::List(items) => Some(JsonValue::Array(items.clone())),
            Value::Json(v) => Some(v.clone()),
            Value::DateTime(_) | Value::Date(_) | Value::Duration(_) => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<TimeDelta> for Value {
    fn from(d: TimeDelta) -> Self {
        Value::Duration(d)
    }
}

impl From<Vec<JsonValue>> for Value {
    fn from(items: Vec<JsonValue>) -> Self {
        Value::List(items)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from("a"), Value::String("a".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(true)), Value::Bool(true));
        assert_eq!(Value::from(vec![json!(1)]), Value::List(vec![json!(1)]));
    }

    #[test]
    fn test_type_names_distinguish_variants() {
        assert_eq!(Value::Int(1).type_name(), "integer");
        assert_eq!(Value::Float(1.0).type_name(), "float");
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_to_json_rejects_nan() {
        assert_eq!(Value::Float(f64::NAN).to_json(), None);
        assert_eq!(Value::Int(4).to_json(), Some(json!(4)));
        assert_eq!(
            Value::Json(json!({"a": [1, 2]})).to_json(),
            Some(json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn test_from_local_naive_is_utc_aware() {
        let naive = NaiveDate::from_ymd_opt(2017, 9, 11)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let value = Value::from_local_naive(naive);
        let dt = value.as_datetime().unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(dt, expected);
    }
}
