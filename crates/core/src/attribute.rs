//! Attribute descriptors
//!
//! An [`Attribute`] is a named, typed field of a model. It knows:
//! - which [`Value`] variants it accepts (its [`Kind`])
//! - how to encode a value for storage and decode it back (see `codec`)
//! - how to validate a value, accumulating every violation
//! - which index families it participates in (`indexed` / `index_value`)
//! - how to produce a default when a record omits it
//!
//! Attributes are plain data built with a fluent API:
//!
//! ```
//! use kvmodel_core::Attribute;
//!
//! let receiver = Attribute::integer("receiver_id").required().index_value();
//! let created = Attribute::datetime("date_created").required().indexed();
//! assert!(receiver.is_index_value());
//! assert!(created.is_indexed());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::codec;
use crate::error::{FieldError, Result};
use crate::value::Value;

/// Default `max_length` of a char attribute
pub const DEFAULT_MAX_LENGTH: usize = 255;

/// Custom per-attribute validator: `(field_name, value) -> violations`
pub type Validator = Arc<dyn Fn(&str, &Value) -> Vec<FieldError> + Send + Sync>;

/// Attribute kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// UTF-8 text
    Char,
    /// Signed 64-bit integer
    Integer,
    /// 64-bit float
    Float,
    /// Boolean
    Boolean,
    /// UTC datetime
    DateTime,
    /// Calendar date
    Date,
    /// Signed duration, stored as whole seconds
    TimeDelta,
    /// JSON list
    List,
    /// Arbitrary JSON
    Json,
}

impl Kind {
    /// Kinds whose storage encoding is numeric and can score a sorted set
    pub fn is_sortable(&self) -> bool {
        matches!(self, Kind::Integer | Kind::Float | Kind::DateTime | Kind::Date)
    }

    /// Name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Char => "char",
            Kind::Integer => "integer",
            Kind::Float => "float",
            Kind::Boolean => "boolean",
            Kind::DateTime => "datetime",
            Kind::Date => "date",
            Kind::TimeDelta => "timedelta",
            Kind::List => "list",
            Kind::Json => "json",
        }
    }

    /// Native value types accepted by this kind
    pub fn acceptable_types(&self) -> &'static [&'static str] {
        match self {
            Kind::Char => &["string"],
            Kind::Integer => &["integer"],
            Kind::Float => &["float"],
            Kind::Boolean => &["bool"],
            Kind::DateTime => &["datetime"],
            Kind::Date => &["date"],
            Kind::TimeDelta => &["duration"],
            Kind::List => &["list"],
            Kind::Json => &["json", "list", "string", "integer", "float", "bool"],
        }
    }

    /// True if `value` is one of the acceptable variants (null is always accepted)
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        self.acceptable_types().contains(&value.type_name())
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default value source
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value
    Static(Value),
    /// A zero-argument producer called at record construction time
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Produce the default
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Static(v) => v.clone(),
            DefaultValue::Producer(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(v) => f.debug_tuple("Static").field(v).finish(),
            DefaultValue::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// A named, typed field descriptor
#[derive(Clone)]
pub struct Attribute {
    name: String,
    kind: Kind,
    required: bool,
    indexed: bool,
    index_value: bool,
    unique: bool,
    max_length: usize,
    auto_now: bool,
    auto_now_add: bool,
    default: Option<DefaultValue>,
    validator: Option<Validator>,
}

impl Attribute {
    /// Create an attribute of the given kind
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            indexed: false,
            index_value: false,
            unique: false,
            max_length: DEFAULT_MAX_LENGTH,
            auto_now: false,
            auto_now_add: false,
            default: None,
            validator: None,
        }
    }

    /// Text attribute
    pub fn char(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Char)
    }

    /// Integer attribute
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Integer)
    }

    /// Float attribute
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Float)
    }

    /// Boolean attribute
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Boolean)
    }

    /// Datetime attribute
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, Kind::DateTime)
    }

    /// Date attribute
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Date)
    }

    /// Duration attribute
    pub fn time_delta(name: impl Into<String>) -> Self {
        Self::new(name, Kind::TimeDelta)
    }

    /// List attribute
    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, Kind::List)
    }

    /// JSON attribute
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Json)
    }

    // ========== Builder ==========

    /// Value must be present (and non-blank for text)
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Participate in the sortable index families
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Participate as an equality/membership filter
    pub fn index_value(mut self) -> Self {
        self.index_value = true;
        self
    }

    /// Reserved uniqueness flag (recorded, not enforced)
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Maximum text length in characters (char attributes only)
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = max;
        self
    }

    /// Stamp with the current time on every write (datetime/date)
    pub fn auto_now(mut self) -> Self {
        self.auto_now = true;
        self
    }

    /// Stamp with the current time on create when absent (datetime/date)
    pub fn auto_now_add(mut self) -> Self {
        self.auto_now_add = true;
        self
    }

    /// Static default
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    /// Default produced on demand
    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    /// Custom validator, run after the built-in checks
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str, &Value) -> Vec<FieldError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    // ========== Accessors ==========

    /// Attribute name, also the storage field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute kind
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Is the attribute required
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Does the attribute back a sortable index
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Is the attribute an equality/membership filter field
    pub fn is_index_value(&self) -> bool {
        self.index_value
    }

    /// Reserved uniqueness flag
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Stamped on every write
    pub fn is_auto_now(&self) -> bool {
        self.auto_now
    }

    /// Stamped on create
    pub fn is_auto_now_add(&self) -> bool {
        self.auto_now_add
    }

    /// Maximum text length
    pub fn max_length_limit(&self) -> usize {
        self.max_length
    }

    /// Resolve the default, `Value::Null` when none is declared
    pub fn default_for(&self) -> Value {
        self.default
            .as_ref()
            .map_or(Value::Null, DefaultValue::resolve)
    }

    /// True if a default is declared
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    // ========== Codec ==========

    /// Encode a native value into its storage string
    ///
    /// `Value::Null` always encodes to the kind's placeholder.
    pub fn encode(&self, value: &Value) -> Result<String> {
        codec::encode(self.kind, &self.name, value)
    }

    /// Decode a storage string into a native value
    pub fn decode(&self, raw: &str) -> Result<Value> {
        codec::decode(self.kind, &self.name, raw)
    }

    /// Sorted-set score of a value, `None` for null
    pub fn score(&self, value: &Value) -> Result<Option<f64>> {
        codec::score(self.kind, &self.name, value)
    }

    // ========== Validation ==========

    /// Validate a value, returning every violation found
    pub fn validate(&self, value: &Value) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if !self.kind.accepts(value) {
            errors.push(FieldError::new(
                &self.name,
                format!(
                    "Must be one of {} not a {}",
                    self.kind.acceptable_types().join("/"),
                    value.type_name()
                ),
            ));
        }

        if self.required && is_blank(value) {
            errors.push(FieldError::new(&self.name, "required"));
        }

        if let Some(validator) = &self.validator {
            errors.extend(validator(&self.name, value));
        }

        match (self.kind, value) {
            (Kind::Char, Value::String(s)) => {
                if errors.is_empty() && s.chars().count() > self.max_length {
                    errors.push(FieldError::new(&self.name, "exceeds max length"));
                }
            }
            (Kind::Float, Value::Float(f)) if !f.is_finite() => {
                errors.push(FieldError::new(&self.name, "must be a finite number"));
            }
            (Kind::List, Value::Null) => {
                errors.push(FieldError::new(&self.name, "must be a list"));
            }
            (Kind::Json, v) if self.kind.accepts(v) && v.to_json().is_none() => {
                errors.push(FieldError::new(&self.name, "is not JSON serializable"));
            }
            _ => {}
        }

        errors
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("indexed", &self.indexed)
            .field("index_value", &self.index_value)
            .field("unique", &self.unique)
            .field("default", &self.default)
            .field("validator", &self.validator.as_ref().map(|_| ".."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_char_collects_type_and_required() {
        let attr = Attribute::char("title").required();
        let errors = attr.validate(&Value::Int(3));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Must be one of string"));

        let errors = attr.validate(&Value::String("   ".into()));
        assert_eq!(errors, vec![FieldError::new("title", "required")]);

        assert!(attr.validate(&Value::String("hi".into())).is_empty());
    }

    #[test]
    fn test_max_length_checked_only_when_clean() {
        let attr = Attribute::char("code").max_length(3);
        let errors = attr.validate(&Value::String("abcd".into()));
        assert_eq!(errors, vec![FieldError::new("code", "exceeds max length")]);
        assert!(attr.validate(&Value::String("abc".into())).is_empty());
    }

    #[test]
    fn test_custom_validator_errors_accumulate() {
        let attr = Attribute::integer("age")
            .required()
            .validator(|name, value| match value {
                Value::Int(i) if *i < 0 => vec![FieldError::new(name, "must be positive")],
                _ => vec![],
            });
        assert_eq!(
            attr.validate(&Value::Int(-1)),
            vec![FieldError::new("age", "must be positive")]
        );

        let errors = attr.validate(&Value::Null);
        assert_eq!(errors, vec![FieldError::new("age", "required")]);
    }

    #[test]
    fn test_list_requires_a_list() {
        let attr = Attribute::list("sender_ids");
        assert_eq!(
            attr.validate(&Value::Null),
            vec![FieldError::new("sender_ids", "must be a list")]
        );
        assert!(attr.validate(&Value::List(vec![json!(2)])).is_empty());
    }

    #[test]
    fn test_json_rejects_unserializable_float() {
        let attr = Attribute::json("info");
        let errors = attr.validate(&Value::Float(f64::NAN));
        assert!(errors.iter().any(|e| e.message == "is not JSON serializable"));
        assert!(attr.validate(&Value::Json(json!({"a": 1}))).is_empty());
        assert!(attr.validate(&Value::String("plain".into())).is_empty());
    }

    #[test]
    fn test_float_must_be_finite() {
        let attr = Attribute::float("ratio");
        assert_eq!(
            attr.validate(&Value::Float(f64::INFINITY)),
            vec![FieldError::new("ratio", "must be a finite number")]
        );
    }

    #[test]
    fn test_defaults_static_and_producer() {
        let fixed = Attribute::boolean("is_read").default_value(false);
        assert_eq!(fixed.default_for(), Value::Bool(false));

        let produced = Attribute::list("tags").default_with(|| Value::List(vec![]));
        assert_eq!(produced.default_for(), Value::List(vec![]));

        assert_eq!(Attribute::char("x").default_for(), Value::Null);
    }

    #[test]
    fn test_sortable_kinds() {
        assert!(Kind::Integer.is_sortable());
        assert!(Kind::DateTime.is_sortable());
        assert!(!Kind::Char.is_sortable());
        assert!(!Kind::Boolean.is_sortable());
    }
}
