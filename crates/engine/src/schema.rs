//! Model schemas
//!
//! A [`Schema`] is the static descriptor of one model: its attributes, which
//! of them are indexed (sortable) or index-value (equality filters), the
//! optional meta field, the unique composite index tuples, the expiration and
//! the created-at field. Schemas are declared with [`SchemaBuilder`] and
//! checked once, at [`SchemaBuilder::build`].
//!
//! # Example
//!
//! ```ignore
//! let schema = Schema::builder("rcnotice")
//!     .expire_secs(86400 * 7 * 3)
//!     .attribute(Attribute::integer("receiver_id").required().index_value())
//!     .attribute(Attribute::integer("notice_id").indexed())
//!     .attribute(Attribute::datetime("date_created").indexed())
//!     .meta_field("receiver_id")
//!     .created_at("date_created")
//!     .unique_index(&["receiver_id", "notice_id"])
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kvmodel_core::keys::{is_safe_segment, CREATED_AT_FIELD, ID_FIELD, KEY_DELIMITER, SHARD_DELIMITER};
use kvmodel_core::{
    Attribute, Error, Expiration, FieldError, Kind, Result, Timestamp, ValidationErrors, Value,
};

use crate::record::Record;

/// Record-level validation hook, run after per-attribute validation
pub type RecordValidator = Arc<dyn Fn(&Record) -> Vec<FieldError> + Send + Sync>;

/// Static descriptor of a model
#[derive(Clone)]
pub struct Schema {
    name: String,
    attributes: Vec<Attribute>,
    positions: HashMap<String, usize>,
    indexed: Vec<String>,
    index_values: Vec<String>,
    meta_field: Option<String>,
    unique_indexes: Vec<Vec<String>>,
    expiration: Expiration,
    created_at_field: Option<String>,
    validator: Option<RecordValidator>,
}

impl Schema {
    /// Start declaring a model
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Model name, the first segment of every key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in declaration order (inherited first)
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.positions.get(name).map(|&i| &self.attributes[i])
    }

    /// Indexed (sortable) field names
    pub fn indexed_fields(&self) -> &[String] {
        &self.indexed
    }

    /// Index-value (equality filter) field names
    pub fn index_value_fields(&self) -> &[String] {
        &self.index_values
    }

    /// Meta field namespacing per-owner indexes
    pub fn meta_field(&self) -> Option<&str> {
        self.meta_field.as_deref()
    }

    /// Unique composite index tuples, sort field last
    pub fn unique_indexes(&self) -> &[Vec<String>] {
        &self.unique_indexes
    }

    /// Model expiration
    pub fn expiration(&self) -> Expiration {
        self.expiration
    }

    /// Field whose value places records in index shards
    pub fn created_at_field(&self) -> Option<&str> {
        self.created_at_field.as_deref()
    }

    /// True if `name` is an indexed field
    pub fn is_indexed(&self, name: &str) -> bool {
        self.attribute(name).map_or(false, Attribute::is_indexed)
    }

    /// True if `name` is an index-value field
    pub fn is_index_value(&self, name: &str) -> bool {
        self.attribute(name).map_or(false, Attribute::is_index_value)
    }

    // ========== Records ==========

    /// A fresh record with every default resolved
    pub fn new_record(&self) -> Record {
        let mut record = Record::new();
        self.resolve_defaults(&mut record);
        record
    }

    /// Fill absent attributes that declare a default
    ///
    /// Attributes explicitly set (even to null) are left alone.
    pub fn resolve_defaults(&self, record: &mut Record) {
        for attr in &self.attributes {
            if attr.has_default() && !record.contains(attr.name()) {
                record.insert(attr.name(), attr.default_for());
            }
        }
    }

    /// Stamp `auto_now` attributes, and `auto_now_add` ones when `creating`
    pub(crate) fn stamp_times(&self, record: &mut Record, now: Timestamp, creating: bool) {
        let now = DateTime::<Utc>::from_timestamp_micros(now.as_micros() as i64).unwrap_or_default();
        for attr in &self.attributes {
            let stamp = attr.is_auto_now()
                || (creating && attr.is_auto_now_add() && record.get(attr.name()).is_null());
            if !stamp {
                continue;
            }
            match attr.kind() {
                Kind::DateTime => record.insert(attr.name(), now),
                Kind::Date => record.insert(attr.name(), now.date_naive()),
                _ => {}
            }
        }
    }

    /// Validate a whole record, collecting every violation
    pub fn validate(&self, record: &Record) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        for name in record.values().keys() {
            if self.attribute(name).is_none() {
                errors.push(FieldError::new(name.as_str(), "unknown attribute"));
            }
        }

        for attr in &self.attributes {
            let value = record.get(attr.name());
            let field_errors = attr.validate(value);
            if field_errors.is_empty() && attr.is_index_value() {
                if let Ok(encoded) = attr.encode(value) {
                    if encoded.contains(KEY_DELIMITER) || encoded.contains(SHARD_DELIMITER) {
                        errors.push(FieldError::new(
                            attr.name(),
                            format!("cannot contain '{}' or '{}'", KEY_DELIMITER, SHARD_DELIMITER),
                        ));
                    }
                }
            }
            errors.extend(field_errors);
        }

        if let Some(validator) = &self.validator {
            errors.extend(validator(record));
        }
        errors
    }

    /// Storage fields of a record hash, in declaration order
    pub(crate) fn encode_record(&self, id: &str, record: &Record) -> Result<Vec<(String, String)>> {
        let mut fields = Vec::with_capacity(self.attributes.len() + 2);
        fields.push((ID_FIELD.to_string(), id.to_string()));
        for attr in &self.attributes {
            fields.push((attr.name().to_string(), attr.encode(record.get(attr.name()))?));
        }
        if let Some(at) = record.created_at() {
            fields.push((CREATED_AT_FIELD.to_string(), at.to_string()));
        }
        Ok(fields)
    }

    /// Rebuild a record from its stored hash
    ///
    /// Attributes missing from the hash (declared after the record was
    /// written) read as null.
    pub(crate) fn decode_record(&self, id: &str, hash: &HashMap<String, String>) -> Result<Record> {
        let mut record = Record::with_id(id);
        for attr in &self.attributes {
            let value = match hash.get(attr.name()) {
                Some(raw) => attr.decode(raw)?,
                None => Value::Null,
            };
            record.insert(attr.name(), value);
        }
        let created_at = hash
            .get(CREATED_AT_FIELD)
            .and_then(|raw| raw.parse::<f64>().ok());
        record.set_created_at(created_at);
        Ok(record)
    }

    /// Shard placement stamp: the created-at field's score, else `now`
    pub(crate) fn creation_stamp(&self, record: &Record, now: Timestamp) -> Result<f64> {
        if let Some(field) = &self.created_at_field {
            if let Some(attr) = self.attribute(field) {
                if let Some(score) = attr.score(record.get(field))? {
                    return Ok(score);
                }
            }
        }
        Ok(now.as_secs_f64())
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("meta_field", &self.meta_field)
            .field("unique_indexes", &self.unique_indexes)
            .field("expiration", &self.expiration)
            .field("created_at_field", &self.created_at_field)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Declarative builder for [`Schema`]
pub struct SchemaBuilder {
    name: String,
    attributes: Vec<Attribute>,
    meta_field: Option<String>,
    unique_indexes: Vec<Vec<String>>,
    expiration: i64,
    created_at_field: Option<String>,
    validator: Option<RecordValidator>,
}

impl SchemaBuilder {
    /// Start a schema for model `name` that never expires
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            meta_field: None,
            unique_indexes: Vec::new(),
            expiration: -1,
            created_at_field: None,
            validator: None,
        }
    }

    /// Inherit everything `parent` declares
    ///
    /// Attributes declared later with the same name replace the inherited
    /// ones; meta field, created-at field, expiration and validator are
    /// taken from the parent unless set again.
    pub fn extend(mut self, parent: &Schema) -> Self {
        for attr in parent.attributes() {
            self = self.attribute(attr.clone());
        }
        self.unique_indexes.extend(parent.unique_indexes.iter().cloned());
        if self.meta_field.is_none() {
            self.meta_field = parent.meta_field.clone();
        }
        if self.created_at_field.is_none() {
            self.created_at_field = parent.created_at_field.clone();
        }
        if self.expiration < 0 {
            self.expiration = parent.expiration.secs().map_or(-1, |s| s as i64);
        }
        if self.validator.is_none() {
            self.validator = parent.validator.clone();
        }
        self
    }

    /// Declare an attribute
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name() == attribute.name())
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        self
    }

    /// Expiration in seconds; any negative value means never
    pub fn expire_secs(mut self, secs: i64) -> Self {
        self.expiration = secs;
        self
    }

    /// Index-value field namespacing per-owner range indexes
    pub fn meta_field(mut self, field: impl Into<String>) -> Self {
        self.meta_field = Some(field.into());
        self
    }

    /// Declare a unique composite index; the last field is the sort field
    pub fn unique_index(mut self, fields: &[&str]) -> Self {
        self.unique_indexes
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Field whose value places records in index shards
    pub fn created_at(mut self, field: impl Into<String>) -> Self {
        self.created_at_field = Some(field.into());
        self
    }

    /// Record-level validation hook
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Record) -> Vec<FieldError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Check the declaration and produce the schema
    ///
    /// # Errors
    ///
    /// Returns `Error::Schema` describing the first inconsistency found.
    pub fn build(self) -> Result<Schema> {
        if !is_safe_segment(&self.name) {
            return Err(Error::schema(format!("invalid model name '{}'", self.name)));
        }
        if self.expiration == 0 {
            return Err(Error::schema("expiration must be positive, or negative for never"));
        }

        let mut positions = HashMap::new();
        let mut indexed = Vec::new();
        let mut index_values = Vec::new();
        for (i, attr) in self.attributes.iter().enumerate() {
            let name = attr.name();
            if !is_safe_segment(name) {
                return Err(Error::schema(format!("invalid attribute name '{}'", name)));
            }
            if name == ID_FIELD || name == CREATED_AT_FIELD {
                return Err(Error::schema(format!("'{}' is reserved", name)));
            }
            if attr.is_indexed() && attr.is_index_value() {
                return Err(Error::schema(format!(
                    "'{}' cannot be both indexed and index_value",
                    name
                )));
            }
            if attr.is_indexed() {
                if !attr.kind().is_sortable() {
                    return Err(Error::schema(format!(
                        "indexed field '{}' has non-sortable kind {}",
                        name,
                        attr.kind()
                    )));
                }
                indexed.push(name.to_string());
            }
            if attr.is_index_value() {
                if matches!(attr.kind(), Kind::List | Kind::Json) {
                    return Err(Error::schema(format!(
                        "index_value field '{}' cannot be of kind {}",
                        name,
                        attr.kind()
                    )));
                }
                index_values.push(name.to_string());
            }
            positions.insert(name.to_string(), i);
        }

        let lookup = |name: &str| positions.get(name).map(|&i| &self.attributes[i]);

        if let Some(meta) = &self.meta_field {
            match lookup(meta) {
                Some(attr) if attr.is_index_value() => {}
                Some(_) => {
                    return Err(Error::schema(format!(
                        "meta field '{}' must be index_value",
                        meta
                    )))
                }
                None => return Err(Error::schema(format!("unknown meta field '{}'", meta))),
            }
        }

        let mut unique_indexes: Vec<Vec<String>> = Vec::new();
        for tuple in self.unique_indexes {
            if tuple.len() < 2 {
                return Err(Error::schema(format!(
                    "unique index {:?} needs at least two fields",
                    tuple
                )));
            }
            let (sort, filters) = tuple.split_last().ok_or_else(|| Error::schema("empty unique index"))?;
            for field in filters {
                match lookup(field) {
                    Some(attr) if attr.is_index_value() => {}
                    _ => {
                        return Err(Error::schema(format!(
                            "unique index {:?}: '{}' must be an index_value field",
                            tuple, field
                        )))
                    }
                }
            }
            match lookup(sort) {
                Some(attr) if attr.is_indexed() => {}
                _ => {
                    return Err(Error::schema(format!(
                        "unique index {:?}: last field '{}' must be indexed",
                        tuple, sort
                    )))
                }
            }
            let mut distinct = filters.to_vec();
            distinct.sort();
            distinct.dedup();
            if distinct.len() != filters.len() {
                return Err(Error::schema(format!("unique index {:?} repeats a field", tuple)));
            }
            if !unique_indexes.contains(&tuple) {
                unique_indexes.push(tuple);
            }
        }

        if let Some(field) = &self.created_at_field {
            match lookup(field) {
                Some(attr) if matches!(attr.kind(), Kind::DateTime | Kind::Date) => {}
                Some(_) => {
                    return Err(Error::schema(format!(
                        "created_at field '{}' must be a datetime or date",
                        field
                    )))
                }
                None => {
                    return Err(Error::schema(format!("unknown created_at field '{}'", field)))
                }
            }
        }

        Ok(Schema {
            name: self.name,
            attributes: self.attributes,
            positions,
            indexed,
            index_values,
            meta_field: self.meta_field,
            unique_indexes,
            expiration: Expiration::from_secs(self.expiration),
            created_at_field: self.created_at_field,
            validator: self.validator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice_builder() -> SchemaBuilder {
        Schema::builder("notice")
            .expire_secs(3600)
            .attribute(Attribute::integer("receiver_id").required().index_value())
            .attribute(Attribute::char("category").index_value())
            .attribute(Attribute::integer("notice_id").indexed())
            .attribute(Attribute::datetime("date_created").indexed().auto_now_add())
            .attribute(Attribute::boolean("is_read").index_value().default_value(false))
            .meta_field("receiver_id")
            .created_at("date_created")
            .unique_index(&["category", "date_created"])
    }

    #[test]
    fn test_build_collects_index_fields() {
        let schema = notice_builder().build().unwrap();
        assert_eq!(schema.indexed_fields(), &["notice_id", "date_created"]);
        assert_eq!(
            schema.index_value_fields(),
            &["receiver_id", "category", "is_read"]
        );
        assert_eq!(schema.meta_field(), Some("receiver_id"));
        assert!(schema.expiration().is_expiring());
    }

    #[test]
    fn test_indexed_must_be_sortable() {
        let err = Schema::builder("m")
            .attribute(Attribute::char("title").indexed())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_meta_field_must_be_index_value() {
        let err = Schema::builder("m")
            .attribute(Attribute::integer("owner"))
            .meta_field("owner")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must be index_value"));
    }

    #[test]
    fn test_unique_index_shape() {
        let err = notice_builder()
            .unique_index(&["notice_id", "category"])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(notice_builder().unique_index(&["notice_id"]).build().is_err());
    }

    #[test]
    fn test_reserved_names() {
        assert!(Schema::builder("m")
            .attribute(Attribute::char("id"))
            .build()
            .is_err());
        assert!(Schema::builder("bad:name").build().is_err());
        assert!(Schema::builder("m").expire_secs(0).build().is_err());
    }

    #[test]
    fn test_extend_inherits_and_overrides() {
        let parent = notice_builder().build().unwrap();
        let child = Schema::builder("child")
            .extend(&parent)
            .attribute(Attribute::char("category").index_value().max_length(8))
            .attribute(Attribute::char("extra"))
            .build()
            .unwrap();
        assert_eq!(child.attributes().len(), parent.attributes().len() + 1);
        assert_eq!(child.attribute("category").unwrap().max_length_limit(), 8);
        assert_eq!(child.meta_field(), Some("receiver_id"));
        assert_eq!(child.expiration(), Expiration::After(3600));
    }

    #[test]
    fn test_defaults_and_validation() {
        let schema = notice_builder().build().unwrap();
        let record = schema.new_record();
        assert_eq!(record.get("is_read"), &Value::Bool(false));

        let errors = schema.validate(&record.set("bogus", 1i64));
        assert!(errors.has_field("receiver_id"));
        assert!(errors.has_field("bogus"));
    }

    #[test]
    fn test_index_value_rejects_delimiters() {
        let schema = notice_builder().build().unwrap();
        let record = schema
            .new_record()
            .set("receiver_id", 1i64)
            .set("category", "a:b");
        assert!(schema.validate(&record).has_field("category"));
    }

    #[test]
    fn test_record_validator_joins_errors() {
        let schema = notice_builder()
            .validator(|r: &Record| {
                if r.get("notice_id").as_int() == Some(13) {
                    vec![FieldError::new("notice_id", "unlucky")]
                } else {
                    Vec::new()
                }
            })
            .build()
            .unwrap();
        let record = schema.new_record().set("notice_id", 13i64);
        let errors = schema.validate(&record);
        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("notice_id"));
    }

    #[test]
    fn test_encode_decode_record() {
        let schema = notice_builder().build().unwrap();
        let mut record = schema
            .new_record()
            .set("receiver_id", 2i64)
            .set("category", "ask")
            .set("notice_id", 5i64);
        record.set_created_at(Some(1_700_000_000.5));

        let fields = schema.encode_record("5", &record).unwrap();
        assert_eq!(fields[0], ("id".to_string(), "5".to_string()));
        let hash: HashMap<String, String> = fields.into_iter().collect();
        assert_eq!(hash["_created_at"], "1700000000.5");

        let decoded = schema.decode_record("5", &hash).unwrap();
        assert_eq!(decoded.id(), Some("5"));
        assert_eq!(decoded.get("notice_id"), &Value::Int(5));
        assert_eq!(decoded.get("category").as_str(), Some("ask"));
        assert_eq!(decoded.created_at(), Some(1_700_000_000.5));
    }

    #[test]
    fn test_stamp_times() {
        let schema = notice_builder().build().unwrap();
        let mut record = Record::new();
        schema.stamp_times(&mut record, Timestamp::from_secs(1_000), true);
        assert_eq!(record.get("date_created").as_datetime().unwrap().timestamp(), 1_000);

        // auto_now_add does not fire on update
        let mut later = Record::new();
        schema.stamp_times(&mut later, Timestamp::from_secs(2_000), false);
        assert!(later.get("date_created").is_null());
    }
}
