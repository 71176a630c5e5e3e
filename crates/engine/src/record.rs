//! Records
//!
//! A [`Record`] is an explicit mapping from attribute name to value plus the
//! record id. Attributes absent from the map read as `Value::Null`.

use std::collections::BTreeMap;

use kvmodel_core::Value;

static NULL: Value = Value::Null;

/// One instance of a model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    id: Option<String>,
    values: BTreeMap<String, Value>,
    created_at: Option<f64>,
}

impl Record {
    /// Empty record without an id
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty record with the given id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Builder-style setter
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Set an attribute in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Remove an attribute, returning its value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Attribute value, `Value::Null` when absent
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    /// True if the attribute has been set (even to null)
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// All set attributes
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Record id, once assigned
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assign the id
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Creation stamp (seconds since epoch) used for shard placement
    ///
    /// Only expiring models persist this.
    pub fn created_at(&self) -> Option<f64> {
        self.created_at
    }

    pub(crate) fn set_created_at(&mut self, at: Option<f64>) {
        self.created_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_reads_null() {
        let r = Record::new().set("title", "hello");
        assert_eq!(r.get("title").as_str(), Some("hello"));
        assert!(r.get("missing").is_null());
        assert!(!r.contains("missing"));
        assert!(r.id().is_none());
    }

    #[test]
    fn test_id_assignment() {
        let mut r = Record::with_id("6");
        assert_eq!(r.id(), Some("6"));
        r.set_id("7");
        assert_eq!(r.id(), Some("7"));
    }

    #[test]
    fn test_insert_and_remove() {
        let mut r = Record::new();
        r.insert("n", 3i64);
        assert_eq!(r.remove("n"), Some(Value::Int(3)));
        assert!(r.values().is_empty());
    }
}
