//! Error types for kvmodel
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - `Validation`: one or more field-level violations, always the full list
//! - `Query`: a query that cannot be built (raised before any store access)
//! - `Integrity`: duplicate id on create
//! - `Parameter`: malformed caller input
//! - `Schema`: an invalid model declaration
//! - `Codec`: a stored string that cannot be decoded
//! - `Store`: transport or protocol failure in the store client
//! - `Config`: configuration that cannot be read or parsed

use std::fmt;
use thiserror::Error;

/// Result type alias for kvmodel operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single field-level violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Attribute name the violation refers to
    pub field: String,
    /// Human readable reason ("required", "exceeds max length", ...)
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Accumulated validation violations
///
/// Validation never stops at the first problem: every attribute is checked
/// and all violations are carried together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// Create an empty list
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append one violation
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// Append many violations
    pub fn extend(&mut self, errors: impl IntoIterator<Item = FieldError>) {
        self.0.extend(errors);
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of violations
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Borrow the violations
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// True if any violation refers to `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Convert into `Ok(())` when empty, `Err(Error::Validation)` otherwise
    pub fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Error types for kvmodel
#[derive(Debug, Error)]
pub enum Error {
    /// One or more field-level violations
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Query could not be constructed from the given filters and ordering
    #[error("Invalid query: {0}")]
    Query(String),

    /// A record with the same id already exists
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Malformed caller input
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    /// Invalid model declaration
    #[error("Invalid schema: {0}")]
    Schema(String),

    /// Stored value could not be decoded for its attribute kind
    #[error("Codec error on field '{field}': {message}")]
    Codec {
        /// Attribute being decoded
        field: String,
        /// What went wrong
        message: String,
    },

    /// Store transport or protocol failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a validation error from a single violation
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(ValidationErrors::from(vec![FieldError::new(field, message)]))
    }

    /// Build a query construction error
    pub fn query(msg: impl Into<String>) -> Self {
        Error::Query(msg.into())
    }

    /// Build an integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Error::Integrity(msg.into())
    }

    /// Build a parameter error
    pub fn parameter(msg: impl Into<String>) -> Self {
        Error::Parameter(msg.into())
    }

    /// Build a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Build a codec error
    pub fn codec(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Codec {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Build a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// True for `Error::Validation`
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// True for `Error::Query`
    pub fn is_query(&self) -> bool {
        matches!(self, Error::Query(_))
    }

    /// True for `Error::Integrity`
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }

    /// True for `Error::Parameter`
    pub fn is_parameter(&self) -> bool {
        matches!(self, Error::Parameter(_))
    }

    /// Violations carried by a validation error, if this is one
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Error::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::codec("<json>", e.to_string())
    }
}
