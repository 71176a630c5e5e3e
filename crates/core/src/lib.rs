//! Core types for kvmodel
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: Error taxonomy (validation, query, integrity, parameter, ...)
//! - Value: Native attribute values
//! - Attribute / Kind: Typed field descriptors with codecs and validation
//! - Timestamp / Clock: Time sources shared by engine and store
//! - Key derivation: record, index, shard and union keys
//! - ShardPolicy: Time-bucketing of expiring indexes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribute;
pub mod codec;
pub mod error;
pub mod keys;
pub mod timestamp;
pub mod value;

pub use attribute::{Attribute, DefaultValue, Kind, Validator, DEFAULT_MAX_LENGTH};
pub use error::{Error, FieldError, Result, ValidationErrors};
pub use keys::{Expiration, KeyPath, ShardPolicy};
pub use timestamp::{Clock, ManualClock, SystemClock, Timestamp};
pub use value::Value;
