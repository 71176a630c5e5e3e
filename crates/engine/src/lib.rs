//! Object layer for kvmodel
//!
//! This crate turns a key-value store's hash, sorted-set and set commands
//! into schema-driven records with secondary indexes:
//! - Schema: attributes, index declarations, expiration
//! - Model: create, update, delete and fetch records
//! - Index maintenance: base, meta and unique composite sorted sets
//! - Self-healing rolling indexes over time shards for expiring models
//! - Query: immutable builder resolving filters to one index key
//! - Engine: per-store model registry and configuration
//!
//! The store is injected as an `Arc<dyn Store>`; nothing here holds global
//! state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod heal;
pub mod index;
pub mod model;
pub mod query;
pub mod record;
pub mod registry;
pub mod schema;

pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use index::{index_entries, IndexEntry, IndexWriter};
pub use model::Model;
pub use query::{field, Condition, Direction, Field, Op, Operand, OrderBy, Query};
pub use record::Record;
pub use registry::Engine;
pub use schema::{RecordValidator, Schema, SchemaBuilder};
