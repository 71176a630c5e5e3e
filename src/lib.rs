//! kvmodel - schema-driven records on a key-value store
//!
//! kvmodel builds CRUD, secondary indexes and range queries out of a store's
//! hash, sorted-set and set commands, with time-sharded, self-healing index
//! expiration for models whose records age out.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use kvmodel::{field, Attribute, Engine, MemoryStore, Record, Schema};
//!
//! let engine = Engine::new(Arc::new(MemoryStore::new()));
//! let notices = engine.register(
//!     Schema::builder("notice")
//!         .attribute(Attribute::integer("receiver_id").required().index_value())
//!         .attribute(Attribute::integer("notice_id").indexed())
//!         .meta_field("receiver_id")
//!         .build()?,
//! )?;
//!
//! notices.create(Record::new().set("receiver_id", 2).set("notice_id", 7))?;
//!
//! let latest = notices
//!     .query()
//!     .filter_by("receiver_id", 2)?
//!     .order_by(field("notice_id").desc())?
//!     .limit(10)?
//!     .all()?;
//! ```
//!
//! # Architecture
//!
//! - `kvmodel-core`: values, attributes and codecs, key derivation, errors
//! - `kvmodel-storage`: the `Store` contract and an in-memory store
//! - `kvmodel-engine`: schemas, models, index maintenance, queries

pub use kvmodel_core::{
    keys, Attribute, Clock, DefaultValue, Error, Expiration, FieldError, Kind, ManualClock,
    Result, ShardPolicy, SystemClock, Timestamp, ValidationErrors, Validator, Value,
};
pub use kvmodel_engine::{
    field, Condition, Direction, Engine, EngineConfig, Field, Model, Op, Operand, OrderBy, Query,
    Record, RecordValidator, Schema, SchemaBuilder, CONFIG_FILE_NAME,
};
pub use kvmodel_storage::{
    Command, ExpiryCleaner, MemoryStore, Pipeline, Reply, ScoreBound, SortedSet, Store,
};
