//! Store layer for kvmodel
//!
//! This crate defines the key-value store contract the object layer is
//! written against, and an in-memory implementation of it:
//! - Command / Reply: hash, sorted-set and set primitives plus expiration
//! - Store: the client trait (one batch method, convenience helpers)
//! - Pipeline: builder that submits commands as one batch
//! - MemoryStore: single-process store with lazy expiry
//! - ExpiryIndex / ExpiryCleaner: bulk purge of expired keys
//!
//! # Batches
//!
//! A batch is ordered but not transactional. Writers that race on the same
//! keys resolve last-writer-wins; self-healing index reads tolerate the
//! resulting gaps.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleaner;
pub mod command;
pub mod memory;
pub mod pipeline;
pub mod sorted_set;
pub mod traits;
pub mod ttl;

pub use cleaner::ExpiryCleaner;
pub use command::{Command, Reply, ScoreBound};
pub use memory::MemoryStore;
pub use pipeline::Pipeline;
pub use sorted_set::SortedSet;
pub use traits::Store;
pub use ttl::ExpiryIndex;
