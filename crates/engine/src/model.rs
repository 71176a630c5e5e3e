//! Model: CRUD facade over one schema
//!
//! ## Design
//!
//! Model is a stateless facade. It holds the store handle, the schema, the
//! clock and the engine configuration, all behind `Arc`, so cloning is cheap
//! and clones share everything.
//!
//! ## Storage layout
//!
//! - record hash at `model:id`, one field per attribute plus `id` (and
//!   `_created_at` for expiring models)
//! - index memberships as described in [`index`](crate::index)
//!
//! ## Consistency
//!
//! The record hash and its index memberships are written in separate
//! batches. A failure in between leaves the indexes behind the hash; the
//! hash is the source of truth. The existence check in `create` and the
//! write that follows are not atomic either, so two concurrent creates of
//! the same id can both succeed (last writer wins).

use std::fmt;
use std::sync::Arc;

use kvmodel_core::keys::{is_safe_segment, record_key};
use kvmodel_core::{Clock, Error, Result, ShardPolicy, Timestamp, Value};
use kvmodel_storage::{Pipeline, Store};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::index::{index_entries, IndexWriter};
use crate::query::Query;
use crate::record::Record;
use crate::schema::Schema;

/// CRUD facade for one model
///
/// # Example
///
/// ```ignore
/// let notices = engine.register(schema)?;
///
/// let created = notices.create(
///     Record::new().set("receiver_id", 2).set("notice_id", 7),
/// )?;
/// let updated = notices.update(&created, [("title", Value::from("hi"))])?;
/// notices.delete(&updated)?;
/// ```
#[derive(Clone)]
pub struct Model {
    store: Arc<dyn Store>,
    schema: Arc<Schema>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl Model {
    /// Facade over `store` for `schema`
    pub fn new(
        store: Arc<dyn Store>,
        schema: Arc<Schema>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            schema,
            clock,
            config,
        }
    }

    /// Model name
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// The model's schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Shard policy, `None` for models that never expire
    pub fn policy(&self) -> Option<ShardPolicy> {
        ShardPolicy::with_padding(self.schema.expiration(), self.config.shard_window_padding)
    }

    fn writer(&self) -> IndexWriter<'_> {
        IndexWriter::new(self.store(), &self.schema, self.policy(), &self.config)
    }

    fn check_id(id: &str) -> Result<()> {
        if is_safe_segment(id) {
            Ok(())
        } else {
            Err(Error::parameter(format!("invalid record id '{}'", id)))
        }
    }

    fn record_key(&self, id: &str) -> String {
        record_key(self.name(), id)
    }

    // ========== Writes ==========

    /// Create a record
    ///
    /// Resolves defaults, stamps `auto_now`/`auto_now_add` attributes,
    /// assigns a UUID v4 id when the record has none, validates every
    /// attribute, then writes the hash and its index memberships.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` listing every violation
    /// - `Error::Integrity` if a record with the same id exists
    /// - `Error::Parameter` for an id that cannot be embedded in a key
    pub fn create(&self, record: Record) -> Result<Record> {
        let mut record = record;
        let now = self.now();
        self.schema.resolve_defaults(&mut record);
        self.schema.stamp_times(&mut record, now, true);

        let id = match record.id() {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        Self::check_id(&id)?;
        record.set_id(id.clone());

        self.schema.validate(&record).into_result()?;

        let key = self.record_key(&id);
        if self.store.exists(&key)? {
            return Err(Error::integrity(format!(
                "{} '{}' already exists",
                self.name(),
                id
            )));
        }

        let policy = self.policy();
        let stamp = self.schema.creation_stamp(&record, now)?;
        record.set_created_at(policy.map(|_| stamp));

        let entries = index_entries(&self.schema, &record)?;
        let mut p = Pipeline::new();
        p.hset(&key, self.schema.encode_record(&id, &record)?);
        if let Some(policy) = &policy {
            p.expire(&key, policy.expire_secs().saturating_mul(self.config.record_ttl_factor));
        }
        p.execute(self.store())?;
        self.writer().add(&id, stamp, &entries)?;

        info!(target: "kvmodel::model", model = self.name(), id = %id, "Created record");
        Ok(record)
    }

    /// Alias of [`create`](Self::create)
    pub fn save(&self, record: Record) -> Result<Record> {
        self.create(record)
    }

    /// Apply `changes` to a stored record
    ///
    /// The new values are `record` with `changes` applied on top. The stored
    /// hash is only compared against: fields whose storage encoding differs
    /// from it are the ones written. If any of them is an indexed or
    /// index-value field, every index membership is removed under the stored
    /// values and re-added under the new ones.
    ///
    /// # Errors
    ///
    /// - `Error::Parameter` if the record has no id or is not stored
    /// - `Error::Validation` if the updated record is invalid
    pub fn update<I, K, V>(&self, record: &Record, changes: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let id = record
            .id()
            .ok_or_else(|| Error::parameter("cannot update a record without an id"))?
            .to_string();
        Self::check_id(&id)?;

        let key = self.record_key(&id);
        let stored = self.store.hgetall(&key)?;
        if stored.is_empty() {
            return Err(Error::parameter(format!(
                "{} '{}' does not exist",
                self.name(),
                id
            )));
        }
        let old = self.schema.decode_record(&id, &stored)?;

        let mut new = record.clone();
        new.set_id(id.clone());
        new.set_created_at(old.created_at());
        for (name, value) in changes {
            new.insert(name, value);
        }
        self.schema.stamp_times(&mut new, self.now(), false);
        self.schema.validate(&new).into_result()?;

        // compare storage encodings: null and its placeholder are the same
        let mut changed: Vec<&str> = Vec::new();
        for attr in self.schema.attributes() {
            if attr.encode(old.get(attr.name()))? != attr.encode(new.get(attr.name()))? {
                changed.push(attr.name());
            }
        }
        if changed.is_empty() {
            return Ok(new);
        }

        let reindex = changed
            .iter()
            .any(|name| self.schema.is_indexed(name) || self.schema.is_index_value(name));

        if reindex {
            let writer = self.writer();
            writer.remove(&id, old.created_at(), &index_entries(&self.schema, &old)?)?;
            self.store.hset(&key, self.schema.encode_record(&id, &new)?)?;
            let stamp = match new.created_at() {
                Some(at) => at,
                None => self.schema.creation_stamp(&new, self.now())?,
            };
            writer.add(&id, stamp, &index_entries(&self.schema, &new)?)?;
        } else {
            let mut fields = Vec::with_capacity(changed.len());
            for name in &changed {
                if let Some(attr) = self.schema.attribute(name) {
                    fields.push((name.to_string(), attr.encode(new.get(name))?));
                }
            }
            self.store.hset(&key, fields)?;
        }

        debug!(
            target: "kvmodel::model",
            model = self.name(),
            id = %id,
            changed = ?changed,
            reindex,
            "Updated record"
        );
        Ok(new)
    }

    /// Delete a record by its id
    pub fn delete(&self, record: &Record) -> Result<bool> {
        let id = record
            .id()
            .ok_or_else(|| Error::parameter("cannot delete a record without an id"))?;
        self.delete_by_id(id)
    }

    /// Delete a record and every index membership
    ///
    /// Returns false (and writes nothing) if the record does not exist, so a
    /// repeated delete is a no-op.
    pub fn delete_by_id(&self, id: &str) -> Result<bool> {
        Self::check_id(id)?;
        let key = self.record_key(id);
        let stored = self.store.hgetall(&key)?;
        if stored.is_empty() {
            // leftovers from a partial delete
            self.writer().remove(id, None, &[])?;
            return Ok(false);
        }
        let old = self.schema.decode_record(id, &stored)?;
        self.writer()
            .remove(id, old.created_at(), &index_entries(&self.schema, &old)?)?;
        self.store.del(&key)?;

        info!(target: "kvmodel::model", model = self.name(), id, "Deleted record");
        Ok(true)
    }

    // ========== Reads ==========

    /// Fetch a record
    pub fn get_by_id(&self, id: &str) -> Result<Option<Record>> {
        Self::check_id(id)?;
        let stored = self.store.hgetall(&self.record_key(id))?;
        if stored.is_empty() {
            return Ok(None);
        }
        self.schema.decode_record(id, &stored).map(Some)
    }

    /// Fetch several records in one batch, `None` for misses, order preserved
    pub fn batch_get_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Option<Record>>> {
        let mut p = Pipeline::new();
        for id in ids {
            Self::check_id(id.as_ref())?;
            p.hgetall(&self.record_key(id.as_ref()));
        }
        let replies = p.execute(self.store())?;

        let mut records = Vec::with_capacity(ids.len());
        for (id, reply) in ids.iter().zip(replies) {
            let hash = reply.into_hash()?;
            if hash.is_empty() {
                records.push(None);
            } else {
                records.push(Some(self.schema.decode_record(id.as_ref(), &hash)?));
            }
        }
        Ok(records)
    }

    /// True if the record hash exists
    pub fn exists(&self, id: &str) -> Result<bool> {
        Self::check_id(id)?;
        self.store.exists(&self.record_key(id))
    }

    /// Start a query
    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &self.schema)
            .field("config", &self.config)
            .finish()
    }
}
