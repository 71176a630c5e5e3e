//! Index maintenance
//!
//! For every indexed field a record belongs to up to three families of
//! sorted sets, each holding `(record_id, score)`:
//! - base: `model:field`
//! - meta: `model:meta_field:meta_value:field` (when a meta field is declared)
//! - unique composite: `model:f1:v1:...:field` (one per tuple ending in `field`)
//!
//! Expiring models write into the time shard `key/bucket` of each logical
//! key, bucketed by the record's creation stamp. The rolling key itself is
//! only written when it already exists; otherwise it is rebuilt on the next
//! read (see [`heal`](crate::heal)).
//!
//! Per-record housekeeping sets (`model:id:_zindexes` and friends) list the
//! logical keys a record was added to, so a delete can find every key even
//! if the caller's view of the record is stale.
//!
//! Writes go out as pipelined batches without multi-key atomicity; a failed
//! batch can leave the indexes partially updated.

use kvmodel_core::keys::{
    base_index_key, bucket_key, composite_index_key, meta_index_key, BASE_BUCKET,
    COMPOSITE_BUCKET, META_BUCKET,
};
use kvmodel_core::{Result, ShardPolicy};
use kvmodel_storage::{Pipeline, Reply, Store};
use tracing::debug;

use crate::config::EngineConfig;
use crate::record::Record;
use crate::schema::Schema;

/// One logical index key a record belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Logical (rolling) sorted-set key
    pub key: String,
    /// Housekeeping bucket the key is listed under
    pub bucket: &'static str,
    /// Member score
    pub score: f64,
}

/// Every logical index key `record` belongs to, with its score
///
/// Indexed fields holding null are not indexed.
pub fn index_entries(schema: &Schema, record: &Record) -> Result<Vec<IndexEntry>> {
    let model = schema.name();
    let mut entries = Vec::new();

    for field in schema.indexed_fields() {
        let attr = match schema.attribute(field) {
            Some(attr) => attr,
            None => continue,
        };
        let score = match attr.score(record.get(field))? {
            Some(score) => score,
            None => continue,
        };

        entries.push(IndexEntry {
            key: base_index_key(model, field),
            bucket: BASE_BUCKET,
            score,
        });

        if let Some(meta) = schema.meta_field() {
            if let Some(meta_attr) = schema.attribute(meta) {
                let meta_value = meta_attr.encode(record.get(meta))?;
                entries.push(IndexEntry {
                    key: meta_index_key(model, meta, &meta_value, field),
                    bucket: META_BUCKET,
                    score,
                });
            }
        }

        for tuple in schema.unique_indexes() {
            let (sort, filters) = match tuple.split_last() {
                Some(parts) => parts,
                None => continue,
            };
            if sort != field {
                continue;
            }
            let mut pairs = Vec::with_capacity(filters.len());
            for name in filters {
                if let Some(filter_attr) = schema.attribute(name) {
                    pairs.push((name.as_str(), filter_attr.encode(record.get(name))?));
                }
            }
            entries.push(IndexEntry {
                key: composite_index_key(
                    model,
                    pairs.iter().map(|(f, v)| (*f, v.as_str())),
                    field,
                ),
                bucket: COMPOSITE_BUCKET,
                score,
            });
        }
    }
    Ok(entries)
}

/// Writes and removes index memberships for one model
pub struct IndexWriter<'a> {
    store: &'a dyn Store,
    schema: &'a Schema,
    policy: Option<ShardPolicy>,
    config: &'a EngineConfig,
}

impl<'a> IndexWriter<'a> {
    /// Writer over `store` for `schema`
    pub fn new(
        store: &'a dyn Store,
        schema: &'a Schema,
        policy: Option<ShardPolicy>,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            schema,
            policy,
            config,
        }
    }

    fn shard_ttl(&self, policy: &ShardPolicy) -> u64 {
        policy.expire_secs().saturating_mul(self.config.shard_ttl_factor)
    }

    fn record_ttl(&self, policy: &ShardPolicy) -> u64 {
        policy.expire_secs().saturating_mul(self.config.record_ttl_factor)
    }

    /// Add `id` to every key in `entries`
    ///
    /// `created_at` places the member in its shard (expiring models only).
    pub fn add(&self, id: &str, created_at: f64, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let model = self.schema.name();

        let policy = match self.policy {
            None => {
                let mut p = Pipeline::new();
                for entry in entries {
                    p.zadd(&entry.key, entry.score, id)
                        .sadd(&bucket_key(model, id, entry.bucket), &entry.key);
                }
                p.execute(self.store)?;
                debug!(target: "kvmodel::index", model, id, keys = entries.len(), "Indexed record");
                return Ok(());
            }
            Some(policy) => policy,
        };

        // which rolling keys are currently materialized
        let mut probe = Pipeline::new();
        for entry in entries {
            probe.exists(&entry.key);
        }
        let live = probe.execute(self.store)?;

        let shard_ttl = self.shard_ttl(&policy);
        let record_ttl = self.record_ttl(&policy);
        let mut p = Pipeline::new();
        let mut rolling = 0usize;
        for (entry, reply) in entries.iter().zip(live) {
            let shard = policy.shard_key_at(&entry.key, created_at);
            p.zadd(&shard, entry.score, id).expire(&shard, shard_ttl);
            if reply == Reply::Bool(true) {
                p.zadd(&entry.key, entry.score, id)
                    .expire(&entry.key, policy.expire_secs());
                rolling += 1;
            }
            let bucket = bucket_key(model, id, entry.bucket);
            p.sadd(&bucket, &entry.key).expire(&bucket, record_ttl);
        }
        p.execute(self.store)?;

        debug!(
            target: "kvmodel::index",
            model,
            id,
            keys = entries.len(),
            rolling,
            bucket = policy.bucket_for_secs(created_at),
            "Indexed record"
        );
        Ok(())
    }

    /// Remove `id` from every key in `entries` and every key listed in its
    /// housekeeping sets
    ///
    /// `created_at` targets the shard the member was written to, not the
    /// current one.
    pub fn remove(&self, id: &str, created_at: Option<f64>, entries: &[IndexEntry]) -> Result<()> {
        let model = self.schema.name();

        let buckets = [BASE_BUCKET, META_BUCKET, COMPOSITE_BUCKET];
        let mut keys: Vec<(String, &'static str)> = entries
            .iter()
            .map(|e| (e.key.clone(), e.bucket))
            .collect();
        for bucket in buckets {
            for key in self.store.smembers(&bucket_key(model, id, bucket))? {
                if !keys.iter().any(|(k, _)| *k == key) {
                    keys.push((key, bucket));
                }
            }
        }
        if keys.is_empty() {
            return Ok(());
        }

        let mut p = Pipeline::new();
        for (key, bucket) in &keys {
            p.zrem(key, id);
            if let (Some(policy), Some(at)) = (self.policy, created_at) {
                p.zrem(&policy.shard_key_at(key, at), id);
            }
            p.srem(&bucket_key(model, id, bucket), key);
        }
        p.execute(self.store)?;

        debug!(target: "kvmodel::index", model, id, keys = keys.len(), "Unindexed record");
        Ok(())
    }
}
