//! Self-healing range index
//!
//! The rolling key of an expiring model is a cached max-aggregate union of
//! its most recent time shards. When it has expired (or was never built) the
//! next read rebuilds it and gives it the model expiration again.
//!
//! Rebuilding is idempotent: two readers racing to heal the same key compute
//! the same union, the second one merely redundantly.

use kvmodel_core::keys::union_key;
use kvmodel_core::{Result, ShardPolicy, Timestamp};
use kvmodel_storage::{Pipeline, Store};
use tracing::{debug, info};

/// Make sure the rolling `key` exists, rebuilding it from shards if not
///
/// Returns true if a rebuild happened. A rebuild that finds no members leaves
/// the key absent.
pub fn ensure_rolling(
    store: &dyn Store,
    policy: &ShardPolicy,
    key: &str,
    now: Timestamp,
) -> Result<bool> {
    if store.exists(key)? {
        return Ok(false);
    }
    let shards = policy.recent_shard_keys(key, now);
    let members = store.zunionstore_max(key, &shards)?;
    if members == 0 {
        debug!(target: "kvmodel::heal", key, shards = shards.len(), "No members to rebuild");
        return Ok(true);
    }
    store.expire(key, policy.expire_secs())?;
    info!(
        target: "kvmodel::heal",
        key,
        shards = shards.len(),
        members,
        ttl = policy.expire_secs(),
        "Rebuilt rolling index"
    );
    Ok(true)
}

/// Merge several index keys into one cached key
///
/// A single key is returned as is. Otherwise the union is stored under a
/// digest of the source keys for `ttl_secs` and reused until it expires.
pub fn union_cache(store: &dyn Store, model: &str, keys: &[String], ttl_secs: u64) -> Result<String> {
    if let [only] = keys {
        return Ok(only.clone());
    }
    let dest = union_key(model, keys);
    if store.exists(&dest)? {
        debug!(target: "kvmodel::heal", key = %dest, "Union cache hit");
        return Ok(dest);
    }

    let mut p = Pipeline::new();
    p.zunionstore_max(&dest, keys.to_vec()).expire(&dest, ttl_secs);
    let replies = p.execute(store)?;
    debug!(
        target: "kvmodel::heal",
        key = %dest,
        sources = keys.len(),
        reply = ?replies.first(),
        "Union cached"
    );
    Ok(dest)
}
