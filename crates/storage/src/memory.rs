//! In-memory store
//!
//! [`MemoryStore`] implements the full [`Store`] contract over a single
//! keyspace guarded by one mutex. Each batch takes the lock once, so a batch
//! is applied without interleaving from other clients.
//!
//! # Expiration
//!
//! Keys carry an optional expiry instant read from the store's [`Clock`].
//! Expired keys are invisible to every command and are removed lazily when
//! touched, or in bulk by [`MemoryStore::purge_expired`] (see
//! [`ExpiryCleaner`](crate::ExpiryCleaner)). Tests drive time with a
//! [`ManualClock`](kvmodel_core::ManualClock).
//!
//! # Types
//!
//! Each key holds a hash, a sorted set or a set. Applying a command to a key
//! of another type fails the batch with `Error::Store`. Containers that
//! become empty are deleted, as in Redis.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kvmodel_core::{Clock, Error, Result, SystemClock, Timestamp};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::command::{Command, Reply};
use crate::sorted_set::SortedSet;
use crate::traits::Store;
use crate::ttl::ExpiryIndex;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Slot {
    Hash(FxHashMap<String, String>),
    ZSet(SortedSet),
    Set(FxHashSet<String>),
}

impl Slot {
    fn is_empty(&self) -> bool {
        match self {
            Slot::Hash(h) => h.is_empty(),
            Slot::ZSet(z) => z.is_empty(),
            Slot::Set(s) => s.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: FxHashMap<String, Entry>,
    expiry: ExpiryIndex,
}

impl Keyspace {
    /// Drop `key` if its expiry has passed
    fn evict_if_expired(&mut self, key: &str, now: Timestamp) {
        let expired = matches!(
            self.entries.get(key),
            Some(Entry { expires_at: Some(at), .. }) if *at <= now
        );
        if expired {
            self.remove(key);
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                if let Some(at) = entry.expires_at {
                    self.expiry.remove(at, key);
                }
                true
            }
            None => false,
        }
    }

    fn live(&mut self, key: &str, now: Timestamp) -> Option<&mut Entry> {
        self.evict_if_expired(key, now);
        self.entries.get_mut(key)
    }

    /// Remove the key if its container became empty
    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).map_or(false, |e| e.slot.is_empty()) {
            self.remove(key);
        }
    }

    fn hash_mut(&mut self, key: &str, now: Timestamp) -> Result<&mut FxHashMap<String, String>> {
        self.evict_if_expired(key, now);
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Hash(FxHashMap::default()),
            expires_at: None,
        });
        match &mut entry.slot {
            Slot::Hash(h) => Ok(h),
            _ => Err(Error::store(WRONG_TYPE)),
        }
    }

    fn zset_mut(&mut self, key: &str, now: Timestamp) -> Result<&mut SortedSet> {
        self.evict_if_expired(key, now);
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::ZSet(SortedSet::new()),
            expires_at: None,
        });
        match &mut entry.slot {
            Slot::ZSet(z) => Ok(z),
            _ => Err(Error::store(WRONG_TYPE)),
        }
    }

    fn set_mut(&mut self, key: &str, now: Timestamp) -> Result<&mut FxHashSet<String>> {
        self.evict_if_expired(key, now);
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Set(FxHashSet::default()),
            expires_at: None,
        });
        match &mut entry.slot {
            Slot::Set(s) => Ok(s),
            _ => Err(Error::store(WRONG_TYPE)),
        }
    }

    fn zset(&mut self, key: &str, now: Timestamp) -> Result<Option<&SortedSet>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Entry { slot: Slot::ZSet(z), .. }) => Ok(Some(z)),
            Some(_) => Err(Error::store(WRONG_TYPE)),
        }
    }

    fn set_expiry(&mut self, key: &str, at: Option<Timestamp>) {
        if let Some(entry) = self.entries.get_mut(key) {
            let previous = std::mem::replace(&mut entry.expires_at, at);
            if let Some(prev) = previous {
                self.expiry.remove(prev, key);
            }
            if let Some(at) = at {
                self.expiry.insert(at, key);
            }
        }
    }

    fn apply(&mut self, command: Command, now: Timestamp) -> Result<Reply> {
        match command {
            Command::HSet { key, fields } => {
                let hash = self.hash_mut(&key, now)?;
                let mut added = 0;
                for (field, value) in fields {
                    if hash.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                self.drop_if_empty(&key);
                Ok(Reply::Int(added))
            }
            Command::HGetAll { key } => match self.live(&key, now) {
                None => Ok(Reply::Hash(HashMap::new())),
                Some(Entry { slot: Slot::Hash(h), .. }) => Ok(Reply::Hash(
                    h.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                )),
                Some(_) => Err(Error::store(WRONG_TYPE)),
            },
            Command::Del { key } => {
                self.evict_if_expired(&key, now);
                Ok(Reply::Bool(self.remove(&key)))
            }
            Command::Exists { key } => Ok(Reply::Bool(self.live(&key, now).is_some())),
            Command::Expire { key, seconds } => {
                if self.live(&key, now).is_none() {
                    return Ok(Reply::Bool(false));
                }
                if seconds == 0 {
                    self.remove(&key);
                } else {
                    let at = now.after(Duration::from_secs(seconds));
                    self.set_expiry(&key, Some(at));
                }
                Ok(Reply::Bool(true))
            }
            Command::Ttl { key } => match self.live(&key, now) {
                None => Ok(Reply::Int(-2)),
                Some(Entry { expires_at: None, .. }) => Ok(Reply::Int(-1)),
                Some(Entry { expires_at: Some(at), .. }) => {
                    let remaining = at.as_micros().saturating_sub(now.as_micros());
                    Ok(Reply::Int(((remaining + 500_000) / 1_000_000) as i64))
                }
            },
            Command::ZAdd { key, score, member } => {
                if score.is_nan() {
                    return Err(Error::store("ZADD score is not a number"));
                }
                let added = self.zset_mut(&key, now)?.insert(&member, score);
                Ok(Reply::Int(added as i64))
            }
            Command::ZRem { key, member } => {
                let present = self.zset(&key, now)?.is_some();
                let removed = present && self.zset_mut(&key, now)?.remove(&member);
                self.drop_if_empty(&key);
                Ok(Reply::Int(removed as i64))
            }
            Command::ZRange { key, start, stop, rev } => Ok(Reply::Members(
                self.zset(&key, now)?
                    .map(|z| z.range_by_rank(start, stop, rev))
                    .unwrap_or_default(),
            )),
            Command::ZRangeByScore {
                key,
                min,
                max,
                offset,
                count,
                rev,
            } => Ok(Reply::Members(
                self.zset(&key, now)?
                    .map(|z| z.range_by_score(min, max, offset, count, rev))
                    .unwrap_or_default(),
            )),
            Command::ZCount { key, min, max } => Ok(Reply::Int(
                self.zset(&key, now)?.map_or(0, |z| z.count(min, max)) as i64,
            )),
            Command::ZCard { key } => Ok(Reply::Int(
                self.zset(&key, now)?.map_or(0, |z| z.len()) as i64,
            )),
            Command::ZScore { key, member } => Ok(Reply::Float(
                self.zset(&key, now)?.and_then(|z| z.score(&member)),
            )),
            Command::ZUnionStoreMax { dest, keys } => {
                let mut union = SortedSet::new();
                for key in &keys {
                    if let Some(z) = self.zset(key, now)? {
                        union.union_max(z);
                    }
                }
                self.remove(&dest);
                let card = union.len() as i64;
                if !union.is_empty() {
                    self.entries.insert(
                        dest,
                        Entry {
                            slot: Slot::ZSet(union),
                            expires_at: None,
                        },
                    );
                }
                Ok(Reply::Int(card))
            }
            Command::SAdd { key, member } => {
                let added = self.set_mut(&key, now)?.insert(member);
                Ok(Reply::Int(added as i64))
            }
            Command::SRem { key, member } => {
                let removed = match self.live(&key, now) {
                    None => false,
                    Some(Entry { slot: Slot::Set(s), .. }) => s.remove(&member),
                    Some(_) => return Err(Error::store(WRONG_TYPE)),
                };
                self.drop_if_empty(&key);
                Ok(Reply::Int(removed as i64))
            }
            Command::SMembers { key } => match self.live(&key, now) {
                None => Ok(Reply::Members(Vec::new())),
                Some(Entry { slot: Slot::Set(s), .. }) => {
                    let mut members: Vec<String> = s.iter().cloned().collect();
                    members.sort();
                    Ok(Reply::Members(members))
                }
                Some(_) => Err(Error::store(WRONG_TYPE)),
            },
        }
    }
}

/// Single-process store with Redis-like semantics
pub struct MemoryStore {
    inner: Mutex<Keyspace>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Keyspace::default()),
            clock,
        }
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        let now = self.clock.now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.expires_at.map_or(true, |at| at > now))
            .count()
    }

    /// Live keys starting with `prefix`, sorted
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.expires_at.map_or(true, |at| at > now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remove every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired = inner.expiry.take_expired(now);
        let mut purged = 0;
        for key in expired {
            if inner.remove(&key) {
                purged += 1;
            }
        }
        if purged > 0 {
            trace!(target: "kvmodel::store", purged, "Purged expired keys");
        }
        purged
    }

    /// Remove every key
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.expiry = ExpiryIndex::new();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.inner.lock().entries.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl Store for MemoryStore {
    fn execute(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            let name = command.name();
            match inner.apply(command, now) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    debug!(target: "kvmodel::store", command = name, error = %e, "Batch aborted");
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }
}
