//! Expiry index
//!
//! Deadlines → keys, ordered by deadline, so a sweep touches only the keys
//! that are due instead of scanning the keyspace. Lazy eviction on access
//! keeps the index in step by calling [`ExpiryIndex::remove`].

use std::collections::BTreeMap;
use std::time::Duration;

use kvmodel_core::Timestamp;
use rustc_hash::FxHashSet;

/// deadline → keys expiring at that instant
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    index: BTreeMap<Timestamp, FxHashSet<String>>,
}

impl ExpiryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `key` as expiring at `at`
    pub fn insert(&mut self, at: Timestamp, key: &str) {
        self.index.entry(at).or_default().insert(key.to_string());
    }

    /// Stop tracking `key` at `at`
    ///
    /// Called when a key is deleted, persisted or re-expired.
    pub fn remove(&mut self, at: Timestamp, key: &str) {
        if let Some(keys) = self.index.get_mut(&at) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&at);
            }
        }
    }

    /// Untrack and return every key whose deadline is at or before `now`
    pub fn take_expired(&mut self, now: Timestamp) -> Vec<String> {
        let pending = self.index.split_off(&now.after(Duration::from_micros(1)));
        let due = std::mem::replace(&mut self.index, pending);
        due.into_values().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut keys: Vec<String>) -> Vec<String> {
        keys.sort();
        keys
    }

    #[test]
    fn test_take_expired_is_inclusive_and_drains() {
        let mut idx = ExpiryIndex::new();
        idx.insert(Timestamp::from_secs(10), "a");
        idx.insert(Timestamp::from_secs(10), "b");
        idx.insert(Timestamp::from_secs(20), "c");

        assert!(idx.take_expired(Timestamp::from_secs(9)).is_empty());
        assert_eq!(sorted(idx.take_expired(Timestamp::from_secs(10))), vec!["a", "b"]);
        // already taken
        assert!(idx.take_expired(Timestamp::from_secs(10)).is_empty());
        assert_eq!(idx.take_expired(Timestamp::from_secs(30)), vec!["c"]);
    }

    #[test]
    fn test_removed_key_is_not_returned() {
        let mut idx = ExpiryIndex::new();
        idx.insert(Timestamp::from_secs(10), "a");
        idx.insert(Timestamp::from_secs(10), "b");
        idx.remove(Timestamp::from_secs(10), "a");
        // removing an unknown key is a no-op
        idx.remove(Timestamp::from_secs(99), "a");

        assert_eq!(idx.take_expired(Timestamp::from_secs(10)), vec!["b"]);
    }
}
