//! Store client abstraction
//!
//! [`Store`] is the only seam between the object layer and the key-value
//! store. Implementations need one method, [`Store::execute`], which runs a
//! batch of commands and answers with one reply per command. The batch is a
//! pipeline, not a transaction: commands run in order, but another client's
//! commands may interleave between batches and nothing is rolled back if the
//! batch fails part way.
//!
//! Thread safety: all methods must be safe to call concurrently (Send + Sync).

use std::collections::HashMap;

use kvmodel_core::{Error, Result};

use crate::command::{Command, Reply, ScoreBound};

/// Key-value store client
pub trait Store: Send + Sync {
    /// Execute a batch of commands in order
    ///
    /// Returns exactly one reply per command.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` on transport failure or when a command is
    /// applied to a key holding the wrong type.
    fn execute(&self, commands: Vec<Command>) -> Result<Vec<Reply>>;

    /// Execute a single command
    fn execute_one(&self, command: Command) -> Result<Reply> {
        let name = command.name();
        self.execute(vec![command])?
            .pop()
            .ok_or_else(|| Error::store(format!("no reply for {}", name)))
    }

    /// Read a whole hash; empty when missing
    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.execute_one(Command::HGetAll { key: key.to_string() })?
            .into_hash()
    }

    /// Set several hash fields
    fn hset(&self, key: &str, fields: Vec<(String, String)>) -> Result<()> {
        self.execute_one(Command::HSet {
            key: key.to_string(),
            fields,
        })?;
        Ok(())
    }

    /// Does the key exist
    fn exists(&self, key: &str) -> Result<bool> {
        self.execute_one(Command::Exists { key: key.to_string() })?
            .into_bool()
    }

    /// Delete a key; true if it existed
    fn del(&self, key: &str) -> Result<bool> {
        self.execute_one(Command::Del { key: key.to_string() })?
            .into_bool()
    }

    /// Set a TTL; false if the key does not exist
    fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        self.execute_one(Command::Expire {
            key: key.to_string(),
            seconds,
        })?
        .into_bool()
    }

    /// Remaining TTL in seconds (-2 missing, -1 persistent)
    fn ttl(&self, key: &str) -> Result<i64> {
        self.execute_one(Command::Ttl { key: key.to_string() })?
            .into_int()
    }

    /// Add or re-score a member; true if it was new
    fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        self.execute_one(Command::ZAdd {
            key: key.to_string(),
            score,
            member: member.to_string(),
        })?
        .into_bool()
    }

    /// Remove a member; true if it was present
    fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        self.execute_one(Command::ZRem {
            key: key.to_string(),
            member: member.to_string(),
        })?
        .into_bool()
    }

    /// Score of a member
    fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.execute_one(Command::ZScore {
            key: key.to_string(),
            member: member.to_string(),
        })?
        .into_score()
    }

    /// Sorted-set cardinality
    fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self
            .execute_one(Command::ZCard { key: key.to_string() })?
            .into_int()? as u64)
    }

    /// Members within a score range
    fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> Result<u64> {
        Ok(self
            .execute_one(Command::ZCount {
                key: key.to_string(),
                min,
                max,
            })?
            .into_int()? as u64)
    }

    /// Members by rank
    fn zrange(&self, key: &str, start: i64, stop: i64, rev: bool) -> Result<Vec<String>> {
        self.execute_one(Command::ZRange {
            key: key.to_string(),
            start,
            stop,
            rev,
        })?
        .into_members()
    }

    /// Members by score range with paging
    fn zrangebyscore(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        count: Option<usize>,
        rev: bool,
    ) -> Result<Vec<String>> {
        self.execute_one(Command::ZRangeByScore {
            key: key.to_string(),
            min,
            max,
            offset,
            count,
            rev,
        })?
        .into_members()
    }

    /// Max-aggregate union of `keys` stored at `dest`; returns its cardinality
    fn zunionstore_max(&self, dest: &str, keys: &[String]) -> Result<u64> {
        Ok(self
            .execute_one(Command::ZUnionStoreMax {
                dest: dest.to_string(),
                keys: keys.to_vec(),
            })?
            .into_int()? as u64)
    }

    /// Add a set member; true if it was new
    fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.execute_one(Command::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        })?
        .into_bool()
    }

    /// Remove a set member; true if it was present
    fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.execute_one(Command::SRem {
            key: key.to_string(),
            member: member.to_string(),
        })?
        .into_bool()
    }

    /// All set members
    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.execute_one(Command::SMembers { key: key.to_string() })?
            .into_members()
    }
}
