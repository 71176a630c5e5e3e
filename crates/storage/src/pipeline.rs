//! Command batching
//!
//! A [`Pipeline`] collects commands and submits them to a [`Store`] as a
//! single batch. It is sized by the caller to one logical write (record
//! hash plus its index keys), never across unrelated records.

use kvmodel_core::{Error, Result};

use crate::command::{Command, Reply, ScoreBound};
use crate::traits::Store;

/// Builder for a batch of commands
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Borrow the queued commands
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Queue an arbitrary command
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Queue HSET
    pub fn hset(&mut self, key: &str, fields: Vec<(String, String)>) -> &mut Self {
        self.push(Command::HSet {
            key: key.to_string(),
            fields,
        })
    }

    /// Queue HGETALL
    pub fn hgetall(&mut self, key: &str) -> &mut Self {
        self.push(Command::HGetAll { key: key.to_string() })
    }

    /// Queue DEL
    pub fn del(&mut self, key: &str) -> &mut Self {
        self.push(Command::Del { key: key.to_string() })
    }

    /// Queue EXISTS
    pub fn exists(&mut self, key: &str) -> &mut Self {
        self.push(Command::Exists { key: key.to_string() })
    }

    /// Queue EXPIRE
    pub fn expire(&mut self, key: &str, seconds: u64) -> &mut Self {
        self.push(Command::Expire {
            key: key.to_string(),
            seconds,
        })
    }

    /// Queue ZADD
    pub fn zadd(&mut self, key: &str, score: f64, member: &str) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.to_string(),
            score,
            member: member.to_string(),
        })
    }

    /// Queue ZREM
    pub fn zrem(&mut self, key: &str, member: &str) -> &mut Self {
        self.push(Command::ZRem {
            key: key.to_string(),
            member: member.to_string(),
        })
    }

    /// Queue ZRANGE / ZREVRANGE
    pub fn zrange(&mut self, key: &str, start: i64, stop: i64, rev: bool) -> &mut Self {
        self.push(Command::ZRange {
            key: key.to_string(),
            start,
            stop,
            rev,
        })
    }

    /// Queue ZRANGEBYSCORE / ZREVRANGEBYSCORE
    pub fn zrangebyscore(
        &mut self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        count: Option<usize>,
        rev: bool,
    ) -> &mut Self {
        self.push(Command::ZRangeByScore {
            key: key.to_string(),
            min,
            max,
            offset,
            count,
            rev,
        })
    }

    /// Queue ZCOUNT
    pub fn zcount(&mut self, key: &str, min: ScoreBound, max: ScoreBound) -> &mut Self {
        self.push(Command::ZCount {
            key: key.to_string(),
            min,
            max,
        })
    }

    /// Queue ZUNIONSTORE with MAX aggregation
    pub fn zunionstore_max(&mut self, dest: &str, keys: Vec<String>) -> &mut Self {
        self.push(Command::ZUnionStoreMax {
            dest: dest.to_string(),
            keys,
        })
    }

    /// Queue SADD
    pub fn sadd(&mut self, key: &str, member: &str) -> &mut Self {
        self.push(Command::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        })
    }

    /// Queue SREM
    pub fn srem(&mut self, key: &str, member: &str) -> &mut Self {
        self.push(Command::SRem {
            key: key.to_string(),
            member: member.to_string(),
        })
    }

    /// Submit the batch
    ///
    /// An empty pipeline does not touch the store.
    pub fn execute<S: Store + ?Sized>(self, store: &S) -> Result<Vec<Reply>> {
        if self.commands.is_empty() {
            return Ok(Vec::new());
        }
        let expected = self.commands.len();
        let replies = store.execute(self.commands)?;
        if replies.len() != expected {
            return Err(Error::store(format!(
                "batch of {} commands answered with {} replies",
                expected,
                replies.len()
            )));
        }
        Ok(replies)
    }
}
