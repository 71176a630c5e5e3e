//! Store commands and replies
//!
//! The store contract is deliberately small: hash, sorted-set and set
//! primitives plus key existence and expiration. A batch of [`Command`]s is
//! submitted together and answered by one [`Reply`] per command, in order.

use std::collections::HashMap;
use std::fmt;

use kvmodel_core::{Error, Result};

/// One end of a score range
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    /// Unbounded below
    NegInf,
    /// Unbounded above
    PosInf,
    /// Includes the score itself
    Inclusive(f64),
    /// Excludes the score itself
    Exclusive(f64),
}

impl ScoreBound {
    /// True if `score` is not below this bound used as a minimum
    pub fn admits_as_min(&self, score: f64) -> bool {
        match self {
            ScoreBound::NegInf => true,
            ScoreBound::PosInf => false,
            ScoreBound::Inclusive(v) => score >= *v,
            ScoreBound::Exclusive(v) => score > *v,
        }
    }

    /// True if `score` is not above this bound used as a maximum
    pub fn admits_as_max(&self, score: f64) -> bool {
        match self {
            ScoreBound::NegInf => false,
            ScoreBound::PosInf => true,
            ScoreBound::Inclusive(v) => score <= *v,
            ScoreBound::Exclusive(v) => score < *v,
        }
    }

    /// True if `score` lies within `[min, max]` as written
    pub fn contains(min: ScoreBound, max: ScoreBound, score: f64) -> bool {
        min.admits_as_min(score) && max.admits_as_max(score)
    }
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::NegInf => f.write_str("-inf"),
            ScoreBound::PosInf => f.write_str("+inf"),
            ScoreBound::Inclusive(v) => write!(f, "{}", v),
            ScoreBound::Exclusive(v) => write!(f, "({}", v),
        }
    }
}

/// A single store command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set several hash fields
    HSet {
        /// Hash key
        key: String,
        /// Field/value pairs
        fields: Vec<(String, String)>,
    },
    /// Read a whole hash
    HGetAll {
        /// Hash key
        key: String,
    },
    /// Delete a key of any type
    Del {
        /// Key
        key: String,
    },
    /// Does the key exist
    Exists {
        /// Key
        key: String,
    },
    /// Set a time-to-live on an existing key
    Expire {
        /// Key
        key: String,
        /// Seconds from now; zero deletes the key
        seconds: u64,
    },
    /// Remaining time-to-live in seconds (-2 missing, -1 persistent)
    Ttl {
        /// Key
        key: String,
    },
    /// Add or re-score a sorted-set member
    ZAdd {
        /// Sorted-set key
        key: String,
        /// Score
        score: f64,
        /// Member
        member: String,
    },
    /// Remove a sorted-set member
    ZRem {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
    },
    /// Members by rank, inclusive, negative ranks count from the end
    ZRange {
        /// Sorted-set key
        key: String,
        /// First rank
        start: i64,
        /// Last rank
        stop: i64,
        /// Highest score first
        rev: bool,
    },
    /// Members by score range with paging
    ZRangeByScore {
        /// Sorted-set key
        key: String,
        /// Lower bound
        min: ScoreBound,
        /// Upper bound
        max: ScoreBound,
        /// Members to skip
        offset: usize,
        /// Maximum members to return
        count: Option<usize>,
        /// Highest score first
        rev: bool,
    },
    /// Members within a score range
    ZCount {
        /// Sorted-set key
        key: String,
        /// Lower bound
        min: ScoreBound,
        /// Upper bound
        max: ScoreBound,
    },
    /// Sorted-set cardinality
    ZCard {
        /// Sorted-set key
        key: String,
    },
    /// Score of a member
    ZScore {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
    },
    /// Store the union of `keys` at `dest`, keeping each member's maximum score
    ZUnionStoreMax {
        /// Destination key (overwritten)
        dest: String,
        /// Source sorted sets; missing keys count as empty
        keys: Vec<String>,
    },
    /// Add a set member
    SAdd {
        /// Set key
        key: String,
        /// Member
        member: String,
    },
    /// Remove a set member
    SRem {
        /// Set key
        key: String,
        /// Member
        member: String,
    },
    /// All set members
    SMembers {
        /// Set key
        key: String,
    },
}

impl Command {
    /// Command name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::HSet { .. } => "HSET",
            Command::HGetAll { .. } => "HGETALL",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Expire { .. } => "EXPIRE",
            Command::Ttl { .. } => "TTL",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZRange { rev: false, .. } => "ZRANGE",
            Command::ZRange { rev: true, .. } => "ZREVRANGE",
            Command::ZRangeByScore { rev: false, .. } => "ZRANGEBYSCORE",
            Command::ZRangeByScore { rev: true, .. } => "ZREVRANGEBYSCORE",
            Command::ZCount { .. } => "ZCOUNT",
            Command::ZCard { .. } => "ZCARD",
            Command::ZScore { .. } => "ZSCORE",
            Command::ZUnionStoreMax { .. } => "ZUNIONSTORE",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SMembers { .. } => "SMEMBERS",
        }
    }
}

/// Reply to one command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Acknowledgement without payload
    Ok,
    /// Integer reply (counts, TTLs)
    Int(i64),
    /// Boolean reply (existence, expire applied)
    Bool(bool),
    /// Optional score
    Float(Option<f64>),
    /// Hash contents (empty when missing)
    Hash(HashMap<String, String>),
    /// Member list
    Members(Vec<String>),
}

impl Reply {
    fn mismatch(&self, expected: &str) -> Error {
        Error::store(format!("unexpected reply {:?}, expected {}", self, expected))
    }

    /// Read an integer reply
    pub fn into_int(self) -> Result<i64> {
        match self {
            Reply::Int(i) => Ok(i),
            other => Err(other.mismatch("integer")),
        }
    }

    /// Read a boolean reply (integers count as true when non-zero)
    pub fn into_bool(self) -> Result<bool> {
        match self {
            Reply::Bool(b) => Ok(b),
            Reply::Int(i) => Ok(i != 0),
            other => Err(other.mismatch("bool")),
        }
    }

    /// Read a score reply
    pub fn into_score(self) -> Result<Option<f64>> {
        match self {
            Reply::Float(f) => Ok(f),
            other => Err(other.mismatch("score")),
        }
    }

    /// Read a hash reply
    pub fn into_hash(self) -> Result<HashMap<String, String>> {
        match self {
            Reply::Hash(h) => Ok(h),
            other => Err(other.mismatch("hash")),
        }
    }

    /// Read a member list reply
    pub fn into_members(self) -> Result<Vec<String>> {
        match self {
            Reply::Members(m) => Ok(m),
            other => Err(other.mismatch("members")),
        }
    }
}
