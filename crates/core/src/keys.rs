//! Key derivation
//!
//! Every persisted structure is addressed by a colon-delimited key composed
//! left to right:
//!
//! | Structure | Key |
//! |-----------|-----|
//! | record hash | `model:id` |
//! | base index | `model:field` |
//! | meta index | `model:meta_field:meta_value:field` |
//! | composite index | `model:f1:v1:f2:v2:...:field` |
//! | shard of an index | `<index key>/<bucket>` |
//! | housekeeping set | `model:id:_zindexes` (and friends) |
//! | cached union | `model:_union:<digest>` |
//!
//! All functions here are pure: the same inputs always yield the same key.

use std::fmt;
use std::time::Duration;

use xxhash_rust::xxh3::xxh3_64;

use crate::timestamp::Timestamp;

/// Delimiter between key segments
pub const KEY_DELIMITER: char = ':';

/// Delimiter between an index key and its shard bucket
pub const SHARD_DELIMITER: char = '/';

/// Hidden hash field holding a record's creation stamp
pub const CREATED_AT_FIELD: &str = "_created_at";

/// Hash field holding the record id
pub const ID_FIELD: &str = "id";

/// Housekeeping set of base index keys a record belongs to
pub const BASE_BUCKET: &str = "_zindexes";

/// Housekeeping set of meta index keys a record belongs to
pub const META_BUCKET: &str = "_zindex_with_meta";

/// Housekeeping set of composite index keys a record belongs to
pub const COMPOSITE_BUCKET: &str = "_zindex_unique";

const UNION_SEGMENT: &str = "_union";

const HOUR: u64 = 3_600;
const DAY: u64 = 86_400;
const WEEK: u64 = 7 * DAY;

/// Hierarchical key builder
///
/// `KeyPath::new("notice").push(2).push("title")` renders as `notice:2:title`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(String);

impl KeyPath {
    /// Start a path at its root segment
    pub fn new(root: impl fmt::Display) -> Self {
        KeyPath(root.to_string())
    }

    /// Append one segment
    pub fn push(mut self, segment: impl fmt::Display) -> Self {
        if !self.0.is_empty() {
            self.0.push(KEY_DELIMITER);
        }
        self.0.push_str(&segment.to_string());
        self
    }

    /// Borrow the rendered key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the rendered key
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.0
    }
}

/// `model:id`
pub fn record_key(model: &str, id: &str) -> String {
    KeyPath::new(model).push(id).into_string()
}

/// `model:id:attr`
pub fn record_attr_key(model: &str, id: &str, attr: &str) -> String {
    KeyPath::new(model).push(id).push(attr).into_string()
}

/// `model:field`
pub fn base_index_key(model: &str, field: &str) -> String {
    KeyPath::new(model).push(field).into_string()
}

/// `model:meta_field:meta_value:field`
pub fn meta_index_key(model: &str, meta_field: &str, meta_value: &str, field: &str) -> String {
    KeyPath::new(model)
        .push(meta_field)
        .push(meta_value)
        .push(field)
        .into_string()
}

/// `model:f1:v1:...:fn:vn:sort_field`
///
/// `pairs` are the (index-value field, encoded value) pairs in declaration order.
pub fn composite_index_key<'a, I>(model: &str, pairs: I, sort_field: &str) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut path = KeyPath::new(model);
    for (field, value) in pairs {
        path = path.push(field).push(value);
    }
    path.push(sort_field).into_string()
}

/// `key/bucket`
pub fn shard_key(key: &str, bucket: i64) -> String {
    format!("{}{}{}", key, SHARD_DELIMITER, bucket)
}

/// `model:id:bucket_name` housekeeping set
pub fn bucket_key(model: &str, id: &str, bucket: &str) -> String {
    record_attr_key(model, id, bucket)
}

/// Cache key of a max-union over `keys`
///
/// Independent of the order `keys` are given in.
pub fn union_key(model: &str, keys: &[String]) -> String {
    let mut sorted: Vec<&str> = keys.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let digest = xxh3_64(sorted.join(",").as_bytes());
    KeyPath::new(model)
        .push(UNION_SEGMENT)
        .push(format!("{:016x}", digest))
        .into_string()
}

/// True if `segment` can be embedded in a key without changing its shape
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(KEY_DELIMITER) && !segment.contains(SHARD_DELIMITER)
}

/// Model expiration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Records and indexes never expire
    Never,
    /// Indexes cover a rolling window of this many seconds
    After(u64),
}

impl Expiration {
    /// Interpret a declared expiration; any negative value (conventionally -1) means never
    pub fn from_secs(secs: i64) -> Self {
        if secs < 0 {
            Expiration::Never
        } else {
            Expiration::After(secs as u64)
        }
    }

    /// Expiration in seconds, if any
    pub fn secs(&self) -> Option<u64> {
        match self {
            Expiration::Never => None,
            Expiration::After(secs) => Some(*secs),
        }
    }

    /// Expiration as a duration, if any
    pub fn duration(&self) -> Option<Duration> {
        self.secs().map(Duration::from_secs)
    }

    /// True for expiring models
    pub fn is_expiring(&self) -> bool {
        matches!(self, Expiration::After(_))
    }
}

/// Time-sharding of the index keys of an expiring model
///
/// Bucket size is chosen by thresholding the expiration:
/// - up to one day: hourly buckets
/// - up to seven days: daily buckets
/// - beyond: weekly buckets
///
/// The rolling (unsharded) key is rebuilt from the
/// `ceil(expiration / bucket) + padding` most recent shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPolicy {
    expire_secs: u64,
    bucket_secs: u64,
    padding: u64,
}

impl ShardPolicy {
    /// Extra shards covered by the rolling window by default
    pub const DEFAULT_PADDING: u64 = 2;

    /// Policy for an expiration; `None` when the model never expires
    pub fn for_expiration(expiration: Expiration) -> Option<Self> {
        Self::with_padding(expiration, Self::DEFAULT_PADDING)
    }

    /// Policy with a custom window padding
    pub fn with_padding(expiration: Expiration, padding: u64) -> Option<Self> {
        let expire_secs = expiration.secs()?;
        let bucket_secs = if expire_secs > WEEK {
            WEEK
        } else if expire_secs > DAY {
            DAY
        } else {
            HOUR
        };
        Some(Self {
            expire_secs,
            bucket_secs,
            padding,
        })
    }

    /// Bucket width in seconds
    pub fn bucket_secs(&self) -> u64 {
        self.bucket_secs
    }

    /// Model expiration in seconds
    pub fn expire_secs(&self) -> u64 {
        self.expire_secs
    }

    /// Bucket number containing `secs` (seconds since epoch, may be fractional)
    pub fn bucket_for_secs(&self, secs: f64) -> i64 {
        (secs / self.bucket_secs as f64).floor() as i64
    }

    /// Bucket number containing `at`
    pub fn bucket_for(&self, at: Timestamp) -> i64 {
        (at.as_secs() / self.bucket_secs) as i64
    }

    /// Number of shards merged into the rolling key
    pub fn window(&self) -> u64 {
        self.expire_secs.div_ceil(self.bucket_secs) + self.padding
    }

    /// Shard of `key` a record stamped at `secs` lands in
    pub fn shard_key_at(&self, key: &str, secs: f64) -> String {
        shard_key(key, self.bucket_for_secs(secs))
    }

    /// The most recent shard keys of `key` relative to `now`, newest first
    pub fn recent_shard_keys(&self, key: &str, now: Timestamp) -> Vec<String> {
        let current = self.bucket_for(now);
        (0..self.window() as i64)
            .map(|i| shard_key(key, current - i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_path_composition() {
        let path = KeyPath::new("rcnotice").push(6).push("title");
        assert_eq!(path.as_str(), "rcnotice:6:title");
        assert_eq!(KeyPath::new("").push("a").as_str(), "a");
    }

    #[test]
    fn test_index_key_families() {
        assert_eq!(record_key("rcnotice", "6"), "rcnotice:6");
        assert_eq!(base_index_key("rcnotice", "notice_id"), "rcnotice:notice_id");
        assert_eq!(
            meta_index_key("rcnotice", "receiver_id", "2", "date_created"),
            "rcnotice:receiver_id:2:date_created"
        );
        assert_eq!(
            composite_index_key(
                "rcnotice",
                [("receiver_id", "2"), ("is_read", "0")],
                "notice_id"
            ),
            "rcnotice:receiver_id:2:is_read:0:notice_id"
        );
        assert_eq!(
            bucket_key("rcnotice", "6", BASE_BUCKET),
            "rcnotice:6:_zindexes"
        );
    }

    #[test]
    fn test_union_key_is_order_independent() {
        let a = vec!["m:x:1:f".to_string(), "m:x:2:f".to_string()];
        let b = vec!["m:x:2:f".to_string(), "m:x:1:f".to_string()];
        assert_eq!(union_key("m", &a), union_key("m", &b));
        assert!(union_key("m", &a).starts_with("m:_union:"));
        assert_ne!(union_key("m", &a), union_key("m", &a[..1]));
    }

    #[test]
    fn test_safe_segments() {
        assert!(is_safe_segment("42"));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment("a:b"));
        assert!(!is_safe_segment("a/b"));
    }

    #[test]
    fn test_expiration_from_secs() {
        assert_eq!(Expiration::from_secs(-1), Expiration::Never);
        assert_eq!(Expiration::from_secs(60).secs(), Some(60));
        assert!(ShardPolicy::for_expiration(Expiration::Never).is_none());
    }

    #[test]
    fn test_bucket_thresholds() {
        let hourly = ShardPolicy::for_expiration(Expiration::After(DAY)).unwrap();
        assert_eq!(hourly.bucket_secs(), HOUR);
        let daily = ShardPolicy::for_expiration(Expiration::After(DAY + 1)).unwrap();
        assert_eq!(daily.bucket_secs(), DAY);
        let still_daily = ShardPolicy::for_expiration(Expiration::After(WEEK)).unwrap();
        assert_eq!(still_daily.bucket_secs(), DAY);
        let weekly = ShardPolicy::for_expiration(Expiration::After(3 * WEEK)).unwrap();
        assert_eq!(weekly.bucket_secs(), WEEK);
    }

    #[test]
    fn test_window_rounds_up_and_pads() {
        let policy = ShardPolicy::for_expiration(Expiration::After(10 * DAY)).unwrap();
        // 10 days over weekly buckets -> 2 buckets + 2 padding
        assert_eq!(policy.window(), 4);
        let exact = ShardPolicy::for_expiration(Expiration::After(3 * WEEK)).unwrap();
        assert_eq!(exact.window(), 5);
    }

    #[test]
    fn test_recent_shard_keys_newest_first() {
        let policy = ShardPolicy::for_expiration(Expiration::After(2 * HOUR)).unwrap();
        let now = Timestamp::from_secs(10 * HOUR + 5);
        let keys = policy.recent_shard_keys("m:f", now);
        assert_eq!(keys, vec!["m:f/10", "m:f/9", "m:f/8", "m:f/7"]);
    }

    #[test]
    fn test_shard_key_from_fractional_stamp() {
        let policy = ShardPolicy::for_expiration(Expiration::After(HOUR)).unwrap();
        assert_eq!(policy.shard_key_at("m:f", 7_199.999), "m:f/1");
        assert_eq!(policy.shard_key_at("m:f", 7_200.0), "m:f/2");
    }
}
