//! Instants and clocks
//!
//! Expiry is decided against a [`Clock`], never the wall clock directly:
//! the engine asks it where a record's index shard goes and which shards a
//! rebuild reads, and the in-memory store asks it whether a key's TTL has
//! lapsed. A key whose deadline equals "now" is already gone.
//!
//! [`ManualClock`] lets tests step across TTLs and shard boundaries without
//! sleeping.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// An instant, in whole microseconds since the Unix epoch
///
/// Orders chronologically, so it can key an ordered map of deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Wall-clock now; a clock set before 1970 reads as the epoch
    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(since)
    }

    /// Whole seconds since the epoch
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    fn from_duration(since_epoch: Duration) -> Self {
        Timestamp(u64::try_from(since_epoch.as_micros()).unwrap_or(u64::MAX))
    }

    /// Microseconds since the epoch
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Whole seconds since the epoch, rounded down
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Seconds since the epoch with the microsecond fraction
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// The instant `by` later; pins at the far end of the range
    pub fn after(&self, by: Duration) -> Self {
        let step = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(step))
    }
}

/// Source of "now" for expiry decisions
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant
    fn now(&self) -> Timestamp;
}

/// Reads the operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to
///
/// Cloning shares the instant, so a store and an engine built from clones
/// of one clock stay in step.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    /// Stopped at `secs` seconds past the epoch
    pub fn at_secs(secs: u64) -> Self {
        Self {
            now: Arc::new(Mutex::new(Timestamp::from_secs(secs))),
        }
    }

    /// Step forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.after(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
