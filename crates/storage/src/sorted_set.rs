//! Sorted set
//!
//! Members are unique and ordered by (score, member). Scores are kept in a
//! member map for O(1) lookup and mirrored in an ordered set for range scans.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::command::ScoreBound;

/// f64 with a total order
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Unique members ordered by score, ties broken by member
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: FxHashMap<String, f64>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// True when there are no members
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Add a member or replace its score; true if the member is new
    pub fn insert(&mut self, member: &str, score: f64) -> bool {
        match self.scores.insert(member.to_string(), score) {
            Some(old) => {
                self.order.remove(&(Score(old), member.to_string()));
                self.order.insert((Score(score), member.to_string()));
                false
            }
            None => {
                self.order.insert((Score(score), member.to_string()));
                true
            }
        }
    }

    /// Remove a member; true if it was present
    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(old) => {
                self.order.remove(&(Score(old), member.to_string()));
                true
            }
            None => false,
        }
    }

    /// Score of a member
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Iterate (member, score) in ascending order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, f64)> + '_ {
        self.order.iter().map(|(s, m)| (m.as_str(), s.0))
    }

    /// Members by inclusive rank range; negative ranks count from the end
    pub fn range_by_rank(&self, start: i64, stop: i64, rev: bool) -> Vec<String> {
        let len = self.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if len == 0 || start > stop || start >= len {
            return Vec::new();
        }
        let take = (stop - start + 1) as usize;
        let skip = start as usize;
        if rev {
            self.order
                .iter()
                .rev()
                .skip(skip)
                .take(take)
                .map(|(_, m)| m.clone())
                .collect()
        } else {
            self.order
                .iter()
                .skip(skip)
                .take(take)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    /// Members with `min <= score <= max` (per bound inclusivity), paged
    pub fn range_by_score(
        &self,
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        count: Option<usize>,
        rev: bool,
    ) -> Vec<String> {
        let take = count.unwrap_or(usize::MAX);
        let admit = |(s, _): &&(Score, String)| ScoreBound::contains(min, max, s.0);
        if rev {
            self.order
                .iter()
                .rev()
                .filter(admit)
                .skip(offset)
                .take(take)
                .map(|(_, m)| m.clone())
                .collect()
        } else {
            self.order
                .iter()
                .filter(admit)
                .skip(offset)
                .take(take)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    /// Number of members within the score range
    pub fn count(&self, min: ScoreBound, max: ScoreBound) -> usize {
        self.scores
            .values()
            .filter(|s| ScoreBound::contains(min, max, **s))
            .count()
    }

    /// Merge another set in, keeping the larger score for shared members
    pub fn union_max(&mut self, other: &SortedSet) {
        for (member, score) in other.iter() {
            match self.score(member) {
                Some(existing) if existing >= score => {}
                _ => {
                    self.insert(member, score);
                }
            }
        }
    }
}
