//! Eviction Policy Module
//!
//! Ranks entries for removal when the store is over its entry or size cap.
//!
//! Every policy is a weighting of one composite score:
//!
//! ```text
//! score = recency * idle_secs + age * age_secs + frequency / (access_count + 1)
//!       + size * size_kib - priority * priority
//! ```
//!
//! The highest score is evicted first. LRU, LFU and FIFO are the composite with
//! a single non-zero weight. The default adaptive weights leave frequency out
//! of the score, so between entries of equal size and priority the least
//! recently used always goes first; access count only breaks ties.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::cache::CacheEntry;

// == Eviction Weights ==
/// Per-term weights of the composite eviction score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionWeights {
    /// Per second since last access
    pub recency: f64,
    /// Per second since creation
    pub age: f64,
    /// Scales `1 / (access_count + 1)`
    pub frequency: f64,
    /// Per KiB of stored payload
    pub size: f64,
    /// Scales the entry priority, subtracted from the score
    pub priority: f64,
}

impl EvictionWeights {
    const ZERO: Self = Self {
        recency: 0.0,
        age: 0.0,
        frequency: 0.0,
        size: 0.0,
        priority: 0.0,
    };
}

impl Default for EvictionWeights {
    fn default() -> Self {
        Self {
            recency: 1.0,
            age: 0.0,
            frequency: 0.0,
            size: 1.0,
            priority: 120.0,
        }
    }
}

// == Eviction Policy ==
/// Victim ordering used by the store under capacity pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvictionPolicy {
    /// Least recently used first
    Lru,
    /// Least frequently used first, least recent among equals
    Lfu,
    /// Oldest insertion first
    Fifo,
    /// Weighted composite of recency, age, frequency, size and priority
    Adaptive(EvictionWeights),
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::Adaptive(EvictionWeights::default())
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "adaptive" => Ok(EvictionPolicy::default()),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}

impl EvictionPolicy {
    /// Short name for logs and stats.
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Adaptive(_) => "adaptive",
        }
    }

    /// Composite weights this policy scores with.
    pub fn weights(&self) -> EvictionWeights {
        match self {
            EvictionPolicy::Lru => EvictionWeights {
                recency: 1.0,
                ..EvictionWeights::ZERO
            },
            EvictionPolicy::Lfu => EvictionWeights {
                frequency: 1.0,
                ..EvictionWeights::ZERO
            },
            EvictionPolicy::Fifo => EvictionWeights {
                age: 1.0,
                ..EvictionWeights::ZERO
            },
            EvictionPolicy::Adaptive(weights) => *weights,
        }
    }

    // == Score ==
    /// Eviction score of `entry` at time `now`. Higher is evicted sooner.
    pub fn score(&self, entry: &CacheEntry, now: u64) -> f64 {
        let w = self.weights();
        let idle_secs = entry.idle_ms(now) as f64 / 1000.0;
        let age_secs = entry.age_ms(now) as f64 / 1000.0;
        let rarity = 1.0 / (entry.access_count as f64 + 1.0);
        let size_kib = entry.size_bytes as f64 / 1024.0;

        w.recency * idle_secs + w.age * age_secs + w.frequency * rarity + w.size * size_kib
            - w.priority * entry.priority
    }

    // == Select Victims ==
    /// Orders candidate keys from first-to-evict to last.
    ///
    /// Ties fall back to fewest accesses for the adaptive policy, then access
    /// order for every policy except FIFO, then insertion order, oldest first.
    pub fn rank<'a, I>(&self, entries: I, now: u64) -> Vec<String>
    where
        I: IntoIterator<Item = &'a CacheEntry>,
    {
        let by_count = matches!(self, EvictionPolicy::Adaptive(_));
        let by_access = !matches!(self, EvictionPolicy::Fifo);

        let mut scored: Vec<(&CacheEntry, f64)> = entries
            .into_iter()
            .map(|e| (e, self.score(e, now)))
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    if by_count {
                        a.access_count.cmp(&b.access_count)
                    } else {
                        Ordering::Equal
                    }
                })
                .then_with(|| {
                    if by_access {
                        a.touch.cmp(&b.touch)
                    } else {
                        Ordering::Equal
                    }
                })
                .then_with(|| a.seq.cmp(&b.seq))
        });

        scored.into_iter().map(|(e, _)| e.key.clone()).collect()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Payload;
    use std::collections::BTreeSet;

    fn make_entry(key: &str, seq: u64, last_access: u64, access_count: u64, size: usize) -> CacheEntry {
        let mut e = CacheEntry::new(
            key,
            Payload::raw("x".repeat(size)),
            60_000,
            BTreeSet::new(),
            0.5,
            0,
        );
        e.seq = seq;
        e.touch = seq;
        e.last_accessed_at = last_access;
        e.access_count = access_count;
        e
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("LRU".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Lru));
        assert_eq!("lfu".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Lfu));
        assert_eq!(" fifo ".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Fifo));
        assert_eq!(
            "adaptive".parse::<EvictionPolicy>(),
            Ok(EvictionPolicy::default())
        );
        assert!("random".parse::<EvictionPolicy>().is_err());
    }

    #[test]
    fn test_lru_ranks_least_recent_first() {
        let a = make_entry("a", 0, 1_000, 5, 10);
        let b = make_entry("b", 1, 3_000, 0, 10);
        let c = make_entry("c", 2, 2_000, 0, 10);

        let order = EvictionPolicy::Lru.rank([&a, &b, &c], 10_000);
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_lfu_ranks_least_frequent_first() {
        let a = make_entry("a", 0, 1_000, 5, 10);
        let b = make_entry("b", 1, 3_000, 0, 10);
        let c = make_entry("c", 2, 2_000, 2, 10);

        let order = EvictionPolicy::Lfu.rank([&a, &b, &c], 10_000);
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_fifo_ignores_access() {
        let mut a = make_entry("a", 0, 9_000, 50, 10);
        let mut b = make_entry("b", 1, 1_000, 0, 10);
        a.created_at = 100;
        b.created_at = 200;

        let order = EvictionPolicy::Fifo.rank([&b, &a], 10_000);
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let a = make_entry("a", 2, 1_000, 0, 10);
        let b = make_entry("b", 0, 1_000, 0, 10);
        let c = make_entry("c", 1, 1_000, 0, 10);

        let order = EvictionPolicy::default().rank([&a, &b, &c], 1_000);
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_adaptive_prefers_old_unused_large() {
        let policy = EvictionPolicy::default();
        let hot = make_entry("hot", 0, 9_900, 100, 100);
        let cold = make_entry("cold", 1, 0, 0, 100);
        let big = make_entry("big", 2, 9_900, 100, 512 * 1024);

        assert!(policy.score(&cold, 10_000) > policy.score(&hot, 10_000));
        assert!(policy.score(&big, 10_000) > policy.score(&hot, 10_000));
    }

    #[test]
    fn test_adaptive_priority_keeps_entry_longer() {
        let policy = EvictionPolicy::default();
        let mut keep = make_entry("keep", 0, 0, 0, 10);
        let mut drop = make_entry("drop", 1, 0, 0, 10);
        keep.priority = 1.0;
        drop.priority = 0.0;

        let order = policy.rank([&keep, &drop], 5_000);
        assert_eq!(order, vec!["drop", "keep"]);
    }

    #[test]
    fn test_adaptive_recency_beats_access_count() {
        let policy = EvictionPolicy::default();
        let busy_but_stale = make_entry("stale", 0, 0, 10, 4);
        let fresh = make_entry("fresh", 1, 10_000, 0, 4);

        let order = policy.rank([&fresh, &busy_but_stale], 20_000);
        assert_eq!(order, vec!["stale", "fresh"]);
    }

    #[test]
    fn test_adaptive_tie_prefers_fewer_accesses() {
        let policy = EvictionPolicy::default();
        let read = make_entry("read", 0, 1_000, 3, 10);
        let unread = make_entry("unread", 1, 1_000, 0, 10);

        let order = policy.rank([&read, &unread], 1_000);
        assert_eq!(order, vec!["unread", "read"]);
    }

    #[test]
    fn test_pure_policies_zero_other_weights() {
        let w = EvictionPolicy::Lru.weights();
        assert_eq!(w.recency, 1.0);
        assert_eq!(w.frequency + w.size + w.priority + w.age, 0.0);
    }
}
