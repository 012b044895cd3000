//! Stats collection for the tables.
//!
//! The evictable table counts hits, misses and evictions. Each counter is an
//! independent relaxed atomic, so a [`StatsSnapshot`] taken while other
//! threads operate on the table is approximate. Both variants can report a
//! [`BucketStats`] summary of how evenly keys are spread across buckets.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Live counters of an evictable table.
#[derive(Debug, Default)]
pub(crate) struct TableStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TableStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn evicted(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// A point in time copy of the evictable table's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StatsSnapshot {
    /// The number of `get` calls that found their key.
    pub hits: u64,
    /// The number of `get` calls that did not find their key.
    pub misses: u64,
    /// The number of entries removed to make room, including bulk evictions.
    pub evictions: u64,
}

impl StatsSnapshot {
    /// The fraction of lookups that hit, or `0.0` if nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Occupancy of the table's buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BucketStats {
    /// Fewest occupied slots in any bucket.
    pub min: u64,
    /// Most occupied slots in any bucket.
    pub max: u64,
    /// Occupied slots over the whole table.
    pub sum: u64,
    /// Mean occupied slots per bucket.
    pub avg: f64,
}

impl BucketStats {
    pub(crate) fn from_lengths<I>(lengths: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        let mut min = u64::MAX;
        let mut max = 0;
        let mut sum = 0;
        let mut buckets = 0u64;
        for len in lengths {
            min = min.min(len);
            max = max.max(len);
            sum += len;
            buckets += 1;
        }
        if buckets == 0 {
            return BucketStats {
                min: 0,
                max: 0,
                sum: 0,
                avg: 0.0,
            };
        }
        BucketStats {
            min,
            max,
            sum,
            avg: sum as f64 / buckets as f64,
        }
    }
}
