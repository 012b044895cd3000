//! EvictableHashTable - A fixed capacity lock-free hashtable that makes room.
//!
//! This behaves like the [`HashTable`](crate::hashtable::HashTable), except
//! that a `put` of a new key into a full bucket evicts one of the bucket's
//! entries instead of failing. The evicted entry is handed back as
//! [`Put::Evicted`] so the caller can write it back or release it.
//!
//! The victim is chosen by a second chance clock per bucket. Inserting,
//! replacing, or reading an entry marks it as recently used. When room is
//! needed the bucket's hand sweeps from where it last stopped, clearing marks
//! as it goes, and evicts the first unmarked entry. Entries that are read
//! often keep being re-marked and survive, entries that are only written once
//! age out. The new entry takes over the victim's slot directly.
//!
//! A hit, miss, and eviction counter is kept and can be read with
//! [`EvictableHashTable::stats`].

use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;

use crate::config::{TableBuilder, TableConfig};
use crate::error::TableError;
use crate::internals::table::RawTable;
use crate::stats::{BucketStats, StatsSnapshot, TableStats};
use crate::table::{ConcurrentTable, Put};

/// A fixed capacity concurrent hashtable that evicts on full buckets.
///
/// # Examples
/// ```
/// use conctable::{EvictableHashTable, Put};
///
/// // One bucket of two slots, so every key collides.
/// let table: EvictableHashTable<char, u32> = EvictableHashTable::new(1, 2);
///
/// assert_eq!(table.put('a', 1), Ok(Put::Inserted));
/// assert_eq!(table.put('b', 2), Ok(Put::Inserted));
/// assert_eq!(table.put('c', 3), Ok(Put::Evicted('a', 1)));
///
/// assert_eq!(table.get(&'a'), Ok(None));
/// assert_eq!(table.get(&'c'), Ok(Some(3)));
///
/// let stats = table.stats();
/// assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
/// ```
pub struct EvictableHashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: RawTable<K, V>,
    stats: TableStats,
}

impl<K, V> EvictableHashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a table of `bucket_count` buckets with `bucket_length` slots
    /// each.
    ///
    /// # Panics
    /// If either dimension is zero. Use [`TableBuilder`] to handle this
    /// as an error instead.
    pub fn new(bucket_count: usize, bucket_length: usize) -> Self {
        TableBuilder::new()
            .set_size(bucket_count, bucket_length)
            .build_evictable()
            .expect("Invalid table parameters!")
    }

    pub(crate) fn from_config(config: TableConfig) -> Self {
        EvictableHashTable {
            inner: RawTable::new(config, true),
            stats: TableStats::new(),
        }
    }

    /// Look up `k`, returning a clone of its value. A hit marks the entry as
    /// recently used.
    pub fn get(&self, k: &K) -> Result<Option<V>, TableError> {
        let r = self.inner.get(k)?;
        if r.is_some() {
            self.stats.hit();
        } else {
            self.stats.miss();
        }
        Ok(r)
    }

    /// Insert `v` for `k`, or replace the current value of `k`.
    ///
    /// If `k` is absent and its bucket is full, the clock victim of that
    /// bucket is evicted and returned in [`Put::Evicted`]. This never fails
    /// with [`TableError::Full`], only with [`TableError::Again`] under
    /// contention, in which case `v` is dropped.
    pub fn put(&self, k: K, v: V) -> Result<Put<K, V>, TableError> {
        let r = self.inner.put(k, v)?;
        if let Put::Evicted(..) = r {
            self.stats.evicted(1);
        }
        Ok(r)
    }

    /// Remove `k` from the table, returning its value.
    pub fn remove(&self, k: &K) -> Result<Option<V>, TableError> {
        self.inner.remove(k)
    }

    /// Evict up to `count` entries chosen by the buckets' clocks, visiting
    /// buckets round robin. Fewer are returned if the table runs out of
    /// entries, or if contention keeps buckets busy.
    pub fn evict(&self, count: usize) -> Vec<(K, V)> {
        let evicted = self.inner.evict(count);
        self.stats.evicted(evicted.len() as u64);
        evicted
    }

    /// A copy of the hit, miss and eviction counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// An approximate count of entries. Exact when no operation is in flight.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// If the table appears empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed maximum number of entries, `bucket_count * bucket_length`.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// The number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.inner.bucket_count()
    }

    /// The number of slots in each bucket.
    pub fn bucket_length(&self) -> usize {
        self.inner.bucket_length()
    }

    /// Visit every entry without marking any of them as used. Weakly
    /// consistent under concurrency.
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V),
    {
        self.inner.for_each(f)
    }

    /// Summarise how many slots are occupied per bucket.
    pub fn bucket_stats(&self) -> BucketStats {
        self.inner.bucket_stats()
    }

    /// Consume the table, handing every remaining entry to the caller.
    pub fn into_entries(mut self) -> Vec<(K, V)> {
        self.inner.drain()
    }
}

impl<K, V> Default for EvictableHashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BUCKET_COUNT, crate::config::DEFAULT_BUCKET_LENGTH)
    }
}

impl<K, V> fmt::Debug for EvictableHashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvictableHashTable")
            .field("bucket_count", &self.bucket_count())
            .field("bucket_length", &self.bucket_length())
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<K, V> ConcurrentTable<K, V> for EvictableHashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, k: &K) -> Result<Option<V>, TableError> {
        EvictableHashTable::get(self, k)
    }

    fn put(&self, k: K, v: V) -> Result<Put<K, V>, TableError> {
        EvictableHashTable::put(self, k, v)
    }

    fn remove(&self, k: &K) -> Result<Option<V>, TableError> {
        EvictableHashTable::remove(self, k)
    }

    fn len(&self) -> usize {
        EvictableHashTable::len(self)
    }

    fn capacity(&self) -> usize {
        EvictableHashTable::capacity(self)
    }
}

#[cfg(test)]
mod tests {
    use super::EvictableHashTable;
    use crate::error::TableError;
    use crate::table::Put;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::scope;

    #[test]
    fn test_evictable_collide_evicts_oldest() {
        let t: EvictableHashTable<char, u32> = EvictableHashTable::new(1, 2);
        assert_eq!(t.put('a', 1), Ok(Put::Inserted));
        assert_eq!(t.put('b', 2), Ok(Put::Inserted));
        assert_eq!(t.put('c', 3), Ok(Put::Evicted('a', 1)));
        assert_eq!(t.get(&'a'), Ok(None));
        assert_eq!(t.get(&'b'), Ok(Some(2)));
        assert_eq!(t.get(&'c'), Ok(Some(3)));
        assert_eq!(t.len(), 2);

        let s = t.stats();
        assert_eq!(s.hits, 2);
        assert_eq!(s.misses, 1);
        assert_eq!(s.evictions, 1);
    }

    #[test]
    fn test_evictable_read_gives_second_chance() {
        let t: EvictableHashTable<u32, u32> = EvictableHashTable::new(1, 3);
        for k in 1..=3 {
            assert_eq!(t.put(k, k * 10), Ok(Put::Inserted));
        }
        // All three start marked, the sweep clears them and takes slot 0.
        assert_eq!(t.put(4, 40), Ok(Put::Evicted(1, 10)));
        // Reading 2 re-marks it, so the hand passes it and takes 3.
        assert_eq!(t.get(&2), Ok(Some(20)));
        assert_eq!(t.put(5, 50), Ok(Put::Evicted(3, 30)));
        assert_eq!(t.get(&2), Ok(Some(20)));
        assert_eq!(t.get(&4), Ok(Some(40)));
        assert_eq!(t.get(&5), Ok(Some(50)));
    }

    #[test]
    fn test_evictable_replace_does_not_evict() {
        let t: EvictableHashTable<u32, u32> = EvictableHashTable::new(1, 2);
        assert_eq!(t.put(1, 1), Ok(Put::Inserted));
        assert_eq!(t.put(2, 2), Ok(Put::Inserted));
        assert_eq!(t.put(2, 3), Ok(Put::Replaced(2)));
        assert_eq!(t.put(1, 4), Ok(Put::Replaced(1)));
        assert_eq!(t.stats().evictions, 0);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_evictable_bulk_evict() {
        let t: EvictableHashTable<u32, u32> = EvictableHashTable::new(8, 2);
        let mut present = BTreeSet::new();
        for k in 0..16 {
            match t.put(k, k) {
                Ok(Put::Inserted) => {
                    present.insert(k);
                }
                Ok(Put::Evicted(ok, _)) => {
                    present.remove(&ok);
                    present.insert(k);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(t.len(), present.len());

        let evicted = t.evict(4);
        assert_eq!(evicted.len(), 4.min(present.len()));
        for (k, v) in evicted.iter() {
            assert_eq!(k, v);
            assert!(present.remove(k));
            assert_eq!(t.get(k), Ok(None));
        }
        assert_eq!(t.len(), present.len());

        let rest = t.evict(usize::MAX);
        assert_eq!(rest.len(), present.len());
        assert!(t.is_empty());
        assert_eq!(t.evict(1), Vec::new());
    }

    #[test]
    fn test_evictable_for_each_does_not_mark() {
        let t: EvictableHashTable<u32, u32> = EvictableHashTable::new(1, 2);
        t.put(1, 1).unwrap();
        t.put(2, 2).unwrap();
        // Clears both marks and evicts 1 into slot 0.
        assert_eq!(t.put(3, 3), Ok(Put::Evicted(1, 1)));
        let mut n = 0;
        t.for_each(|_, _| n += 1);
        assert_eq!(n, 2);
        // 2 was not re-marked by the visit, so it goes next.
        assert_eq!(t.put(4, 4), Ok(Put::Evicted(2, 2)));
        assert_eq!(t.stats().hits, 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_evictable_concurrent_churn() {
        let t: EvictableHashTable<u32, u32> = EvictableHashTable::new(4, 2);
        let evicted = AtomicUsize::new(0);

        scope(|s| {
            for tid in 0..4u32 {
                let t = &t;
                let evicted = &evicted;
                s.spawn(move || {
                    for i in 0..2000u32 {
                        let k = (tid * 2000 + i) % 64;
                        match t.put(k, k) {
                            Ok(Put::Evicted(ek, ev)) => {
                                assert_eq!(ek, ev);
                                evicted.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(_) | Err(TableError::Again) => {}
                            Err(TableError::Full) => panic!("evictable table reported full"),
                        }
                        if let Ok(Some(v)) = t.get(&k) {
                            assert_eq!(v, k);
                        }
                    }
                });
            }
        });

        assert!(t.len() <= t.capacity());
        assert_eq!(t.stats().evictions, evicted.load(Ordering::Relaxed) as u64);
        let mut keys = BTreeSet::new();
        t.for_each(|k, v| {
            assert_eq!(k, v);
            assert!(keys.insert(*k), "duplicate key {}", k);
        });
        assert_eq!(keys.len(), t.len());
    }
}
