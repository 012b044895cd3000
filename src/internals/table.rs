//! The bucket array and the operations both table variants share.

#[cfg(feature = "ahash")]
use ahash::RandomState;

#[cfg(all(feature = "foldhash", not(feature = "ahash")))]
use foldhash::fast::RandomState;

#[cfg(all(not(feature = "ahash"), not(feature = "foldhash")))]
use std::collections::hash_map::RandomState;

use crossbeam_epoch::{self as epoch, Owned};
use crossbeam_utils::CachePadded;
use std::fmt::Debug;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use super::bucket::{Bucket, Upsert};
use crate::backoff::RetryPolicy;
use crate::config::TableConfig;
use crate::error::TableError;
use crate::stats::BucketStats;
use crate::table::Put;

pub(crate) struct RawTable<K, V> {
    buckets: Box<[CachePadded<Bucket<K, V>>]>,
    bucket_length: usize,
    build_hasher: RandomState,
    len: CachePadded<AtomicUsize>,
    evict_hand: AtomicUsize,
    retry: RetryPolicy,
    evictable: bool,
}

impl<K, V> RawTable<K, V>
where
    K: Copy + Eq + Hash + Debug,
    V: Clone,
{
    pub(crate) fn new(config: TableConfig, evictable: bool) -> Self {
        let TableConfig {
            bucket_count,
            bucket_length,
            retry,
        } = config;
        debug!(
            bucket_count,
            bucket_length,
            budget = retry.budget(),
            evictable,
            "creating table"
        );
        let buckets = (0..bucket_count)
            .map(|_| CachePadded::new(Bucket::new(bucket_length)))
            .collect();
        RawTable {
            buckets,
            bucket_length,
            build_hasher: RandomState::default(),
            len: CachePadded::new(AtomicUsize::new(0)),
            evict_hand: AtomicUsize::new(0),
            retry,
            evictable,
        }
    }

    #[inline]
    fn bucket_of(&self, k: &K) -> &Bucket<K, V> {
        let h = BuildHasher::hash_one(&self.build_hasher, k);
        &self.buckets[(h % self.buckets.len() as u64) as usize]
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn bucket_length(&self) -> usize {
        self.bucket_length
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len() * self.bucket_length
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub(crate) fn get(&self, k: &K) -> Result<Option<V>, TableError> {
        let guard = epoch::pin();
        let bucket = self.bucket_of(k);
        let found = self.retry.run(|| bucket.lookup(k, self.evictable, &guard))?;
        // SAFETY: lookup only returns validated non-null values, which the
        // guard keeps alive until we have cloned them.
        Ok(found.and_then(|v| unsafe { v.as_ref() }).cloned())
    }

    pub(crate) fn put(&self, k: K, v: V) -> Result<Put<K, V>, TableError> {
        let guard = epoch::pin();
        let bucket = self.bucket_of(&k);
        let value = Owned::new(v).into_shared(&guard);

        let r = self
            .retry
            .run(|| bucket.upsert(k, value, self.evictable, &guard));

        let e = match r {
            Ok(Upsert::Inserted) => {
                self.len.fetch_add(1, Ordering::Relaxed);
                return Ok(Put::Inserted);
            }
            Ok(Upsert::Replaced(old)) => return Ok(Put::Replaced(old)),
            Ok(Upsert::Evicted(ok, ov)) => return Ok(Put::Evicted(ok, ov)),
            Ok(Upsert::Full) => TableError::Full,
            Err(e) => e,
        };
        // SAFETY: the value was never linked into a slot.
        drop(unsafe { value.into_owned() });
        Err(e)
    }

    pub(crate) fn remove(&self, k: &K) -> Result<Option<V>, TableError> {
        let guard = epoch::pin();
        let bucket = self.bucket_of(k);
        let removed = self.retry.run(|| bucket.remove(k, &guard))?;
        if removed.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    /// Evict up to `count` entries, one clock victim per bucket visit,
    /// cycling through the buckets from where the last call stopped. Stops
    /// early once every bucket has been visited without finding a victim.
    pub(crate) fn evict(&self, count: usize) -> Vec<(K, V)> {
        let guard = epoch::pin();
        let n = self.buckets.len();
        let mut evicted = Vec::with_capacity(count.min(self.capacity()));
        let mut idle = 0;
        while evicted.len() < count && idle < n {
            let b = self.evict_hand.fetch_add(1, Ordering::Relaxed) % n;
            match self.retry.run(|| self.buckets[b].evict_one(&guard)) {
                Ok(Some(kv)) => {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    evicted.push(kv);
                    idle = 0;
                }
                Ok(None) | Err(_) => idle += 1,
            }
        }
        evicted
    }

    pub(crate) fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        let guard = epoch::pin();
        for bucket in self.buckets.iter() {
            bucket.for_each(&guard, &mut f);
        }
    }

    pub(crate) fn bucket_stats(&self) -> BucketStats {
        BucketStats::from_lengths(self.buckets.iter().map(|b| b.occupied() as u64))
    }

    /// Reserve a slot for `k` and never release it, leaving the bucket
    /// looking like an insert stalled mid transition.
    #[cfg(test)]
    pub(crate) fn stall_insert(&self, k: &K) -> bool {
        use super::bucket::Claim;
        use crate::backoff::Attempt;

        let guard = epoch::pin();
        matches!(
            self.bucket_of(k).find_or_claim(k, &guard),
            Attempt::Done(Claim::Claimed { .. })
        )
    }

    pub(crate) fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len());
        for bucket in self.buckets.iter_mut() {
            bucket.drain_exclusive(&mut out);
        }
        *self.len.get_mut() = 0;
        out
    }
}

impl<K, V> Drop for RawTable<K, V> {
    fn drop(&mut self) {
        debug!(entries = *self.len.get_mut(), "releasing table");
    }
}
