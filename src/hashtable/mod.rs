//! HashTable - A fixed capacity lock-free hashtable.
//!
//! A [`HashTable`] can be used in place of a `RwLock<HashMap>` or a
//! `Mutex<HashMap>` when the maximum number of live entries is known up
//! front. Readers never block, and writers to different slots never block
//! each other.
//!
//! The table is an array of `bucket_count` buckets holding `bucket_length`
//! slots each. A key can only ever live in the bucket its hash selects, so a
//! `put` of a new key into a bucket whose slots are all taken fails with
//! [`TableError::Full`] even if other buckets have room. The table never
//! grows. If you would rather lose old entries than fail inserts, use the
//! [`EvictableHashTable`](crate::evictable::EvictableHashTable).
//!
//! Values are returned by clone. Memory of replaced and removed values is
//! reclaimed with crossbeam-epoch once no reader can still observe it, so
//! for large values prefer storing an `Arc<T>`.

use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;

use crate::config::{TableBuilder, TableConfig};
use crate::error::TableError;
use crate::internals::table::RawTable;
use crate::stats::BucketStats;
use crate::table::{ConcurrentTable, Put};

/// A fixed capacity concurrent hashtable that reports full buckets.
///
/// # Examples
/// ```
/// use conctable::{HashTable, Put, TableError};
///
/// // One bucket of two slots, so every key collides.
/// let table: HashTable<char, u32> = HashTable::new(1, 2);
///
/// assert_eq!(table.put('a', 1), Ok(Put::Inserted));
/// assert_eq!(table.put('b', 2), Ok(Put::Inserted));
/// assert_eq!(table.put('c', 3), Err(TableError::Full));
///
/// assert_eq!(table.put('a', 10), Ok(Put::Replaced(1)));
/// assert_eq!(table.remove(&'b'), Ok(Some(2)));
/// assert_eq!(table.get(&'b'), Ok(None));
/// assert_eq!(table.put('c', 3), Ok(Put::Inserted));
/// ```
pub struct HashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: RawTable<K, V>,
}

impl<K, V> HashTable<K, V>
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
            .build()
            .expect("Invalid table parameters!")
    }

    pub(crate) fn from_config(config: TableConfig) -> Self {
        HashTable {
            inner: RawTable::new(config, false),
        }
    }

    /// Look up `k`, returning a clone of its value. Only fails with
    /// [`TableError::Again`] when writers kept the bucket busy for the whole
    /// retry budget.
    pub fn get(&self, k: &K) -> Result<Option<V>, TableError> {
        self.inner.get(k)
    }

    /// If `k` is present in the table.
    pub fn contains_key(&self, k: &K) -> Result<bool, TableError> {
        self.inner.get(k).map(|v| v.is_some())
    }

    /// Insert `v` for `k`, or replace the current value of `k` and return it.
    ///
    /// Fails with [`TableError::Full`] if `k` is absent and its bucket has no
    /// free slot. On any error `v` is dropped.
    pub fn put(&self, k: K, v: V) -> Result<Put<K, V>, TableError> {
        let r = self.inner.put(k, v);
        debug_assert!(!matches!(r, Ok(Put::Evicted(..))));
        r
    }

    /// Remove `k` from the table, returning its value.
    pub fn remove(&self, k: &K) -> Result<Option<V>, TableError> {
        self.inner.remove(k)
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

    /// Visit every entry. Entries being changed while the visit passes them
    /// may be skipped, so under concurrency this is weakly consistent.
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

impl<K, V> Default for HashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BUCKET_COUNT, crate::config::DEFAULT_BUCKET_LENGTH)
    }
}

impl<K, V> fmt::Debug for HashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("bucket_count", &self.bucket_count())
            .field("bucket_length", &self.bucket_length())
            .field("len", &self.len())
            .finish()
    }
}

impl<K, V> ConcurrentTable<K, V> for HashTable<K, V>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, k: &K) -> Result<Option<V>, TableError> {
        HashTable::get(self, k)
    }

    fn put(&self, k: K, v: V) -> Result<Put<K, V>, TableError> {
        HashTable::put(self, k, v)
    }

    fn remove(&self, k: &K) -> Result<Option<V>, TableError> {
        HashTable::remove(self, k)
    }

    fn len(&self) -> usize {
        HashTable::len(self)
    }

    fn capacity(&self) -> usize {
        HashTable::capacity(self)
    }
}
