//! The interface shared by both table variants.

use crate::error::TableError;

/// What a successful `put` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Put<K, V> {
    /// The key was absent and now holds the value.
    Inserted,
    /// The key was present. Its previous value is handed back.
    Replaced(V),
    /// The key was absent and its bucket was full, so the returned entry was
    /// evicted to make room. Only an [`EvictableHashTable`] does this.
    ///
    /// [`EvictableHashTable`]: crate::evictable::EvictableHashTable
    Evicted(K, V),
}

/// A fixed capacity concurrent table.
///
/// Implemented by [`HashTable`] and [`EvictableHashTable`], so code can be
/// written once against either policy.
///
/// ```
/// use conctable::{ConcurrentTable, HashTable, EvictableHashTable, Put};
///
/// fn store<T: ConcurrentTable<u32, &'static str>>(t: &T) {
///     assert_eq!(t.put(1, "one"), Ok(Put::Inserted));
///     assert_eq!(t.get(&1), Ok(Some("one")));
/// }
///
/// store(&HashTable::new(16, 4));
/// store(&EvictableHashTable::new(16, 4));
/// ```
///
/// [`HashTable`]: crate::hashtable::HashTable
/// [`EvictableHashTable`]: crate::evictable::EvictableHashTable
pub trait ConcurrentTable<K, V> {
    /// Look up `k`, returning a clone of its value.
    fn get(&self, k: &K) -> Result<Option<V>, TableError>;

    /// Insert or replace the value of `k`.
    fn put(&self, k: K, v: V) -> Result<Put<K, V>, TableError>;

    /// Remove `k`, returning its value.
    fn remove(&self, k: &K) -> Result<Option<V>, TableError>;

    /// An approximate count of entries.
    fn len(&self) -> usize;

    /// If the table appears empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed maximum number of entries.
    fn capacity(&self) -> usize;
}
