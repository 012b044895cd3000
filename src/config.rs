//! Table configuration.
//!
//! A table's shape is fixed when it is built: `bucket_count` buckets of
//! `bucket_length` slots each. Use [`TableBuilder`] to configure and create
//! either variant.

use std::fmt::Debug;
use std::hash::Hash;

use crate::backoff::RetryPolicy;
use crate::error::BuildError;
use crate::evictable::EvictableHashTable;
use crate::hashtable::HashTable;

/// Buckets in a default table.
#[cfg(not(feature = "verification"))]
pub const DEFAULT_BUCKET_COUNT: usize = 1024;
/// Slots per bucket in a default table.
#[cfg(not(feature = "verification"))]
pub const DEFAULT_BUCKET_LENGTH: usize = 4;

/// Buckets in a default table.
#[cfg(feature = "verification")]
pub const DEFAULT_BUCKET_COUNT: usize = VERIFICATION_BUCKET_COUNT;
/// Slots per bucket in a default table.
#[cfg(feature = "verification")]
pub const DEFAULT_BUCKET_LENGTH: usize = VERIFICATION_BUCKET_LENGTH;

/// Buckets in the reduced shape used to keep exhaustive state exploration
/// tractable.
pub const VERIFICATION_BUCKET_COUNT: usize = 2;
/// Slots per bucket in the reduced verification shape.
pub const VERIFICATION_BUCKET_LENGTH: usize = 2;

/// Attempts an operation makes before it reports `Again`.
pub const DEFAULT_RETRY_BUDGET: u32 = 64;

/// A validated table shape.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableConfig {
    pub(crate) bucket_count: usize,
    pub(crate) bucket_length: usize,
    pub(crate) retry: RetryPolicy,
}

/// A configurable builder to create new fixed capacity tables.
///
/// ```
/// use conctable::TableBuilder;
///
/// let table = TableBuilder::new()
///     .set_size(64, 4)
///     .set_retry_budget(16)
///     .build::<u64, String>()
///     .expect("Invalid table parameters!");
/// assert_eq!(table.capacity(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct TableBuilder {
    bucket_count: usize,
    bucket_length: usize,
    retry_budget: u32,
}

impl Default for TableBuilder {
    fn default() -> Self {
        TableBuilder {
            bucket_count: DEFAULT_BUCKET_COUNT,
            bucket_length: DEFAULT_BUCKET_LENGTH,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl TableBuilder {
    /// Create a new builder with the default shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of buckets and the number of slots in each bucket.
    /// The table can never hold more than `bucket_count * bucket_length`
    /// entries, and a single bucket never more than `bucket_length`.
    #[must_use]
    pub fn set_size(self, bucket_count: usize, bucket_length: usize) -> Self {
        TableBuilder {
            bucket_count,
            bucket_length,
            retry_budget: self.retry_budget,
        }
    }

    /// Set how many attempts an operation makes under contention before it
    /// returns `Again`. A budget of 1 means a single lost race is reported.
    #[must_use]
    pub fn set_retry_budget(self, retry_budget: u32) -> Self {
        TableBuilder {
            bucket_count: self.bucket_count,
            bucket_length: self.bucket_length,
            retry_budget,
        }
    }

    /// Shrink the table to the 2 x 2 verification shape.
    #[must_use]
    pub fn verification(self) -> Self {
        self.set_size(VERIFICATION_BUCKET_COUNT, VERIFICATION_BUCKET_LENGTH)
    }

    pub(crate) fn validate(self) -> Result<TableConfig, BuildError> {
        let TableBuilder {
            bucket_count,
            bucket_length,
            retry_budget,
        } = self;

        if bucket_count == 0 {
            return Err(BuildError::ZeroBucketCount);
        }
        if bucket_length == 0 {
            return Err(BuildError::ZeroBucketLength);
        }
        if retry_budget == 0 {
            return Err(BuildError::ZeroRetryBudget);
        }

        Ok(TableConfig {
            bucket_count,
            bucket_length,
            retry: RetryPolicy::new(retry_budget),
        })
    }

    /// Consume this builder, returning a standard table. A zero sized
    /// dimension or budget is an error.
    pub fn build<K, V>(self) -> Result<HashTable<K, V>, BuildError>
    where
        K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.validate().map(HashTable::from_config)
    }

    /// Consume this builder, returning a table that evicts entries instead
    /// of reporting a full bucket.
    pub fn build_evictable<K, V>(self) -> Result<EvictableHashTable<K, V>, BuildError>
    where
        K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.validate().map(EvictableHashTable::from_config)
    }
}

#[cfg(test)]
mod tests {
    use super::{TableBuilder, DEFAULT_BUCKET_COUNT, DEFAULT_BUCKET_LENGTH};
    use crate::error::BuildError;

    #[test]
    fn test_builder_defaults() {
        let t = TableBuilder::new().build::<u32, u32>().unwrap();
        assert_eq!(t.bucket_count(), DEFAULT_BUCKET_COUNT);
        assert_eq!(t.bucket_length(), DEFAULT_BUCKET_LENGTH);
        assert_eq!(t.capacity(), DEFAULT_BUCKET_COUNT * DEFAULT_BUCKET_LENGTH);
    }

    #[test]
    fn test_builder_verification() {
        let t = TableBuilder::new()
            .verification()
            .build_evictable::<u32, u32>()
            .unwrap();
        assert_eq!(t.capacity(), 4);
    }

    #[test]
    fn test_builder_rejects_zero() {
        assert_eq!(
            TableBuilder::new().set_size(0, 4).build::<u8, u8>().err(),
            Some(BuildError::ZeroBucketCount)
        );
        assert_eq!(
            TableBuilder::new().set_size(4, 0).build::<u8, u8>().err(),
            Some(BuildError::ZeroBucketLength)
        );
        assert_eq!(
            TableBuilder::new()
                .set_retry_budget(0)
                .build_evictable::<u8, u8>()
                .err(),
            Some(BuildError::ZeroRetryBudget)
        );
    }
}
