//! Conctable - Fixed Capacity Concurrent Hashtables
//!
//! These tables hold a fixed number of key/value entries, chosen when the
//! table is built, and let any number of threads read and write them at the
//! same time without locks. Readers never block writers and never observe a
//! key paired with a value it was never stored with.
//!
//! You can use these in place of a `Mutex<HashMap>` or `RwLock<HashMap>`
//! when the working set has a known upper bound, and will likely see
//! improvements in parallel throughput, since operations on different slots
//! never contend.
//!
//! Two variants are provided:
//!
//! * [`HashTable`] - a `put` of a new key into a full bucket fails with
//!   [`TableError::Full`].
//! * [`EvictableHashTable`] - a `put` of a new key into a full bucket evicts
//!   a not recently used entry of that bucket and returns it.
//!
//! Both implement [`ConcurrentTable`]. Every operation is a bounded number of
//! lock-free attempts, and reports [`TableError::Again`] if it lost every
//! race within its retry budget. Callers choose whether to retry.
//!
//! Keys must be `Copy`, since readers take a speculative copy of a key that
//! may be concurrently overwritten and only trust it once validated. Values
//! are returned by clone, and reclaimed through epoch based reclamation.
//!
//! # Features
//!
//! * `foldhash` - hash keys with the foldhash crate (default)
//! * `ahash` - hash keys with the cpu accelerated ahash crate
//! * `serde` - serialise stats snapshots
//! * `verification` - default to the reduced 2 x 2 shape used for exhaustive
//!   testing of the concurrency protocol
//!
//! If neither hasher feature is enabled, the standard library's `RandomState`
//! is used.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![allow(clippy::needless_lifetimes)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod evictable;
pub mod hashtable;
pub mod stats;
pub mod table;

// This is where the scary rust lives.
mod internals;

pub use backoff::{Attempt, RetryPolicy};
pub use config::TableBuilder;
pub use error::{BuildError, TableError};
pub use evictable::EvictableHashTable;
pub use hashtable::HashTable;
pub use stats::{BucketStats, StatsSnapshot};
pub use table::{ConcurrentTable, Put};
