//! This module contains the lock-free core shared by both table variants.
//!
//! Nothing in here is public: the safe wrappers live in
//! [`crate::hashtable`] and [`crate::evictable`].

pub(crate) mod bucket;
pub(crate) mod slot;
pub(crate) mod table;
