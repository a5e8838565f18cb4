//! Named response caches for offline support.
//!
//! This module provides the storage side of the worker:
//! - Any number of named caches, each keyed by request identity (method + URL)
//! - Full response snapshots (status, headers, body) as values
//! - Scoped lookups in one cache and unscoped lookups across all of them
//! - Whole-cache deletion, which is how stale versions are reclaimed

mod layer;
#[cfg(test)]
pub mod mock;
mod storage;
mod traits;

pub use layer::{CacheLayer, NamedCache};
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CachedResponse, RequestKey, ResponseSource, Served};
