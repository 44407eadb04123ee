//! Model response caching.
//!
//! This crate provides an in-memory implementation of `ResponseCache` with
//! optional LRU bounding, hit/miss statistics and JSON persistence so that a
//! run can be resumed without repeating paid calls.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;

pub use cache::{CacheStats, InMemoryResponseCache, ResponseCacheConfig, ResponseCacheConfigBuilder};
