//! Positional indexes over large XML source files.
//!
//! [`build_index`] streams each source once and records where every document
//! starts and ends. [`IndexedFileCache`] serves documents by id from those
//! byte ranges, keeping a bounded number of parsed documents in memory.

mod builder;
mod cache;

pub use builder::{DocumentIndex, FailedSource, IndexRule, IndexStatus, build_index};
pub use cache::{CacheOptions, CacheStats, CachedDocument, IndexedFileCache};
