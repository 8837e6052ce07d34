//! Content-addressed artifact cache for stencil
//!
//! This crate persists generation outputs so repeated runs can reuse them:
//! - [`ContentStore`]: immutable blobs keyed by SHA-256, sharded on disk
//! - [`CacheIndex`]: logical keys, sizes and timestamps over those blobs
//! - [`ArtifactCache`]: the facade keeping both consistent under one lock
//! - [`GarbageCollector`]: age, lru, fifo, size and hybrid eviction
//!
//! # Layout
//!
//! ```text
//! <cache root>/
//!   index.json
//!   blobs/ab/cd/abcd...
//! ```
//!
//! Timestamps come from an injectable [`stencil_core::Clock`], so eviction is
//! reproducible under test and under `SOURCE_DATE_EPOCH`.

mod cache;
pub mod cas;
mod error;
pub mod gc;
pub mod index;
pub mod paths;

pub use cache::{ArtifactCache, BLOBS_DIR, CacheStats, VerifyReport};
pub use cas::{BlobId, ContentStore, FsContentStore, MemoryContentStore};
pub use error::{Error, Result};
pub use gc::{
    AnalyzeReport, CollectReport, EvictionCandidate, EvictionReason, GarbageCollector, GcOptions,
    GcStrategy,
};
pub use index::{CacheEntry, CacheIndex, JsonFileIndex, MemoryIndex};
pub use paths::{CACHE_DIR_ENV, resolve_cache_root};
