//! Event type definitions for structured stencil events.
//!
//! Events are grouped by the component that raises them (artifact cache,
//! garbage collector, operation engine). They are plain data: emitting one never
//! influences the operation that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured stencil event with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StencilEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
    /// The event category and data.
    pub category: EventCategory,
}

impl StencilEvent {
    /// Create a new event with the given category.
    #[must_use]
    pub fn new(category: EventCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category,
        }
    }

    /// Stable dotted name for the event, e.g. `cache.stored`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.category.event_type()
    }
}

/// Event categories organized by component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventCategory {
    /// Artifact cache events.
    Cache(CacheEvent),
    /// Garbage collection events.
    Gc(GcEvent),
    /// File operation events.
    Operation(OperationEvent),
}

impl EventCategory {
    /// Stable dotted name for the event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Cache(e) => match e {
                CacheEvent::Stored { .. } => "cache.stored",
                CacheEvent::Hit { .. } => "cache.hit",
                CacheEvent::Miss { .. } => "cache.miss",
                CacheEvent::Deleted { .. } => "cache.deleted",
                CacheEvent::Corruption { .. } => "cache.corruption",
            },
            Self::Gc(e) => match e {
                GcEvent::Started { .. } => "gc.started",
                GcEvent::Evicted { .. } => "gc.evicted",
                GcEvent::Completed { .. } => "gc.completed",
            },
            Self::Operation(e) => match e {
                OperationEvent::Skipped { .. } => "operation.skipped",
                OperationEvent::Unchanged { .. } => "operation.unchanged",
                OperationEvent::Applied { .. } => "operation.applied",
            },
        }
    }
}

/// Artifact cache events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum CacheEvent {
    /// Content was recorded under a logical key.
    Stored {
        /// Logical key.
        key: String,
        /// Content hash.
        hash: String,
        /// Content size in bytes.
        size: u64,
        /// Whether the blob already existed before this call.
        deduplicated: bool,
    },
    /// A lookup found its content.
    Hit {
        /// Logical key.
        key: String,
        /// Content hash.
        hash: String,
    },
    /// A lookup found nothing.
    Miss {
        /// Logical key.
        key: String,
    },
    /// A logical key was removed.
    Deleted {
        /// Logical key.
        key: String,
        /// Content hash the key pointed at.
        hash: String,
        /// Whether the blob itself was removed.
        blob_removed: bool,
    },
    /// An index record points at a blob that is missing or damaged.
    Corruption {
        /// Logical key, when known.
        key: Option<String>,
        /// Content hash.
        hash: String,
        /// Human readable detail.
        detail: String,
    },
}

/// Garbage collection events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GcEvent {
    /// A collection or analysis pass started.
    Started {
        /// Strategy name.
        strategy: String,
        /// True for `analyze`.
        dry_run: bool,
        /// Number of blob units considered.
        units: usize,
    },
    /// A blob unit was selected for eviction.
    Evicted {
        /// Content hash.
        hash: String,
        /// Size in bytes.
        size: u64,
        /// Eviction reason.
        reason: String,
        /// True for `analyze`, where nothing is actually removed.
        dry_run: bool,
    },
    /// A pass finished.
    Completed {
        /// Units removed (or recommended for removal).
        removed: usize,
        /// Units kept.
        kept: usize,
        /// Bytes freed (or that would be freed).
        bytes: u64,
        /// True for `analyze`.
        dry_run: bool,
    },
}

/// File operation events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OperationEvent {
    /// The operation was skipped before touching the filesystem.
    Skipped {
        /// Target path.
        path: String,
        /// Why it was skipped.
        reason: String,
    },
    /// The operation found its content already in place.
    Unchanged {
        /// Target path.
        path: String,
        /// Operation mode name.
        operation: String,
    },
    /// The operation wrote the target.
    Applied {
        /// Target path.
        path: String,
        /// Operation mode name.
        operation: String,
        /// Bytes written to the target.
        bytes_written: u64,
    },
}
