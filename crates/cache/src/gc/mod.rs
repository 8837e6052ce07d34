//! Garbage collection for cached artifacts
//!
//! The collector snapshots the index, groups records into one unit per blob
//! hash and runs the pure [`plan`] over them. `collect` then removes the
//! planned records (index first, then blobs); `analyze` only reports.

mod plan;
mod strategy;

pub use plan::{BlobUnit, Plan, PlannedEviction, plan};
pub use strategy::{EvictionReason, GcStrategy};

use crate::cache::{ArtifactCache, CacheStats};
use crate::cas::BlobId;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use stencil_events::{CacheEvent, EventCategory, GcEvent};

/// Limits and strategy for one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcOptions {
    /// Retained bytes allowed after collection
    pub max_size: Option<u64>,
    /// Oldest entry allowed to survive
    pub max_age: Option<Duration>,
    /// Victim selection order
    pub strategy: GcStrategy,
}

impl GcOptions {
    /// No limits, given strategy
    #[must_use]
    pub const fn new(strategy: GcStrategy) -> Self {
        Self {
            max_size: None,
            max_age: None,
            strategy,
        }
    }

    /// Set the size limit
    #[must_use]
    pub const fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Set the age limit
    #[must_use]
    pub const fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }
}

/// A unit the collector removed or would remove
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionCandidate {
    /// Blob hash
    pub hash: BlobId,
    /// Blob size in bytes
    pub size: u64,
    /// Milliseconds since creation
    pub age_ms: u64,
    /// Milliseconds since last access
    pub last_access_age_ms: u64,
    /// Why it was selected
    pub reason: EvictionReason,
    /// Logical keys that pointed at it
    pub keys: Vec<String>,
}

/// Result of [`GarbageCollector::collect`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectReport {
    /// Units removed, in eviction order
    pub removed: Vec<EvictionCandidate>,
    /// Hashes that survived
    pub kept: Vec<BlobId>,
    /// Bytes actually reclaimed
    pub bytes_freed: u64,
    /// Wall time spent
    pub duration_ms: u64,
}

/// Result of [`GarbageCollector::analyze`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeReport {
    /// Cache statistics at analysis time
    pub stats: CacheStats,
    /// Logical keys in the index
    pub total_entries: usize,
    /// Units `collect` would remove, in eviction order
    pub recommendations: Vec<EvictionCandidate>,
    /// Bytes `collect` would reclaim
    pub potential_savings: u64,
}

/// Garbage collector bound to an [`ArtifactCache`]
#[derive(Debug)]
pub struct GarbageCollector<'a> {
    cache: &'a ArtifactCache,
}

impl<'a> GarbageCollector<'a> {
    /// Collector for `cache`
    #[must_use]
    pub const fn new(cache: &'a ArtifactCache) -> Self {
        Self { cache }
    }

    /// Evict according to `options`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index or a blob cannot be removed. Units
    /// already removed stay removed.
    pub fn collect(&self, options: &GcOptions) -> Result<CollectReport> {
        let started = Instant::now();
        let mut guard = self.cache.lock()?;
        let now = self.cache.now();

        let units = self.units(&guard.index.all());
        self.started(options, units.len(), false);
        let plan = plan(units, options, now);

        if !plan.evict.is_empty() {
            let hashes: Vec<BlobId> = plan.evict.iter().map(|e| e.unit.hash.clone()).collect();
            guard.index.remove_hashes(&hashes)?;
            for eviction in &plan.evict {
                if !eviction.unit.missing {
                    self.cache.store().remove(&eviction.unit.hash)?;
                }
                self.evicted(eviction, false);
            }
        }
        drop(guard);

        let report = CollectReport {
            removed: candidates(&plan, now),
            kept: plan.keep.iter().map(|u| u.hash.clone()).collect(),
            bytes_freed: plan.bytes_freed(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.completed(&plan, false);
        tracing::info!(
            strategy = %options.strategy,
            removed = report.removed.len(),
            kept = report.kept.len(),
            bytes_freed = report.bytes_freed,
            duration_ms = report.duration_ms,
            "Garbage collection complete"
        );
        Ok(report)
    }

    /// Report what [`collect`](Self::collect) would do without changing anything.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index cannot be reloaded.
    pub fn analyze(&self, options: &GcOptions) -> Result<AnalyzeReport> {
        let guard = self.cache.lock()?;
        let now = self.cache.now();
        let entries = guard.index.all();
        drop(guard);

        let units = self.units(&entries);
        self.started(options, units.len(), true);
        let plan = plan(units, options, now);
        for eviction in &plan.evict {
            self.evicted(eviction, true);
        }
        self.completed(&plan, true);

        Ok(AnalyzeReport {
            stats: self.cache.stats_for(&entries),
            total_entries: entries.len(),
            recommendations: candidates(&plan, now),
            potential_savings: plan.bytes_freed(),
        })
    }

    fn units(&self, entries: &[crate::CacheEntry]) -> Vec<BlobUnit> {
        let store = self.cache.store();
        let mut units = BlobUnit::group(entries);
        for unit in &mut units {
            unit.missing = !store.has(&unit.hash);
            if unit.missing {
                self.cache.emit(EventCategory::Cache(CacheEvent::Corruption {
                    key: unit.keys.first().cloned(),
                    hash: unit.hash.to_string(),
                    detail: "blob missing from store".to_string(),
                }));
            }
        }
        units
    }

    fn started(&self, options: &GcOptions, units: usize, dry_run: bool) {
        self.cache.emit(EventCategory::Gc(GcEvent::Started {
            strategy: options.strategy.to_string(),
            dry_run,
            units,
        }));
    }

    fn evicted(&self, eviction: &PlannedEviction, dry_run: bool) {
        self.cache.emit(EventCategory::Gc(GcEvent::Evicted {
            hash: eviction.unit.hash.to_string(),
            size: eviction.unit.size,
            reason: eviction.reason.to_string(),
            dry_run,
        }));
    }

    fn completed(&self, plan: &Plan, dry_run: bool) {
        self.cache.emit(EventCategory::Gc(GcEvent::Completed {
            removed: plan.evict.len(),
            kept: plan.keep.len(),
            bytes: plan.bytes_freed(),
            dry_run,
        }));
    }
}

fn candidates(plan: &Plan, now: chrono::DateTime<chrono::Utc>) -> Vec<EvictionCandidate> {
    plan.evict
        .iter()
        .map(|e| EvictionCandidate {
            hash: e.unit.hash.clone(),
            size: e.unit.size,
            age_ms: millis(e.unit.age(now)),
            last_access_age_ms: millis(e.unit.idle(now)),
            reason: e.reason,
            keys: e.unit.keys.clone(),
        })
        .collect()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
