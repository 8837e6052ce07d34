//! Pure eviction planning
//!
//! The planner never touches storage. It receives one [`BlobUnit`] per distinct
//! hash (already flagged if the blob is missing) and decides, in order, which
//! units to evict and why.

use super::{EvictionReason, GcOptions, GcStrategy};
use crate::cas::BlobId;
use crate::index::CacheEntry;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;
use stencil_core::clock::elapsed;

/// Every index entry sharing one hash, treated as a single eviction unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUnit {
    /// Shared content hash
    pub hash: BlobId,
    /// Blob size, counted once however many keys point at it
    pub size: u64,
    /// Earliest `created_at` among the keys
    pub created_at: DateTime<Utc>,
    /// Latest `last_accessed_at` among the keys
    pub last_accessed_at: DateTime<Utc>,
    /// Logical keys pointing at the hash, sorted
    pub keys: Vec<String>,
    /// The index references the hash but the store does not hold it
    pub missing: bool,
}

impl BlobUnit {
    /// Group entries by hash. Output is ordered by hash.
    #[must_use]
    pub fn group(entries: &[CacheEntry]) -> Vec<Self> {
        let mut units: BTreeMap<&BlobId, Self> = BTreeMap::new();
        for entry in entries {
            units
                .entry(&entry.hash)
                .and_modify(|unit| {
                    unit.size = unit.size.max(entry.size);
                    unit.created_at = unit.created_at.min(entry.created_at);
                    unit.last_accessed_at = unit.last_accessed_at.max(entry.last_accessed_at);
                    unit.keys.push(entry.logical_key.clone());
                })
                .or_insert_with(|| Self {
                    hash: entry.hash.clone(),
                    size: entry.size,
                    created_at: entry.created_at,
                    last_accessed_at: entry.last_accessed_at,
                    keys: vec![entry.logical_key.clone()],
                    missing: false,
                });
        }
        units
            .into_values()
            .map(|mut unit| {
                unit.keys.sort();
                unit
            })
            .collect()
    }

    /// Time since creation
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        elapsed(self.created_at, now)
    }

    /// Time since last access
    #[must_use]
    pub fn idle(&self, now: DateTime<Utc>) -> Duration {
        elapsed(self.last_accessed_at, now)
    }
}

/// A unit selected for eviction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEviction {
    /// The victim
    pub unit: BlobUnit,
    /// Which rule selected it
    pub reason: EvictionReason,
}

/// Outcome of planning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Victims in the order they were selected
    pub evict: Vec<PlannedEviction>,
    /// Survivors, ordered by hash
    pub keep: Vec<BlobUnit>,
}

impl Plan {
    /// Bytes the evictions would free. Units whose blob is already gone free nothing.
    #[must_use]
    pub fn bytes_freed(&self) -> u64 {
        self.evict
            .iter()
            .filter(|e| !e.unit.missing)
            .map(|e| e.unit.size)
            .sum()
    }
}

/// Decide which units to evict under `options` as of `now`.
#[must_use]
pub fn plan(units: Vec<BlobUnit>, options: &GcOptions, now: DateTime<Utc>) -> Plan {
    let mut evict = Vec::new();

    let (missing, mut retained): (Vec<_>, Vec<_>) = units.into_iter().partition(|u| u.missing);
    evict.extend(missing.into_iter().map(|unit| PlannedEviction {
        unit,
        reason: EvictionReason::MissingBlob,
    }));

    match options.strategy {
        GcStrategy::Age => {
            expire(&mut retained, &mut evict, options.max_age, now, EvictionReason::AgeExpired);
        }
        GcStrategy::Lru => {
            expire(&mut retained, &mut evict, options.max_age, now, EvictionReason::Expired);
            if let Some(max) = options.max_size {
                prune(&mut retained, &mut evict, max, EvictionReason::Lru, by_recency, |_| true);
            }
        }
        GcStrategy::Fifo => {
            expire(&mut retained, &mut evict, options.max_age, now, EvictionReason::Expired);
            if let Some(max) = options.max_size {
                prune(&mut retained, &mut evict, max, EvictionReason::Fifo, by_creation, |_| true);
            }
        }
        GcStrategy::Size => {
            if let Some(max) = options.max_size {
                prune(&mut retained, &mut evict, max, EvictionReason::Size, by_size, |_| true);
            }
        }
        GcStrategy::Hybrid => {
            expire(&mut retained, &mut evict, options.max_age, now, EvictionReason::AgeExpired);
            if let Some(max) = options.max_size {
                let above_mean = above_mean(&retained);
                prune(&mut retained, &mut evict, max, EvictionReason::Size, by_size, above_mean);
                prune(&mut retained, &mut evict, max, EvictionReason::Lru, by_recency, |_| true);
            }
        }
    }

    retained.sort_by(|a, b| a.hash.cmp(&b.hash));
    Plan {
        evict,
        keep: retained,
    }
}

fn is_expired(unit: &BlobUnit, max_age: Duration, now: DateTime<Utc>) -> bool {
    max_age.is_zero() || unit.age(now) > max_age
}

fn expire(
    retained: &mut Vec<BlobUnit>,
    evict: &mut Vec<PlannedEviction>,
    max_age: Option<Duration>,
    now: DateTime<Utc>,
    reason: EvictionReason,
) {
    let Some(max_age) = max_age else {
        return;
    };
    let (mut expired, fresh): (Vec<_>, Vec<_>) = std::mem::take(retained)
        .into_iter()
        .partition(|u| is_expired(u, max_age, now));
    expired.sort_by(by_creation);
    evict.extend(
        expired
            .into_iter()
            .map(|unit| PlannedEviction { unit, reason }),
    );
    *retained = fresh;
}

// Walks units in `order`, evicting eligible ones until the retained total fits.
// A zero limit keeps nothing, including empty blobs.
fn prune(
    retained: &mut Vec<BlobUnit>,
    evict: &mut Vec<PlannedEviction>,
    max_size: u64,
    reason: EvictionReason,
    order: fn(&BlobUnit, &BlobUnit) -> Ordering,
    eligible: impl Fn(&BlobUnit) -> bool,
) {
    let mut total: u64 = retained.iter().map(|u| u.size).sum();
    let mut left = retained.len();
    let over = |total: u64, left: usize| total > max_size || (max_size == 0 && left > 0);

    let mut ordered = std::mem::take(retained);
    ordered.sort_by(order);
    for unit in ordered {
        if over(total, left) && eligible(&unit) {
            total -= unit.size;
            left -= 1;
            evict.push(PlannedEviction { unit, reason });
        } else {
            retained.push(unit);
        }
    }
}

// size > total / count, compared without division
fn above_mean(units: &[BlobUnit]) -> impl Fn(&BlobUnit) -> bool + use<> {
    let total: u128 = units.iter().map(|u| u128::from(u.size)).sum();
    let count = units.len() as u128;
    move |unit| u128::from(unit.size) * count > total
}

fn by_recency(a: &BlobUnit, b: &BlobUnit) -> Ordering {
    a.last_accessed_at
        .cmp(&b.last_accessed_at)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.hash.cmp(&b.hash))
}

fn by_creation(a: &BlobUnit, b: &BlobUnit) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then(a.hash.cmp(&b.hash))
}

fn by_size(a: &BlobUnit, b: &BlobUnit) -> Ordering {
    b.size
        .cmp(&a.size)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.hash.cmp(&b.hash))
}
