//! The artifact cache facade
//!
//! [`ArtifactCache`] pairs one [`ContentStore`] with one [`CacheIndex`] and keeps
//! them consistent. Every mutation runs inside a process-wide critical section
//! for the cache directory followed by the index mutex, in that order.

use crate::cas::{BlobId, ContentStore, FsContentStore, MemoryContentStore};
use crate::gc::GarbageCollector;
use crate::index::{CacheEntry, CacheIndex, INDEX_FILE_NAME, JsonFileIndex, MemoryIndex};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use stencil_core::{PathLockGuard, SharedClock, SystemClock, lock_path};
use stencil_events::{CacheEvent, EventCategory, SharedObserver, TracingObserver, emit};

/// Directory holding the sharded blob tree inside a cache root
pub const BLOBS_DIR: &str = "blobs";

/// Aggregate view of the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Distinct blobs referenced by the index
    pub file_count: usize,
    /// Logical keys
    pub entry_count: usize,
    /// Bytes across distinct blobs
    pub total_size: u64,
    /// Successful `get` calls since this handle was opened
    pub hits: u64,
    /// Unsuccessful `get` calls since this handle was opened
    pub misses: u64,
    /// Earliest `createdAt` in the index
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Latest `createdAt` in the index
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Findings of an integrity scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    /// Hashes the index references but the store does not hold
    pub missing_blobs: Vec<BlobId>,
    /// Blobs no index record references
    pub orphan_blobs: Vec<BlobId>,
    /// Blobs whose bytes no longer match their hash
    pub corrupt_blobs: Vec<BlobId>,
    /// Whether damage was repaired
    pub repaired: bool,
}

impl VerifyReport {
    /// True when nothing was found
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing_blobs.is_empty() && self.orphan_blobs.is_empty() && self.corrupt_blobs.is_empty()
    }
}

/// Index access plus the directory critical section, released together
pub(crate) struct CacheGuard<'a> {
    pub(crate) index: MutexGuard<'a, Box<dyn CacheIndex>>,
    _dir: Option<PathLockGuard>,
}

/// Content-addressed artifact cache
///
/// # Example
///
/// ```rust
/// use stencil_cache::ArtifactCache;
/// use std::collections::BTreeMap;
///
/// let cache = ArtifactCache::in_memory();
/// let entry = cache.set("component/button", b"<button/>", BTreeMap::new()).unwrap();
/// assert_eq!(cache.get("component/button").unwrap().unwrap(), b"<button/>");
/// assert_eq!(cache.get_by_hash(&entry.hash).unwrap().unwrap(), b"<button/>");
/// ```
pub struct ArtifactCache {
    root: Option<PathBuf>,
    store: Box<dyn ContentStore>,
    index: Mutex<Box<dyn CacheIndex>>,
    clock: SharedClock,
    observer: SharedObserver,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("root", &self.root)
            .field("store", &self.store)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl ArtifactCache {
    /// Open (or create) a filesystem cache at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the index
    /// cannot be loaded.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Error::io(e, &root, "create_dir_all"))?;
        let index = {
            let _dir = lock_path(&root);
            JsonFileIndex::open(root.join(INDEX_FILE_NAME))?
        };
        let store = FsContentStore::new(root.join(BLOBS_DIR));
        tracing::debug!(root = %root.display(), entries = index.len(), "Opened artifact cache");

        let mut cache = Self::new(Box::new(store), Box::new(index));
        cache.root = Some(root);
        Ok(cache)
    }

    /// A cache that lives only as long as this value
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryContentStore::new()),
            Box::new(MemoryIndex::new()),
        )
    }

    /// Assemble a cache from explicit backends
    #[must_use]
    pub fn new(store: Box<dyn ContentStore>, index: Box<dyn CacheIndex>) -> Self {
        Self {
            root: None,
            store,
            index: Mutex::new(index),
            clock: Arc::new(SystemClock),
            observer: TracingObserver::shared(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Use `clock` for every timestamp and age computation
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Send lifecycle events to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Cache directory, for filesystem caches
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Garbage collector bound to this cache
    #[must_use]
    pub fn gc(&self) -> GarbageCollector<'_> {
        GarbageCollector::new(self)
    }

    // Other handles on the same directory may have written the index since we
    // last looked, so it is re-read once the directory lock is held.
    pub(crate) fn lock(&self) -> Result<CacheGuard<'_>> {
        let dir = self.root.as_deref().map(lock_path);
        let mut index = self
            .index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        index.reload()?;
        Ok(CacheGuard { index, _dir: dir })
    }

    pub(crate) fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn emit(&self, category: EventCategory) {
        emit(self.observer.as_ref(), category);
    }

    /// Store `content` under `key`.
    ///
    /// When `key` previously pointed at other content that no remaining key
    /// references, that blob is removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for an empty key, or a storage error if the
    /// blob or the index cannot be written.
    pub fn set(
        &self,
        key: &str,
        content: &[u8],
        tags: BTreeMap<String, String>,
    ) -> Result<CacheEntry> {
        validate_key(key)?;
        let mut guard = self.lock()?;

        let previous = guard.index.lookup(key).map(|e| e.hash);
        let expected = BlobId::from_data(content);
        let deduplicated = self.store.has(&expected);
        let hash = self.store.put(content)?;
        let entry = guard
            .index
            .record(key, &hash, content.len() as u64, tags, self.now())?;
        if let Some(old) = previous
            && old != hash
            && guard.index.references(&old) == 0
        {
            self.store.remove(&old)?;
            tracing::debug!(key, hash = %old, "Removed superseded blob");
        }
        drop(guard);

        self.emit(EventCategory::Cache(CacheEvent::Stored {
            key: key.to_string(),
            hash: hash.to_string(),
            size: entry.size,
            deduplicated,
        }));
        Ok(entry)
    }

    /// Content stored under `key`, bumping its access time.
    ///
    /// A record whose blob is missing or damaged is dropped and reported as a
    /// miss.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store or index cannot be accessed.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut guard = self.lock()?;

        let Some(entry) = guard.index.lookup(key) else {
            drop(guard);
            return Ok(self.miss(key));
        };

        let detail = match self.store.get(&entry.hash) {
            Ok(Some(data)) => {
                guard.index.touch(key, self.now())?;
                drop(guard);
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.emit(EventCategory::Cache(CacheEvent::Hit {
                    key: key.to_string(),
                    hash: entry.hash.to_string(),
                }));
                return Ok(Some(data));
            }
            Ok(None) => "blob missing from store".to_string(),
            Err(err @ Error::Integrity { .. }) => {
                self.store.remove(&entry.hash)?;
                err.to_string()
            }
            Err(err) => return Err(err),
        };

        guard.index.remove_hash(&entry.hash)?;
        drop(guard);
        self.emit(EventCategory::Cache(CacheEvent::Corruption {
            key: Some(key.to_string()),
            hash: entry.hash.to_string(),
            detail,
        }));
        Ok(self.miss(key))
    }

    fn miss(&self, key: &str) -> Option<Vec<u8>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.emit(EventCategory::Cache(CacheEvent::Miss {
            key: key.to_string(),
        }));
        None
    }

    /// Content with `hash`, regardless of which key stored it. Does not touch
    /// access times.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or [`Error::Integrity`] if the blob is damaged.
    pub fn get_by_hash(&self, hash: &BlobId) -> Result<Option<Vec<u8>>> {
        self.store.get(hash)
    }

    /// Record for `key` without touching it
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index cannot be reloaded.
    pub fn lookup(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.index.lookup(key))
    }

    /// Remove `key`. The blob goes too once no other key references it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index or store cannot be updated.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut guard = self.lock()?;
        let Some(entry) = guard.index.remove(key)? else {
            return Ok(false);
        };
        let blob_removed = guard.index.references(&entry.hash) == 0 && self.store.remove(&entry.hash)?;
        drop(guard);

        self.emit(EventCategory::Cache(CacheEvent::Deleted {
            key: key.to_string(),
            hash: entry.hash.to_string(),
            blob_removed,
        }));
        Ok(true)
    }

    /// Remove every record and blob. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index or store cannot be updated.
    pub fn clear(&self) -> Result<usize> {
        let mut guard = self.lock()?;
        let removed = guard.index.clear()?;
        for hash in self.store.list()? {
            self.store.remove(&hash)?;
        }
        tracing::info!(removed, "Cleared artifact cache");
        Ok(removed)
    }

    /// Aggregate counters
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index cannot be reloaded.
    pub fn stats(&self) -> Result<CacheStats> {
        let entries = self.lock()?.index.all();
        Ok(self.stats_for(&entries))
    }

    pub(crate) fn stats_for(&self, entries: &[CacheEntry]) -> CacheStats {
        let mut sizes: BTreeMap<&BlobId, u64> = BTreeMap::new();
        for entry in entries {
            sizes.insert(&entry.hash, entry.size);
        }
        CacheStats {
            file_count: sizes.len(),
            entry_count: entries.len(),
            total_size: sizes.values().sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            oldest_entry: entries.iter().map(|e| e.created_at).min(),
            newest_entry: entries.iter().map(|e| e.created_at).max(),
        }
    }

    /// Point-in-time copy of every record
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index cannot be reloaded.
    pub fn snapshot(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.lock()?.index.all())
    }

    /// Scan for missing, orphaned and damaged blobs.
    ///
    /// With `repair`, records pointing at missing or damaged blobs are dropped
    /// and orphan and damaged blobs are deleted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the scan or a repair step fails.
    pub fn verify(&self, repair: bool) -> Result<VerifyReport> {
        let mut guard = self.lock()?;
        let referenced: BTreeSet<BlobId> = guard.index.all().into_iter().map(|e| e.hash).collect();
        let stored: BTreeSet<BlobId> = self.store.list()?.into_iter().collect();

        let mut report = VerifyReport {
            missing_blobs: referenced.difference(&stored).cloned().collect(),
            orphan_blobs: stored.difference(&referenced).cloned().collect(),
            ..VerifyReport::default()
        };
        for hash in referenced.intersection(&stored) {
            match self.store.get(hash) {
                Ok(_) => {}
                Err(Error::Integrity { .. }) => report.corrupt_blobs.push(hash.clone()),
                Err(err) => return Err(err),
            }
        }

        for hash in report.missing_blobs.iter().chain(&report.corrupt_blobs) {
            self.emit(EventCategory::Cache(CacheEvent::Corruption {
                key: None,
                hash: hash.to_string(),
                detail: if report.corrupt_blobs.contains(hash) {
                    "content does not match hash".to_string()
                } else {
                    "blob missing from store".to_string()
                },
            }));
        }

        if repair && !report.is_clean() {
            let dropped: Vec<BlobId> = report
                .missing_blobs
                .iter()
                .chain(&report.corrupt_blobs)
                .cloned()
                .collect();
            guard.index.remove_hashes(&dropped)?;
            for hash in report.orphan_blobs.iter().chain(&report.corrupt_blobs) {
                self.store.remove(hash)?;
            }
            report.repaired = true;
            tracing::info!(
                missing = report.missing_blobs.len(),
                orphans = report.orphan_blobs.len(),
                corrupt = report.corrupt_blobs.len(),
                "Repaired artifact cache"
            );
        }
        Ok(report)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::invalid_key(key, "keys must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_core::ManualClock;
    use stencil_events::RecordingObserver;
    use tempfile::TempDir;

    fn recorded() -> (ArtifactCache, Arc<RecordingObserver>) {
        let recorder = Arc::new(RecordingObserver::new());
        let cache = ArtifactCache::in_memory().with_observer(recorder.clone());
        (cache, recorder)
    }

    #[test]
    fn test_set_and_get() {
        let (cache, recorder) = recorded();
        cache.set("k", b"content", BTreeMap::new()).unwrap();
        assert_eq!(cache.get("k").unwrap().unwrap(), b"content");
        assert!(cache.get("other").unwrap().is_none());
        assert_eq!(
            recorder.event_types(),
            vec!["cache.stored", "cache.hit", "cache.miss"]
        );
        let stats = cache.stats().unwrap();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_empty_key_rejected() {
        let cache = ArtifactCache::in_memory();
        assert!(matches!(
            cache.set("  ", b"x", BTreeMap::new()),
            Err(Error::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_get_touches_access_time() {
        let clock = Arc::new(ManualClock::at_epoch_secs(1_000));
        let cache = ArtifactCache::in_memory().with_clock(clock.clone());
        cache.set("k", b"x", BTreeMap::new()).unwrap();
        clock.advance(std::time::Duration::from_secs(60));
        cache.get("k").unwrap();

        let entry = cache.lookup("k").unwrap().unwrap();
        assert_eq!(entry.created_at.timestamp(), 1_000);
        assert_eq!(entry.last_accessed_at.timestamp(), 1_060);
    }

    #[test]
    fn test_dedup_counts_one_file() {
        let (cache, recorder) = recorded();
        cache.set("a", b"same", BTreeMap::new()).unwrap();
        cache.set("b", b"same", BTreeMap::new()).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size, 4);

        let events = recorder.events();
        assert!(matches!(
            &events[1].category,
            EventCategory::Cache(CacheEvent::Stored { deduplicated: true, .. })
        ));
    }

    #[test]
    fn test_delete_keeps_shared_blob() {
        let cache = ArtifactCache::in_memory();
        let entry = cache.set("a", b"same", BTreeMap::new()).unwrap();
        cache.set("b", b"same", BTreeMap::new()).unwrap();

        assert!(cache.delete("a").unwrap());
        assert!(cache.get_by_hash(&entry.hash).unwrap().is_some());
        assert!(cache.delete("b").unwrap());
        assert!(cache.get_by_hash(&entry.hash).unwrap().is_none());
        assert!(!cache.delete("b").unwrap());
    }

    #[test]
    fn test_missing_blob_is_corruption_then_miss() {
        let tmp = TempDir::new().unwrap();
        let recorder = Arc::new(RecordingObserver::new());
        let cache = ArtifactCache::open(tmp.path())
            .unwrap()
            .with_observer(recorder.clone());
        let entry = cache.set("k", b"content", BTreeMap::new()).unwrap();

        let blob = FsContentStore::new(tmp.path().join(BLOBS_DIR)).blob_path(&entry.hash);
        std::fs::remove_file(blob).unwrap();

        assert!(cache.get("k").unwrap().is_none());
        assert!(cache.lookup("k").unwrap().is_none());
        assert_eq!(
            recorder.event_types(),
            vec!["cache.stored", "cache.corruption", "cache.miss"]
        );
    }

    #[test]
    fn test_damaged_blob_is_dropped() {
        let store = MemoryContentStore::new();
        let hash = store.put(b"good").unwrap();
        store.corrupt(&hash, b"evil".to_vec());
        let mut index = MemoryIndex::new();
        index
            .record("k", &hash, 4, BTreeMap::new(), Utc::now())
            .unwrap();
        let cache = ArtifactCache::new(Box::new(store), Box::new(index));

        assert!(cache.get("k").unwrap().is_none());
        assert!(cache.get_by_hash(&hash).unwrap().is_none());
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_verify_and_repair() {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::open(tmp.path()).unwrap();
        let kept = cache.set("kept", b"kept", BTreeMap::new()).unwrap();
        let lost = cache.set("lost", b"lost", BTreeMap::new()).unwrap();

        let store = FsContentStore::new(tmp.path().join(BLOBS_DIR));
        std::fs::remove_file(store.blob_path(&lost.hash)).unwrap();
        let orphan = store.put(b"orphan").unwrap();

        let report = cache.verify(false).unwrap();
        assert_eq!(report.missing_blobs, vec![lost.hash.clone()]);
        assert_eq!(report.orphan_blobs, vec![orphan.clone()]);
        assert!(report.corrupt_blobs.is_empty());
        assert!(!report.repaired);
        assert!(cache.lookup("lost").unwrap().is_some());

        let report = cache.verify(true).unwrap();
        assert!(report.repaired);
        assert!(cache.lookup("lost").unwrap().is_none());
        assert!(!store.has(&orphan));
        assert!(store.has(&kept.hash));
        assert!(cache.verify(false).unwrap().is_clean());
    }

    #[test]
    fn test_clear() {
        let cache = ArtifactCache::in_memory();
        let entry = cache.set("a", b"1", BTreeMap::new()).unwrap();
        cache.set("b", b"2", BTreeMap::new()).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
        assert!(cache.get_by_hash(&entry.hash).unwrap().is_none());
    }

    #[test]
    fn test_reopen_sees_entries() {
        let tmp = TempDir::new().unwrap();
        {
            let cache = ArtifactCache::open(tmp.path()).unwrap();
            cache.set("k", b"persisted", BTreeMap::new()).unwrap();
        }
        let cache = ArtifactCache::open(tmp.path()).unwrap();
        assert_eq!(cache.get("k").unwrap().unwrap(), b"persisted");
        assert!(tmp.path().join(INDEX_FILE_NAME).is_file());
    }

    #[test]
    fn test_overwrite_removes_superseded_blob() {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::open(tmp.path()).unwrap();
        let first = cache.set("k", &[b'a'; 1000], BTreeMap::new()).unwrap();
        let second = cache.set("k", b"0123456789", BTreeMap::new()).unwrap();

        let store = FsContentStore::new(tmp.path().join(BLOBS_DIR));
        assert!(!store.has(&first.hash));
        assert!(store.has(&second.hash));
        assert!(cache.verify(false).unwrap().is_clean());
        assert_eq!(cache.stats().unwrap().total_size, 10);
    }

    #[test]
    fn test_overwrite_keeps_blob_shared_with_other_key() {
        let cache = ArtifactCache::in_memory();
        let shared = cache.set("a", b"shared", BTreeMap::new()).unwrap();
        cache.set("b", b"shared", BTreeMap::new()).unwrap();
        cache.set("a", b"fresh", BTreeMap::new()).unwrap();

        assert!(cache.get_by_hash(&shared.hash).unwrap().is_some());
        assert_eq!(cache.get("b").unwrap().unwrap(), b"shared");
    }

    #[test]
    fn test_handles_on_same_directory_see_each_other() {
        let tmp = TempDir::new().unwrap();
        let a = ArtifactCache::open(tmp.path()).unwrap();
        let b = ArtifactCache::open(tmp.path()).unwrap();
        a.set("from_a", b"a", BTreeMap::new()).unwrap();
        b.set("from_b", b"b", BTreeMap::new()).unwrap();
        assert!(a.lookup("from_b").unwrap().is_some());

        let reopened = ArtifactCache::open(tmp.path()).unwrap();
        assert!(reopened.lookup("from_a").unwrap().is_some());
        assert!(reopened.lookup("from_b").unwrap().is_some());
        assert!(reopened.verify(false).unwrap().is_clean());
    }
}
