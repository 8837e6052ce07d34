//! Metadata ledger over stored blobs
//!
//! The index maps logical keys to content hashes and carries the timestamps the
//! garbage collector plans over. Many keys may share one hash.

use crate::cas::BlobId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Index file schema version
pub const INDEX_VERSION: u32 = 1;

/// File name of the persisted index inside the cache root
pub const INDEX_FILE_NAME: &str = "index.json";

/// One logical key's record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Caller-supplied key
    pub logical_key: String,
    /// Hash of the stored content
    pub hash: BlobId,
    /// Byte length of the stored content
    pub size: u64,
    /// When this key first pointed at `hash`
    pub created_at: DateTime<Utc>,
    /// Last read or write through this key
    pub last_accessed_at: DateTime<Utc>,
    /// Opaque reporting metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Storage for [`CacheEntry`] records.
///
/// Implementations are the only writers of index records. Callers serialize
/// access (the [`ArtifactCache`](crate::ArtifactCache) holds them behind a mutex).
pub trait CacheIndex: Send + fmt::Debug {
    /// Insert or update the record for `key`.
    ///
    /// Re-recording the same hash keeps `created_at`; a different hash starts a
    /// new lifetime.
    fn record(
        &mut self,
        key: &str,
        hash: &BlobId,
        size: u64,
        tags: BTreeMap<String, String>,
        at: DateTime<Utc>,
    ) -> Result<CacheEntry>;

    /// Record for `key`, if any.
    fn lookup(&self, key: &str) -> Option<CacheEntry>;

    /// Bump `last_accessed_at`. Returns `false` for unknown keys.
    fn touch(&mut self, key: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Every record, ordered by key.
    fn all(&self) -> Vec<CacheEntry>;

    /// Drop the record for `key`.
    fn remove(&mut self, key: &str) -> Result<Option<CacheEntry>>;

    /// Drop every record pointing at `hash`.
    fn remove_hash(&mut self, hash: &BlobId) -> Result<Vec<CacheEntry>>;

    /// Drop every record pointing at any of `hashes`. Returns the number of records removed.
    fn remove_hashes(&mut self, hashes: &[BlobId]) -> Result<usize> {
        let mut removed = 0;
        for hash in hashes {
            removed += self.remove_hash(hash)?.len();
        }
        Ok(removed)
    }

    /// Number of keys pointing at `hash`.
    fn references(&self, hash: &BlobId) -> usize;

    /// Drop every record. Returns how many there were.
    fn clear(&mut self) -> Result<usize>;

    /// Number of records.
    fn len(&self) -> usize;

    /// Whether the index holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-read persisted state written by other handles. Volatile indexes have
    /// nothing to re-read.
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct EntryTable {
    entries: BTreeMap<String, CacheEntry>,
}

impl EntryTable {
    fn from_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.logical_key.clone(), e))
                .collect(),
        }
    }

    fn record(
        &mut self,
        key: &str,
        hash: &BlobId,
        size: u64,
        tags: BTreeMap<String, String>,
        at: DateTime<Utc>,
    ) -> CacheEntry {
        let created_at = match self.entries.get(key) {
            Some(existing) if existing.hash == *hash => existing.created_at,
            _ => at,
        };
        let entry = CacheEntry {
            logical_key: key.to_string(),
            hash: hash.clone(),
            size,
            created_at,
            last_accessed_at: at,
            tags,
        };
        self.entries.insert(key.to_string(), entry.clone());
        entry
    }

    fn touch(&mut self, key: &str, at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed_at = entry.last_accessed_at.max(at);
                true
            }
            None => false,
        }
    }

    fn remove_hash(&mut self, hash: &BlobId) -> Vec<CacheEntry> {
        let keys: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.hash == *hash)
            .map(|e| e.logical_key.clone())
            .collect();
        keys.iter()
            .filter_map(|k| self.entries.remove(k))
            .collect()
    }

    fn references(&self, hash: &BlobId) -> usize {
        self.entries.values().filter(|e| e.hash == *hash).count()
    }

    fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

/// Volatile index for tests and ephemeral caches
#[derive(Debug, Default, Clone)]
pub struct MemoryIndex {
    table: EntryTable,
}

impl MemoryIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheIndex for MemoryIndex {
    fn record(
        &mut self,
        key: &str,
        hash: &BlobId,
        size: u64,
        tags: BTreeMap<String, String>,
        at: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        Ok(self.table.record(key, hash, size, tags, at))
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.table.entries.get(key).cloned()
    }

    fn touch(&mut self, key: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.table.touch(key, at))
    }

    fn all(&self) -> Vec<CacheEntry> {
        self.table.entries.values().cloned().collect()
    }

    fn remove(&mut self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.table.entries.remove(key))
    }

    fn remove_hash(&mut self, hash: &BlobId) -> Result<Vec<CacheEntry>> {
        Ok(self.table.remove_hash(hash))
    }

    fn references(&self, hash: &BlobId) -> usize {
        self.table.references(hash)
    }

    fn clear(&mut self) -> Result<usize> {
        Ok(self.table.clear())
    }

    fn len(&self) -> usize {
        self.table.entries.len()
    }
}

/// On-disk layout of `index.json`
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

fn load_table(path: &Path) -> Result<EntryTable> {
    let Some(bytes) = stencil_core::fs::read_optional(path)? else {
        return Ok(EntryTable::default());
    };
    let file: IndexFile = serde_json::from_slice(&bytes).map_err(|e| {
        Error::serialization(format!(
            "Failed to parse cache index {}: {e}",
            path.display()
        ))
    })?;
    if file.version != INDEX_VERSION {
        return Err(Error::configuration(format!(
            "Unsupported cache index version {} in {} (expected {INDEX_VERSION})",
            file.version,
            path.display()
        )));
    }
    Ok(EntryTable::from_entries(file.entries))
}

/// Index persisted as a JSON document, rewritten atomically on every mutation
#[derive(Debug)]
pub struct JsonFileIndex {
    path: PathBuf,
    table: EntryTable,
}

impl JsonFileIndex {
    /// Load the index at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the file is not a valid index, a
    /// configuration error for an unsupported schema version, or an I/O error
    /// if it cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = load_table(&path)?;
        tracing::debug!(
            path = %path.display(),
            entries = table.entries.len(),
            "Loaded cache index"
        );
        Ok(Self { path, table })
    }

    /// Location of the index file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let file = IndexFile {
            version: INDEX_VERSION,
            entries: self.table.entries.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| Error::serialization(format!("Failed to serialize cache index: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }
        stencil_core::fs::atomic_write(&self.path, &json)?;
        Ok(())
    }

    // Applies a mutation and persists it; the in-memory table is rolled back if
    // the write fails so memory never runs ahead of disk.
    fn mutate<T>(&mut self, f: impl FnOnce(&mut EntryTable) -> T) -> Result<T> {
        let before = self.table.clone();
        let out = f(&mut self.table);
        if let Err(err) = self.save() {
            self.table = before;
            return Err(err);
        }
        Ok(out)
    }
}

impl CacheIndex for JsonFileIndex {
    fn record(
        &mut self,
        key: &str,
        hash: &BlobId,
        size: u64,
        tags: BTreeMap<String, String>,
        at: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        self.mutate(|t| t.record(key, hash, size, tags, at))
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.table.entries.get(key).cloned()
    }

    fn touch(&mut self, key: &str, at: DateTime<Utc>) -> Result<bool> {
        if !self.table.entries.contains_key(key) {
            return Ok(false);
        }
        self.mutate(|t| t.touch(key, at))
    }

    fn all(&self) -> Vec<CacheEntry> {
        self.table.entries.values().cloned().collect()
    }

    fn remove(&mut self, key: &str) -> Result<Option<CacheEntry>> {
        if !self.table.entries.contains_key(key) {
            return Ok(None);
        }
        self.mutate(|t| t.entries.remove(key))
    }

    fn remove_hash(&mut self, hash: &BlobId) -> Result<Vec<CacheEntry>> {
        if self.table.references(hash) == 0 {
            return Ok(Vec::new());
        }
        self.mutate(|t| t.remove_hash(hash))
    }

    fn remove_hashes(&mut self, hashes: &[BlobId]) -> Result<usize> {
        if hashes.iter().all(|h| self.table.references(h) == 0) {
            return Ok(0);
        }
        self.mutate(|t| hashes.iter().map(|h| t.remove_hash(h).len()).sum())
    }

    fn references(&self, hash: &BlobId) -> usize {
        self.table.references(hash)
    }

    fn clear(&mut self) -> Result<usize> {
        self.mutate(EntryTable::clear)
    }

    fn len(&self) -> usize {
        self.table.entries.len()
    }

    fn reload(&mut self) -> Result<()> {
        self.table = load_table(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn hash(data: &str) -> BlobId {
        BlobId::from_data(data.as_bytes())
    }

    #[test]
    fn test_record_same_hash_keeps_created_at() {
        let mut index = MemoryIndex::new();
        index
            .record("k", &hash("a"), 1, BTreeMap::new(), at(100))
            .unwrap();
        let entry = index
            .record("k", &hash("a"), 1, BTreeMap::new(), at(200))
            .unwrap();
        assert_eq!(entry.created_at, at(100));
        assert_eq!(entry.last_accessed_at, at(200));
    }

    #[test]
    fn test_record_new_hash_resets_created_at() {
        let mut index = MemoryIndex::new();
        index
            .record("k", &hash("a"), 1, BTreeMap::new(), at(100))
            .unwrap();
        let entry = index
            .record("k", &hash("b"), 1, BTreeMap::new(), at(200))
            .unwrap();
        assert_eq!(entry.created_at, at(200));
        assert_eq!(index.references(&hash("a")), 0);
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut index = MemoryIndex::new();
        index
            .record("k", &hash("a"), 1, BTreeMap::new(), at(100))
            .unwrap();
        assert!(index.touch("k", at(50)).unwrap());
        assert_eq!(index.lookup("k").unwrap().last_accessed_at, at(100));
        assert!(!index.touch("missing", at(300)).unwrap());
    }

    #[test]
    fn test_remove_hash_drops_all_keys() {
        let mut index = MemoryIndex::new();
        index
            .record("one", &hash("a"), 1, BTreeMap::new(), at(1))
            .unwrap();
        index
            .record("two", &hash("a"), 1, BTreeMap::new(), at(2))
            .unwrap();
        index
            .record("three", &hash("b"), 1, BTreeMap::new(), at(3))
            .unwrap();
        assert_eq!(index.references(&hash("a")), 2);

        let removed = index.remove_hash(&hash("a")).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(index.len(), 1);
        assert!(index.lookup("three").is_some());
    }

    #[test]
    fn test_json_index_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE_NAME);

        let mut tags = BTreeMap::new();
        tags.insert("generator".to_string(), "component".to_string());
        {
            let mut index = JsonFileIndex::open(&path).unwrap();
            index.record("k", &hash("a"), 42, tags.clone(), at(10)).unwrap();
            index.touch("k", at(20)).unwrap();
        }

        let index = JsonFileIndex::open(&path).unwrap();
        let entry = index.lookup("k").unwrap();
        assert_eq!(entry.size, 42);
        assert_eq!(entry.created_at, at(10));
        assert_eq!(entry.last_accessed_at, at(20));
        assert_eq!(entry.tags, tags);
    }

    #[test]
    fn test_json_index_uses_camel_case() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE_NAME);
        let mut index = JsonFileIndex::open(&path).unwrap();
        index
            .record("k", &hash("a"), 1, BTreeMap::new(), at(10))
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"version\": 1"));
        assert!(raw.contains("\"logicalKey\""));
        assert!(raw.contains("\"lastAccessedAt\""));
    }

    #[test]
    fn test_json_index_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE_NAME);
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            JsonFileIndex::open(&path),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn test_json_index_rejects_future_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE_NAME);
        std::fs::write(&path, br#"{"version": 2, "entries": []}"#).unwrap();
        assert!(matches!(
            JsonFileIndex::open(&path),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_json_remove_hashes_batches() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE_NAME);
        let mut index = JsonFileIndex::open(&path).unwrap();
        for (key, data) in [("a", "1"), ("b", "2"), ("c", "3")] {
            index
                .record(key, &hash(data), 1, BTreeMap::new(), at(1))
                .unwrap();
        }
        let removed = index.remove_hashes(&[hash("1"), hash("3")]).unwrap();
        assert_eq!(removed, 2);

        let reopened = JsonFileIndex::open(&path).unwrap();
        assert_eq!(
            reopened
                .all()
                .into_iter()
                .map(|e| e.logical_key)
                .collect::<Vec<_>>(),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn test_clear() {
        let mut index = MemoryIndex::new();
        index
            .record("a", &hash("1"), 1, BTreeMap::new(), at(1))
            .unwrap();
        assert_eq!(index.clear().unwrap(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_json_reload_picks_up_other_writer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE_NAME);
        let mut first = JsonFileIndex::open(&path).unwrap();
        let mut second = JsonFileIndex::open(&path).unwrap();

        first.record("a", &hash("1"), 1, BTreeMap::new(), at(1)).unwrap();
        second.reload().unwrap();
        second.record("b", &hash("2"), 1, BTreeMap::new(), at(2)).unwrap();

        let reopened = JsonFileIndex::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
    }
}
