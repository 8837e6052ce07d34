//! Content-addressable blob storage
//!
//! Blobs are stored by their SHA-256 hash in a two-level directory structure to
//! avoid filesystem limitations with large numbers of files in a single
//! directory.
//!
//! ## Directory Structure
//!
//! ```text
//! <cache root>/blobs/
//!   ab/
//!     cd/
//!       abcdef123456... (actual blob)
//! ```
//!
//! Stores hold bytes only. Which blobs are wanted, and for how long, is decided
//! by the index and the garbage collector.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A blob identifier (SHA-256 hash as lowercase hex)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

impl BlobId {
    /// Compute blob ID from data
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hex::encode(hash))
    }

    /// Create from hex string (validation)
    ///
    /// # Errors
    ///
    /// Returns error if the hex string is invalid or wrong length
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let s = hex.into();
        if s.len() != 64 {
            return Err(Error::invalid_hash(
                &s,
                format!("expected 64 hex characters, got {}", s.len()),
            ));
        }
        if !s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(Error::invalid_hash(&s, "must contain only lowercase hex digits"));
        }
        Ok(Self(s))
    }

    /// Get the hex representation
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for BlobId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(value)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

/// Immutable byte storage keyed by content hash.
///
/// A miss is `Ok(None)`, never an error. Errors are reserved for the storage
/// medium failing or for bytes that no longer match their hash.
pub trait ContentStore: Send + Sync + fmt::Debug {
    /// Store bytes and return their hash. Storing the same bytes again writes nothing.
    fn put(&self, data: &[u8]) -> Result<BlobId>;

    /// Load a blob, verifying its hash.
    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>>;

    /// Whether a blob is present.
    fn has(&self, id: &BlobId) -> bool;

    /// Remove a blob. Returns `false` if it was already absent.
    fn remove(&self, id: &BlobId) -> Result<bool>;

    /// Size of a blob without loading it.
    fn size(&self, id: &BlobId) -> Result<Option<u64>>;

    /// Every blob currently stored.
    fn list(&self) -> Result<Vec<BlobId>>;
}

fn verify(id: &BlobId, data: &[u8]) -> Result<()> {
    let computed = BlobId::from_data(data);
    if computed != *id {
        return Err(Error::Integrity {
            expected: id.to_string(),
            computed: computed.to_string(),
        });
    }
    Ok(())
}

/// Filesystem-backed content store
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Create a store rooted at `root` (created lazily on first write)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the sharded blob tree
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the path for a blob based on its ID
    ///
    /// Uses a two-level directory structure: `{root}/{id[0:2]}/{id[2:4]}/{id}`
    #[must_use]
    pub fn blob_path(&self, id: &BlobId) -> PathBuf {
        let hex = id.as_hex();
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(hex)
    }
}

impl ContentStore for FsContentStore {
    fn put(&self, data: &[u8]) -> Result<BlobId> {
        let id = BlobId::from_data(data);
        let path = self.blob_path(&id);

        // Check if blob already exists
        if path.exists() {
            tracing::trace!(hash = %id.short(), "Blob already stored");
            return Ok(id);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }

        stencil_core::fs::atomic_write(&path, data)?;
        tracing::debug!(hash = %id.short(), size = data.len(), "Stored blob");
        Ok(id)
    }

    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(id);
        let Some(data) = stencil_core::fs::read_optional(&path)? else {
            return Ok(None);
        };
        verify(id, &data)?;
        Ok(Some(data))
    }

    fn has(&self, id: &BlobId) -> bool {
        self.blob_path(id).is_file()
    }

    fn remove(&self, id: &BlobId) -> Result<bool> {
        let path = self.blob_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(e, &path, "remove_file")),
        }
    }

    fn size(&self, id: &BlobId) -> Result<Option<u64>> {
        let path = self.blob_path(id);
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(e, &path, "metadata")),
        }
    }

    fn list(&self) -> Result<Vec<BlobId>> {
        let mut blobs = Vec::new();
        if !self.root.exists() {
            return Ok(blobs);
        }

        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| self.root.clone(), Path::to_path_buf);
                Error::io(e.into(), path, "read_dir")
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            // Temp files and strays are not blobs
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| BlobId::from_hex(name).ok())
            {
                blobs.push(id);
            }
        }

        Ok(blobs)
    }
}

/// In-memory content store, for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<BlobId, Vec<u8>>>,
}

impl MemoryContentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, HashMap<BlobId, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overwrite the bytes stored under `id` without rehashing.
    ///
    /// Only meant for simulating on-disk damage in tests.
    pub fn corrupt(&self, id: &BlobId, data: Vec<u8>) {
        self.blobs().insert(id.clone(), data);
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, data: &[u8]) -> Result<BlobId> {
        let id = BlobId::from_data(data);
        self.blobs()
            .entry(id.clone())
            .or_insert_with(|| data.to_vec());
        Ok(id)
    }

    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        let Some(data) = self.blobs().get(id).cloned() else {
            return Ok(None);
        };
        verify(id, &data)?;
        Ok(Some(data))
    }

    fn has(&self, id: &BlobId) -> bool {
        self.blobs().contains_key(id)
    }

    fn remove(&self, id: &BlobId) -> Result<bool> {
        Ok(self.blobs().remove(id).is_some())
    }

    fn size(&self, id: &BlobId) -> Result<Option<u64>> {
        Ok(self.blobs().get(id).map(|d| d.len() as u64))
    }

    fn list(&self) -> Result<Vec<BlobId>> {
        let mut ids: Vec<BlobId> = self.blobs().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blob_id_from_data() {
        let data = b"hello world";
        let id = BlobId::from_data(data);
        // SHA-256 of "hello world"
        assert_eq!(
            id.as_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(id.short(), "b94d27b9934d");
    }

    #[test]
    fn test_blob_id_validation() {
        // Valid
        assert!(
            BlobId::from_hex("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef")
                .is_ok()
        );

        // Too short
        assert!(BlobId::from_hex("abc").is_err());

        // Invalid characters
        assert!(
            BlobId::from_hex("xyz3456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef")
                .is_err()
        );

        // Uppercase would map to a different blob path
        assert!(
            BlobId::from_hex("0123456789ABCDEF0123456789abcdef0123456789abcdef0123456789abcdef")
                .is_err()
        );
    }

    #[test]
    fn test_blob_id_serde_validates() {
        let id = BlobId::from_data(b"x");
        let json = serde_json::to_string(&id).unwrap();
        let back: BlobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<BlobId>("\"nothex\"").is_err());
    }

    #[test]
    fn test_store_and_load() {
        let tmp = TempDir::new().unwrap();
        let store = FsContentStore::new(tmp.path());

        let data = b"test data";
        let id = store.put(data).unwrap();

        assert!(store.has(&id));
        assert_eq!(store.get(&id).unwrap().unwrap(), data);
    }

    #[test]
    fn test_store_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FsContentStore::new(tmp.path());

        let data = b"test data";
        let id1 = store.put(data).unwrap();
        let id2 = store.put(data).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_load_nonexistent_is_miss() {
        let tmp = TempDir::new().unwrap();
        let store = FsContentStore::new(tmp.path());

        let id =
            BlobId::from_hex("0000000000000000000000000000000000000000000000000000000000000000")
                .unwrap();
        assert!(store.get(&id).unwrap().is_none());
        assert!(!store.has(&id));
        assert_eq!(store.size(&id).unwrap(), None);
    }

    #[test]
    fn test_integrity_check() {
        let tmp = TempDir::new().unwrap();
        let store = FsContentStore::new(tmp.path());

        let id = store.put(b"test data").unwrap();

        // Corrupt the blob on disk
        fs::write(store.blob_path(&id), b"corrupted").unwrap();

        assert!(matches!(store.get(&id), Err(Error::Integrity { .. })));
    }

    #[test]
    fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let store = FsContentStore::new(tmp.path());

        let id = store.put(b"test data").unwrap();
        assert!(store.remove(&id).unwrap());
        assert!(!store.has(&id));
        assert!(!store.remove(&id).unwrap());
    }

    #[test]
    fn test_list_skips_strays() {
        let tmp = TempDir::new().unwrap();
        let store = FsContentStore::new(tmp.path());

        let id1 = store.put(b"data1").unwrap();
        let id2 = store.put(b"data2").unwrap();
        let shard = store.blob_path(&id1);
        fs::write(shard.with_file_name(".stencil-abc.tmp"), b"partial").unwrap();

        let mut blobs = store.list().unwrap();
        blobs.sort();
        let mut expected = vec![id1, id2];
        expected.sort();
        assert_eq!(blobs, expected);
    }

    #[test]
    fn test_size() {
        let tmp = TempDir::new().unwrap();
        let store = FsContentStore::new(tmp.path());

        let data = b"test data with some length";
        let id = store.put(data).unwrap();

        assert_eq!(store.size(&id).unwrap(), Some(data.len() as u64));
    }

    #[test]
    fn test_two_level_directory_structure() {
        let tmp = TempDir::new().unwrap();
        let store = FsContentStore::new(tmp.path());

        let id = store.put(b"test").unwrap();

        let path = store.blob_path(&id);
        let hex = id.as_hex();
        let rel = path.strip_prefix(tmp.path()).unwrap();
        let parts: Vec<_> = rel.iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(parts, vec![&hex[0..2], &hex[2..4], hex]);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryContentStore::new();
        let id = store.put(b"abc").unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap(), b"abc");
        assert_eq!(store.size(&id).unwrap(), Some(3));
        assert_eq!(store.list().unwrap(), vec![id.clone()]);
        assert!(store.remove(&id).unwrap());
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_detects_corruption() {
        let store = MemoryContentStore::new();
        let id = store.put(b"abc").unwrap();
        store.corrupt(&id, b"abd".to_vec());
        assert!(matches!(store.get(&id), Err(Error::Integrity { .. })));
    }
}
