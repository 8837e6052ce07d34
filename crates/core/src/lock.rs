//! Process-wide critical sections keyed by filesystem path.
//!
//! Every cache directory and every operation target gets one mutex for the
//! lifetime of the process. Two callers naming the same path (even through
//! different relative spellings) always contend on the same mutex.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Guard for a path critical section. The section is released on drop.
#[derive(Debug)]
pub struct PathLockGuard {
    path: PathBuf,
    _guard: MutexGuard<'static, ()>,
}

impl PathLockGuard {
    /// The normalized path this guard protects.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Enter the critical section for `path`, blocking until it is free.
///
/// Not reentrant: acquiring the same path twice on one thread deadlocks.
#[must_use = "the critical section ends when the guard is dropped"]
pub fn lock_path(path: &Path) -> PathLockGuard {
    let key = normalize_key(path);
    let mutex = process_lock_for_path(&key);
    let guard = mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    tracing::trace!(path = %key.display(), "Entered path critical section");
    PathLockGuard {
        path: key,
        _guard: guard,
    }
}

// Absolute, with `.` and `..` folded lexically. Symlinks are not resolved.
fn normalize_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut key = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(key.components().next_back(), Some(Component::Normal(_))) {
                    key.pop();
                } else if !key.has_root() {
                    key.push(component);
                }
            }
            other => key.push(other),
        }
    }
    key
}

fn process_lock_for_path(path: &Path) -> &'static Mutex<()> {
    static PROCESS_LOCKS: OnceLock<Mutex<HashMap<PathBuf, &'static Mutex<()>>>> = OnceLock::new();
    let locks = PROCESS_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));

    let mut map = locks
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = map.get(path) {
        return existing;
    }

    // Leaked once per distinct path; the registry lives as long as the process.
    let mutex: &'static Mutex<()> = Box::leak(Box::new(Mutex::new(())));
    map.insert(path.to_path_buf(), mutex);
    mutex
}
