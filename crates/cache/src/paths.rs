//! Cache root discovery

use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit cache directory
pub const CACHE_DIR_ENV: &str = "STENCIL_CACHE_DIR";

/// Inputs for determining cache root directory
#[derive(Debug, Clone)]
struct CacheInputs {
    stencil_cache_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    // Resolution order (first writable wins):
    // 1) STENCIL_CACHE_DIR (explicit override)
    // 2) XDG_CACHE_HOME/stencil
    // 3) OS cache dir/stencil
    // 4) ~/.stencil/cache
    // 5) TMPDIR/stencil/cache (fallback)
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(dir) = inputs
        .stencil_cache_dir
        .filter(|p| !p.as_os_str().is_empty())
    {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("stencil"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("stencil"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".stencil/cache"));
    }
    candidates.push(inputs.temp_dir.join("stencil/cache"));

    for path in candidates {
        if path.starts_with("/homeless-shelter") {
            continue;
        }
        if is_writable_dir(&path) {
            tracing::debug!(root = %path.display(), "Selected cache root");
            return Ok(path);
        }
        tracing::trace!(candidate = %path.display(), "Cache root candidate not writable");
    }
    Err(Error::configuration(
        "Failed to determine a writable cache directory",
    ))
}

// Existing directories may be read-only (some CI images mount $HOME that way).
fn is_writable_dir(path: &Path) -> bool {
    if path.exists() {
        let probe = path.join(".write_probe");
        return match std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&probe)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                true
            }
            Err(_) => false,
        };
    }
    std::fs::create_dir_all(path).is_ok()
}

fn non_blank_env(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolve the cache root.
///
/// An explicit directory (from `--cache-dir` or configuration) wins and is
/// created if needed. Otherwise the environment and platform defaults are
/// tried in order and the first writable candidate is used.
///
/// # Errors
///
/// Returns a configuration error if no candidate is writable, or an I/O error
/// if the explicit directory cannot be created.
pub fn resolve_cache_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(e, dir, "create_dir_all"))?;
        return Ok(dir.to_path_buf());
    }

    cache_root_from_inputs(CacheInputs {
        stencil_cache_dir: non_blank_env(CACHE_DIR_ENV),
        xdg_cache_home: non_blank_env("XDG_CACHE_HOME"),
        os_cache_dir: cache_dir(),
        home_dir: home_dir(),
        temp_dir: std::env::temp_dir(),
    })
}
