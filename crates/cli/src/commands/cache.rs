//! `stencil cache ...`

use super::CommandContext;
use crate::errors::{CliError, CliResult};
use serde_json::json;
use std::fmt::Write as _;
use std::path::PathBuf;
use stencil_cache::{CacheEntry, CacheStats, VerifyReport};
use stencil_core::format_size;

pub fn set(
    ctx: &CommandContext,
    key: &str,
    file: Option<PathBuf>,
    content: Option<String>,
    tags: Vec<(String, String)>,
) -> CliResult<()> {
    let bytes = match (file, content) {
        (Some(path), _) => {
            std::fs::read(&path).map_err(|e| CliError::file_error("read", path, e))?
        }
        (None, Some(content)) => content.into_bytes(),
        (None, None) => {
            return Err(CliError::invalid_argument(
                "cache set",
                "either --file or --content is required",
            ));
        }
    };

    let cache = ctx.open_cache()?;
    let entry = cache.set(key, &bytes, tags.into_iter().collect())?;
    ctx.output.emit(&entry, |e: &CacheEntry| {
        format!(
            "Stored {} ({}, {})",
            e.logical_key,
            e.hash.short(),
            format_size(e.size)
        )
    })
}

pub fn get(ctx: &CommandContext, key: &str, output: Option<PathBuf>) -> CliResult<()> {
    let cache = ctx.open_cache()?;
    let bytes = cache.get(key)?.ok_or_else(|| CliError::NotFound {
        key: key.to_string(),
    })?;

    if let Some(path) = output {
        stencil_core::fs::atomic_write(&path, &bytes)?;
        return ctx.output.emit(
            &json!({ "key": key, "size": bytes.len(), "output": path }),
            |_| format!("Wrote {} to {}", format_size(bytes.len() as u64), path.display()),
        );
    }

    if ctx.output.is_json() {
        ctx.output.emit(
            &json!({
                "key": key,
                "size": bytes.len(),
                "content": String::from_utf8_lossy(&bytes),
            }),
            |_| String::new(),
        )
    } else {
        ctx.output.raw(&bytes)
    }
}

pub fn stats(ctx: &CommandContext) -> CliResult<()> {
    let cache = ctx.open_cache()?;
    let stats = cache.stats()?;
    ctx.output.emit(&stats, |s: &CacheStats| {
        let mut text = String::new();
        let _ = writeln!(text, "Entries:    {}", s.entry_count);
        let _ = writeln!(text, "Blobs:      {}", s.file_count);
        let _ = write!(text, "Total size: {}", format_size(s.total_size));
        if let (Some(oldest), Some(newest)) = (s.oldest_entry, s.newest_entry) {
            let _ = write!(
                text,
                "\nOldest:     {}\nNewest:     {}",
                oldest.to_rfc3339(),
                newest.to_rfc3339()
            );
        }
        text
    })
}

pub fn delete(ctx: &CommandContext, key: &str) -> CliResult<()> {
    let cache = ctx.open_cache()?;
    let deleted = cache.delete(key)?;
    ctx.output
        .emit(&json!({ "key": key, "deleted": deleted }), |_| {
            if deleted {
                format!("Deleted {key}")
            } else {
                format!("No entry for {key}")
            }
        })
}

pub fn clear(ctx: &CommandContext) -> CliResult<()> {
    let cache = ctx.open_cache()?;
    let removed = cache.clear()?;
    ctx.output
        .emit(&json!({ "removed": removed }), |_| format!("Removed {removed} entries"))
}

pub fn verify(ctx: &CommandContext, repair: bool) -> CliResult<()> {
    let cache = ctx.open_cache()?;
    let report = cache.verify(repair)?;
    ctx.output.emit(&report, describe_verify)?;

    let problems =
        report.missing_blobs.len() + report.orphan_blobs.len() + report.corrupt_blobs.len();
    if problems > 0 && !report.repaired {
        return Err(CliError::CacheDamaged { problems });
    }
    Ok(())
}

fn describe_verify(report: &VerifyReport) -> String {
    if report.is_clean() {
        return "Cache is consistent".to_string();
    }
    let mut text = String::new();
    for (label, hashes) in [
        ("missing blob", &report.missing_blobs),
        ("orphan blob", &report.orphan_blobs),
        ("corrupt blob", &report.corrupt_blobs),
    ] {
        for hash in hashes {
            let _ = writeln!(text, "{label}: {hash}");
        }
    }
    if report.repaired {
        text.push_str("Repaired");
    }
    text.trim_end().to_string()
}
