//! `stencil gc ...`

use super::CommandContext;
use crate::config::GcOverrides;
use crate::errors::CliResult;
use std::fmt::Write as _;
use std::time::Duration;
use stencil_cache::{AnalyzeReport, CollectReport, EvictionCandidate};
use stencil_core::{format_duration, format_size};

pub fn collect(ctx: &CommandContext, overrides: GcOverrides) -> CliResult<()> {
    let options = ctx.config.gc_options(overrides);
    let cache = ctx.open_cache()?;
    let report = cache.gc().collect(&options)?;
    ctx.output.emit(&report, |r: &CollectReport| {
        let mut text = format!(
            "Removed {} unit(s), freed {}, kept {}",
            r.removed.len(),
            format_size(r.bytes_freed),
            r.kept.len()
        );
        push_candidates(&mut text, &r.removed);
        text
    })
}

pub fn analyze(ctx: &CommandContext, overrides: GcOverrides) -> CliResult<()> {
    let options = ctx.config.gc_options(overrides);
    let cache = ctx.open_cache()?;
    let report = cache.gc().analyze(&options)?;
    ctx.output.emit(&report, |r: &AnalyzeReport| {
        let mut text = format!(
            "{} entries in {} blob(s), {}; collect would remove {} unit(s) and free {}",
            r.total_entries,
            r.stats.file_count,
            format_size(r.stats.total_size),
            r.recommendations.len(),
            format_size(r.potential_savings)
        );
        push_candidates(&mut text, &r.recommendations);
        text
    })
}

fn push_candidates(text: &mut String, candidates: &[EvictionCandidate]) {
    for candidate in candidates {
        let _ = write!(
            text,
            "\n  {} {:>9} {:<12} idle {:<6} {}",
            candidate.hash.short(),
            format_size(candidate.size),
            candidate.reason.as_str(),
            format_duration(Duration::from_millis(candidate.last_access_age_ms)),
            candidate.keys.join(", ")
        );
    }
}
