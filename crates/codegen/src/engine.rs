//! File operation engine
//!
//! Applies one descriptor to one target:
//!
//! ```text
//! validate -> lock target -> read -> skipIf -> transform -> atomic write -> chmod
//!                                      |          |
//!                                   Skipped   NoOpIdempotent
//! ```
//!
//! Any error leaves the target as it was.

use crate::condition::{ConditionContext, ConditionEvaluator, DefaultConditionEvaluator};
use crate::descriptor::{OperationDescriptor, WriteMode};
use crate::transform::{Mutation, apply_mode};
use crate::validate::validate_operation;
use crate::{CodegenError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use stencil_core::lock_path;
use stencil_events::{EventCategory, OperationEvent, SharedObserver, TracingObserver, emit};

/// Terminal state of an operation that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    /// Nothing was read or written past the skip check
    Skipped,
    /// The target already held the content
    NoOpIdempotent,
    /// The target was written (or would be, in dry-run mode)
    Applied,
}

/// Outcome of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    /// Mode name (`write`, `inject`, ...)
    pub operation: String,
    /// Target path
    pub path: PathBuf,
    /// Size of the target after writing; 0 when nothing was written
    pub bytes_written: u64,
    /// The target changed (or would change)
    pub changed: bool,
    /// The operation was skipped
    pub skipped: bool,
    /// Why the operation was skipped or not written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Terminal state
    pub status: OperationStatus,
}

impl OperationResult {
    fn skipped(mode: &WriteMode, path: &Path, reason: impl Into<String>) -> Self {
        Self {
            operation: mode.name().to_string(),
            path: path.to_path_buf(),
            bytes_written: 0,
            changed: false,
            skipped: true,
            reason: Some(reason.into()),
            status: OperationStatus::Skipped,
        }
    }

    fn unchanged(mode: &WriteMode, path: &Path) -> Self {
        Self {
            operation: mode.name().to_string(),
            path: path.to_path_buf(),
            bytes_written: 0,
            changed: false,
            skipped: false,
            reason: Some("content already present".to_string()),
            status: OperationStatus::NoOpIdempotent,
        }
    }
}

/// Applies operation descriptors to files
pub struct OperationEngine {
    evaluator: Box<dyn ConditionEvaluator>,
    observer: SharedObserver,
    dry_run: bool,
}

impl std::fmt::Debug for OperationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationEngine")
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl Default for OperationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationEngine {
    /// Engine with the default condition evaluator and a tracing observer
    #[must_use]
    pub fn new() -> Self {
        Self {
            evaluator: Box::new(DefaultConditionEvaluator),
            observer: TracingObserver::shared(),
            dry_run: false,
        }
    }

    /// Evaluate `skipIf` with `evaluator`
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Box<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Send lifecycle events to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Compute results without writing anything
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Apply `content` to `path` as `descriptor` describes
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::Validation`] for an invalid descriptor,
    /// [`CodegenError::Condition`] for a malformed `skipIf`, and an apply or I/O
    /// error if the target cannot be read or written. The target is unchanged
    /// in every error case.
    pub fn apply(
        &self,
        path: &Path,
        content: &str,
        descriptor: &OperationDescriptor,
        context: &Value,
    ) -> Result<OperationResult> {
        for warning in validate_operation(descriptor).into_result()? {
            tracing::warn!(path = %path.display(), "{warning}");
        }
        let mode = descriptor.mode()?;

        let _guard = lock_path(path);
        let raw = read_existing(path)?;
        let existing = match raw.as_deref() {
            None => None,
            // A full write never edits the old bytes, so they need not be text.
            Some(bytes) if mode == WriteMode::Write => Some(String::from_utf8_lossy(bytes)),
            Some(bytes) => Some(Cow::Borrowed(
                std::str::from_utf8(bytes)
                    .map_err(|_| CodegenError::apply(path, "target is not valid UTF-8"))?,
            )),
        };

        if let Some(condition) = &descriptor.skip_if {
            let ctx = ConditionContext {
                target: path,
                existing: existing.as_deref(),
                variables: context,
            };
            if self.evaluator.should_skip(condition, &ctx)? {
                return Ok(self.skip(&mode, path, "skipIf matched"));
            }
        }

        if mode == WriteMode::Write
            && descriptor.unless_exists
            && !descriptor.force
            && existing.is_some()
        {
            return Ok(self.skip(&mode, path, "target exists (unlessExists)"));
        }

        if matches!(mode, WriteMode::Inject { .. }) && existing.is_none() {
            return Err(CodegenError::apply(path, "inject target does not exist"));
        }

        let mutation = if mode == WriteMode::Write {
            if raw.as_deref() == Some(content.as_bytes()) {
                Mutation::Unchanged
            } else {
                Mutation::Replace(content.to_string())
            }
        } else {
            apply_mode(&mode, existing.as_deref(), content)
        };
        let updated = match mutation {
            Mutation::Unchanged => {
                emit(
                    self.observer.as_ref(),
                    EventCategory::Operation(OperationEvent::Unchanged {
                        path: path.display().to_string(),
                        operation: mode.name().to_string(),
                    }),
                );
                return Ok(OperationResult::unchanged(&mode, path));
            }
            Mutation::MarkerNotFound => return Ok(self.skip(&mode, path, "marker not found")),
            Mutation::Replace(updated) => updated,
        };

        let bytes_written = updated.len() as u64;
        if self.dry_run {
            tracing::info!(path = %path.display(), operation = %mode, bytes = bytes_written, "Would write (dry run)");
        } else {
            self.write(path, updated.as_bytes(), descriptor)?;
            emit(
                self.observer.as_ref(),
                EventCategory::Operation(OperationEvent::Applied {
                    path: path.display().to_string(),
                    operation: mode.name().to_string(),
                    bytes_written,
                }),
            );
        }

        Ok(OperationResult {
            operation: mode.name().to_string(),
            path: path.to_path_buf(),
            bytes_written,
            changed: true,
            skipped: false,
            reason: self.dry_run.then(|| "dry run".to_string()),
            status: OperationStatus::Applied,
        })
    }

    fn skip(&self, mode: &WriteMode, path: &Path, reason: &str) -> OperationResult {
        emit(
            self.observer.as_ref(),
            EventCategory::Operation(OperationEvent::Skipped {
                path: path.display().to_string(),
                reason: reason.to_string(),
            }),
        );
        OperationResult::skipped(mode, path, reason)
    }

    #[allow(clippy::unused_self)]
    fn write(&self, path: &Path, bytes: &[u8], descriptor: &OperationDescriptor) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
            && !parent.is_dir()
        {
            if !descriptor.create_directories {
                return Err(CodegenError::apply(
                    path,
                    format!(
                        "parent directory {} does not exist and createDirectories is false",
                        parent.display()
                    ),
                ));
            }
            std::fs::create_dir_all(parent)
                .map_err(|e| CodegenError::io(e, parent, "create_dir_all"))?;
        }

        stencil_core::fs::atomic_write(path, bytes)?;
        if let Some(mode) = descriptor.chmod {
            stencil_core::fs::set_mode(path, mode)?;
        }
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Wrote target");
        Ok(())
    }
}

fn read_existing(path: &Path) -> Result<Option<Vec<u8>>> {
    if path.is_dir() {
        return Err(CodegenError::apply(path, "target is a directory"));
    }
    Ok(stencil_core::fs::read_optional(path)?)
}
