//! Descriptor validation
//!
//! Mode conflicts are rejected here and nowhere else. The engine re-runs this
//! check before touching the filesystem but never resolves a conflict itself.

use crate::descriptor::{OperationDescriptor, multiple_modes_message};
use crate::{CodegenError, Result};
use serde::{Deserialize, Serialize};

/// Highest meaningful permission value (setuid, setgid, sticky, rwx x3)
const MAX_MODE: u32 = 0o7777;

/// Validation outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// No errors were found
    pub valid: bool,
    /// Problems that block the operation
    pub errors: Vec<String>,
    /// Settings that will be ignored
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Turn a failed report into [`CodegenError::Validation`]; pass warnings through
    ///
    /// # Errors
    ///
    /// Returns the collected errors when the report is not valid
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.valid {
            Ok(self.warnings)
        } else {
            Err(CodegenError::Validation {
                errors: self.errors,
            })
        }
    }
}

/// Check a descriptor for conflicting or malformed settings
#[must_use]
pub fn validate_operation(descriptor: &OperationDescriptor) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if descriptor.to.trim().is_empty() {
        errors.push("missing target path: `to` must be a non-empty string".to_string());
    }

    let modes = descriptor.selected_modes();
    if modes.len() > 1 {
        errors.push(multiple_modes_message(&modes));
    }

    let has_marker = descriptor.before.is_some() || descriptor.after.is_some();
    if has_marker && !descriptor.inject {
        warnings.push("`before`/`after` have no effect without `inject`".to_string());
    }
    if descriptor.inject && descriptor.before.is_some() && descriptor.after.is_some() {
        errors.push("`before` and `after` cannot both be set".to_string());
    }

    if descriptor.line_at == Some(0) {
        errors.push("`lineAt` is 1-indexed; 0 is not a line".to_string());
    }

    if let Some(mode) = descriptor.chmod
        && mode > MAX_MODE
    {
        errors.push(format!("`chmod` {mode:#o} is not a valid permission mode"));
    }

    if descriptor.unless_exists && !modes.is_empty() {
        warnings.push(format!(
            "`unlessExists` has no effect with {}",
            modes.join(", ")
        ));
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}
