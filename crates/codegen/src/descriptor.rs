//! Operation descriptors
//!
//! A descriptor is the per-file instruction produced alongside rendered content:
//! where the content goes and how it is merged into whatever is already there.

use crate::{CodegenError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

/// A `skipIf` condition: a literal boolean or an expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkipIf {
    /// Literal `true`/`false`
    Bool(bool),
    /// Expression handed to a [`ConditionEvaluator`](crate::ConditionEvaluator)
    Expr(String),
}

/// How content is merged into the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace or create the whole file
    Write,
    /// Insert lines relative to a marker, at most once
    Inject {
        /// Insert directly before the first line containing this
        before: Option<String>,
        /// Insert directly after the first line containing this
        after: Option<String>,
    },
    /// Add to the end
    Append,
    /// Add to the start
    Prepend,
    /// Insert as a line at this 1-indexed position
    LineAt(usize),
}

impl WriteMode {
    /// Stable mode name used in results and events
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Inject { .. } => "inject",
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::LineAt(_) => "lineAt",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const fn default_true() -> bool {
    true
}

/// Instruction for one target file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    /// Target path template
    #[serde(default)]
    pub to: String,
    /// Insert relative to a marker
    #[serde(default)]
    pub inject: bool,
    /// Add to the end of the target
    #[serde(default)]
    pub append: bool,
    /// Add to the start of the target
    #[serde(default)]
    pub prepend: bool,
    /// Insert at this 1-indexed line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_at: Option<usize>,
    /// Inject marker: insert before the first line containing it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Inject marker: insert after the first line containing it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Skip the operation when this holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if: Option<SkipIf>,
    /// Permission bits set after writing (number, or octal string like `"755"`)
    #[serde(
        default,
        deserialize_with = "deserialize_chmod",
        skip_serializing_if = "Option::is_none"
    )]
    pub chmod: Option<u32>,
    /// Create missing parent directories
    #[serde(default = "default_true")]
    pub create_directories: bool,
    /// Write mode only: leave an existing target alone
    #[serde(default)]
    pub unless_exists: bool,
    /// Override `unlessExists`
    #[serde(default)]
    pub force: bool,
}

impl Default for OperationDescriptor {
    fn default() -> Self {
        Self {
            to: String::new(),
            inject: false,
            append: false,
            prepend: false,
            line_at: None,
            before: None,
            after: None,
            skip_if: None,
            chmod: None,
            create_directories: true,
            unless_exists: false,
            force: false,
        }
    }
}

impl OperationDescriptor {
    /// Plain write to `to`
    #[must_use]
    pub fn write(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }

    /// Load a descriptor from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid descriptor
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw =
            std::fs::read_to_string(path).map_err(|e| CodegenError::io(e, path, "read"))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Names of every mode field that is set, in a fixed order
    #[must_use]
    pub fn selected_modes(&self) -> Vec<&'static str> {
        let mut modes = Vec::new();
        if self.inject {
            modes.push("inject");
        }
        if self.append {
            modes.push("append");
        }
        if self.prepend {
            modes.push("prepend");
        }
        if self.line_at.is_some() {
            modes.push("lineAt");
        }
        modes
    }

    /// The single selected write mode.
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::Validation`] when more than one mode is set.
    pub fn mode(&self) -> Result<WriteMode> {
        let selected = self.selected_modes();
        if selected.len() > 1 {
            return Err(CodegenError::Validation {
                errors: vec![multiple_modes_message(&selected)],
            });
        }
        Ok(if self.inject {
            WriteMode::Inject {
                before: self.before.clone(),
                after: self.after.clone(),
            }
        } else if self.append {
            WriteMode::Append
        } else if self.prepend {
            WriteMode::Prepend
        } else if let Some(line) = self.line_at {
            WriteMode::LineAt(line)
        } else {
            WriteMode::Write
        })
    }
}

pub(crate) fn multiple_modes_message(selected: &[&str]) -> String {
    format!("multiple operation modes: {}", selected.join(", "))
}

fn deserialize_chmod<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u32),
        Octal(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Number(mode)) => Ok(Some(mode)),
        Some(Repr::Octal(s)) => {
            let digits = s.trim().trim_start_matches("0o");
            u32::from_str_radix(digits, 8)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid octal mode '{s}'")))
        }
    }
}
