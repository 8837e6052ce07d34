//! Everything the CLI prints to stdout goes through here

#![allow(clippy::print_stdout)]

use crate::errors::{CliError, CliResult};
use serde::Serialize;
use std::io::Write;

/// Human text or pretty JSON, chosen once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    json: bool,
}

impl Output {
    pub const fn new(json: bool) -> Self {
        Self { json }
    }

    pub const fn is_json(&self) -> bool {
        self.json
    }

    /// Print `value` as JSON, or the text `human` renders
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T) -> String) -> CliResult<()> {
        if self.json {
            let rendered = serde_json::to_string_pretty(value).map_err(CliError::Output)?;
            println!("{rendered}");
        } else {
            let text = human(value);
            if !text.is_empty() {
                println!("{text}");
            }
        }
        Ok(())
    }

    /// Write bytes to stdout unchanged
    pub fn raw(&self, bytes: &[u8]) -> CliResult<()> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(bytes)
            .and_then(|()| stdout.flush())
            .map_err(|e| CliError::file_error("write", "<stdout>", e))
    }
}
