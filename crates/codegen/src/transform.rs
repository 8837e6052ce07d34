//! Pure content transforms for each write mode
//!
//! These functions decide what the target should contain. They never read or
//! write files, so every idempotency rule is testable on plain strings.

use crate::descriptor::WriteMode;

/// What applying a mode to existing content produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// The target already holds the content
    Unchanged,
    /// The inject marker does not occur in the target
    MarkerNotFound,
    /// Replace the target with this
    Replace(String),
}

/// Compute the new target content.
///
/// `existing` is `None` when the target does not exist; callers reject that
/// case for inject before calling.
#[must_use]
pub fn apply_mode(mode: &WriteMode, existing: Option<&str>, content: &str) -> Mutation {
    let current = existing.unwrap_or("");
    match mode {
        WriteMode::Write => {
            if existing == Some(content) {
                Mutation::Unchanged
            } else {
                Mutation::Replace(content.to_string())
            }
        }
        WriteMode::Append => {
            if existing.is_some() && current.ends_with(content) {
                Mutation::Unchanged
            } else {
                Mutation::Replace(format!("{current}{content}"))
            }
        }
        WriteMode::Prepend => {
            if existing.is_some() && current.starts_with(content) {
                Mutation::Unchanged
            } else {
                Mutation::Replace(format!("{content}{current}"))
            }
        }
        WriteMode::Inject { before, after } => inject(current, content, before.as_deref(), after.as_deref()),
        WriteMode::LineAt(line) => Mutation::Replace(insert_at_line(current, content, *line)),
    }
}

/// `\r\n` if the text uses it, `\n` otherwise
#[must_use]
pub fn line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}

// Content as complete lines in the target's line ending style.
fn as_block(content: &str, eol: &str) -> String {
    let body = content.trim_end_matches(['\r', '\n']);
    let mut block = String::with_capacity(body.len() + eol.len());
    for line in body.split('\n') {
        block.push_str(line.strip_suffix('\r').unwrap_or(line));
        block.push_str(eol);
    }
    block
}

fn inject(current: &str, content: &str, before: Option<&str>, after: Option<&str>) -> Mutation {
    if content.trim_end_matches(['\r', '\n']).is_empty() {
        return Mutation::Unchanged;
    }

    // Look for the content as it would be written, not as it was given.
    let eol = line_ending(current);
    let block = as_block(content, eol);
    if current.contains(block.trim_end_matches(['\r', '\n'])) {
        return Mutation::Unchanged;
    }
    let mut lines: Vec<String> = current.split_inclusive('\n').map(str::to_string).collect();

    let index = match (after, before) {
        (Some(marker), _) => match lines.iter().position(|l| l.contains(marker)) {
            Some(i) => i + 1,
            None => return Mutation::MarkerNotFound,
        },
        (None, Some(marker)) => match lines.iter().position(|l| l.contains(marker)) {
            Some(i) => i,
            None => return Mutation::MarkerNotFound,
        },
        (None, None) => lines.len(),
    };

    terminate_previous(&mut lines, index, eol);
    lines.insert(index, block);
    Mutation::Replace(lines.concat())
}

fn insert_at_line(current: &str, content: &str, line: usize) -> String {
    let eol = line_ending(current);
    let block = as_block(content, eol);
    let mut lines: Vec<String> = current.split_inclusive('\n').map(str::to_string).collect();
    let index = line.saturating_sub(1).min(lines.len());
    terminate_previous(&mut lines, index, eol);
    lines.insert(index, block);
    lines.concat()
}

// A final line without a terminator must get one before anything follows it.
fn terminate_previous(lines: &mut [String], index: usize, eol: &str) {
    if let Some(previous) = index.checked_sub(1).and_then(|i| lines.get_mut(i))
        && !previous.ends_with('\n')
    {
        previous.push_str(eol);
    }
}
