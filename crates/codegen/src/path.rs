//! Output path resolution
//!
//! Substitution is delegated to a [`Renderer`]; this module only normalizes the
//! rendered string. It never touches the filesystem.

use crate::{CodegenError, Result};
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Turns a template string into text using a variable context
pub trait Renderer: Send + Sync {
    /// Render `template` against `context`
    ///
    /// # Errors
    ///
    /// Returns an error if the template references something the context lacks
    fn render(&self, template: &str, context: &Value) -> Result<String>;
}

/// `{{ name }}` substitution with dotted lookups (`{{ user.name }}`)
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
            .unwrap_or_else(|e| unreachable!("placeholder pattern is valid: {e}"))
    })
}

/// Look up a dotted path (`a.b.0`) in a JSON value
#[must_use]
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

impl Renderer for PlaceholderRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in placeholder_pattern().captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let rendered = match lookup(context, name.as_str()) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(Value::Null) | None => {
                    return Err(CodegenError::Render(format!(
                        "undefined variable '{}'",
                        name.as_str()
                    )));
                }
                Some(_) => {
                    return Err(CodegenError::Render(format!(
                        "variable '{}' is not a scalar",
                        name.as_str()
                    )));
                }
            };
            out.push_str(&template[last..whole.start()]);
            out.push_str(&rendered);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }
}

/// Trim, collapse repeated separators and strip leading `./`.
///
/// Returns `None` when nothing is left.
#[must_use]
pub fn normalize_path(rendered: &str) -> Option<PathBuf> {
    let trimmed = rendered.trim();
    let mut collapsed = String::with_capacity(trimmed.len());
    let mut previous_slash = false;
    for ch in trimmed.chars() {
        let slash = ch == '/';
        if !(slash && previous_slash) {
            collapsed.push(ch);
        }
        previous_slash = slash;
    }

    let mut rest = collapsed.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    if rest.is_empty() {
        None
    } else {
        Some(PathBuf::from(rest))
    }
}

/// Resolves `to` templates into target paths
#[derive(Debug, Default, Clone)]
pub struct PathResolver<R = PlaceholderRenderer> {
    renderer: R,
}

impl<R: Renderer> PathResolver<R> {
    /// Resolver using `renderer` for substitution
    pub const fn new(renderer: R) -> Self {
        Self { renderer }
    }

    /// Render and normalize `template`
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::PathResolution`] if rendering fails or the result
    /// is empty
    pub fn resolve(&self, template: &str, context: &Value) -> Result<PathBuf> {
        let rendered = self
            .renderer
            .render(template, context)
            .map_err(|e| CodegenError::path_resolution(template, e.to_string()))?;
        let path = normalize_path(&rendered)
            .ok_or_else(|| CodegenError::path_resolution(template, "resolved to an empty path"))?;
        tracing::debug!(template, path = %path.display(), "Resolved output path");
        Ok(path)
    }
}
