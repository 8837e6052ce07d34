//! `skipIf` evaluation

use crate::descriptor::SkipIf;
use crate::path::lookup;
use crate::{CodegenError, Result};
use regex::Regex;
use serde_json::Value;
use std::path::Path;

/// What a condition may inspect
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    /// Resolved target path
    pub target: &'a Path,
    /// Current target content, if the file exists
    pub existing: Option<&'a str>,
    /// Generator variables
    pub variables: &'a Value,
}

/// Decides whether an operation should be skipped
pub trait ConditionEvaluator: Send + Sync {
    /// `true` to skip
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::Condition`] for malformed conditions
    fn should_skip(&self, condition: &SkipIf, ctx: &ConditionContext<'_>) -> Result<bool>;
}

/// Built-in evaluation rules, in order:
///
/// 1. booleans and the strings `"true"` / `"false"`
/// 2. `!name`: skip when `name` is falsy (or absent) in the variables
/// 3. `name`: skip when `name` is truthy, if the variables define it
/// 4. anything else is a regex matched against the current target content;
///    a missing target never matches
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConditionEvaluator;

impl ConditionEvaluator for DefaultConditionEvaluator {
    fn should_skip(&self, condition: &SkipIf, ctx: &ConditionContext<'_>) -> Result<bool> {
        let expr = match condition {
            SkipIf::Bool(b) => return Ok(*b),
            SkipIf::Expr(expr) => expr.trim(),
        };
        match expr {
            "" | "false" => return Ok(false),
            "true" => return Ok(true),
            _ => {}
        }

        if let Some(name) = expr.strip_prefix('!').map(str::trim)
            && is_identifier(name)
        {
            return Ok(!lookup(ctx.variables, name).is_some_and(truthy));
        }
        if is_identifier(expr)
            && let Some(value) = lookup(ctx.variables, expr)
        {
            return Ok(truthy(value));
        }

        let Some(existing) = ctx.existing else {
            return Ok(false);
        };
        let pattern = Regex::new(expr).map_err(|e| CodegenError::Condition {
            expression: expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(pattern.is_match(existing))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !s.ends_with('.')
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn skip(condition: SkipIf, existing: Option<&str>, variables: &Value) -> Result<bool> {
        let ctx = ConditionContext {
            target: Path::new("out.txt"),
            existing,
            variables,
        };
        DefaultConditionEvaluator.should_skip(&condition, &ctx)
    }

    fn expr(s: &str) -> SkipIf {
        SkipIf::Expr(s.to_string())
    }

    #[test]
    fn test_literals() {
        let vars = json!({});
        assert!(skip(SkipIf::Bool(true), None, &vars).unwrap());
        assert!(!skip(SkipIf::Bool(false), None, &vars).unwrap());
        assert!(skip(expr("true"), None, &vars).unwrap());
        assert!(!skip(expr(" false "), None, &vars).unwrap());
        assert!(!skip(expr(""), Some("anything"), &vars).unwrap());
    }

    #[test]
    fn test_variable_truthiness() {
        let vars = json!({"withTests": false, "opts": {"skip": 1}, "name": ""});
        assert!(!skip(expr("withTests"), None, &vars).unwrap());
        assert!(skip(expr("!withTests"), None, &vars).unwrap());
        assert!(skip(expr("opts.skip"), None, &vars).unwrap());
        assert!(!skip(expr("name"), None, &vars).unwrap());
        assert!(skip(expr("!undefinedFlag"), None, &vars).unwrap());
    }

    #[test]
    fn test_regex_against_content() {
        let vars = json!({});
        let content = "import { Button } from './button';\n";
        assert!(skip(expr("Button"), Some(content), &vars).unwrap());
        assert!(skip(expr(r"import \{ \w+ \}"), Some(content), &vars).unwrap());
        assert!(!skip(expr("Card"), Some(content), &vars).unwrap());
        assert!(!skip(expr("Button"), None, &vars).unwrap());
    }

    #[test]
    fn test_invalid_regex() {
        let err = skip(expr("(unclosed"), Some("x"), &json!({})).unwrap_err();
        assert!(matches!(err, CodegenError::Condition { .. }));
    }
}
