//! `stencil resolve`, `stencil validate`, `stencil apply`

use super::{CommandContext, variables};
use crate::errors::{CliError, CliResult};
use serde_json::json;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use stencil_codegen::{
    OperationDescriptor, OperationEngine, OperationResult, OperationStatus, PathResolver,
    ValidationReport, validate_operation,
};

pub fn resolve(ctx: &CommandContext, template: &str, vars: &[(String, String)]) -> CliResult<()> {
    let context = variables(vars);
    let path = <PathResolver>::default().resolve(template, &context)?;
    ctx.output
        .emit(&json!({ "template": template, "path": path }), |_| {
            path.display().to_string()
        })
}

pub fn validate(ctx: &CommandContext, descriptor: &Path) -> CliResult<()> {
    let desc = OperationDescriptor::load(descriptor)?;
    let report = validate_operation(&desc);
    ctx.output.emit(&report, describe_report)?;
    if report.valid {
        Ok(())
    } else {
        Err(invalid(descriptor, &report))
    }
}

pub fn apply(
    ctx: &CommandContext,
    descriptor: &Path,
    content: Option<String>,
    content_file: Option<PathBuf>,
    vars: &[(String, String)],
    dry_run: bool,
) -> CliResult<()> {
    let mut desc = OperationDescriptor::load(descriptor)?;
    let report = validate_operation(&desc);
    if !report.valid {
        return Err(invalid(descriptor, &report));
    }
    if !ctx.config.operations.create_directories {
        desc.create_directories = false;
    }

    let content = match (content, content_file) {
        (Some(content), _) => content,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|e| CliError::file_error("read", path, e))?,
        (None, None) => {
            return Err(CliError::invalid_argument(
                "apply",
                "either --content or --content-file is required",
            ));
        }
    };

    let context = variables(vars);
    let path = <PathResolver>::default().resolve(&desc.to, &context)?;
    let result = OperationEngine::new()
        .dry_run(dry_run)
        .apply(&path, &content, &desc, &context)?;
    ctx.output.emit(&result, describe_result)
}

fn invalid(descriptor: &Path, report: &ValidationReport) -> CliError {
    CliError::InvalidDescriptor {
        path: descriptor.to_path_buf(),
        errors: report.errors.join("\n"),
    }
}

fn describe_report(report: &ValidationReport) -> String {
    let mut text = String::from(if report.valid { "valid" } else { "invalid" });
    for error in &report.errors {
        let _ = write!(text, "\nerror: {error}");
    }
    for warning in &report.warnings {
        let _ = write!(text, "\nwarning: {warning}");
    }
    text
}

fn describe_result(result: &OperationResult) -> String {
    let path = result.path.display();
    match result.status {
        OperationStatus::Applied => match result.reason.as_deref() {
            Some(reason) => format!(
                "{} {path} ({} bytes, {reason})",
                result.operation, result.bytes_written
            ),
            None => format!("{} {path} ({} bytes)", result.operation, result.bytes_written),
        },
        OperationStatus::NoOpIdempotent => format!("unchanged {path}"),
        OperationStatus::Skipped => format!(
            "skipped {path}: {}",
            result.reason.as_deref().unwrap_or("condition matched")
        ),
    }
}
