use std::fs;

use sitevault_pipeline::validate;

use crate::cli::{OutputFormat, ValidateArgs};
use crate::context::{AppContext, CliError, CliResult};
use crate::output::render_verdict;

/// Print the verdict for a local file; a rejected payload exits as a
/// validation failure.
pub(crate) fn handle_validate(
    ctx: &AppContext,
    args: &ValidateArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let bytes = fs::read(&args.file).map_err(|err| {
        CliError::validation(format!("cannot read {}: {err}", args.file.display()))
    })?;
    let verdict = validate(&bytes, args.kind);
    render_verdict(&args.file, args.kind, &verdict, format)?;
    if verdict.valid {
        return Ok(());
    }
    if let Some(metrics) = &ctx.metrics {
        metrics.inc_validation_rejection(args.kind.as_str());
    }
    Err(CliError::validation(format!(
        "{} rejected as {}: {}",
        args.file.display(),
        args.kind,
        verdict.reason.unwrap_or("invalid")
    )))
}
