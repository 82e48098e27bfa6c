//! Output renderers and formatting helpers for CLI commands.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::anyhow;
use serde::Serialize;
use serde_json::json;
use sitevault_events::{JobProgress, ResourceKind};
use sitevault_pipeline::{JobReport, QualityReport, ValidationVerdict};

use crate::cli::OutputFormat;
use crate::context::{CliError, CliResult};

const URL_WIDTH: usize = 48;

pub(crate) fn render_job_report(report: &JobReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            print!("{}", job_table(report));
            Ok(())
        }
    }
}

pub(crate) fn render_quality(report: &QualityReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            print!("{}", quality_table(report));
            Ok(())
        }
    }
}

pub(crate) fn render_verdict(
    file: &Path,
    kind: ResourceKind,
    verdict: &ValidationVerdict,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&json!({
            "file": file.display().to_string(),
            "expected_kind": kind,
            "valid": verdict.valid,
            "detected_kind": verdict.detected_kind,
            "reason": verdict.reason,
        })),
        OutputFormat::Table => {
            println!("file: {}", file.display());
            println!("expected: {kind}");
            println!("detected: {}", verdict.detected_kind.as_str());
            println!("valid: {}", verdict.valid);
            if let Some(reason) = verdict.reason {
                println!("reason: {reason}");
            }
            Ok(())
        }
    }
}

/// One stderr line per progress notification.
pub(crate) fn progress_line(progress: &JobProgress) -> String {
    let mut line = format!(
        "[{:>3}%] {:<10} {}/{}",
        progress.percent_complete,
        progress.stage.as_str(),
        progress.processed_count,
        progress.total_count
    );
    if let Some(failure) = &progress.failure {
        let _ = write!(line, " ({failure})");
    }
    line
}

pub(crate) fn job_table(report: &JobReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "job: {}", report.job_id);
    let _ = writeln!(out, "stage: {}", report.stage());
    let _ = writeln!(
        out,
        "processed: {}/{}",
        report.progress.processed_count, report.progress.total_count
    );
    if let Some(failure) = &report.progress.failure {
        let _ = writeln!(out, "reason: {failure}");
    }
    if !report.records.is_empty() {
        let _ = writeln!(
            out,
            "{:<13} {:<6} {:<width$} PATH",
            "OUTCOME",
            "KIND",
            "URL",
            width = URL_WIDTH
        );
        for record in &report.records {
            let path = record
                .written_path
                .as_ref()
                .unwrap_or(&record.descriptor.destination_path);
            let _ = writeln!(
                out,
                "{:<13} {:<6} {:<width$} {}",
                record.outcome.as_str(),
                record.descriptor.expected_kind.as_str(),
                shorten(&record.descriptor.source_url, URL_WIDTH),
                path.display(),
                width = URL_WIDTH
            );
        }
    }
    for relocation in &report.relocations {
        let _ = writeln!(
            out,
            "moved: {} -> {}",
            relocation.from.display(),
            relocation.to.display()
        );
    }
    if let Some(quality) = &report.quality {
        out.push_str(&quality_table(quality));
    }
    out
}

pub(crate) fn quality_table(report: &QualityReport) -> String {
    let categories = &report.categories;
    let mut out = String::new();
    let _ = writeln!(out, "overall: {}/100", report.overall);
    let _ = writeln!(out, "  html:   {:>3}/100", categories.html.score);
    let _ = writeln!(
        out,
        "  css:    {:>3}/100 ({} files, {} broken)",
        categories.css.score, categories.css.stats.total, categories.css.stats.broken
    );
    let _ = writeln!(
        out,
        "  images: {:>3}/100 ({} files, {} broken, {} heavy, {} MB)",
        categories.images.score,
        categories.images.stats.total,
        categories.images.stats.broken,
        categories.images.stats.oversized,
        categories.images.stats.total_size_mb
    );
    let issues = categories
        .html
        .issues
        .iter()
        .chain(&categories.css.issues)
        .chain(&categories.images.issues);
    for issue in issues {
        let _ = writeln!(out, "  - {issue}");
    }
    out
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

fn shorten(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut shortened: String = value.chars().take(width.saturating_sub(3)).collect();
    shortened.push_str("...");
    shortened
}
