//! Archive quality scoring.
//!
//! # Design
//! - Each category is scored by a pure function over pre-inspected samples;
//!   [`aggregate`] combines them once.
//! - Only the materialized tree is inspected; job records are not consulted.
//! - Every constant comes from [`ScoringPolicy`].

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sitevault_config::{ArchiveLayout, CategoryWeights, ScoringPolicy};
use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};
use crate::optimizer::static_regex;

const MAX_SCORE: f64 = 100.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

static EMPTY_IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    static_regex(
        r#"(?i)<img\b[^>]*?\bsrc\s*=\s*(?:""|''|"\s*null\s*"|'\s*null\s*'|null\b)"#,
        "empty img src",
    )
});
static LINK_TAG: Lazy<Regex> = Lazy::new(|| static_regex(r"(?i)<link\b[^>]*>", "link tag"));
static STYLESHEET_REL: Lazy<Regex> = Lazy::new(|| {
    static_regex(
        r#"(?i)\brel\s*=\s*["']?[^"'>]*\bstylesheet\b"#,
        "stylesheet rel",
    )
});
static EMPTY_HREF: Lazy<Regex> = Lazy::new(|| {
    static_regex(
        r#"(?i)\bhref\s*=\s*(?:""|''|"\s*null\s*"|'\s*null\s*'|null\b)"#,
        "empty href",
    )
});

/// Score, findings, and statistics for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport<S> {
    /// Score in `0..=100`.
    pub score: u8,
    /// Human-readable findings naming concrete files and counts.
    pub issues: Vec<String>,
    /// Category statistics.
    pub stats: S,
}

/// Image category statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStats {
    /// Files inspected.
    pub total: usize,
    /// Files that failed structural decoding.
    pub broken: usize,
    /// Files above the oversize threshold.
    pub oversized: usize,
    /// Combined size in bytes.
    pub total_bytes: u64,
    /// Combined size in megabytes, two decimals.
    pub total_size_mb: f64,
}

/// Stylesheet category statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssStats {
    /// Stylesheets inspected.
    pub total: usize,
    /// Stylesheets containing HTML.
    pub broken: usize,
    /// Combined size in bytes.
    pub total_bytes: u64,
}

/// Document category statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlStats {
    /// Whether the root document exists.
    pub present: bool,
    /// Size of the document in bytes.
    pub bytes: u64,
    /// `<img>` tags with an empty or `null` source.
    pub empty_image_src: usize,
    /// Stylesheet links with an empty or `null` href.
    pub empty_stylesheet_href: usize,
    /// Tracker token occurrences.
    pub tracker_hits: usize,
}

/// Per-category reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCategories {
    /// Images under the images directory.
    pub images: CategoryReport<ImageStats>,
    /// Stylesheets under the stylesheet directory.
    pub css: CategoryReport<CssStats>,
    /// The root document.
    pub html: CategoryReport<HtmlStats>,
}

/// Quality report persisted as `quality.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Weighted overall score in `0..=100`.
    pub overall: u8,
    /// Category breakdown.
    pub categories: QualityCategories,
}

/// Inspected image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    /// Path relative to the images directory.
    pub name: String,
    /// Size in bytes.
    pub bytes: u64,
    /// Whether the file failed structural decoding.
    pub broken: bool,
}

impl ImageSample {
    /// Inspect raw file contents; SVG files are checked textually.
    #[must_use]
    pub fn inspect(name: impl Into<String>, contents: &[u8]) -> Self {
        let name = name.into();
        let is_svg = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
        let broken = if is_svg {
            !String::from_utf8_lossy(contents)
                .to_ascii_lowercase()
                .contains("<svg")
        } else {
            image::load_from_memory(contents).is_err()
        };
        Self {
            name,
            bytes: len_u64(contents.len()),
            broken,
        }
    }
}

/// Inspected stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssSample {
    /// Path relative to the stylesheet directory.
    pub name: String,
    /// Size in bytes.
    pub bytes: u64,
    /// Whether the stylesheet contains an HTML document.
    pub broken: bool,
}

impl CssSample {
    /// Inspect raw stylesheet contents.
    #[must_use]
    pub fn inspect(name: impl Into<String>, contents: &[u8]) -> Self {
        Self {
            name: name.into(),
            bytes: len_u64(contents.len()),
            broken: String::from_utf8_lossy(contents)
                .to_ascii_lowercase()
                .contains("<html"),
        }
    }
}

/// Score the image category.
#[must_use]
pub fn score_images(samples: &[ImageSample], policy: &ScoringPolicy) -> CategoryReport<ImageStats> {
    let mut issues = Vec::new();
    let mut broken = 0;
    let mut oversized = 0;
    let mut total_bytes = 0_u64;
    for sample in samples {
        total_bytes = total_bytes.saturating_add(sample.bytes);
        if sample.broken {
            broken += 1;
            issues.push(format!("Broken image: {}", sample.name));
        }
        if sample.bytes > policy.oversized_image_bytes {
            oversized += 1;
            issues.push(format!(
                "Heavy image: {} ({:.1}MB)",
                sample.name,
                mb(sample.bytes)
            ));
        }
    }
    let total = samples.len();
    let score = if total == 0 {
        MAX_SCORE
    } else {
        MAX_SCORE
            - f64::from(policy.broken_image_penalty) * ratio(broken, total)
            - f64::from(policy.oversized_image_penalty) * ratio(oversized, total)
    };
    CategoryReport {
        score: clamp_score(score),
        issues,
        stats: ImageStats {
            total,
            broken,
            oversized,
            total_bytes,
            total_size_mb: (mb(total_bytes) * 100.0).round() / 100.0,
        },
    }
}

/// Score the stylesheet category.
#[must_use]
pub fn score_css(samples: &[CssSample], policy: &ScoringPolicy) -> CategoryReport<CssStats> {
    let issues: Vec<String> = samples
        .iter()
        .filter(|sample| sample.broken)
        .map(|sample| format!("Invalid CSS (contains HTML): {}", sample.name))
        .collect();
    let total = samples.len();
    let broken = issues.len();
    let score = if total == 0 {
        MAX_SCORE
    } else {
        MAX_SCORE - f64::from(policy.broken_css_penalty) * ratio(broken, total)
    };
    CategoryReport {
        score: clamp_score(score),
        issues,
        stats: CssStats {
            total,
            broken,
            total_bytes: samples
                .iter()
                .fold(0_u64, |sum, sample| sum.saturating_add(sample.bytes)),
        },
    }
}

/// Score the root document; `None` means it is missing.
#[must_use]
pub fn score_html(document: Option<&str>, policy: &ScoringPolicy) -> CategoryReport<HtmlStats> {
    let Some(html) = document else {
        return CategoryReport {
            score: 0,
            issues: vec!["Missing root document".to_string()],
            stats: HtmlStats {
                present: false,
                bytes: 0,
                empty_image_src: 0,
                empty_stylesheet_href: 0,
                tracker_hits: 0,
            },
        };
    };

    let empty_image_src = EMPTY_IMG_SRC.find_iter(html).count();
    let empty_stylesheet_href = LINK_TAG
        .find_iter(html)
        .filter(|tag| STYLESHEET_REL.is_match(tag.as_str()) && EMPTY_HREF.is_match(tag.as_str()))
        .count();
    let lowered = html.to_ascii_lowercase();
    let mut tracker_hits = 0;
    let mut trackers_found = Vec::new();
    for token in &policy.tracker_tokens {
        let hits = lowered.matches(&token.to_ascii_lowercase()).count();
        if hits > 0 {
            tracker_hits += hits;
            trackers_found.push(token.as_str());
        }
    }

    let mut issues = Vec::new();
    let mut deduction = 0_u64;
    if empty_image_src > 0 {
        issues.push(format!("{empty_image_src} image tags with empty src"));
        deduction += capped(empty_image_src, policy.html_hit_penalty, policy.empty_image_src_cap);
    }
    if empty_stylesheet_href > 0 {
        issues.push(format!("{empty_stylesheet_href} stylesheet links with empty href"));
        deduction += capped(
            empty_stylesheet_href,
            policy.html_hit_penalty,
            policy.empty_stylesheet_href_cap,
        );
    }
    if tracker_hits > 0 {
        issues.push(format!(
            "{tracker_hits} tracking script references ({})",
            trackers_found.join(", ")
        ));
        deduction = deduction.saturating_add(
            len_u64(tracker_hits).saturating_mul(u64::from(policy.html_hit_penalty)),
        );
    }

    CategoryReport {
        score: u8::try_from(100_u64.saturating_sub(deduction)).unwrap_or(0),
        issues,
        stats: HtmlStats {
            present: true,
            bytes: len_u64(html.len()),
            empty_image_src,
            empty_stylesheet_href,
            tracker_hits,
        },
    }
}

/// Combine category reports into the final weighted report.
#[must_use]
pub fn aggregate(
    images: CategoryReport<ImageStats>,
    css: CategoryReport<CssStats>,
    html: CategoryReport<HtmlStats>,
    weights: &CategoryWeights,
) -> QualityReport {
    let weighted = f64::from(images.score) * weights.images
        + f64::from(css.score) * weights.css
        + f64::from(html.score) * weights.html;
    QualityReport {
        overall: clamp_score(weighted),
        categories: QualityCategories { images, css, html },
    }
}

/// Inspect and score the archive rooted at `root`.
///
/// Blocking; run on the blocking pool from async code.
///
/// # Errors
///
/// Returns an error when the tree cannot be traversed or a file cannot be read.
pub fn score_archive(
    root: &Path,
    layout: &ArchiveLayout,
    policy: &ScoringPolicy,
) -> PipelineResult<QualityReport> {
    let images = collect(&root.join(&layout.images_dir), |_| true, |name, contents| {
        ImageSample::inspect(name, contents)
    })?;
    let css = collect(
        &root.join(&layout.css_dir),
        |path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
        },
        |name, contents| CssSample::inspect(name, contents),
    )?;
    let document_path = root.join(&layout.document);
    let document = if document_path.is_file() {
        let bytes = fs::read(&document_path)
            .map_err(|source| PipelineError::io("quality.read", &document_path, source))?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        None
    };

    let mut html = score_html(document.as_deref(), policy);
    if !html.stats.present {
        html.issues = vec![format!("Missing {}", layout.document)];
    }
    Ok(aggregate(
        score_images(&images, policy),
        score_css(&css, policy),
        html,
        &policy.weights,
    ))
}

/// Render the report as Markdown for `QUALITY.md`.
#[must_use]
pub fn render_markdown(report: &QualityReport) -> String {
    let categories = &report.categories;
    let mut out = String::new();
    let _ = writeln!(out, "# Quality Report\n");
    let _ = writeln!(out, "## Overall Score: {}/100\n", report.overall);
    let _ = writeln!(out, "### Breakdown");
    let _ = writeln!(out, "- **HTML Structure**: {}/100", categories.html.score);
    let _ = writeln!(out, "- **Stylesheets**: {}/100", categories.css.score);
    let _ = writeln!(out, "- **Images & Assets**: {}/100\n", categories.images.score);
    let _ = writeln!(out, "### Detailed Inspection\n");
    let _ = writeln!(out, "**HTML Issues**:");
    push_issues(&mut out, &categories.html.issues);
    let _ = writeln!(out, "\n**CSS Stats**:");
    let _ = writeln!(out, "- Total Files: {}", categories.css.stats.total);
    let _ = writeln!(out, "- Broken Files: {}", categories.css.stats.broken);
    push_issues(&mut out, &categories.css.issues);
    let _ = writeln!(out, "\n**Image Optimization**:");
    let _ = writeln!(out, "- Total Images: {}", categories.images.stats.total);
    let _ = writeln!(out, "- Total Size: {} MB", categories.images.stats.total_size_mb);
    push_issues(&mut out, &categories.images.issues);
    out
}

fn push_issues(out: &mut String, issues: &[String]) {
    if issues.is_empty() {
        let _ = writeln!(out, "_No significant issues found._");
    }
    for issue in issues {
        let _ = writeln!(out, "- {issue}");
    }
}

fn collect<T>(
    dir: &Path,
    include: impl Fn(&Path) -> bool,
    inspect: impl Fn(String, &[u8]) -> T,
) -> PipelineResult<Vec<T>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut samples = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
    for entry in walker {
        let entry = entry.map_err(|source| PipelineError::walkdir("quality.scan", dir, source))?;
        if !entry.file_type().is_file() || !include(entry.path()) {
            continue;
        }
        let contents = fs::read(entry.path())
            .map_err(|source| PipelineError::io("quality.read", entry.path(), source))?;
        let name = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or_else(|_| entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        samples.push(inspect(name, &contents));
    }
    Ok(samples)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

fn ratio(count: usize, total: usize) -> f64 {
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    let total = u32::try_from(total).unwrap_or(u32::MAX);
    f64::from(count) / f64::from(total)
}

#[allow(clippy::cast_precision_loss)]
fn mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

fn capped(hits: usize, per_hit: u32, cap: u32) -> u64 {
    len_u64(hits)
        .saturating_mul(u64::from(per_hit))
        .min(u64::from(cap))
}

fn len_u64(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_score(score: f64) -> u8 {
    score.round().clamp(0.0, MAX_SCORE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, bytes: u64, broken: bool) -> ImageSample {
        ImageSample {
            name: name.into(),
            bytes,
            broken,
        }
    }

    #[test]
    fn empty_categories_score_full_marks() {
        let policy = ScoringPolicy::default();
        assert_eq!(score_images(&[], &policy).score, 100);
        assert_eq!(score_css(&[], &policy).score, 100);
    }

    #[test]
    fn image_penalties_scale_with_ratios() {
        let policy = ScoringPolicy::default();
        let report = score_images(
            &[image("a.png", 10, true), image("b.jpg", 2_000_000, false)],
            &policy,
        );
        assert_eq!(report.score, 60);
        assert_eq!(report.stats.broken, 1);
        assert_eq!(report.stats.oversized, 1);
        assert!(report.issues.iter().any(|issue| issue.contains("a.png")));
        assert!(report.issues.iter().any(|issue| issue.starts_with("Heavy image: b.jpg")));

        let all_bad = score_images(&[image("c.png", 2_000_000, true)], &policy);
        assert_eq!(all_bad.score, 20);
    }

    #[test]
    fn css_with_html_is_broken() {
        let policy = ScoringPolicy::default();
        let samples = [
            CssSample::inspect("ok.css", b"body{margin:0}"),
            CssSample::inspect("bad.css", b"<!DOCTYPE html><HTML></html>"),
        ];
        let report = score_css(&samples, &policy);
        assert_eq!(report.score, 50);
        assert_eq!(report.issues, vec!["Invalid CSS (contains HTML): bad.css"]);
        assert_eq!(report.stats.total_bytes, 42);
    }

    #[test]
    fn svg_images_are_checked_textually() {
        assert!(!ImageSample::inspect("ok.svg", b"<?xml?><svg/>").broken);
        assert!(ImageSample::inspect("bad.svg", b"<html></html>").broken);
        assert!(ImageSample::inspect("bad.png", b"nope").broken);
    }

    #[test]
    fn html_findings_are_capped_per_rule() {
        let policy = ScoringPolicy::default();
        let mut html = String::from("<html><head>");
        for _ in 0..8 {
            html.push_str(r#"<link rel="stylesheet" href="">"#);
        }
        html.push_str(r#"<link rel="icon" href="">"#);
        html.push_str("</head><body>");
        html.push_str(r#"<img src="" alt=""><img alt="x" src="null"><img src="a.png">"#);
        html.push_str("<script>gtag('js'); fbq('init');</script></body></html>");

        let report = score_html(Some(&html), &policy);
        assert_eq!(report.stats.empty_stylesheet_href, 8);
        assert_eq!(report.stats.empty_image_src, 2);
        assert_eq!(report.stats.tracker_hits, 2);
        // 30 (capped) + 10 + 10
        assert_eq!(report.score, 50);
        assert_eq!(report.issues.len(), 3);
    }

    #[test]
    fn missing_document_scores_zero() {
        let report = score_html(None, &ScoringPolicy::default());
        assert_eq!(report.score, 0);
        assert!(!report.stats.present);
    }

    #[test]
    fn overall_is_weighted_and_rounded() {
        let policy = ScoringPolicy::default();
        let report = aggregate(
            score_images(&[image("a.png", 10, true)], &policy),
            score_css(&[], &policy),
            score_html(Some("<html></html>"), &policy),
            &policy.weights,
        );
        // 50 * 0.3 + 100 * 0.3 + 100 * 0.4
        assert_eq!(report.overall, 85);
        let markdown = render_markdown(&report);
        assert!(markdown.contains("## Overall Score: 85/100"));
        assert!(markdown.contains("- Broken image: a.png"));
        assert!(markdown.contains("_No significant issues found._"));
    }

    #[test]
    fn archive_scan_skips_hidden_files_and_foreign_suffixes() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let layout = ArchiveLayout::default();
        let css_dir = root.path().join(&layout.css_dir);
        fs::create_dir_all(css_dir.join("nested"))?;
        fs::write(css_dir.join("nested/site.css"), "a{b:c}")?;
        fs::write(css_dir.join("notes.txt"), "<html>")?;
        fs::write(css_dir.join(".draft.css"), "<html>")?;
        fs::write(root.path().join("index.html"), "<html><body></body></html>")?;

        let report = score_archive(root.path(), &layout, &ScoringPolicy::default())?;
        assert_eq!(report.categories.css.stats.total, 1);
        assert_eq!(report.categories.css.score, 100);
        assert_eq!(report.categories.images.stats.total, 0);
        assert_eq!(report.overall, 100);
        Ok(())
    }
}
