//! Range and shape checks for configuration documents.

use std::path::{Component, Path};

use url::Url;

use crate::defaults::{MAX_CONCURRENCY, MAX_FETCH_TIMEOUT_SECS};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{ArchiveLayout, CdnRule, OptimizerSettings, PipelineConfig, ScoringPolicy};

const WEIGHT_TOLERANCE: f64 = 1e-6;

impl PipelineConfig {
    /// Validate every section, returning the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] naming the offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_range("pipeline", "concurrency", self.concurrency, 1, MAX_CONCURRENCY)?;
        ensure_range(
            "pipeline",
            "fetch_timeout_secs",
            self.fetch_timeout_secs,
            1,
            MAX_FETCH_TIMEOUT_SECS,
        )?;
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid(
                "pipeline",
                "user_agent",
                None,
                "must_not_be_empty",
            ));
        }
        validate_optimizer(&self.optimizer)?;
        validate_scoring(&self.scoring)?;
        validate_layout(&self.layout)?;
        for (index, rule) in self.cdn.iter().enumerate() {
            validate_cdn_rule(index, rule)?;
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid(
                "logging",
                "level",
                None,
                "must_not_be_empty",
            ));
        }
        if let Some(format) = self.logging.format.as_deref()
            && !matches!(format, "json" | "pretty")
        {
            return Err(ConfigError::invalid(
                "logging",
                "format",
                Some(format.to_string()),
                "unsupported_format",
            ));
        }
        Ok(())
    }
}

fn ensure_range<T>(section: &'static str, field: &str, value: T, min: T, max: T) -> ConfigResult<()>
where
    T: PartialOrd + ToString,
{
    if value < min || value > max {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(value.to_string()),
            "out_of_range",
        ));
    }
    Ok(())
}

fn validate_optimizer(settings: &OptimizerSettings) -> ConfigResult<()> {
    ensure_range("optimizer", "jpeg_quality", settings.jpeg_quality, 1, 100)?;
    ensure_range(
        "optimizer",
        "max_image_dimension",
        settings.max_image_dimension,
        1,
        u32::from(u16::MAX),
    )?;
    if settings
        .js_minifier
        .first()
        .is_some_and(|program| program.trim().is_empty())
    {
        return Err(ConfigError::invalid(
            "optimizer",
            "js_minifier",
            None,
            "empty_program",
        ));
    }
    Ok(())
}

fn validate_scoring(policy: &ScoringPolicy) -> ConfigResult<()> {
    for (field, value) in [
        ("broken_image_penalty", policy.broken_image_penalty),
        ("oversized_image_penalty", policy.oversized_image_penalty),
        ("broken_css_penalty", policy.broken_css_penalty),
        ("html_hit_penalty", policy.html_hit_penalty),
        ("empty_image_src_cap", policy.empty_image_src_cap),
        ("empty_stylesheet_href_cap", policy.empty_stylesheet_href_cap),
    ] {
        ensure_range("scoring", field, value, 0, 100)?;
    }
    let weights = policy.weights;
    for (field, value) in [
        ("weights.images", weights.images),
        ("weights.css", weights.css),
        ("weights.html", weights.html),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::invalid(
                "scoring",
                field,
                Some(value.to_string()),
                "must_be_non_negative",
            ));
        }
    }
    if (weights.total() - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ConfigError::invalid(
            "scoring",
            "weights",
            Some(weights.total().to_string()),
            "must_sum_to_one",
        ));
    }
    if policy.tracker_tokens.iter().any(|token| token.is_empty()) {
        return Err(ConfigError::invalid(
            "scoring",
            "tracker_tokens",
            None,
            "must_not_contain_empty_token",
        ));
    }
    Ok(())
}

fn validate_layout(layout: &ArchiveLayout) -> ConfigResult<()> {
    for (field, value) in [
        ("images_dir", &layout.images_dir),
        ("fonts_dir", &layout.fonts_dir),
        ("icons_dir", &layout.icons_dir),
        ("css_dir", &layout.css_dir),
        ("js_dir", &layout.js_dir),
        ("other_dir", &layout.other_dir),
        ("document", &layout.document),
    ] {
        if !is_relative_inside(value) {
            return Err(ConfigError::invalid(
                "layout",
                field,
                Some(value.clone()),
                "must_be_relative",
            ));
        }
    }
    Ok(())
}

fn validate_cdn_rule(index: usize, rule: &CdnRule) -> ConfigResult<()> {
    if rule.fragment.trim().is_empty() {
        return Err(ConfigError::invalid(
            "cdn",
            format!("[{index}].fragment"),
            None,
            "must_not_be_empty",
        ));
    }
    match Url::parse(&rule.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::invalid(
            "cdn",
            format!("[{index}].url"),
            Some(rule.url.clone()),
            "must_be_http_url",
        )),
    }
}

/// Non-empty relative path that never climbs above its base.
pub(crate) fn is_relative_inside(value: &str) -> bool {
    let path = Path::new(value);
    !value.trim().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
