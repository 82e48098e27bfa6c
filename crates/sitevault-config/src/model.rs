//! Typed configuration documents.
//!
//! # Design
//! - Every field has a default so an empty document is a complete config.
//! - Unknown fields are rejected to surface typos early.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitevault_events::ResourceKind;

use crate::defaults;

/// Top-level configuration for one pipeline deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of descriptors processed concurrently.
    pub concurrency: usize,
    /// Per-request fetch timeout, also bounding the JS minifier.
    pub fetch_timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Optimizer tuning.
    pub optimizer: OptimizerSettings,
    /// Quality scoring policy.
    pub scoring: ScoringPolicy,
    /// Archive directory layout.
    pub layout: ArchiveLayout,
    /// Ordered CDN substitution table; the first matching rule wins.
    pub cdn: Vec<CdnRule>,
    /// Logging preferences.
    pub logging: LoggingSettings,
}

impl PipelineConfig {
    /// Fetch timeout as a [`Duration`].
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::CONCURRENCY,
            fetch_timeout_secs: defaults::FETCH_TIMEOUT_SECS,
            user_agent: defaults::USER_AGENT.to_string(),
            optimizer: OptimizerSettings::default(),
            scoring: ScoringPolicy::default(),
            layout: ArchiveLayout::default(),
            cdn: CdnRule::default_table(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Optimizer tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerSettings {
    /// Longest image side after downscaling.
    pub max_image_dimension: u32,
    /// JPEG encoder quality (1..=100).
    pub jpeg_quality: u8,
    /// External JavaScript minifier command; empty disables minification.
    pub js_minifier: Vec<String>,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_image_dimension: defaults::MAX_IMAGE_DIMENSION,
            jpeg_quality: defaults::JPEG_QUALITY,
            js_minifier: defaults::JS_MINIFIER.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Weights applied to category scores when computing the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CategoryWeights {
    /// Weight of the images category.
    pub images: f64,
    /// Weight of the stylesheet category.
    pub css: f64,
    /// Weight of the document category.
    pub html: f64,
}

impl CategoryWeights {
    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.images + self.css + self.html
    }
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            images: defaults::IMAGES_WEIGHT,
            css: defaults::CSS_WEIGHT,
            html: defaults::HTML_WEIGHT,
        }
    }
}

/// Tunable constants used by the quality scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringPolicy {
    /// Images larger than this many bytes count as oversized.
    pub oversized_image_bytes: u64,
    /// Points removed when every image is broken.
    pub broken_image_penalty: u32,
    /// Points removed when every image is oversized.
    pub oversized_image_penalty: u32,
    /// Points removed when every stylesheet is broken.
    pub broken_css_penalty: u32,
    /// Points removed per document finding.
    pub html_hit_penalty: u32,
    /// Cap on the empty image `src` deduction.
    pub empty_image_src_cap: u32,
    /// Cap on the empty stylesheet `href` deduction.
    pub empty_stylesheet_href_cap: u32,
    /// Category weights.
    pub weights: CategoryWeights,
    /// Substrings that identify tracking scripts in the document.
    pub tracker_tokens: Vec<String>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            oversized_image_bytes: defaults::OVERSIZED_IMAGE_BYTES,
            broken_image_penalty: defaults::BROKEN_IMAGE_PENALTY,
            oversized_image_penalty: defaults::OVERSIZED_IMAGE_PENALTY,
            broken_css_penalty: defaults::BROKEN_CSS_PENALTY,
            html_hit_penalty: defaults::HTML_HIT_PENALTY,
            empty_image_src_cap: defaults::EMPTY_IMAGE_SRC_CAP,
            empty_stylesheet_href_cap: defaults::EMPTY_STYLESHEET_HREF_CAP,
            weights: CategoryWeights::default(),
            tracker_tokens: defaults::TRACKER_TOKENS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Relative directory layout of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveLayout {
    /// Raster and vector images.
    pub images_dir: String,
    /// Web fonts.
    pub fonts_dir: String,
    /// Favicons and `.ico` files.
    pub icons_dir: String,
    /// Stylesheets.
    pub css_dir: String,
    /// Scripts.
    pub js_dir: String,
    /// Anything else.
    pub other_dir: String,
    /// Root document path.
    pub document: String,
}

impl ArchiveLayout {
    /// Directory that holds resources of `kind`.
    #[must_use]
    pub fn dir_for(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Image => &self.images_dir,
            ResourceKind::Font => &self.fonts_dir,
            ResourceKind::Css => &self.css_dir,
            ResourceKind::Js => &self.js_dir,
            ResourceKind::Html | ResourceKind::Other => &self.other_dir,
        }
    }
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        Self {
            images_dir: defaults::IMAGES_DIR.to_string(),
            fonts_dir: defaults::FONTS_DIR.to_string(),
            icons_dir: defaults::ICONS_DIR.to_string(),
            css_dir: defaults::CSS_DIR.to_string(),
            js_dir: defaults::JS_DIR.to_string(),
            other_dir: defaults::OTHER_DIR.to_string(),
            document: defaults::DOCUMENT.to_string(),
        }
    }
}

/// One row of the CDN substitution table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CdnRule {
    /// Case-insensitive substring matched against the source URL.
    pub fragment: String,
    /// Kind the rule applies to; `None` matches any kind.
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    /// Substitute URL fetched when the rule matches.
    pub url: String,
}

impl CdnRule {
    /// Whether this rule applies to `url` of the given `kind`.
    #[must_use]
    pub fn matches(&self, url: &str, kind: ResourceKind) -> bool {
        if self.kind.is_some_and(|rule_kind| rule_kind != kind) {
            return false;
        }
        url.to_ascii_lowercase()
            .contains(&self.fragment.to_ascii_lowercase())
    }

    /// The built-in table of well-known library mirrors.
    #[must_use]
    pub fn default_table() -> Vec<Self> {
        defaults::CDN_TABLE
            .iter()
            .map(|(fragment, kind, url)| Self {
                fragment: (*fragment).to_string(),
                kind: Some(*kind),
                url: (*url).to_string(),
            })
            .collect()
    }
}

/// Logging preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive.
    pub level: String,
    /// `json` or `pretty`; inferred from the build profile when absent.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}
