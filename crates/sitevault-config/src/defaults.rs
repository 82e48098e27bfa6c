//! Literal defaults for pipeline configuration.
//!
//! # Design
//! - Keep every tunable literal in one place so documents and tests agree.
//! - The CDN table is data; ordering is significant (first match wins).

use sitevault_events::ResourceKind;

/// Default worker pool size.
pub const CONCURRENCY: usize = 8;
/// Upper bound accepted for the worker pool size.
pub const MAX_CONCURRENCY: usize = 256;
/// Default fetch timeout in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 30;
/// Upper bound accepted for the fetch timeout.
pub const MAX_FETCH_TIMEOUT_SECS: u64 = 600;
/// Desktop user agent sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Longest image side after optimization.
pub const MAX_IMAGE_DIMENSION: u32 = 2000;
/// JPEG encoder quality.
pub const JPEG_QUALITY: u8 = 85;
/// External JavaScript minifier command line.
pub const JS_MINIFIER: [&str; 3] = ["terser", "--compress", "--mangle"];

pub(crate) const OVERSIZED_IMAGE_BYTES: u64 = 1_000_000;
pub(crate) const BROKEN_IMAGE_PENALTY: u32 = 50;
pub(crate) const OVERSIZED_IMAGE_PENALTY: u32 = 30;
pub(crate) const BROKEN_CSS_PENALTY: u32 = 100;
pub(crate) const HTML_HIT_PENALTY: u32 = 5;
pub(crate) const EMPTY_IMAGE_SRC_CAP: u32 = 30;
pub(crate) const EMPTY_STYLESHEET_HREF_CAP: u32 = 30;
pub(crate) const IMAGES_WEIGHT: f64 = 0.3;
pub(crate) const CSS_WEIGHT: f64 = 0.3;
pub(crate) const HTML_WEIGHT: f64 = 0.4;
pub(crate) const TRACKER_TOKENS: [&str; 6] = [
    "google-analytics",
    "googletagmanager",
    "gtag(",
    "fbq(",
    "hotjar",
    "clarity.ms",
];

pub(crate) const IMAGES_DIR: &str = "assets/images";
pub(crate) const FONTS_DIR: &str = "assets/fonts";
pub(crate) const ICONS_DIR: &str = "assets/icons";
pub(crate) const CSS_DIR: &str = "css";
pub(crate) const JS_DIR: &str = "js";
pub(crate) const OTHER_DIR: &str = "assets/misc";
pub(crate) const DOCUMENT: &str = "index.html";

pub(crate) const LOG_LEVEL: &str = "info";

/// `(fragment, kind, substitute url)` rows of the default CDN table.
///
/// `react-dom` precedes `react` so the more specific fragment wins.
pub(crate) const CDN_TABLE: [(&str, ResourceKind, &str); 10] = [
    ("jquery", ResourceKind::Js, "https://code.jquery.com/jquery-3.6.0.min.js"),
    (
        "bootstrap",
        ResourceKind::Css,
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
    ),
    (
        "bootstrap",
        ResourceKind::Js,
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js",
    ),
    (
        "fontawesome",
        ResourceKind::Css,
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
    ),
    (
        "font-awesome",
        ResourceKind::Css,
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
    ),
    (
        "animate.css",
        ResourceKind::Css,
        "https://cdnjs.cloudflare.com/ajax/libs/animate.css/4.1.1/animate.min.css",
    ),
    ("tailwind", ResourceKind::Js, "https://cdn.tailwindcss.com"),
    ("vue", ResourceKind::Js, "https://unpkg.com/vue@3/dist/vue.global.js"),
    (
        "react-dom",
        ResourceKind::Js,
        "https://unpkg.com/react-dom@18/umd/react-dom.production.min.js",
    ),
    (
        "react",
        ResourceKind::Js,
        "https://unpkg.com/react@18/umd/react.production.min.js",
    ),
];
