//! Stylesheet minification.

use once_cell::sync::Lazy;
use regex::Regex;

static COMMENTS: Lazy<Regex> = Lazy::new(|| static_regex(r"(?s)/\*.*?\*/", "comment"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| static_regex(r"\s+", "whitespace"));
static STRUCTURAL: Lazy<Regex> = Lazy::new(|| static_regex(r"\s*([{};])\s*", "structural"));

pub(crate) fn static_regex(pattern: &'static str, desc: &'static str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid {desc} regex: {err}"))
}

/// Pluggable stylesheet compressor.
///
/// Returning `None` (or an empty string) falls back to the regex baseline.
pub trait CssCompressor: Send + Sync {
    /// Compress `css`, or decline.
    fn compress(&self, css: &str) -> Option<String>;
}

/// Default compressor: baseline plus tightening around block and declaration
/// punctuation.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralCssCompressor;

impl CssCompressor for StructuralCssCompressor {
    fn compress(&self, css: &str) -> Option<String> {
        let baseline = baseline_minify(css);
        let tightened = STRUCTURAL.replace_all(&baseline, "$1");
        Some(tightened.replace(";}", "}").trim().to_string())
    }
}

/// Strip comments and collapse whitespace runs to a single space.
#[must_use]
pub fn baseline_minify(css: &str) -> String {
    let without_comments = COMMENTS.replace_all(css, "");
    WHITESPACE
        .replace_all(&without_comments, " ")
        .trim()
        .to_string()
}

/// Minify a stylesheet, preferring `compressor` and never returning empty
/// output for non-empty input.
pub(crate) fn minify_css(bytes: &[u8], compressor: &dyn CssCompressor) -> Vec<u8> {
    let text = String::from_utf8_lossy(bytes);
    let minified = compressor
        .compress(&text)
        .filter(|output| !output.trim().is_empty())
        .unwrap_or_else(|| baseline_minify(&text));
    if minified.is_empty() && !bytes.is_empty() {
        return bytes.to_vec();
    }
    minified.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Declining;

    impl CssCompressor for Declining {
        fn compress(&self, _css: &str) -> Option<String> {
            Some("   ".to_string())
        }
    }

    #[test]
    fn baseline_strips_multiline_comments() {
        let css = "/* header\n spans lines */\nbody  {\n  margin: 0;\n}\n/* tail */";
        assert_eq!(baseline_minify(css), "body { margin: 0; }");
    }

    #[test]
    fn structural_compressor_tightens_punctuation() {
        let css = "a { color: red ; }\n\nb{ x:1; y:2; }";
        let output = StructuralCssCompressor.compress(css).expect("compressed");
        assert_eq!(output, "a{color: red}b{x:1;y:2}");
    }

    #[test]
    fn declining_compressor_falls_back_to_baseline() {
        let output = minify_css(b"p  {  top: 0 }", &Declining);
        assert_eq!(output, b"p { top: 0 }");
    }

    #[test]
    fn comment_only_input_keeps_original_bytes() {
        let input = b"/* nothing but a comment */";
        assert_eq!(minify_css(input, &StructuralCssCompressor), input.to_vec());
    }
}
