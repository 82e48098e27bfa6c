//! Content validation: telling genuine assets apart from disguised error pages.
//!
//! Every check is a pure function of the payload and the expected kind.
//! Undecodable input is reported as invalid, never as an error.

use serde::Serialize;
use sitevault_events::ResourceKind;

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const SVG_SNIFF_LEN: usize = 1024;
const CSS_AT_RULES: [&str; 3] = ["@import", "@media", "@font-face"];
const JS_MARKERS: [&str; 6] = ["function", "const ", "let ", "var ", "=>", "document."];

/// Concrete format recognised in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    /// HTML document or error page.
    Html,
    /// JPEG image.
    Jpeg,
    /// PNG image.
    Png,
    /// GIF image.
    Gif,
    /// WEBP image.
    Webp,
    /// SVG document.
    Svg,
    /// Stylesheet text.
    Css,
    /// Script text.
    Js,
    /// WOFF font.
    Woff,
    /// WOFF2 font.
    Woff2,
    /// TrueType font.
    Ttf,
    /// OpenType font with CFF outlines.
    Otf,
    /// Nothing recognisable.
    Unknown,
}

impl DetectedFormat {
    /// Lowercase label, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Svg => "svg",
            Self::Css => "css",
            Self::Js => "js",
            Self::Woff => "woff",
            Self::Woff2 => "woff2",
            Self::Ttf => "ttf",
            Self::Otf => "otf",
            Self::Unknown => "unknown",
        }
    }
}

/// Result of validating one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    /// Whether the payload may be written as the expected kind.
    pub valid: bool,
    /// Format recognised in the payload.
    pub detected_kind: DetectedFormat,
    /// Stable reason label when invalid.
    pub reason: Option<&'static str>,
}

impl ValidationVerdict {
    const fn accept(detected_kind: DetectedFormat) -> Self {
        Self {
            valid: true,
            detected_kind,
            reason: None,
        }
    }

    const fn reject(detected_kind: DetectedFormat, reason: &'static str) -> Self {
        Self {
            valid: false,
            detected_kind,
            reason: Some(reason),
        }
    }
}

/// Validate `bytes` against the kind the caller expects.
#[must_use]
pub fn validate(bytes: &[u8], expected_kind: ResourceKind) -> ValidationVerdict {
    if expected_kind.is_pass_through() {
        let detected = if looks_like_html(bytes) {
            DetectedFormat::Html
        } else {
            DetectedFormat::Unknown
        };
        return ValidationVerdict::accept(detected);
    }
    if looks_like_html(bytes) {
        return ValidationVerdict::reject(DetectedFormat::Html, "html_payload");
    }
    match expected_kind {
        ResourceKind::Image => validate_image(bytes),
        ResourceKind::Css => validate_css(bytes),
        ResourceKind::Js => validate_js(bytes),
        ResourceKind::Font => validate_font(bytes),
        ResourceKind::Html | ResourceKind::Other => {
            ValidationVerdict::accept(DetectedFormat::Unknown)
        }
    }
}

/// Whether the payload starts like an HTML document.
#[must_use]
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let head = skip_preamble(bytes);
    starts_with_ignore_case(head, b"<!doctype") || starts_with_ignore_case(head, b"<html")
}

/// Raster signature or SVG root, if any.
#[must_use]
pub fn sniff_image(bytes: &[u8]) -> Option<DetectedFormat> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(DetectedFormat::Jpeg)
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some(DetectedFormat::Png)
    } else if bytes.starts_with(b"GIF8") {
        Some(DetectedFormat::Gif)
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        Some(DetectedFormat::Webp)
    } else if has_svg_root(bytes) {
        Some(DetectedFormat::Svg)
    } else {
        None
    }
}

/// Whether the leading text of a non-binary payload opens an `<svg>` element.
#[must_use]
pub fn has_svg_root(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SVG_SNIFF_LEN)];
    if head.contains(&0) {
        return false;
    }
    String::from_utf8_lossy(head)
        .to_ascii_lowercase()
        .contains("<svg")
}

fn validate_image(bytes: &[u8]) -> ValidationVerdict {
    sniff_image(bytes).map_or_else(
        || ValidationVerdict::reject(DetectedFormat::Unknown, "unknown_image_signature"),
        ValidationVerdict::accept,
    )
}

fn validate_css(bytes: &[u8]) -> ValidationVerdict {
    let text = String::from_utf8_lossy(bytes);
    if contains_html_tag(&text) {
        return ValidationVerdict::reject(DetectedFormat::Html, "embedded_html");
    }
    let has_block = text
        .find('{')
        .is_some_and(|open| text[open..].contains('}'));
    if has_block || CSS_AT_RULES.iter().any(|rule| text.contains(rule)) {
        ValidationVerdict::accept(DetectedFormat::Css)
    } else {
        ValidationVerdict::reject(DetectedFormat::Unknown, "missing_css_structure")
    }
}

fn validate_js(bytes: &[u8]) -> ValidationVerdict {
    let text = String::from_utf8_lossy(bytes);
    if contains_html_tag(&text) {
        return ValidationVerdict::reject(DetectedFormat::Html, "embedded_html");
    }
    if JS_MARKERS.iter().any(|marker| text.contains(marker)) {
        ValidationVerdict::accept(DetectedFormat::Js)
    } else {
        ValidationVerdict::reject(DetectedFormat::Unknown, "missing_js_markers")
    }
}

fn validate_font(bytes: &[u8]) -> ValidationVerdict {
    if bytes.is_empty() {
        return ValidationVerdict::reject(DetectedFormat::Unknown, "empty_payload");
    }
    let detected = if bytes.starts_with(b"wOFF") {
        DetectedFormat::Woff
    } else if bytes.starts_with(b"wOF2") {
        DetectedFormat::Woff2
    } else if bytes.starts_with(&[0x00, 0x01, 0x00, 0x00]) || bytes.starts_with(b"true") {
        DetectedFormat::Ttf
    } else if bytes.starts_with(b"OTTO") {
        DetectedFormat::Otf
    } else {
        DetectedFormat::Unknown
    };
    ValidationVerdict::accept(detected)
}

fn contains_html_tag(text: &str) -> bool {
    text.to_ascii_lowercase().contains("<html")
}

fn skip_preamble(mut bytes: &[u8]) -> &[u8] {
    loop {
        let before = bytes.len();
        bytes = bytes.trim_ascii_start();
        if let Some(rest) = bytes.strip_prefix(BOM) {
            bytes = rest;
        }
        if bytes.len() == before {
            return bytes;
        }
    }
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERROR_PAGE: &[u8] = b"<!DOCTYPE html><html><body>404</body></html>";

    #[test]
    fn html_payloads_are_rejected_for_checked_kinds() {
        let disguised: [&[u8]; 4] = [
            ERROR_PAGE,
            b"  \n<HTML lang=en>",
            b"\xEF\xBB\xBF<!doctype html>",
            b"\n\xEF\xBB\xBF  <html>",
        ];
        for payload in disguised {
            for kind in [
                ResourceKind::Css,
                ResourceKind::Js,
                ResourceKind::Image,
                ResourceKind::Font,
            ] {
                let verdict = validate(payload, kind);
                assert!(!verdict.valid, "{kind} accepted {payload:?}");
                assert_eq!(verdict.detected_kind, DetectedFormat::Html);
            }
            assert!(validate(payload, ResourceKind::Html).valid);
            assert!(validate(payload, ResourceKind::Other).valid);
        }
    }

    #[test]
    fn image_signature_table() {
        let accepted: [(&[u8], DetectedFormat); 6] = [
            (&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0], DetectedFormat::Jpeg),
            (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A], DetectedFormat::Png),
            (b"GIF89a....", DetectedFormat::Gif),
            (b"RIFF\x10\x00\x00\x00WEBPVP8 ", DetectedFormat::Webp),
            (b"<?xml version=\"1.0\"?>\n<svg xmlns=\"x\"/>", DetectedFormat::Svg),
            (b"<SVG width=\"1\"></SVG>", DetectedFormat::Svg),
        ];
        for (payload, format) in accepted {
            let verdict = validate(payload, ResourceKind::Image);
            assert!(verdict.valid);
            assert_eq!(verdict.detected_kind, format);
        }

        let rejected: [&[u8]; 5] = [
            b"",
            b"BM\x00\x00",
            b"RIFF\x10\x00\x00\x00WAVE",
            b"plain text",
            b"\x00\x01<svg>",
        ];
        for payload in rejected {
            let verdict = validate(payload, ResourceKind::Image);
            assert!(!verdict.valid, "accepted {payload:?}");
            assert_eq!(verdict.reason, Some("unknown_image_signature"));
        }
    }

    #[test]
    fn svg_root_beyond_sniff_window_is_rejected() {
        let mut payload = vec![b' '; SVG_SNIFF_LEN];
        payload.extend_from_slice(b"<svg/>");
        assert!(!validate(&payload, ResourceKind::Image).valid);
    }

    #[test]
    fn css_structure_markers() {
        assert!(validate(b"body{margin:0}", ResourceKind::Css).valid);
        assert!(validate(b"@import url(x.css);", ResourceKind::Css).valid);
        assert!(validate(b"@media print", ResourceKind::Css).valid);
        assert!(validate(b"@font-face", ResourceKind::Css).valid);
        assert!(!validate(b"} body {", ResourceKind::Css).valid);
        assert!(!validate(b"just words", ResourceKind::Css).valid);
        let verdict = validate(b"a{} <HTML>", ResourceKind::Css);
        assert_eq!(verdict.reason, Some("embedded_html"));
    }

    #[test]
    fn js_markers() {
        for source in [
            "function f() {}",
            "const a = 1;",
            "let b",
            "var c",
            "x => x",
            "document.title",
        ] {
            assert!(validate(source.as_bytes(), ResourceKind::Js).valid, "{source}");
        }
        assert!(!validate(b"hello world", ResourceKind::Js).valid);
        assert!(!validate(b"var x = '<html>';", ResourceKind::Js).valid);
    }

    #[test]
    fn fonts_need_bytes_and_report_signatures() {
        assert!(!validate(b"", ResourceKind::Font).valid);
        assert_eq!(
            validate(b"wOF2\x00\x01", ResourceKind::Font).detected_kind,
            DetectedFormat::Woff2
        );
        assert_eq!(
            validate(b"OTTO", ResourceKind::Font).detected_kind,
            DetectedFormat::Otf
        );
        let unknown = validate(b"\x12\x34", ResourceKind::Font);
        assert!(unknown.valid);
        assert_eq!(unknown.detected_kind, DetectedFormat::Unknown);
    }

    #[test]
    fn invalid_utf8_never_panics() {
        let garbage = [0xC3, 0x28, 0xA0, 0xA1, 0xFF];
        for kind in ResourceKind::ALL {
            let _ = validate(&garbage, kind);
        }
    }
}
