//! Archive path derivation and destination safety checks.

use std::path::{Component, Path, PathBuf};

use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use sitevault_config::ArchiveLayout;
use sitevault_events::ResourceKind;
use tracing::warn;
use url::Url;

use crate::model::Relocation;

const MAX_FILENAME_LEN: usize = 100;
const KNOWN_EXTENSIONS: [&str; 12] = [
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js", ".woff", ".woff2",
    ".ttf",
];

/// Why a destination was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeDestination {
    /// The path has no components.
    Empty,
    /// The path is absolute or carries a prefix/root.
    Absolute,
    /// The path climbs out of the archive root.
    ParentTraversal,
}

impl UnsafeDestination {
    /// Stable label for records and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty_destination",
            Self::Absolute => "absolute_destination",
            Self::ParentTraversal => "parent_traversal",
        }
    }
}

/// Normalize a descriptor destination, refusing anything that escapes the root.
///
/// # Errors
///
/// Returns the reason the destination is unsafe.
pub fn check_destination(path: &Path) -> Result<PathBuf, UnsafeDestination> {
    if path.is_absolute() || path.has_root() {
        return Err(UnsafeDestination::Absolute);
    }
    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => return Err(UnsafeDestination::ParentTraversal),
            Component::RootDir | Component::Prefix(_) => return Err(UnsafeDestination::Absolute),
        }
    }
    if sanitized.as_os_str().is_empty() {
        return Err(UnsafeDestination::Empty);
    }
    Ok(sanitized)
}

/// Derive an archive-relative destination for a URL of the given kind.
#[must_use]
pub fn destination_for(url: &str, kind: ResourceKind, layout: &ArchiveLayout) -> PathBuf {
    let default_ext = default_extension(kind);
    let filename = sanitize_filename(url, default_ext);
    let directory = if filename.to_ascii_lowercase().ends_with(".ico") {
        layout.icons_dir.as_str()
    } else {
        layout.dir_for(kind)
    };
    Path::new(directory).join(filename)
}

/// Readable filename for `url`, hashed when the natural name is unusable.
#[must_use]
pub fn sanitize_filename(url: &str, default_ext: &str) -> String {
    let mut filename = last_segment(url);
    if filename.is_empty() || filename.len() > MAX_FILENAME_LEN {
        filename = format!("resource_{}{default_ext}", short_hash(url));
    }
    let mut filename: String = filename
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let lowered = filename.to_ascii_lowercase();
    if !default_ext.is_empty() && !KNOWN_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        filename.push_str(default_ext);
    }
    filename
}

const fn default_extension(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Image => ".jpg",
        ResourceKind::Css => ".css",
        ResourceKind::Js => ".js",
        ResourceKind::Font => ".woff2",
        ResourceKind::Html => ".html",
        ResourceKind::Other => "",
    }
}

fn last_segment(url: &str) -> String {
    let path = Url::parse(url).map_or_else(
        |_| {
            url.split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string()
        },
        |parsed| parsed.path().to_string(),
    );
    path.rsplit('/').next().unwrap_or_default().to_string()
}

fn short_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest[..4].iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Point every reference to a relocated destination at the file actually written.
///
/// A reference is the archive-relative path, optionally prefixed with `./` or
/// `/`, delimited by a quote, `(`, `=`, whitespace, or the start of the text on
/// the left and by a quote, `)`, `?`, `#`, whitespace, or the end on the right.
#[must_use]
pub fn relink_document(html: &str, relocations: &[Relocation]) -> String {
    let mut document = html.to_string();
    for relocation in relocations {
        let from = archive_path(&relocation.from);
        let to = archive_path(&relocation.to);
        if from.is_empty() || from == to {
            continue;
        }
        let pattern = format!(
            r#"(^|["'(=\s])(\./|/)?{}(["')?#\s]|$)"#,
            regex::escape(&from)
        );
        let reference = match Regex::new(&pattern) {
            Ok(reference) => reference,
            Err(error) => {
                warn!(from = %from, error = %error, "relocation pattern rejected");
                continue;
            }
        };
        document = reference
            .replace_all(&document, |caps: &Captures<'_>| {
                format!(
                    "{}{}{to}{}",
                    &caps[1],
                    caps.get(2).map_or("", |prefix| prefix.as_str()),
                    &caps[3]
                )
            })
            .into_owned();
    }
    document
}

fn archive_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
