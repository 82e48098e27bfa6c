//! Per-job deduplication of resource URLs.

use dashmap::DashSet;
use url::Url;

/// Concurrent set of canonical URLs already claimed by a job.
#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: DashSet<String>,
}

impl DedupLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `url`; true exactly once per canonical URL.
    pub fn should_process(&self, url: &str) -> bool {
        self.seen.insert(canonicalize(url))
    }

    /// Number of distinct canonical URLs claimed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been claimed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Canonical form used for deduplication.
///
/// Fragments and trailing slashes are dropped (the root path keeps its slash);
/// scheme and host are lowercased by the URL parser.
#[must_use]
pub fn canonicalize(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            let path = parsed.path();
            if path.len() > 1 && path.ends_with('/') {
                let stripped = path.trim_end_matches('/');
                let stripped = if stripped.is_empty() { "/" } else { stripped }.to_string();
                parsed.set_path(&stripped);
            }
            parsed.to_string()
        }
        Err(_) => {
            let without_fragment = trimmed.split('#').next().unwrap_or_default();
            let stripped = without_fragment.trim_end_matches('/');
            if stripped.is_empty() && !without_fragment.is_empty() {
                "/".to_string()
            } else {
                stripped.to_string()
            }
        }
    }
}
