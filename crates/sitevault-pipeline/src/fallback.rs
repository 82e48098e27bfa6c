//! Recovery for descriptors whose direct acquisition failed.
//!
//! Resolution order: one CDN substitute attempt, then a generated placeholder
//! for stylesheets and images, otherwise the descriptor is omitted.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use sitevault_config::CdnRule;
use sitevault_events::{OutcomeKind, ResourceKind};
use tracing::{debug, info};

use crate::fetch::{Acquire, AcquireFailure};
use crate::model::ResourceDescriptor;

/// Minimal stylesheet written when no stylesheet could be acquired.
pub const PLACEHOLDER_CSS: &str = "/* Fallback CSS */\n\
body { font-family: system-ui, -apple-system, sans-serif; line-height: 1.5; }\n\
img { max-width: 100%; height: auto; background: #f0f0f0; }\n";

/// Neutral 300x200 image written when no image could be acquired.
pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="300" height="200" viewBox="0 0 300 200">
<rect width="300" height="200" fill="#f8f9fa"/>
<text x="150" y="100" text-anchor="middle" dominant-baseline="middle" fill="#adb5bd" font-family="sans-serif" font-size="14">Image Unavailable</text>
</svg>
"##;

/// How a failed descriptor was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// A CDN mirror served a valid payload.
    Substituted {
        /// Mirror URL that was fetched.
        substitute_url: String,
        /// Validated payload.
        bytes: Bytes,
    },
    /// A generated placeholder stands in for the resource.
    Placeholder {
        /// Archive-relative path the placeholder must be written to.
        destination: PathBuf,
        /// Placeholder payload.
        bytes: Bytes,
        /// Whether `destination` differs from the requested destination.
        relocated: bool,
    },
    /// Nothing could stand in; the descriptor is reported and skipped.
    Omitted {
        /// Cause of the original failure.
        reason: String,
    },
}

impl FallbackOutcome {
    /// Outcome label recorded for the descriptor.
    #[must_use]
    pub const fn outcome_kind(&self) -> OutcomeKind {
        match self {
            Self::Substituted { .. } => OutcomeKind::Substituted,
            Self::Placeholder { .. } => OutcomeKind::Placeholder,
            Self::Omitted { .. } => OutcomeKind::Omitted,
        }
    }

    /// Whether a file will be written for this outcome.
    #[must_use]
    pub const fn resolved(&self) -> bool {
        !matches!(self, Self::Omitted { .. })
    }
}

/// Resolves failed descriptors against an ordered CDN table.
#[derive(Debug, Clone, Default)]
pub struct FallbackResolver {
    rules: Vec<CdnRule>,
}

impl FallbackResolver {
    /// Resolver over `rules`, consulted in order.
    #[must_use]
    pub const fn new(rules: Vec<CdnRule>) -> Self {
        Self { rules }
    }

    /// First rule that applies to `url` of `kind`.
    #[must_use]
    pub fn rule_for(&self, url: &str, kind: ResourceKind) -> Option<&CdnRule> {
        self.rules.iter().find(|rule| rule.matches(url, kind))
    }

    /// Resolve a descriptor whose direct acquisition ended in `prior_failure`.
    ///
    /// `destination` is the already-checked archive-relative destination.
    pub async fn resolve(
        &self,
        descriptor: &ResourceDescriptor,
        destination: &Path,
        prior_failure: &AcquireFailure,
        acquirer: &dyn Acquire,
    ) -> FallbackOutcome {
        let kind = descriptor.expected_kind;
        if let Some(rule) = self.rule_for(&descriptor.source_url, kind) {
            match acquirer.acquire(&rule.url, kind).await {
                Ok(bytes) => {
                    info!(
                        url = %descriptor.source_url,
                        substitute = %rule.url,
                        "resource replaced by cdn mirror"
                    );
                    return FallbackOutcome::Substituted {
                        substitute_url: rule.url.clone(),
                        bytes,
                    };
                }
                Err(failure) => debug!(
                    url = %descriptor.source_url,
                    substitute = %rule.url,
                    reason = failure.reason(),
                    "cdn mirror unusable"
                ),
            }
        }

        match kind {
            ResourceKind::Css => FallbackOutcome::Placeholder {
                destination: destination.to_path_buf(),
                bytes: Bytes::from_static(PLACEHOLDER_CSS.as_bytes()),
                relocated: false,
            },
            ResourceKind::Image => {
                let svg_destination = destination.with_extension("svg");
                FallbackOutcome::Placeholder {
                    relocated: svg_destination != destination,
                    destination: svg_destination,
                    bytes: Bytes::from_static(PLACEHOLDER_SVG.as_bytes()),
                }
            }
            ResourceKind::Js | ResourceKind::Font | ResourceKind::Html | ResourceKind::Other => {
                FallbackOutcome::Omitted {
                    reason: prior_failure.reason().to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::fetch::FetchError;
    use crate::validator::validate;

    #[derive(Default)]
    struct Scripted {
        bodies: HashMap<&'static str, &'static [u8]>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Acquire for Scripted {
        async fn acquire(&self, url: &str, kind: ResourceKind) -> Result<Bytes, AcquireFailure> {
            self.requested
                .lock()
                .expect("requested lock")
                .push(url.to_string());
            let Some(body) = self.bodies.get(url).copied() else {
                return Err(AcquireFailure::Fetch(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }));
            };
            let verdict = validate(body, kind);
            if verdict.valid {
                Ok(Bytes::from_static(body))
            } else {
                Err(AcquireFailure::Rejected(verdict))
            }
        }
    }

    fn not_found() -> AcquireFailure {
        AcquireFailure::Fetch(FetchError::Status {
            url: "https://origin.test/x".into(),
            status: 404,
        })
    }

    fn resolver() -> FallbackResolver {
        FallbackResolver::new(CdnRule::default_table())
    }

    #[tokio::test]
    async fn cdn_mirror_substitutes_known_libraries() {
        let mirror = "https://code.jquery.com/jquery-3.6.0.min.js";
        let acquirer = Scripted {
            bodies: HashMap::from([(mirror, b"var jQuery = function() {};".as_slice())]),
            ..Scripted::default()
        };
        let descriptor = ResourceDescriptor::new(
            "https://origin.test/vendor/JQuery.min.js",
            ResourceKind::Js,
            "js/jquery.min.js",
        );
        let outcome = resolver()
            .resolve(&descriptor, Path::new("js/jquery.min.js"), &not_found(), &acquirer)
            .await;
        assert_eq!(outcome.outcome_kind(), OutcomeKind::Substituted);
        let FallbackOutcome::Substituted { substitute_url, .. } = outcome else {
            unreachable!();
        };
        assert_eq!(substitute_url, mirror);
    }

    #[test]
    fn react_dom_is_not_mistaken_for_react() {
        let resolver = resolver();
        let rule = resolver
            .rule_for("https://origin.test/react-dom.production.min.js", ResourceKind::Js)
            .expect("rule");
        assert!(rule.url.contains("react-dom"));
    }

    #[tokio::test]
    async fn invalid_mirror_payload_falls_through_to_placeholder() {
        let acquirer = Scripted {
            bodies: HashMap::from([(
                "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
                b"<html>blocked</html>".as_slice(),
            )]),
            ..Scripted::default()
        };
        let descriptor = ResourceDescriptor::new(
            "https://origin.test/bootstrap.css",
            ResourceKind::Css,
            "css/bootstrap.css",
        );
        let outcome = resolver()
            .resolve(&descriptor, Path::new("css/bootstrap.css"), &not_found(), &acquirer)
            .await;
        assert_eq!(
            outcome,
            FallbackOutcome::Placeholder {
                destination: PathBuf::from("css/bootstrap.css"),
                bytes: Bytes::from_static(PLACEHOLDER_CSS.as_bytes()),
                relocated: false,
            }
        );
        assert_eq!(acquirer.requested.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn image_placeholder_is_relocated_to_svg() {
        let descriptor = ResourceDescriptor::new(
            "https://origin.test/hero.jpg",
            ResourceKind::Image,
            "assets/images/hero.jpg",
        );
        let outcome = resolver()
            .resolve(
                &descriptor,
                Path::new("assets/images/hero.jpg"),
                &not_found(),
                &Scripted::default(),
            )
            .await;
        let FallbackOutcome::Placeholder {
            destination,
            bytes,
            relocated,
        } = outcome
        else {
            panic!("expected placeholder");
        };
        assert_eq!(destination, PathBuf::from("assets/images/hero.svg"));
        assert!(relocated);
        assert!(validate(&bytes, ResourceKind::Image).valid);
    }

    #[tokio::test]
    async fn unmatched_scripts_are_omitted_with_the_prior_cause() {
        let descriptor =
            ResourceDescriptor::new("https://origin.test/app.js", ResourceKind::Js, "js/app.js");
        let outcome = resolver()
            .resolve(&descriptor, Path::new("js/app.js"), &not_found(), &Scripted::default())
            .await;
        assert_eq!(
            outcome,
            FallbackOutcome::Omitted {
                reason: "http_status".into()
            }
        );
        assert!(!outcome.resolved());
    }
}
