//! Per-kind asset optimization.
//!
//! # Design
//! - Optimization never drops an asset: every failure path hands back the
//!   original bytes as [`Optimization::Skipped`].
//! - Image work is CPU bound and runs on the blocking pool.
//! - The JavaScript minifier is an external process bounded by the fetch timeout.

mod css;
mod js;
mod raster;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sitevault_config::OptimizerSettings;
use sitevault_events::ResourceKind;
use tracing::debug;

pub use css::{CssCompressor, StructuralCssCompressor, baseline_minify};
pub(crate) use css::static_regex;

use self::raster::{ImageResult, ImageTarget};

/// Bytes produced by a successful optimization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedArtifact {
    /// Optimized payload.
    pub bytes: Bytes,
    /// Extension of the encoded format.
    pub final_extension: Option<&'static str>,
    /// Size of the payload before optimization.
    pub original_len: usize,
}

/// Original bytes handed back when optimization did not apply or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationSkipped {
    /// Untouched payload.
    pub bytes: Bytes,
    /// Stable reason label.
    pub reason: &'static str,
}

/// Result of optimizing one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Optimization {
    /// The payload was rewritten.
    Optimized(OptimizedArtifact),
    /// The payload is kept as-is.
    Skipped(OptimizationSkipped),
}

impl Optimization {
    /// Bytes to write.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        match self {
            Self::Optimized(artifact) => &artifact.bytes,
            Self::Skipped(skipped) => &skipped.bytes,
        }
    }

    /// Consume into the bytes to write.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Optimized(artifact) => artifact.bytes,
            Self::Skipped(skipped) => skipped.bytes,
        }
    }

    /// Bytes removed relative to the input; zero when nothing shrank.
    #[must_use]
    pub fn bytes_saved(&self) -> u64 {
        match self {
            Self::Optimized(artifact) => {
                let saved = artifact.original_len.saturating_sub(artifact.bytes.len());
                u64::try_from(saved).unwrap_or(u64::MAX)
            }
            Self::Skipped(_) => 0,
        }
    }

    const fn skipped(bytes: Bytes, reason: &'static str) -> Self {
        Self::Skipped(OptimizationSkipped { bytes, reason })
    }

    fn optimized(bytes: Bytes, final_extension: &'static str, original_len: usize) -> Self {
        Self::Optimized(OptimizedArtifact {
            bytes,
            final_extension: Some(final_extension),
            original_len,
        })
    }
}

/// Kind-aware optimizer shared by all workers of a job.
#[derive(Clone)]
pub struct Optimizer {
    settings: OptimizerSettings,
    timeout: Duration,
    css: Arc<dyn CssCompressor>,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Optimizer")
            .field("settings", &self.settings)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Optimizer {
    /// Optimizer using the structural stylesheet compressor.
    #[must_use]
    pub fn new(settings: OptimizerSettings, timeout: Duration) -> Self {
        Self {
            settings,
            timeout,
            css: Arc::new(StructuralCssCompressor),
        }
    }

    /// Replace the stylesheet compressor.
    #[must_use]
    pub fn with_css_compressor(mut self, compressor: Arc<dyn CssCompressor>) -> Self {
        self.css = compressor;
        self
    }

    /// Optimize `bytes` for a resource of `kind` destined for `destination`.
    ///
    /// The image output format follows the destination suffix.
    pub async fn optimize(
        &self,
        bytes: Bytes,
        kind: ResourceKind,
        destination: &Path,
    ) -> Optimization {
        if bytes.is_empty() {
            return Optimization::skipped(bytes, "empty_payload");
        }
        match kind {
            ResourceKind::Image => self.optimize_image(bytes, destination).await,
            ResourceKind::Css => {
                let original_len = bytes.len();
                let minified = css::minify_css(&bytes, self.css.as_ref());
                Optimization::optimized(Bytes::from(minified), "css", original_len)
            }
            ResourceKind::Js => self.optimize_js(bytes).await,
            ResourceKind::Font | ResourceKind::Html | ResourceKind::Other => {
                Optimization::skipped(bytes, "pass_through")
            }
        }
    }

    async fn optimize_image(&self, bytes: Bytes, destination: &Path) -> Optimization {
        let Some(target) = ImageTarget::from_path(destination) else {
            return Optimization::skipped(bytes, "unsupported_image_target");
        };
        let max_dimension = self.settings.max_image_dimension;
        let quality = self.settings.jpeg_quality;
        let input = bytes.clone();
        let joined = tokio::task::spawn_blocking(move || {
            raster::recompress(&input, target, max_dimension, quality)
        })
        .await;

        match joined {
            Ok(Ok(ImageResult::Encoded {
                bytes: encoded,
                width,
                height,
            })) => {
                debug!(
                    destination = %destination.display(),
                    width,
                    height,
                    before = bytes.len(),
                    after = encoded.len(),
                    "image re-encoded"
                );
                Optimization::optimized(Bytes::from(encoded), target.extension(), bytes.len())
            }
            Ok(Ok(ImageResult::Unchanged)) => Optimization::skipped(bytes, "not_smaller"),
            Ok(Err(error)) => {
                debug!(
                    destination = %destination.display(),
                    error = %error,
                    "image decode failed; keeping original"
                );
                Optimization::skipped(bytes, "image_decode_failed")
            }
            Err(error) => {
                debug!(
                    destination = %destination.display(),
                    error = %error,
                    "image task aborted; keeping original"
                );
                Optimization::skipped(bytes, "image_task_failed")
            }
        }
    }

    async fn optimize_js(&self, bytes: Bytes) -> Optimization {
        match js::minify_js(&bytes, &self.settings.js_minifier, self.timeout).await {
            Ok(minified) => Optimization::optimized(Bytes::from(minified), "js", bytes.len()),
            Err(error) => {
                debug!(reason = error.reason(), error = %error, "javascript kept unminified");
                Optimization::skipped(bytes, error.reason())
            }
        }
    }
}
