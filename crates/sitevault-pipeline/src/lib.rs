#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub)]

//! Concurrent acquisition, validation, optimization, and scoring of the
//! resources behind a captured web page.
//!
//! Layout: `service.rs` (job orchestration), `fetch.rs` (network seam),
//! `validator.rs`, `optimizer/`, `fallback.rs`, `quality.rs`, `ledger.rs`,
//! `progress.rs`, `layout.rs` (paths), `archive.rs` (atomic writes),
//! `model.rs`, `error.rs`.

mod archive;
pub mod error;
pub mod fallback;
pub mod fetch;
pub mod layout;
pub mod ledger;
pub mod model;
pub mod optimizer;
pub mod progress;
pub mod quality;
pub mod service;
pub mod validator;

pub use error::{PipelineError, PipelineResult};
pub use fallback::{FallbackOutcome, FallbackResolver, PLACEHOLDER_CSS, PLACEHOLDER_SVG};
pub use fetch::{
    Acquire, AcquireFailure, FetchError, Fetcher, FetcherExt, HttpFetcher, TimeoutFetcher,
    ValidatingFetcher,
};
pub use layout::{
    UnsafeDestination, check_destination, destination_for, relink_document, sanitize_filename,
};
pub use ledger::{DedupLedger, canonicalize};
pub use model::{
    JobReport, JobRequest, ManifestEntry, Relocation, ResourceDescriptor, ResourceRecord,
};
pub use optimizer::{
    CssCompressor, Optimization, OptimizationSkipped, OptimizedArtifact, Optimizer,
    StructuralCssCompressor, baseline_minify,
};
pub use progress::{EventBusSink, NoopSink, ProgressSink};
pub use quality::{
    CategoryReport, CssSample, CssStats, HtmlStats, ImageSample, ImageStats, QualityCategories,
    QualityReport, aggregate, render_markdown, score_archive, score_css, score_html, score_images,
};
pub use service::{
    CancelHandle, PipelineJob, QUALITY_JSON, QUALITY_MARKDOWN, RESOURCES_JSON, ResourcePipeline,
    report_into_result, run_pipeline,
};
pub use validator::{DetectedFormat, ValidationVerdict, validate};
