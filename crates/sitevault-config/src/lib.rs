#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub)]

//! Configuration for the Sitevault resource pipeline.
//!
//! Layout: `model.rs` (typed config documents), `defaults.rs` (literal
//! defaults), `validate.rs` (range and shape checks), `loader.rs` (YAML/JSON
//! files plus environment overrides), `error.rs` (`ConfigError`).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    ConfigLoader, ENV_CONCURRENCY, ENV_FETCH_TIMEOUT_SECS, ENV_LOG_LEVEL, ENV_USER_AGENT,
};
pub use model::{
    ArchiveLayout, CategoryWeights, CdnRule, LoggingSettings, OptimizerSettings, PipelineConfig,
    ScoringPolicy,
};
