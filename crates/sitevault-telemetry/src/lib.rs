#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub)]

//! Logging and metrics shared across the Sitevault workspace.
//!
//! Layout: `init.rs` (subscriber installation), `metrics.rs` (Prometheus
//! registry), `error.rs` (`TelemetryError`).

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging, installed_format};
pub use metrics::{Metrics, MetricsSnapshot};
