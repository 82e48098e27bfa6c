//! # Design
//!
//! - Structured, constant-message errors for job-level pipeline faults.
//! - Per-resource problems never surface here; they become outcomes.
//! - Sources are preserved without interpolating context into messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that abort a pipeline job or a pipeline helper.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// IO failures while materializing the archive.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// JSON serialization failures for persisted reports.
    #[error("pipeline json failure")]
    Json {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Directory traversal failures while scoring.
    #[error("pipeline walkdir failure")]
    Walkdir {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Input validation failures.
    #[error("pipeline invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The pipeline configuration failed validation.
    #[error("pipeline configuration invalid")]
    Config {
        /// Underlying configuration error.
        source: sitevault_config::ConfigError,
    },
    /// The HTTP client could not be constructed.
    #[error("pipeline http client unavailable")]
    HttpClient {
        /// Underlying fetch error.
        source: crate::fetch::FetchError,
    },
    /// A worker or blocking task panicked or was aborted.
    #[error("pipeline task failed")]
    Task {
        /// Operation that owned the task.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
    /// The job ended in the `failed` stage.
    #[error("pipeline job failed")]
    JobFailed {
        /// Single-line cause recorded on the job.
        cause: String,
    },
    /// The job was cancelled before scoring.
    #[error("pipeline job cancelled")]
    Cancelled {
        /// Descriptors that reached a terminal outcome before cancellation.
        processed: usize,
    },
}

impl PipelineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Single-line cause suitable for `JobProgress::failure`.
    #[must_use]
    pub fn cause(&self) -> String {
        match self {
            Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {source}", path.display()),
            Self::Json {
                operation, path, ..
            } => format!("{operation} could not serialize {}", path.display()),
            Self::Walkdir {
                operation, path, ..
            } => format!("{operation} could not traverse {}", path.display()),
            Self::InvalidInput { field, reason, .. } => format!("invalid {field}: {reason}"),
            Self::Config { source } => format!("invalid configuration: {}", source.describe()),
            Self::HttpClient { .. } => "http client unavailable".to_string(),
            Self::Task { operation, .. } => format!("{operation} task failed"),
            Self::JobFailed { cause } => cause.clone(),
            Self::Cancelled { processed } => format!("cancelled after {processed} resources"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn io_errors_keep_context_out_of_display() {
        let err = PipelineError::io(
            "archive.create_root",
            "/tmp/site",
            io::Error::other("denied"),
        );
        assert_eq!(err.to_string(), "pipeline io failure");
        assert!(err.source().is_some());
        let cause = err.cause();
        assert!(cause.contains("archive.create_root"));
        assert!(cause.contains("/tmp/site"));
        assert!(!cause.contains('\n'));
    }

    #[test]
    fn invalid_input_cause_names_field() {
        let err = PipelineError::InvalidInput {
            field: "concurrency",
            reason: "must_be_positive",
            value: Some("0".into()),
        };
        assert_eq!(err.cause(), "invalid concurrency: must_be_positive");
    }
}
