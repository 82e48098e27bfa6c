//! Error types for configuration operations.
//!
//! # Design
//!
//! - Constant messages; the offending section, field, and value travel as fields.
//! - Parser and IO errors are preserved as sources.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: String,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The configuration file extension is not understood.
    #[error("unsupported configuration format")]
    UnsupportedFormat {
        /// Path of the rejected file.
        path: PathBuf,
    },
    /// File system operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// YAML document could not be parsed.
    #[error("failed to parse yaml configuration")]
    Yaml {
        /// Path of the document.
        path: PathBuf,
        /// Source parser error.
        source: serde_yaml::Error,
    },
    /// JSON document could not be parsed.
    #[error("failed to parse json configuration")]
    Json {
        /// Path of the document.
        path: PathBuf,
        /// Source parser error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: impl Into<String>,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field: field.into(),
            value,
            reason,
        }
    }

    /// Short reason for invalid-field errors, useful for CLI output.
    #[must_use]
    pub const fn reason(&self) -> Option<&'static str> {
        match self {
            Self::InvalidField { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Single-line description naming the offending location.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::InvalidField {
                section,
                field,
                value,
                reason,
            } => match value {
                Some(value) => format!("{section}.{field} = {value}: {reason}"),
                None => format!("{section}.{field}: {reason}"),
            },
            Self::UnsupportedFormat { path } => {
                format!("{}: expected .yaml, .yml, or .json", path.display())
            }
            Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {source}", path.display()),
            Self::Yaml { path, source } => format!("{}: {source}", path.display()),
            Self::Json { path, source } => format!("{}: {source}", path.display()),
        }
    }
}
