//! Logging initialisation and format selection.
//!
//! # Design
//! - One entry point installs the global subscriber (pretty or JSON).
//! - `RUST_LOG` overrides the configured level when present.

use once_cell::sync::OnceCell;
use sitevault_config::LoggingSettings;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{TelemetryError, TelemetryResult};

/// Default logging target when neither `RUST_LOG` nor config provide one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level directive (e.g. `info`, `sitevault_pipeline=debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
}

impl<'a> LoggingConfig<'a> {
    /// Derive a logging config from the loaded settings section.
    #[must_use]
    pub fn from_settings(settings: &'a LoggingSettings) -> Self {
        Self {
            level: &settings.level,
            format: LogFormat::from_label(settings.format.as_deref()),
        }
    }
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit human-readable logs.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Map a config label to a format, inferring for missing or unknown labels.
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("json") => Self::Json,
            Some("pretty") => Self::Pretty,
            _ => Self::infer(),
        }
    }
}

/// Configure and install the global tracing subscriber.
///
/// Logs go to stderr so command output on stdout stays machine readable.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_logging(config: &LoggingConfig<'_>) -> TelemetryResult<()> {
    let filter = build_env_filter(config.level);
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init(),
    };
    installed.map_err(|source| TelemetryError::SubscriberInstall { source })?;
    let _ = INSTALLED_FORMAT.set(config.format);
    Ok(())
}

/// Format of the subscriber installed by [`init_logging`], if any.
#[must_use]
pub fn installed_format() -> Option<LogFormat> {
    INSTALLED_FORMAT.get().copied()
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_labels() {
        assert_eq!(LogFormat::from_label(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_label(Some(" pretty ")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_label(Some("xml")), LogFormat::infer());
        assert_eq!(LogFormat::from_label(None), LogFormat::infer());
    }

    #[test]
    fn config_from_settings_borrows_level() {
        let settings = LoggingSettings {
            level: "debug".into(),
            format: Some("json".into()),
        };
        let config = LoggingConfig::from_settings(&settings);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn second_install_reports_error() {
        let config = LoggingConfig {
            level: "info",
            format: LogFormat::Pretty,
        };
        let first = init_logging(&config);
        let second = init_logging(&config);
        assert!(first.is_err() || second.is_err());
        if first.is_ok() {
            assert_eq!(installed_format(), Some(LogFormat::Pretty));
        }
    }
}
