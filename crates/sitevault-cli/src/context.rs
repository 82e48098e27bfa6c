//! Loaded configuration, metrics, and error types shared by command handlers.

use std::fmt::{self, Display, Formatter};

use serde_json::json;
use sitevault_config::{ConfigLoader, PipelineConfig};
use sitevault_telemetry::{LoggingConfig, Metrics, init_logging, installed_format};

use crate::cli::{Cli, OutputFormat};
use crate::output::print_json;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

/// State every command handler receives.
pub(crate) struct AppContext {
    pub(crate) config: PipelineConfig,
    pub(crate) metrics: Option<Metrics>,
}

impl AppContext {
    /// Load configuration, install logging, and build the metrics registry.
    pub(crate) fn from_cli(cli: &Cli) -> CliResult<Self> {
        let loader = cli
            .config
            .as_ref()
            .map_or_else(ConfigLoader::new, |path| ConfigLoader::with_file(path.clone()));
        let config = loader
            .load()
            .map_err(|err| CliError::validation(format!("{err}: {}", err.describe())))?;

        if installed_format().is_none() {
            init_logging(&LoggingConfig::from_settings(&config.logging))
                .map_err(CliError::failure)?;
        }

        let metrics = if cli.metrics {
            Some(Metrics::new().map_err(CliError::failure)?)
        } else {
            None
        };
        Ok(Self { config, metrics })
    }

    /// Print the Prometheus exposition when metrics were requested; JSON
    /// output pairs it with the job summary.
    pub(crate) fn emit_metrics(&self, format: OutputFormat) -> CliResult<()> {
        let Some(metrics) = &self.metrics else {
            return Ok(());
        };
        let text = metrics.render().map_err(CliError::failure)?;
        match format {
            OutputFormat::Table => {
                print!("{text}");
                Ok(())
            }
            OutputFormat::Json => print_json(&json!({
                "summary": metrics.snapshot(),
                "exposition": text,
            })),
        }
    }
}
