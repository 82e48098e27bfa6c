//! File and environment backed configuration loading.
//!
//! # Design
//! - Documents are YAML or JSON, chosen by file extension.
//! - Environment overrides apply after the document and before validation.
//! - The environment is read through an injectable lookup so tests stay pure.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::PipelineConfig;

/// Overrides `concurrency`.
pub const ENV_CONCURRENCY: &str = "SITEVAULT_CONCURRENCY";
/// Overrides `fetch_timeout_secs`.
pub const ENV_FETCH_TIMEOUT_SECS: &str = "SITEVAULT_FETCH_TIMEOUT_SECS";
/// Overrides `user_agent`.
pub const ENV_USER_AGENT: &str = "SITEVAULT_USER_AGENT";
/// Overrides `logging.level`.
pub const ENV_LOG_LEVEL: &str = "SITEVAULT_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    fn from_path(path: &Path) -> ConfigResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Builds a validated [`PipelineConfig`] from an optional file plus the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader that starts from built-in defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self { path: None }
    }

    /// Loader that starts from the document at `path`.
    #[must_use]
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Load using the process environment.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load_with_env`].
    pub fn load(&self) -> ConfigResult<PipelineConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, when an
    /// override does not parse, or when the merged config fails validation.
    pub fn load_with_env<F>(&self, lookup: F) -> ConfigResult<PipelineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.path {
            Some(path) => Self::read_document(path)?,
            None => PipelineConfig::default(),
        };
        apply_env_overrides(&mut config, &lookup)?;
        config.validate()?;
        info!(
            source = self
                .path
                .as_deref()
                .map_or_else(|| "defaults".to_string(), |p| p.display().to_string()),
            concurrency = config.concurrency,
            fetch_timeout_secs = config.fetch_timeout_secs,
            cdn_rules = config.cdn.len(),
            "pipeline configuration loaded"
        );
        Ok(config)
    }

    fn read_document(path: &Path) -> ConfigResult<PipelineConfig> {
        let format = DocumentFormat::from_path(path)?;
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            operation: "config.read",
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = contents.len(), "read configuration document");
        if contents.trim().is_empty() {
            return Ok(PipelineConfig::default());
        }
        match format {
            DocumentFormat::Yaml => {
                serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })
            }
            DocumentFormat::Json => {
                serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

fn apply_env_overrides<F>(config: &mut PipelineConfig, lookup: &F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_CONCURRENCY) {
        config.concurrency = parse_env(ENV_CONCURRENCY, &value)?;
    }
    if let Some(value) = lookup(ENV_FETCH_TIMEOUT_SECS) {
        config.fetch_timeout_secs = parse_env(ENV_FETCH_TIMEOUT_SECS, &value)?;
    }
    if let Some(value) = lookup(ENV_USER_AGENT) {
        config.user_agent = value;
    }
    if let Some(value) = lookup(ENV_LOG_LEVEL) {
        config.logging.level = value;
    }
    Ok(())
}

fn parse_env<T: FromStr>(key: &'static str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid("env", key, Some(value.to_string()), "not_a_number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_load_without_file() {
        let config = ConfigLoader::new()
            .load_with_env(env(&[]))
            .expect("defaults");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let config = ConfigLoader::new()
            .load_with_env(env(&[
                (ENV_CONCURRENCY, "3"),
                (ENV_FETCH_TIMEOUT_SECS, " 12 "),
                (ENV_USER_AGENT, "sitevault-test"),
                (ENV_LOG_LEVEL, "debug"),
            ]))
            .expect("overrides");
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.fetch_timeout_secs, 12);
        assert_eq!(config.user_agent, "sitevault-test");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn malformed_env_value_is_reported() {
        let err = ConfigLoader::new()
            .load_with_env(env(&[(ENV_CONCURRENCY, "many")]))
            .expect_err("not a number");
        assert!(matches!(
            err,
            ConfigError::InvalidField { section: "env", reason: "not_a_number", .. }
        ));
    }

    #[test]
    fn out_of_range_env_value_fails_validation() {
        let err = ConfigLoader::new()
            .load_with_env(env(&[(ENV_FETCH_TIMEOUT_SECS, "0")]))
            .expect_err("zero timeout");
        assert_eq!(err.reason(), Some("out_of_range"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = DocumentFormat::from_path(Path::new("sitevault.toml")).expect_err("toml");
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.YML")).expect("yml"),
            DocumentFormat::Yaml
        );
    }
}
