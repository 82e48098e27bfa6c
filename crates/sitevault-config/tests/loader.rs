use std::fs;

use anyhow::Result;
use sitevault_config::{ConfigError, ConfigLoader, ENV_CONCURRENCY, PipelineConfig};
use sitevault_events::ResourceKind;

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn yaml_document_merges_with_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sitevault.yaml");
    fs::write(
        &path,
        r"
concurrency: 4
optimizer:
  jpeg_quality: 70
cdn:
  - fragment: lodash
    kind: js
    url: https://cdn.jsdelivr.net/npm/lodash@4/lodash.min.js
",
    )?;

    let config = ConfigLoader::with_file(&path).load_with_env(no_env)?;
    assert_eq!(config.concurrency, 4);
    assert_eq!(config.optimizer.jpeg_quality, 70);
    assert_eq!(config.optimizer.max_image_dimension, 2000);
    assert_eq!(config.cdn.len(), 1);
    assert_eq!(config.cdn[0].kind, Some(ResourceKind::Js));
    assert_eq!(config.layout, PipelineConfig::default().layout);
    Ok(())
}

#[test]
fn json_document_is_accepted_and_env_wins() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sitevault.json");
    fs::write(&path, r#"{"concurrency": 2, "fetch_timeout_secs": 5}"#)?;

    let config = ConfigLoader::with_file(&path)
        .load_with_env(|key| (key == ENV_CONCURRENCY).then(|| "6".to_string()))?;
    assert_eq!(config.concurrency, 6);
    assert_eq!(config.fetch_timeout_secs, 5);
    Ok(())
}

#[test]
fn unknown_fields_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sitevault.yml");
    fs::write(&path, "concurency: 4\n")?;

    let err = ConfigLoader::with_file(&path)
        .load_with_env(no_env)
        .expect_err("typo should fail");
    assert!(matches!(err, ConfigError::Yaml { .. }));
    Ok(())
}

#[test]
fn missing_file_reports_io_context() {
    let err = ConfigLoader::with_file("/nonexistent/sitevault.yaml")
        .load_with_env(no_env)
        .expect_err("missing");
    match err {
        ConfigError::Io { operation, path, .. } => {
            assert_eq!(operation, "config.read");
            assert!(path.ends_with("sitevault.yaml"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn empty_document_yields_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty.yaml");
    fs::write(&path, "\n")?;
    assert_eq!(
        ConfigLoader::with_file(&path).load_with_env(no_env)?,
        PipelineConfig::default()
    );
    Ok(())
}
