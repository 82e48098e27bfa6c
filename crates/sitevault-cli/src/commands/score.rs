use sitevault_pipeline::score_archive;

use crate::cli::{OutputFormat, ScoreArgs};
use crate::context::{AppContext, CliError, CliResult};
use crate::output::render_quality;

pub(crate) async fn handle_score(
    ctx: &AppContext,
    args: &ScoreArgs,
    format: OutputFormat,
) -> CliResult<()> {
    if !args.root.is_dir() {
        return Err(CliError::validation(format!(
            "{} is not a directory",
            args.root.display()
        )));
    }
    let root = args.root.clone();
    let layout = ctx.config.layout.clone();
    let policy = ctx.config.scoring.clone();
    let report = tokio::task::spawn_blocking(move || score_archive(&root, &layout, &policy))
        .await
        .map_err(CliError::failure)?
        .map_err(CliError::failure)?;
    render_quality(&report, format)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use sitevault_config::PipelineConfig;
    use sitevault_test_support::fixtures::{SAMPLE_CSS, temp_root};

    use super::*;

    fn context() -> AppContext {
        AppContext {
            config: PipelineConfig::default(),
            metrics: None,
        }
    }

    #[tokio::test]
    async fn scores_an_existing_tree() -> anyhow::Result<()> {
        let dir = temp_root()?;
        fs::create_dir_all(dir.path().join("css"))?;
        fs::write(dir.path().join("css/site.css"), SAMPLE_CSS)?;
        fs::write(dir.path().join("index.html"), "<html><body></body></html>")?;

        let args = ScoreArgs {
            root: dir.path().to_path_buf(),
        };
        handle_score(&context(), &args, OutputFormat::Table)
            .await
            .map_err(|err| anyhow::anyhow!(err.display_message()))?;
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_is_a_validation_error() -> anyhow::Result<()> {
        let dir = temp_root()?;
        let args = ScoreArgs {
            root: dir.path().join("absent"),
        };
        let err = handle_score(&context(), &args, OutputFormat::Json)
            .await
            .expect_err("no such directory");
        assert_eq!(err.exit_code(), 2);
        Ok(())
    }
}
