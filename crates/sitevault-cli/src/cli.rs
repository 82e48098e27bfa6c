//! Argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sitevault_events::ResourceKind;

use crate::commands::run::handle_run;
use crate::commands::score::handle_score;
use crate::commands::validate::handle_validate;
use crate::context::{AppContext, CliResult};

/// Parses CLI arguments, executes the requested command, and prints metrics
/// when asked. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let ctx = match AppContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };

    let cli_format = cli.format;
    let outcome = dispatch(cli, &ctx).await;
    let emitted = ctx.emit_metrics(cli_format);
    match outcome.and(emitted) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli, ctx: &AppContext) -> CliResult<()> {
    match cli.command {
        Command::Run(args) => handle_run(ctx, args, cli.format).await,
        Command::Score(args) => handle_score(ctx, &args, cli.format).await,
        Command::Validate(args) => handle_validate(ctx, &args, cli.format),
    }
}

#[derive(Parser)]
#[command(
    name = "sitevault",
    version,
    about = "Archive, optimize, and score the resources behind a captured web page"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "SITEVAULT_CONFIG",
        help = "YAML or JSON configuration file"
    )]
    pub(crate) config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for reports and verdicts"
    )]
    pub(crate) format: OutputFormat,
    #[arg(
        long,
        global = true,
        help = "Print the Prometheus exposition after the command"
    )]
    pub(crate) metrics: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch, validate, optimize, and score every resource in a manifest.
    Run(RunArgs),
    /// Rescore an existing archive directory.
    Score(ScoreArgs),
    /// Check a local file against the kind it claims to be.
    Validate(ValidateArgs),
}

#[derive(Args)]
pub(crate) struct RunArgs {
    #[arg(long, help = "JSON array of {url, kind, destination?} entries")]
    pub(crate) manifest: PathBuf,
    #[arg(long, help = "Archive root directory")]
    pub(crate) output: PathBuf,
    #[arg(long, help = "Rendered HTML written as the archive's root document")]
    pub(crate) document: Option<PathBuf>,
    #[arg(long, help = "Override the configured worker pool size")]
    pub(crate) concurrency: Option<usize>,
    #[arg(long, help = "Stream job events to stderr as JSON lines instead of progress")]
    pub(crate) events: bool,
}

#[derive(Args)]
pub(crate) struct ScoreArgs {
    #[arg(value_name = "DIR", help = "Archive root to score")]
    pub(crate) root: PathBuf,
}

#[derive(Args)]
pub(crate) struct ValidateArgs {
    #[arg(value_name = "FILE", help = "Payload to inspect")]
    pub(crate) file: PathBuf,
    #[arg(long, help = "Expected kind: html, css, js, image, font, or other")]
    pub(crate) kind: ResourceKind,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}
