use anyhow::Context;
use clap::Parser;
use slyscan::cli::Cli;
use indicatif::MultiProgress;
use slyscan::output;
use slyscan::progress::{self, SuspendingWriter};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status after Ctrl-C, as shells report SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let console = progress::console(cli.progress_hidden());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_writer(SuspendingWriter::new(console.clone(), std::io::stderr))
        .init();

    match run(cli, console).await {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, console: MultiProgress) -> anyhow::Result<bool> {
    let settings = cli.settings().context("failed to load settings")?;
    cli.scan
        .execute(settings, cli.quiet, console)
        .await
        .context("scan failed")
}
