use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use smtprobe::app::{App, RunStatus};
use smtprobe::cli::Cli;
use tracing_subscriber::EnvFilter;

// RUST_LOG wins; otherwise --verbose turns on the retry/reconnect diagnostics.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "smtprobe=debug"
    } else {
        "smtprobe=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match App::new(cli).run().await {
        Ok(RunStatus::Completed { fatal: 0 }) => ExitCode::SUCCESS,
        Ok(RunStatus::Completed { fatal }) => {
            eprintln!(
                "{} {fatal} user(s) could not be tested, see the errors above",
                "[!]".red().bold()
            );
            ExitCode::FAILURE
        }
        // Ctrl+C: no error report, just a failing status
        Ok(RunStatus::Interrupted) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {e:#}", "[!]".red().bold());
            ExitCode::FAILURE
        }
    }
}
