//! IndexSleuth — content-addressed directory indexer.
//!
//! Thin binary entry point. All logic lives in the `indexsleuth-core`
//! and `indexsleuth-cli` crates.

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = indexsleuth_cli::Cli::parse();

    // Logs go to stderr so reports on stdout stay machine-readable.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match indexsleuth_cli::run(&cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("command failed: {e:?}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
