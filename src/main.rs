//! Topic Store - Binary Entry Point
//!
//! This is the main entry point for the topic-store binary.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use topic_store::cli::{self, Cli};
use topic_store::logging::{self, Verbosity};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));
    cli::install_interrupt_handler();

    match cli::run(&cli) {
        Ok(()) if cli::interrupted() => ExitCode::from(cli::INTERRUPTED_EXIT_CODE),
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "{} {} failed", topic_store::NAME, topic_store::VERSION);
            ExitCode::FAILURE
        }
    }
}
