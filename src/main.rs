//! swarm CLI entry point
//!
//! A thin composition layer: parse arguments, initialise logging, route the
//! subcommand, and translate the outcome into a process exit code.

use clap::Parser;

use swarm::app::{handle_fatal_error, init_logging};
use swarm::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute_command(cli).await {
        Ok(code) => std::process::exit(code),
        Err(error) => handle_fatal_error(error),
    }
}
