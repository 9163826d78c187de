//! Application bootstrap: logging and fatal-error handling

use tracing_subscriber::EnvFilter;

use crate::error::SwarmError;

/// Initialise tracing from the verbosity flag, unless `RUST_LOG` already
/// says otherwise. Diagnostics go to stderr; agent output owns stdout.
pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "swarm=warn",
        1 => "swarm=info",
        2 => "swarm=debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print the error and exit with its mapped code (2 for user errors,
/// 1 otherwise).
pub fn handle_fatal_error(error: anyhow::Error) -> ! {
    let code = error
        .downcast_ref::<SwarmError>()
        .map(SwarmError::exit_code)
        .unwrap_or(1);
    eprintln!("error: {:#}", error);
    std::process::exit(code);
}
