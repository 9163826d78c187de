//! Command-line interface: argument structures and routing

pub mod args;
pub mod router;

pub use args::{Cli, Commands, OutputFormat};
pub use router::execute_command;
