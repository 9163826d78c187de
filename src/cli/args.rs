//! CLI argument structures
//!
//! All subcommand definitions for the swarm CLI. Durations are parsed with
//! humantime (`30s`, `5m`, `2h`).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Launch, track and control long-running agent processes
#[derive(Parser)]
#[command(name = "swarm")]
#[command(about = "swarm - supervise fleets of long-running agent processes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Operate on the global scope instead of the current project
    ///
    /// Long-only: -g belongs to `logs --grep`.
    #[arg(long, global = true)]
    pub global: bool,

    /// Output format for list/inspect
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch a new agent
    #[command(name = "run")]
    Run {
        /// Named prompt from the prompt directory, or '-' for stdin
        prompt: Option<String>,

        /// Read the prompt from a file
        #[arg(short = 'f', long, conflicts_with = "string")]
        file: Option<PathBuf>,

        /// Use the given string as the prompt
        #[arg(short = 's', long)]
        string: Option<String>,

        /// Number of iterations to run (0 = unlimited)
        #[arg(short = 'n', long, default_value = "1")]
        iterations: u32,

        /// Model identifier passed to the agent
        #[arg(short = 'm', long)]
        model: Option<String>,

        /// Human-readable name, unique among running agents in scope
        #[arg(long)]
        name: Option<String>,

        /// Attach a label (KEY=VALUE, repeatable)
        #[arg(short = 'l', long = "label", value_name = "KEY=VALUE")]
        labels: Vec<String>,

        /// Inject an environment variable (KEY=VALUE, repeatable)
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Shell command to run after the agent terminates
        #[arg(long = "on-complete", value_name = "CMD")]
        on_complete: Option<String>,

        /// Total timeout for the whole run
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Timeout per iteration
        #[arg(long = "iteration-timeout", value_parser = humantime::parse_duration)]
        iteration_timeout: Option<Duration>,

        /// Pass agent output through verbatim instead of pretty-printing
        #[arg(long)]
        raw: bool,

        /// Grace period between a result event and a forced kill
        #[arg(long = "grace-period", value_parser = humantime::parse_duration)]
        grace_period: Option<Duration>,

        /// Run the supervisor in the background and print the agent id
        #[arg(short = 'd', long)]
        detach: bool,
    },

    /// List agents in scope
    #[command(name = "list", alias = "ps")]
    List {
        /// Include terminated agents
        #[arg(short = 'a', long)]
        all: bool,
    },

    /// Show one agent's full record
    #[command(name = "inspect")]
    Inspect {
        /// Agent id, name, '@last' or '_'
        target: String,
    },

    /// View an agent's captured log
    #[command(name = "logs")]
    Logs {
        /// Agent id, name, '@last' or '_'
        target: String,

        /// Only lines newer than this long ago
        #[arg(long, value_parser = humantime::parse_duration)]
        since: Option<Duration>,

        /// Only lines older than this long ago
        #[arg(long, value_parser = humantime::parse_duration)]
        until: Option<Duration>,

        /// Filter lines by regex (repeatable; patterns OR together)
        #[arg(short = 'g', long = "grep", value_name = "PATTERN")]
        grep: Vec<String>,

        /// Match case-sensitively
        #[arg(long)]
        case_sensitive: bool,

        /// Invert the grep match
        #[arg(long)]
        invert: bool,

        /// Lines of context after each match
        #[arg(short = 'A', long, default_value = "0", value_name = "N")]
        after: usize,

        /// Lines of context before each match
        #[arg(short = 'B', long, default_value = "0", value_name = "N")]
        before: usize,

        /// Lines of context around each match
        #[arg(short = 'C', long, default_value = "0", value_name = "N")]
        context: usize,

        /// Only the last N lines
        #[arg(long, value_name = "N")]
        tail: Option<usize>,

        /// Keep the log open and stream new lines
        #[arg(short = 'F', long)]
        follow: bool,

        /// Pretty-print agent events
        #[arg(long)]
        pretty: bool,
    },

    /// Pause a running agent after its current iteration
    #[command(name = "stop")]
    Stop {
        /// Agent id, name, '@last' or '_'
        target: String,
    },

    /// Resume a paused agent
    #[command(name = "start")]
    Start {
        /// Agent id, name, '@last' or '_'
        target: String,
    },

    /// Terminate an agent
    #[command(name = "kill")]
    Kill {
        /// Agent id, name, '@last' or '_'
        target: String,

        /// Force-kill the supervisor's process group instead of waiting
        /// for the current iteration
        #[arg(long)]
        immediate: bool,
    },

    /// Terminate every matching running agent
    #[command(name = "kill-all")]
    KillAll {
        /// Only agents carrying this label (KEY=VALUE, repeatable)
        #[arg(short = 'l', long = "label", value_name = "KEY=VALUE")]
        labels: Vec<String>,

        /// Only agents whose name matches this regex
        #[arg(long, value_name = "REGEX")]
        name: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "force")]
        force: bool,

        /// Force-kill process groups instead of waiting
        #[arg(long)]
        immediate: bool,
    },

    /// Pause every matching running agent
    #[command(name = "pause-all")]
    PauseAll {
        /// Only agents carrying this label (KEY=VALUE, repeatable)
        #[arg(short = 'l', long = "label", value_name = "KEY=VALUE")]
        labels: Vec<String>,

        /// Only agents whose name matches this regex
        #[arg(long, value_name = "REGEX")]
        name: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "force")]
        force: bool,
    },

    /// Resume every matching paused agent
    #[command(name = "resume-all")]
    ResumeAll {
        /// Only agents carrying this label (KEY=VALUE, repeatable)
        #[arg(short = 'l', long = "label", value_name = "KEY=VALUE")]
        labels: Vec<String>,

        /// Only agents whose name matches this regex
        #[arg(long, value_name = "REGEX")]
        name: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "force")]
        force: bool,
    },

    /// Change a running agent's configuration
    #[command(name = "update")]
    Update {
        /// Agent id, name, '@last' or '_'
        target: String,

        /// New iteration target (0 = unlimited)
        #[arg(short = 'n', long)]
        iterations: Option<u32>,

        /// New model, effective next iteration
        #[arg(short = 'm', long)]
        model: Option<String>,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// Set a label (KEY=VALUE, repeatable)
        #[arg(short = 'l', long = "label", value_name = "KEY=VALUE")]
        labels: Vec<String>,

        /// Remove a label by key (repeatable)
        #[arg(long = "remove-label", value_name = "KEY")]
        remove_labels: Vec<String>,
    },

    /// Start a fresh run of an existing agent
    #[command(name = "restart")]
    Restart {
        /// Agent id, name, '@last' or '_'
        target: String,

        /// Continue counting from the source's last iteration
        #[arg(long = "continue")]
        continue_: bool,

        /// Override the iteration target
        #[arg(short = 'n', long)]
        iterations: Option<u32>,

        /// Run the supervisor in the background
        #[arg(short = 'd', long)]
        detach: bool,
    },

    /// Copy an agent's configuration into a new run, with overrides
    #[command(name = "clone")]
    Clone {
        /// Agent id, name, '@last' or '_'
        target: String,

        /// Name for the new agent
        #[arg(long)]
        name: Option<String>,

        /// Override the model
        #[arg(short = 'm', long)]
        model: Option<String>,

        /// Override the iteration target
        #[arg(short = 'n', long)]
        iterations: Option<u32>,

        /// Add or override a label (KEY=VALUE, repeatable)
        #[arg(short = 'l', long = "label", value_name = "KEY=VALUE")]
        labels: Vec<String>,

        /// Print the equivalent `swarm run` invocation instead of running
        #[arg(long)]
        dry_run: bool,

        /// Run the supervisor in the background
        #[arg(short = 'd', long)]
        detach: bool,
    },

    /// Re-run an agent with its exact original configuration
    #[command(name = "replay")]
    Replay {
        /// Agent id, name, '@last' or '_'
        target: String,

        /// Print the equivalent `swarm run` invocation instead of running
        #[arg(long)]
        dry_run: bool,

        /// Run the supervisor in the background
        #[arg(short = 'd', long)]
        detach: bool,
    },

    /// Block until agents terminate
    #[command(name = "wait")]
    Wait {
        /// Agent ids or names
        targets: Vec<String>,

        /// Return as soon as any target terminates
        #[arg(long)]
        any: bool,

        /// Give up after this long (exit code 1)
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Poll interval
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
    },

    /// Delete terminated agents from the store
    #[command(name = "prune")]
    Prune {
        /// Only agents terminated longer than this ago
        #[arg(long = "older-than", value_parser = humantime::parse_duration)]
        older_than: Option<Duration>,

        /// Also delete their log files
        #[arg(long)]
        logs: bool,
    },

    /// Check the health of the swarm installation
    #[command(name = "doctor")]
    Doctor,

    /// Internal: run the supervisor loop for a registered agent
    #[command(name = "supervise", hide = true)]
    Supervise {
        /// Agent id
        id: String,

        /// Environment extensions (KEY=VALUE, repeatable)
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Total timeout for the whole run
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Timeout per iteration
        #[arg(long = "iteration-timeout", value_parser = humantime::parse_duration)]
        iteration_timeout: Option<Duration>,

        /// Pass agent output through verbatim
        #[arg(long)]
        raw: bool,

        /// Grace period between a result event and a forced kill
        #[arg(long = "grace-period", value_parser = humantime::parse_duration)]
        grace_period: Option<Duration>,

        /// First iteration number (used by restart --continue)
        #[arg(long = "starting-iteration", default_value = "1", hide = true)]
        starting_iteration: u32,
    },
}
