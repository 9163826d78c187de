use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the swarm core.
///
/// Operator-facing kinds (bad arguments, unknown agents) map to exit code 2;
/// everything else maps to 1. A total-timeout run exits 124, handled by the
/// `run` command itself.
#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("state file is corrupt: {0}")]
    StoreCorrupt(String),

    #[error("failed to write state file: {0}")]
    StoreWrite(String),

    #[error("could not acquire state lock: {0}")]
    StoreLock(String),

    #[error("an agent named '{0}' is already running")]
    NameConflict(String),

    #[error("no agent matches '{0}'")]
    UnknownAgent(String),

    #[error("'{0}' is ambiguous: matches {1} agents")]
    AmbiguousAgent(String, usize),

    #[error("agent {id} is not running (status: {status})")]
    NotRunning { id: String, status: String },

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid arguments: {0}")]
    Usage(String),

    #[error("iteration timed out after {0:?}")]
    IterationTimeout(Duration),

    #[error("iteration cancelled")]
    IterationCancelled,

    #[error("agent command not found: {0}")]
    CommandNotFound(String),

    #[error("agent exited with {0}")]
    IterationFailed(String),

    #[error("other error: {0}")]
    Other(String),
}

impl SwarmError {
    /// Exit code for the process when this error reaches `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            SwarmError::UnknownAgent(_)
            | SwarmError::AmbiguousAgent(_, _)
            | SwarmError::Usage(_)
            | SwarmError::InvalidName(_)
            | SwarmError::InvalidLabel(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
