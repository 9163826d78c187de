//! swarm: a command-line supervisor for long-running agent processes
//!
//! swarm launches external agent binaries (a coding assistant, typically)
//! through a configurable number of iterations, parses their streamed JSON
//! output for token/cost accounting, and gives the operator Docker-like
//! lifecycle commands over the fleet. All cross-process control flows
//! through a locked, atomically-written state file: operator commands write
//! control fields, supervisors poll them between iterations and publish
//! progress through a merge protocol that never clobbers operator intent.

pub mod agent;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod logview;
pub mod process;
pub mod runner;
pub mod store;
pub mod supervisor;

pub use error::{Result, SwarmError};
