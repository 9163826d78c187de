//! Hidden `supervise` subcommand: the detached supervisor entry point
//!
//! A detached supervisor is an ordinary process running this command; the
//! parent only needs to know its pid. The record (registered by `run`)
//! carries the prompt; the command template comes from configuration; env
//! values travel on the argv since the store keeps names only.

use anyhow::Result;
use std::time::Duration;

use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::runner::CommandTemplate;
use crate::supervisor::{self, SupervisorConfig};

pub struct SuperviseParams {
    pub global: bool,
    pub id: String,
    pub env: Vec<String>,
    pub total_timeout: Option<Duration>,
    pub iteration_timeout: Option<Duration>,
    pub raw: bool,
    pub grace_period: Option<Duration>,
    pub starting_iteration: u32,
}

pub async fn execute(params: SuperviseParams) -> Result<i32> {
    let config = SwarmConfig::load()?;
    let store = super::open_store(params.global)?;
    let record = store
        .get(&params.id)
        .await?
        .ok_or_else(|| SwarmError::UnknownAgent(params.id.clone()))?;
    if record.is_terminated() {
        return Err(SwarmError::NotRunning {
            id: record.id.clone(),
            status: record.status.to_string(),
        }
        .into());
    }

    let command = CommandTemplate::parse(&config.command)?;
    let env_pairs = super::parse_env_pairs(&params.env)?;
    let prompt = record.prompt_content.clone();

    let outcome = supervisor::run_loop(SupervisorConfig {
        store,
        record,
        prompt,
        command,
        env: env_pairs,
        starting_iteration: params.starting_iteration,
        total_timeout: params.total_timeout,
        iteration_timeout: params.iteration_timeout,
        raw_output: params.raw,
        result_grace_period: params.grace_period.unwrap_or(config.result_grace_period),
        poll_interval: config.poll_interval,
    })
    .await?;

    Ok(if outcome.timed_out { 124 } else { 0 })
}
