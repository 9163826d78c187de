//! `swarm stop` / `start` / `kill`: single-agent control signals
//!
//! All three are store writes; the supervisor obeys between iterations. An
//! immediate kill additionally force-kills the supervisor's process group
//! and finalises the record, since the supervisor may never get another
//! chance to.

use anyhow::Result;
use chrono::Utc;

use crate::agent::{AgentStatus, ExitReason, TerminateMode};
use crate::error::SwarmError;
use crate::process;

/// How long `stop` waits for the supervisor to acknowledge the pause.
const PAUSE_ACK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub async fn stop(global: bool, target: &str) -> Result<i32> {
    let store = super::open_store(global)?;
    let record = store.get_by_name_or_id(target).await?;
    ensure_running(&record)?;

    store.set_paused(&record.id, true).await?;

    // Poll until the supervisor writes paused_at; it only checks between
    // iterations, so a long-running iteration delays the acknowledgement.
    let deadline = tokio::time::Instant::now() + PAUSE_ACK_TIMEOUT;
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        match store.get(&record.id).await? {
            Some(r) if r.paused_at.is_some() => {
                println!("{} paused", record.id);
                return Ok(0);
            }
            Some(r) if r.is_terminated() => {
                println!("{} terminated before pausing", record.id);
                return Ok(0);
            }
            Some(_) => {}
            None => return Err(SwarmError::UnknownAgent(record.id.clone()).into()),
        }
        if tokio::time::Instant::now() >= deadline {
            println!(
                "{} pause requested (supervisor has not acknowledged yet)",
                record.id
            );
            return Ok(0);
        }
    }
}

pub async fn start(global: bool, target: &str) -> Result<i32> {
    let store = super::open_store(global)?;
    let record = store.get_by_name_or_id(target).await?;
    ensure_running(&record)?;

    store.set_paused(&record.id, false).await?;
    println!("{} resumed", record.id);
    Ok(0)
}

pub async fn kill(global: bool, target: &str, immediate: bool) -> Result<i32> {
    let store = super::open_store(global)?;
    let record = store.get_by_name_or_id(target).await?;
    ensure_running(&record)?;

    let mode = if immediate {
        TerminateMode::Immediate
    } else {
        TerminateMode::AfterIteration
    };
    store.set_terminate_mode(&record.id, mode).await?;

    if immediate {
        process::force_kill_group(record.pid).await;
        // The supervisor is gone; finalise on its behalf rather than
        // leaving the record for the crash sweep.
        store
            .update_with(&record.id, |r| {
                if r.is_running() {
                    r.status = AgentStatus::Terminated;
                    r.exit_reason = ExitReason::Killed;
                    r.terminated_at = Some(Utc::now());
                }
            })
            .await?;
        println!("{} killed", record.id);
    } else {
        println!("{} will terminate after its current iteration", record.id);
    }
    Ok(0)
}

fn ensure_running(record: &crate::agent::AgentRecord) -> Result<()> {
    if record.is_running() {
        Ok(())
    } else {
        Err(SwarmError::NotRunning {
            id: record.id.clone(),
            status: record.status.to_string(),
        }
        .into())
    }
}
