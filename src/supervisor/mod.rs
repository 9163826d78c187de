//! The iteration supervisor
//!
//! Owns one agent's lifecycle: drives the N-iteration loop, polls the store
//! for operator control between iterations, invokes the runner, and writes
//! the terminal fields on every exit path. Control arrives exclusively
//! through the state file; there is no other channel to a (possibly
//! detached) supervisor.

mod hook;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::agent::{AgentRecord, AgentStatus, ExitReason, TerminateMode, TimeoutReason};
use crate::error::Result;
use crate::events::UsageStats;
use crate::runner::{CancelToken, CommandTemplate, IterationRunner, RunnerConfig, RunnerError};
use crate::store::StateStore;

/// Placeholder replaced with a fresh per-iteration identifier, letting the
/// agent's output be correlated with the iteration that produced it.
pub const ITERATION_PLACEHOLDER: &str = "{{iteration_id}}";

/// Everything `run_loop` needs to drive one agent.
pub struct SupervisorConfig {
    pub store: StateStore,
    pub record: AgentRecord,
    /// Rendered prompt template (placeholder not yet substituted).
    pub prompt: String,
    pub command: CommandTemplate,
    pub env: Vec<(String, String)>,
    /// 1-based; above 1 only for `--continue`.
    pub starting_iteration: u32,
    pub total_timeout: Option<Duration>,
    pub iteration_timeout: Option<Duration>,
    pub raw_output: bool,
    pub result_grace_period: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub timed_out: bool,
}

enum Decision {
    Continue,
    Killed,
    Signal,
    TimedOut,
}

/// Drive the agent to completion. Always terminates the record (and fires
/// the on-complete hook) before returning, whatever the exit path.
pub async fn run_loop(cfg: SupervisorConfig) -> Result<LoopOutcome> {
    let SupervisorConfig {
        store,
        mut record,
        prompt,
        command,
        env,
        starting_iteration,
        total_timeout,
        iteration_timeout,
        raw_output,
        result_grace_period,
        poll_interval,
    } = cfg;

    // Claim write authority: our pid, fresh control fields.
    record.pid = std::process::id();
    store.merge_update(&mut record).await?;

    let mut signals = signal_watcher();
    let deadline = total_timeout.map(|t| Instant::now() + t);
    let root_token = root_token(total_timeout);

    let mut timed_out = false;
    let mut i = starting_iteration.max(1);

    loop {
        match decide(&store, &mut record, i, &mut signals, poll_interval, deadline).await {
            Decision::Continue => {}
            Decision::Killed => {
                record.exit_reason = ExitReason::Killed;
                break;
            }
            Decision::Signal => {
                record.exit_reason = ExitReason::Signal;
                break;
            }
            Decision::TimedOut => {
                timed_out = true;
                break;
            }
        }

        // Bound check after adopting any published target change.
        if record.iterations != 0 && i > record.iterations {
            break;
        }

        // Execute
        record.current_iter = i;
        if let Err(e) = store.merge_update(&mut record).await {
            tracing::error!("failed to publish iteration start: {}", e);
        }
        announce(&format!(
            "iteration {} of {}",
            i,
            if record.iterations == 0 {
                "∞".to_string()
            } else {
                record.iterations.to_string()
            }
        ));

        let iteration_id = format!("{}-i{}-{}", record.id, i, uuid::Uuid::new_v4().simple());
        let rendered = prompt.replace(ITERATION_PLACEHOLDER, &iteration_id);

        let runner_cfg = RunnerConfig {
            model: record.model.clone(),
            prompt: rendered,
            command: command.clone(),
            env: env.clone(),
            raw_output,
            result_grace_period,
        };

        // Usage snapshots stream out of the runner's stdout task; a small
        // updater task serialises them into the store so the callback never
        // blocks on I/O.
        let base_input = record.input_tokens;
        let base_output = record.output_tokens;
        let base_cost = record.total_cost_usd;
        let (tx, mut rx) = mpsc::unbounded_channel::<UsageStats>();
        let updater = {
            let store = store.clone();
            let mut shadow = record.clone();
            tokio::spawn(async move {
                while let Some(stats) = rx.recv().await {
                    shadow.input_tokens = base_input + stats.input_tokens;
                    shadow.output_tokens = base_output + stats.output_tokens;
                    shadow.total_cost_usd = base_cost + stats.total_cost_usd;
                    if !stats.current_task.is_empty() {
                        shadow.current_task = stats.current_task;
                    }
                    if let Err(e) = store.merge_update(&mut shadow).await {
                        tracing::warn!("usage update failed: {}", e);
                    }
                }
            })
        };

        let runner = IterationRunner::new(runner_cfg)
            .with_usage_callback(Arc::new(move |stats| {
                let _ = tx.send(stats);
            }));
        let token = root_token.child(iteration_timeout);
        let result = runner.run(token, tokio::io::stdout()).await;
        let stats = runner.usage();
        drop(runner); // closes the snapshot channel
        let _ = updater.await;

        // Record
        record.input_tokens = base_input + stats.input_tokens;
        record.output_tokens = base_output + stats.output_tokens;
        record.total_cost_usd = base_cost + stats.total_cost_usd;
        if !stats.current_task.is_empty() {
            record.current_task = stats.current_task.clone();
        }
        match result {
            Ok(_) => {
                record.successful_iters += 1;
                record.last_error.clear();
            }
            Err(RunnerError::TimedOut) => {
                record.failed_iters += 1;
                record.last_error = match iteration_timeout {
                    Some(t) => format!("iteration timed out after {:?}", t),
                    None => "iteration timed out".to_string(),
                };
                record.timeout_reason = TimeoutReason::Iteration;
                announce(&format!("iteration {} timed out", i));
            }
            Err(e) => {
                record.failed_iters += 1;
                record.last_error = e.to_string();
                announce(&format!("iteration {} failed: {}", i, record.last_error));
            }
        }
        if let Err(e) = store.merge_update(&mut record).await {
            tracing::error!("failed to record iteration outcome: {}", e);
        }
        // The iteration marker is transient; the next write clears it.
        record.timeout_reason = TimeoutReason::None;

        if *signals.borrow() {
            record.exit_reason = ExitReason::Signal;
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            timed_out = true;
            break;
        }
        if record.iterations != 0 && i >= record.iterations {
            break;
        }
        i += 1;
    }

    finalize(&store, &mut record, timed_out).await;
    Ok(LoopOutcome { timed_out })
}

/// Pre-iteration control poll: total timeout, published configuration
/// changes, terminate requests, and the paused sub-state.
async fn decide(
    store: &StateStore,
    record: &mut AgentRecord,
    i: u32,
    signals: &mut watch::Receiver<bool>,
    poll_interval: Duration,
    deadline: Option<Instant>,
) -> Decision {
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Decision::TimedOut;
        }
        if *signals.borrow() {
            return Decision::Signal;
        }

        let fresh = match store.get(&record.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                tracing::warn!("agent {} disappeared from the store", record.id);
                return Decision::Killed;
            }
            Err(e) => {
                tracing::warn!("control poll failed: {}", e);
                return Decision::Continue;
            }
        };

        if fresh.iterations != record.iterations {
            if fresh.iterations == 0 {
                announce("iteration target cleared; now running indefinitely");
            } else {
                announce(&format!("iteration target now {}", fresh.iterations));
            }
            record.iterations = fresh.iterations;
        }
        if fresh.model != record.model {
            announce(&format!("model now {}", fresh.model));
            record.model = fresh.model.clone();
        }
        record.labels = fresh.labels.clone();

        match fresh.terminate_mode {
            TerminateMode::Immediate => return Decision::Killed,
            TerminateMode::AfterIteration if i > 1 => return Decision::Killed,
            _ => {}
        }

        if !fresh.paused {
            return Decision::Continue;
        }

        // Paused sub-state: acknowledge, then poll until resumed or told
        // to terminate.
        record.paused = true;
        let paused_at = Utc::now();
        record.paused_at = Some(paused_at);
        if let Err(e) = store
            .update_with(&record.id, |r| {
                if r.paused_at.is_none() {
                    r.paused_at = Some(paused_at);
                }
            })
            .await
        {
            tracing::warn!("failed to acknowledge pause: {}", e);
        }
        announce("paused");

        loop {
            tokio::time::sleep(poll_interval).await;
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Decision::TimedOut;
            }
            if *signals.borrow() {
                return Decision::Signal;
            }
            let fresh = match store.get(&record.id).await {
                Ok(Some(fresh)) => fresh,
                Ok(None) => return Decision::Killed,
                Err(e) => {
                    tracing::warn!("pause poll failed: {}", e);
                    continue;
                }
            };
            match fresh.terminate_mode {
                TerminateMode::Immediate => return Decision::Killed,
                TerminateMode::AfterIteration if i > 1 => return Decision::Killed,
                _ => {}
            }
            if !fresh.paused {
                announce("resumed");
                record.paused = false;
                record.paused_at = None;
                if let Err(e) = store
                    .update_with(&record.id, |r| {
                        r.paused_at = None;
                    })
                    .await
                {
                    tracing::warn!("failed to clear pause timestamp: {}", e);
                }
                break;
            }
        }
        // Re-run the full decide pass with post-pause state.
    }
}

/// Terminal write plus the on-complete hook; best-effort by design. Losing
/// this write degrades observability only — the stale sweep repairs the
/// record on the next operator read.
async fn finalize(store: &StateStore, record: &mut AgentRecord, timed_out: bool) {
    if timed_out {
        record.timeout_reason = TimeoutReason::Total;
        announce("total timeout reached");
    }
    record.status = AgentStatus::Terminated;
    record.terminated_at = Some(Utc::now());
    if record.exit_reason.is_unset() {
        record.exit_reason = ExitReason::Completed;
    }
    announce(&format!(
        "terminated ({}): {} succeeded, {} failed",
        record.exit_reason.as_str(),
        record.successful_iters,
        record.failed_iters
    ));
    if let Err(e) = store.merge_update(record).await {
        tracing::warn!("failed to record termination: {}", e);
    }
    hook::run_on_complete(record).await;
}

fn root_token(total_timeout: Option<Duration>) -> CancelToken {
    let (handle, token) = CancelToken::new();
    // Nothing cancels the root explicitly; keep the channel open for the
    // supervisor's lifetime.
    std::mem::forget(handle);
    match total_timeout {
        Some(t) => token.child(Some(t)),
        None => token,
    }
}

/// First SIGINT/SIGTERM requests a clean exit between iterations; the
/// child has its own signal path.
fn signal_watcher() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut interrupt = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("failed to install SIGINT handler: {}", e);
                    return;
                }
            };
            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("failed to install SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        announce("interrupt received; stopping after current iteration");
        let _ = tx.send(true);
    });
    rx
}

/// Supervisor-originated user-visible line, timestamped the way the log
/// viewer expects.
fn announce(msg: &str) {
    println!(
        "{} [swarm] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        msg
    );
}
