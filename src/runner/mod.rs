//! Single-iteration subprocess runner
//!
//! Launches the agent executable once, streams its stdout through the event
//! parser (or tees it raw), forwards stderr, enforces cancellation and
//! timeouts, and force-kills stuck process groups after a result event. The
//! usage callback is always invoked outside the runner's own locks so it can
//! safely write through the store.

pub mod cancel;

pub use cancel::{CancelCause, CancelHandle, CancelToken};

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::sync::watch;

use crate::error::{Result, SwarmError};
use crate::events::{self, AgentEvent, UsageStats};
use crate::process;

/// Default grace window between a result event and a forced group kill.
pub const DEFAULT_RESULT_GRACE: Duration = Duration::from_secs(30);

/// Executable plus argv template with `{model}` / `{prompt}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// Split a shell-style template string into program and argv.
    pub fn parse(template: &str) -> Result<CommandTemplate> {
        let words = shell_words::split(template)
            .map_err(|e| SwarmError::Config(format!("bad command template: {}", e)))?;
        let mut iter = words.into_iter();
        let program = iter
            .next()
            .ok_or_else(|| SwarmError::Config("empty command template".to_string()))?;
        Ok(CommandTemplate {
            program,
            args: iter.collect(),
        })
    }

    /// Substitute the placeholders into a concrete argv.
    pub fn expand(&self, model: &str, prompt: &str) -> (String, Vec<String>) {
        let args = self
            .args
            .iter()
            .map(|a| a.replace("{model}", model).replace("{prompt}", prompt))
            .collect();
        (self.program.clone(), args)
    }
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("iteration timed out")]
    TimedOut,

    #[error("iteration cancelled")]
    Cancelled,

    #[error("agent command not found: {0}")]
    CommandNotFound(String),

    #[error("failed to spawn agent: {0}")]
    Spawn(std::io::Error),

    #[error("agent exited with {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything one iteration needs to launch.
#[derive(Clone)]
pub struct RunnerConfig {
    pub model: String,
    pub prompt: String,
    pub command: CommandTemplate,
    /// KEY=VALUE extensions of the parent environment; later entries win.
    pub env: Vec<(String, String)>,
    /// Pass agent output through verbatim instead of pretty-rendering.
    pub raw_output: bool,
    pub result_grace_period: Duration,
}

pub type UsageCallback = Arc<dyn Fn(UsageStats) + Send + Sync>;

/// Runs one iteration of an agent.
pub struct IterationRunner {
    config: RunnerConfig,
    usage: Arc<Mutex<UsageStats>>,
    child_pid: Arc<AtomicU32>,
    killed_after_result: Arc<AtomicBool>,
    on_usage: Option<UsageCallback>,
}

impl IterationRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            usage: Arc::new(Mutex::new(UsageStats::default())),
            child_pid: Arc::new(AtomicU32::new(0)),
            killed_after_result: Arc::new(AtomicBool::new(false)),
            on_usage: None,
        }
    }

    /// Install the callback that receives cumulative usage snapshots.
    pub fn with_usage_callback(mut self, cb: UsageCallback) -> Self {
        self.on_usage = Some(cb);
        self
    }

    /// Pid of the root child, once spawned.
    pub fn pid(&self) -> Option<u32> {
        match self.child_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Signal the root child process (graceful).
    pub fn kill(&self) {
        if let Some(pid) = self.pid() {
            process::terminate(pid);
        }
    }

    /// Snapshot of the usage aggregates so far.
    pub fn usage(&self) -> UsageStats {
        lock_usage(&self.usage).clone()
    }

    /// Execute the iteration, writing user-visible output to `out`.
    ///
    /// Returns the iteration's final cumulative usage on success. A grace
    /// kill after a result event still counts as success: the iteration's
    /// work was done.
    pub async fn run<W>(&self, cancel: CancelToken, out: W) -> std::result::Result<UsageStats, RunnerError>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (program, args) = self.config.command.expand(&self.config.model, &self.config.prompt);
        tracing::debug!("spawning agent: {} ({} args)", program, args.len());

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        // Own process group so the whole tree can be signalled together.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::CommandNotFound(program.clone())
            } else {
                RunnerError::Spawn(e)
            }
        })?;
        let pid = child.id().unwrap_or(0);
        self.child_pid.store(pid, Ordering::SeqCst);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Spawn(std::io::Error::other("stdout pipe missing")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Spawn(std::io::Error::other("stderr pipe missing")))?;

        // One-shot: flips to true on the first result event.
        let (result_tx, result_rx) = watch::channel(false);

        let stdout_task = tokio::spawn(stdout_loop(
            stdout,
            out,
            self.config.raw_output,
            Arc::clone(&self.usage),
            self.on_usage.clone(),
            result_tx,
        ));

        let stderr_task = tokio::spawn(async move {
            let mut sink = tokio::io::stderr();
            let mut src = BufReader::new(stderr);
            let _ = tokio::io::copy(&mut src, &mut sink).await;
        });

        let grace_task = tokio::spawn(grace_killer(
            result_rx,
            self.config.result_grace_period,
            pid,
            Arc::clone(&self.killed_after_result),
        ));

        // Both stdio copies must finish before waiting on the child;
        // waiting closes the pipes and would race the tail of the output.
        let wait_all = async {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            child.wait().await
        };
        tokio::pin!(wait_all);

        let mut cancel_cause = None;
        let status = tokio::select! {
            status = &mut wait_all => status?,
            cause = cancel.cancelled() => {
                cancel_cause = Some(cause);
                process::force_kill_group(pid).await;
                wait_all.await?
            }
        };
        grace_task.abort();

        let stats = self.usage();
        if self.killed_after_result.load(Ordering::SeqCst) {
            tracing::debug!("agent group killed after result; iteration counts as success");
            return Ok(stats);
        }
        match cancel_cause {
            Some(CancelCause::Expired) => Err(RunnerError::TimedOut),
            Some(CancelCause::Cancelled) => Err(RunnerError::Cancelled),
            None => {
                if status.success() {
                    Ok(stats)
                } else {
                    Err(RunnerError::Failed(describe_status(&status)))
                }
            }
        }
    }
}

async fn stdout_loop<W>(
    stdout: ChildStdout,
    mut out: W,
    raw: bool,
    usage: Arc<Mutex<UsageStats>>,
    on_usage: Option<UsageCallback>,
    result_tx: watch::Sender<bool>,
) where
    W: AsyncWrite + Send + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if raw {
            let _ = out.write_all(line.as_bytes()).await;
            let _ = out.write_all(b"\n").await;
        }
        match AgentEvent::parse(&line) {
            Some(event) => {
                // Snapshot under the lock, deliver outside it.
                let snapshot = {
                    let mut stats = lock_usage(&usage);
                    if stats.absorb(&event) {
                        Some(stats.clone())
                    } else {
                        None
                    }
                };
                if let (Some(snap), Some(cb)) = (snapshot, on_usage.as_ref()) {
                    cb(snap);
                }
                if event.is_result() {
                    let _ = result_tx.send(true);
                }
                if !raw {
                    if let Some(text) = events::render(&event) {
                        let _ = out.write_all(text.as_bytes()).await;
                        let _ = out.write_all(b"\n").await;
                    }
                }
            }
            None => {
                // Opaque pass-through in parsed mode; raw mode already
                // wrote the bytes above.
                if !raw && !line.is_empty() {
                    let _ = out.write_all(line.as_bytes()).await;
                    let _ = out.write_all(b"\n").await;
                }
            }
        }
    }
    let _ = out.flush().await;
}

/// After the first result event, give the child `grace` to exit on its own,
/// then kill the whole group. Some agents launch dev servers whose orphaned
/// children would otherwise keep the pipes open indefinitely.
async fn grace_killer(
    mut result_rx: watch::Receiver<bool>,
    grace: Duration,
    pid: u32,
    killed_flag: Arc<AtomicBool>,
) {
    loop {
        if *result_rx.borrow() {
            break;
        }
        if result_rx.changed().await.is_err() {
            // Stdout closed without a result event.
            return;
        }
    }
    tokio::time::sleep(grace).await;
    if process::is_alive(pid) {
        tracing::warn!(
            "agent (pid {}) still running {:?} after result event; killing process group",
            pid,
            grace
        );
        killed_flag.store(true, Ordering::SeqCst);
        process::force_kill_group(pid).await;
    }
}

fn describe_status(status: &std::process::ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }
    "unknown status".to_string()
}

fn lock_usage(usage: &Mutex<UsageStats>) -> MutexGuard<'_, UsageStats> {
    usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandTemplate {
        CommandTemplate {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    fn config(script: &str) -> RunnerConfig {
        RunnerConfig {
            model: "test-model".to_string(),
            prompt: "test-prompt".to_string(),
            command: sh(script),
            env: Vec::new(),
            raw_output: false,
            result_grace_period: DEFAULT_RESULT_GRACE,
        }
    }

    fn never() -> CancelToken {
        let (handle, token) = CancelToken::new();
        std::mem::forget(handle);
        token
    }

    #[test]
    fn template_parses_and_expands() {
        let t = CommandTemplate::parse("agent --model {model} -p {prompt}").unwrap();
        assert_eq!(t.program, "agent");
        let (prog, args) = t.expand("opus", "do things");
        assert_eq!(prog, "agent");
        assert_eq!(args, vec!["--model", "opus", "-p", "do things"]);
    }

    #[test]
    fn empty_template_rejected() {
        assert!(CommandTemplate::parse("").is_err());
        assert!(CommandTemplate::parse("unbalanced 'quote").is_err());
    }

    #[tokio::test]
    async fn successful_iteration_aggregates_usage() {
        let script = r#"echo '{"type":"assistant","usage":{"input_tokens":10,"output_tokens":2}}'; echo '{"type":"result","usage":{"input_tokens":1,"output_tokens":1},"total_cost_usd":0.01}'"#;
        let runner = IterationRunner::new(config(script));
        let stats = runner.run(never(), tokio::io::sink()).await.unwrap();
        assert_eq!(stats.input_tokens, 11);
        assert_eq!(stats.output_tokens, 3);
        assert!((stats.total_cost_usd - 0.01).abs() < 1e-9);
    }

    #[tokio::test]
    async fn usage_callback_sees_cumulative_snapshots() {
        let script = r#"echo '{"type":"assistant","usage":{"input_tokens":5,"output_tokens":1}}'; echo '{"type":"assistant","usage":{"input_tokens":5,"output_tokens":1}}'"#;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let runner = IterationRunner::new(config(script)).with_usage_callback(Arc::new(
            move |stats: UsageStats| {
                sink.lock().unwrap().push(stats.input_tokens);
            },
        ));
        runner.run(never(), tokio::io::sink()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![5, 10]);
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let runner = IterationRunner::new(config("exit 3"));
        let err = runner.run(never(), tokio::io::sink()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Failed(ref msg) if msg.contains("3")));
    }

    #[tokio::test]
    async fn missing_program_is_command_not_found() {
        let mut cfg = config("true");
        cfg.command.program = "definitely-not-a-real-binary-xyz".to_string();
        let runner = IterationRunner::new(cfg);
        let err = runner.run(never(), tokio::io::sink()).await.unwrap_err();
        assert!(matches!(err, RunnerError::CommandNotFound(_)));
    }

    #[tokio::test]
    async fn iteration_timeout_maps_to_timed_out() {
        let runner = IterationRunner::new(config("sleep 60"));
        let token = CancelToken::with_timeout(Duration::from_millis(200));
        let start = std::time::Instant::now();
        let err = runner.run(token, tokio::io::sink()).await.unwrap_err();
        assert!(matches!(err, RunnerError::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn explicit_cancel_maps_to_cancelled() {
        let runner = IterationRunner::new(config("sleep 60"));
        let (handle, token) = CancelToken::new();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });
        let err = runner.run(token, tokio::io::sink()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn grace_kill_after_result_counts_as_success() {
        // The agent emits a result then parks, holding stdout open through
        // a child that would outlive it.
        let script = r#"echo '{"type":"result","total_cost_usd":0.01}'; sleep 3600"#;
        let mut cfg = config(script);
        cfg.result_grace_period = Duration::from_millis(300);
        let runner = IterationRunner::new(cfg);
        let start = std::time::Instant::now();
        let stats = runner.run(never(), tokio::io::sink()).await.unwrap();
        assert!((stats.total_cost_usd - 0.01).abs() < 1e-9);
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn raw_mode_still_extracts_usage() {
        let script = r#"echo '{"type":"result","usage":{"input_tokens":4,"output_tokens":2},"total_cost_usd":0.5}'"#;
        let mut cfg = config(script);
        cfg.raw_output = true;
        let runner = IterationRunner::new(cfg);
        let stats = runner.run(never(), tokio::io::sink()).await.unwrap();
        assert_eq!(stats.input_tokens, 4);
        assert!((stats.total_cost_usd - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn env_extensions_reach_the_child() {
        let script = r#"test "$SWARM_TEST_VAR" = "expected""#;
        let mut cfg = config(script);
        cfg.env = vec![
            ("SWARM_TEST_VAR".to_string(), "overridden".to_string()),
            ("SWARM_TEST_VAR".to_string(), "expected".to_string()),
        ];
        let runner = IterationRunner::new(cfg);
        assert!(runner.run(never(), tokio::io::sink()).await.is_ok());
    }
}
