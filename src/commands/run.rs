//! `swarm run`: register a new agent and supervise it
//!
//! Foreground runs drive the loop in-process; `--detach` re-executes the
//! binary with the hidden `supervise` subcommand in its own process group,
//! with stdio appended to the agent's log file.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::{self, AgentRecord};
use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::runner::CommandTemplate;
use crate::store::StateStore;
use crate::supervisor::{self, SupervisorConfig};

pub struct RunParams {
    pub global: bool,
    pub prompt: Option<String>,
    pub file: Option<PathBuf>,
    pub string: Option<String>,
    pub iterations: u32,
    pub model: Option<String>,
    pub name: Option<String>,
    pub labels: Vec<String>,
    pub env: Vec<String>,
    pub on_complete: Option<String>,
    pub total_timeout: Option<Duration>,
    pub iteration_timeout: Option<Duration>,
    pub raw: bool,
    pub grace_period: Option<Duration>,
    pub detach: bool,
}

/// How a new record should be brought to life; shared with
/// restart/clone/replay.
pub struct LaunchOptions {
    pub global: bool,
    pub env: Vec<String>,
    pub total_timeout: Option<Duration>,
    pub iteration_timeout: Option<Duration>,
    pub raw: bool,
    pub grace_period: Option<Duration>,
    pub detach: bool,
    pub starting_iteration: u32,
}

pub async fn execute(params: RunParams) -> Result<i32> {
    let config = SwarmConfig::load()?;
    let store = super::open_store(params.global)?;

    let (source, content) = load_prompt(&params, &config)?;

    if let Some(name) = &params.name {
        agent::validate_name(name)?;
    }
    let mut labels = BTreeMap::new();
    for arg in &params.labels {
        let (key, value) = agent::parse_label(arg)?;
        labels.insert(key, value);
    }
    let env_pairs = super::parse_env_pairs(&params.env)?;

    let id = agent::generate_id();
    let mut record = AgentRecord::new(id, source, store.working_dir().to_path_buf());
    record.prompt_content = content;
    record.name = params.name.clone().unwrap_or_default();
    record.labels = labels;
    record.env_names = env_pairs.iter().map(|(k, _)| k.clone()).collect();
    record.on_complete = params.on_complete.clone().unwrap_or_default();
    record.iterations = params.iterations;
    record.model = params.model.clone().unwrap_or_else(|| config.model.clone());

    let options = LaunchOptions {
        global: params.global,
        env: params.env.clone(),
        total_timeout: params.total_timeout,
        iteration_timeout: params.iteration_timeout,
        raw: params.raw,
        grace_period: params.grace_period,
        detach: params.detach,
        starting_iteration: 1,
    };
    launch(&store, &config, record, options).await
}

/// Register the record and either run the loop in-process or hand it to a
/// detached supervisor. Returns the process exit code.
pub async fn launch(
    store: &StateStore,
    config: &SwarmConfig,
    mut record: AgentRecord,
    options: LaunchOptions,
) -> Result<i32> {
    let command = CommandTemplate::parse(&config.command)?;
    let env_pairs = super::parse_env_pairs(&options.env)?;

    if options.detach {
        let log_dir = config.log_dir()?;
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;
        let log_file = log_dir.join(format!("{}.log", record.id));
        record.log_file = log_file.display().to_string();
        let id = record.id.clone();
        store.register(record).await?;

        let pid = spawn_detached(&id, &log_file, &options)?;
        // Hand write authority to the detached supervisor before it gets a
        // chance to write anything itself.
        store.update_with(&id, |r| r.pid = pid).await?;
        println!("{}", id);
        return Ok(0);
    }

    let prompt = record.prompt_content.clone();
    store.register(record.clone()).await?;
    let outcome = supervisor::run_loop(SupervisorConfig {
        store: store.clone(),
        record,
        prompt,
        command,
        env: env_pairs,
        starting_iteration: options.starting_iteration,
        total_timeout: options.total_timeout,
        iteration_timeout: options.iteration_timeout,
        raw_output: options.raw,
        result_grace_period: options.grace_period.unwrap_or(config.result_grace_period),
        poll_interval: config.poll_interval,
    })
    .await?;

    Ok(if outcome.timed_out { 124 } else { 0 })
}

fn spawn_detached(id: &str, log_file: &Path, options: &LaunchOptions) -> Result<u32> {
    let exe = std::env::current_exe().context("resolving the swarm executable")?;
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("opening log file {}", log_file.display()))?;
    let log_err = log.try_clone()?;

    let mut cmd = std::process::Command::new(exe);
    cmd.arg("supervise").arg(id);
    if options.global {
        cmd.arg("--global");
    }
    for entry in &options.env {
        cmd.arg("-e").arg(entry);
    }
    if let Some(t) = options.total_timeout {
        cmd.arg("--timeout")
            .arg(humantime::format_duration(t).to_string());
    }
    if let Some(t) = options.iteration_timeout {
        cmd.arg("--iteration-timeout")
            .arg(humantime::format_duration(t).to_string());
    }
    if options.raw {
        cmd.arg("--raw");
    }
    if let Some(g) = options.grace_period {
        cmd.arg("--grace-period")
            .arg(humantime::format_duration(g).to_string());
    }
    if options.starting_iteration > 1 {
        cmd.arg("--starting-iteration")
            .arg(options.starting_iteration.to_string());
    }
    cmd.stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::from(log))
        .stderr(std::process::Stdio::from(log_err));
    // Detach from the launching terminal's process group.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().context("spawning detached supervisor")?;
    Ok(child.id())
}

/// Resolve the prompt text and its symbolic source.
fn load_prompt(params: &RunParams, config: &SwarmConfig) -> Result<(String, String)> {
    let stdin_piped = !std::io::stdin().is_terminal();

    if let Some(string) = &params.string {
        return Ok(("<string>".to_string(), string.clone()));
    }

    if let Some(file) = &params.file {
        let mut content = std::fs::read_to_string(file)
            .with_context(|| format!("reading prompt file {}", file.display()))?;
        if stdin_piped {
            let mut extra = String::new();
            std::io::stdin().read_to_string(&mut extra)?;
            if !extra.is_empty() {
                content.push('\n');
                content.push_str(&extra);
                return Ok(("<file>+<stdin>".to_string(), content));
            }
        }
        return Ok(("<file>".to_string(), content));
    }

    match params.prompt.as_deref() {
        Some("-") => {
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;
            Ok(("<stdin>".to_string(), content))
        }
        Some(name) => {
            let dir = match &config.prompt_dir {
                Some(dir) => dir.clone(),
                None => std::env::current_dir()?.join(".swarm").join("prompts"),
            };
            let path = dir.join(format!("{}.md", name));
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading named prompt {}", path.display()))?;
            Ok((name.to_string(), content))
        }
        None if stdin_piped => {
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;
            if content.is_empty() {
                Err(SwarmError::Usage("no prompt provided".to_string()).into())
            } else {
                Ok(("<stdin>".to_string(), content))
            }
        }
        None => Err(SwarmError::Usage(
            "no prompt provided (positional name, --file, --string, or stdin)".to_string(),
        )
        .into()),
    }
}
