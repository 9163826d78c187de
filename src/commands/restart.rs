//! `swarm restart` / `clone` / `replay`: derive a new run from an old record
//!
//! All three copy prompt and configuration out of a stored record into a
//! fresh one. `restart --continue` keeps counting iterations where the
//! source stopped; `clone` applies overrides; `replay` is an exact re-run.
//! `--dry-run` prints the equivalent `run` invocation instead of launching.

use anyhow::Result;

use crate::agent::{self, AgentRecord};
use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::store::StateStore;

use super::run::{launch, LaunchOptions};

pub struct RestartParams {
    pub global: bool,
    pub target: String,
    pub continue_: bool,
    pub iterations: Option<u32>,
    pub detach: bool,
}

pub struct CloneParams {
    pub global: bool,
    pub target: String,
    pub name: Option<String>,
    pub model: Option<String>,
    pub iterations: Option<u32>,
    pub labels: Vec<String>,
    pub dry_run: bool,
    pub detach: bool,
}

pub async fn restart(params: RestartParams) -> Result<i32> {
    let config = SwarmConfig::load()?;
    let store = super::open_store(params.global)?;
    let source = store.get_by_name_or_id(&params.target).await?;
    ensure_prompt(&source)?;

    let iterations = params.iterations.unwrap_or(source.iterations);
    let starting_iteration = if params.continue_ {
        if iterations != 0 && source.current_iter >= iterations {
            return Err(SwarmError::Usage(format!(
                "agent {} already reached iteration {}/{}; extend the target with --iterations",
                source.id, source.current_iter, iterations
            ))
            .into());
        }
        source.current_iter + 1
    } else {
        1
    };

    let mut record = derive_record(&store, &source);
    record.name = source.name.clone();
    record.iterations = iterations;
    if params.continue_ {
        record.current_iter = source.current_iter;
        record.successful_iters = source.successful_iters;
        record.failed_iters = source.failed_iters;
    }

    launch(
        &store,
        &config,
        record,
        launch_options(params.global, params.detach, starting_iteration),
    )
    .await
}

pub async fn clone(params: CloneParams) -> Result<i32> {
    let config = SwarmConfig::load()?;
    let store = super::open_store(params.global)?;
    let source = store.get_by_name_or_id(&params.target).await?;
    ensure_prompt(&source)?;

    let mut record = derive_record(&store, &source);
    // Clones are anonymous unless named, so a running source keeps its name.
    record.name = params.name.clone().unwrap_or_default();
    if let Some(name) = &params.name {
        agent::validate_name(name)?;
    }
    if let Some(model) = &params.model {
        record.model = model.clone();
    }
    if let Some(iterations) = params.iterations {
        record.iterations = iterations;
    }
    for arg in &params.labels {
        let (key, value) = agent::parse_label(arg)?;
        record.labels.insert(key, value);
    }

    if params.dry_run {
        println!("{}", equivalent_run(&record, params.global));
        return Ok(0);
    }
    launch(
        &store,
        &config,
        record,
        launch_options(params.global, params.detach, 1),
    )
    .await
}

pub async fn replay(global: bool, target: &str, dry_run: bool, detach: bool) -> Result<i32> {
    let config = SwarmConfig::load()?;
    let store = super::open_store(global)?;
    let source = store.get_by_name_or_id(target).await?;
    ensure_prompt(&source)?;

    let mut record = derive_record(&store, &source);
    record.name = source.name.clone();

    if dry_run {
        println!("{}", equivalent_run(&record, global));
        return Ok(0);
    }
    launch(&store, &config, record, launch_options(global, detach, 1)).await
}

fn launch_options(global: bool, detach: bool, starting_iteration: u32) -> LaunchOptions {
    LaunchOptions {
        global,
        env: Vec::new(),
        total_timeout: None,
        iteration_timeout: None,
        raw: false,
        grace_period: None,
        detach,
        starting_iteration,
    }
}

/// Copy the reproducible parts of `source` into a fresh record rooted at
/// the current working directory.
fn derive_record(store: &StateStore, source: &AgentRecord) -> AgentRecord {
    let mut record = AgentRecord::new(
        agent::generate_id(),
        source.prompt_source.clone(),
        store.working_dir().to_path_buf(),
    );
    record.prompt_content = source.prompt_content.clone();
    record.labels = source.labels.clone();
    record.on_complete = source.on_complete.clone();
    record.iterations = source.iterations;
    record.model = source.model.clone();
    if !source.env_names.is_empty() {
        // Only names are stored, never values; the new run cannot inherit
        // them.
        tracing::warn!(
            "source agent injected env vars ({}); they are not reproduced",
            source.env_names.join(", ")
        );
    }
    record
}

/// The store keeps full prompt content precisely so inline prompts can be
/// reconstructed here; a record without it cannot be re-run.
fn ensure_prompt(source: &AgentRecord) -> Result<()> {
    if source.prompt_content.is_empty() {
        return Err(SwarmError::Usage(format!(
            "agent {} has no stored prompt content (source {}); cannot re-run",
            source.id, source.prompt_source
        ))
        .into());
    }
    Ok(())
}

/// Shell-quoted `swarm run` invocation reproducing this record.
fn equivalent_run(record: &AgentRecord, global: bool) -> String {
    let mut argv: Vec<String> = vec!["swarm".into(), "run".into()];
    if is_inline_source(&record.prompt_source) {
        argv.push("--string".into());
        argv.push(record.prompt_content.clone());
    } else {
        argv.push(record.prompt_source.clone());
    }
    argv.push("-n".into());
    argv.push(record.iterations.to_string());
    if !record.model.is_empty() {
        argv.push("-m".into());
        argv.push(record.model.clone());
    }
    if !record.name.is_empty() {
        argv.push("--name".into());
        argv.push(record.name.clone());
    }
    for (key, value) in &record.labels {
        argv.push("-l".into());
        argv.push(format!("{}={}", key, value));
    }
    if !record.on_complete.is_empty() {
        argv.push("--on-complete".into());
        argv.push(record.on_complete.clone());
    }
    if global {
        argv.push("--global".into());
    }
    shell_words::join(&argv)
}

fn is_inline_source(source: &str) -> bool {
    matches!(source, "<string>" | "<stdin>" | "<file>" | "<file>+<stdin>")
}
