//! `swarm doctor`: read-only health checks
//!
//! Exit codes: 0 healthy, 1 warnings, 2 errors.

use anyhow::Result;
use std::path::Path;

use crate::config::SwarmConfig;
use crate::runner::CommandTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Health {
    Ok,
    Warning,
    Error,
}

struct Report {
    worst: Health,
}

impl Report {
    fn new() -> Self {
        Report { worst: Health::Ok }
    }

    fn check(&mut self, health: Health, message: &str) {
        let mark = match health {
            Health::Ok => "✓",
            Health::Warning => "⚠",
            Health::Error => "✗",
        };
        println!("{} {}", mark, message);
        self.worst = self.worst.max(health);
    }
}

pub async fn execute(global: bool) -> Result<i32> {
    let mut report = Report::new();

    let config = match SwarmConfig::load() {
        Ok(config) => {
            report.check(Health::Ok, "configuration loads");
            config
        }
        Err(e) => {
            report.check(Health::Error, &format!("configuration broken: {}", e));
            SwarmConfig::default()
        }
    };

    let store = super::open_store(global)?;
    match store.list(false).await {
        Ok(records) => {
            let running = records.iter().filter(|r| r.is_running()).count();
            report.check(
                Health::Ok,
                &format!(
                    "state file readable ({} agents, {} running) at {}",
                    records.len(),
                    running,
                    store.path().display()
                ),
            );
        }
        Err(e) => {
            report.check(Health::Error, &format!("state file unreadable: {}", e));
        }
    }

    check_lock(&mut report, store.path());
    check_writable(&mut report, store.path());
    check_log_dir(&mut report, &config);
    check_agent_binary(&mut report, &config);

    Ok(match report.worst {
        Health::Ok => 0,
        Health::Warning => 1,
        Health::Error => 2,
    })
}

fn check_lock(report: &mut Report, state_path: &Path) {
    let lock = state_path.with_file_name("agents.json.lock");
    if !lock.exists() {
        report.check(Health::Ok, "no leftover state lock");
        return;
    }
    let stale = lock
        .metadata()
        .and_then(|m| m.modified())
        .ok()
        .and_then(|m| m.elapsed().ok())
        .is_some_and(|age| age.as_secs() > 30);
    if stale {
        report.check(
            Health::Warning,
            &format!("stale state lock at {} (will be broken)", lock.display()),
        );
    } else {
        report.check(Health::Ok, "state lock held by a live operation");
    }
}

fn check_writable(report: &mut Report, state_path: &Path) {
    let Some(dir) = state_path.parent() else {
        report.check(Health::Error, "state path has no parent directory");
        return;
    };
    if let Err(e) = std::fs::create_dir_all(dir) {
        report.check(
            Health::Error,
            &format!("cannot create state directory {}: {}", dir.display(), e),
        );
        return;
    }
    match tempfile::NamedTempFile::new_in(dir) {
        Ok(_) => report.check(Health::Ok, "state directory writable"),
        Err(e) => report.check(
            Health::Error,
            &format!("state directory not writable: {}", e),
        ),
    }
}

fn check_log_dir(report: &mut Report, config: &SwarmConfig) {
    match config.log_dir() {
        Ok(dir) => match std::fs::create_dir_all(&dir) {
            Ok(()) => report.check(
                Health::Ok,
                &format!("log directory usable at {}", dir.display()),
            ),
            Err(e) => report.check(
                Health::Warning,
                &format!("log directory unusable ({}): {}", dir.display(), e),
            ),
        },
        Err(e) => report.check(Health::Warning, &format!("no log directory: {}", e)),
    }
}

fn check_agent_binary(report: &mut Report, config: &SwarmConfig) {
    let template = match CommandTemplate::parse(&config.command) {
        Ok(t) => t,
        Err(e) => {
            report.check(Health::Error, &format!("bad command template: {}", e));
            return;
        }
    };
    if find_in_path(&template.program) {
        report.check(
            Health::Ok,
            &format!("agent binary '{}' found on PATH", template.program),
        );
    } else {
        report.check(
            Health::Warning,
            &format!("agent binary '{}' not found on PATH", template.program),
        );
    }
}

fn find_in_path(program: &str) -> bool {
    if program.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(program).exists();
    }
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(program).is_file())
}
