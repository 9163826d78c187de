//! Layered TOML configuration
//!
//! Defaults ← global `~/.swarm/config.toml` ← project `.swarm/config.toml`.
//! Only fields present in a file override the layer below it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SwarmError};

/// Effective configuration after layering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Agent command template; `{model}` and `{prompt}` are substituted
    /// per iteration.
    pub command: String,

    /// Default model identifier.
    pub model: String,

    /// Grace window between a result event and a forced group kill.
    #[serde(with = "humantime_serde")]
    pub result_grace_period: Duration,

    /// Cadence for pause polling and `wait`.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Where detached supervisors write captured output. Defaults to
    /// `~/.swarm/logs`.
    pub log_dir: Option<PathBuf>,

    /// Directory searched for named prompts (`<name>.md`). Defaults to
    /// `.swarm/prompts` under the project.
    pub prompt_dir: Option<PathBuf>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            command: "claude --model {model} --print {prompt} --output-format stream-json"
                .to_string(),
            model: "sonnet".to_string(),
            result_grace_period: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            log_dir: None,
            prompt_dir: None,
        }
    }
}

/// One file's worth of overrides; every field optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigLayer {
    command: Option<String>,
    model: Option<String>,
    #[serde(default, with = "humantime_serde::option")]
    result_grace_period: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    poll_interval: Option<Duration>,
    log_dir: Option<PathBuf>,
    prompt_dir: Option<PathBuf>,
}

impl SwarmConfig {
    /// Load the layered configuration for the current working directory.
    pub fn load() -> Result<SwarmConfig> {
        let mut config = SwarmConfig::default();
        if let Some(home) = dirs::home_dir() {
            config.apply_file(&home.join(".swarm").join("config.toml"))?;
        }
        let cwd = std::env::current_dir()?;
        config.apply_file(&cwd.join(".swarm").join("config.toml"))?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(SwarmError::Io(e)),
        };
        let layer: ConfigLayer = toml::from_str(&text)
            .map_err(|e| SwarmError::Config(format!("{}: {}", path.display(), e)))?;
        self.apply(layer);
        Ok(())
    }

    fn apply(&mut self, layer: ConfigLayer) {
        if let Some(command) = layer.command {
            self.command = command;
        }
        if let Some(model) = layer.model {
            self.model = model;
        }
        if let Some(grace) = layer.result_grace_period {
            self.result_grace_period = grace;
        }
        if let Some(interval) = layer.poll_interval {
            self.poll_interval = interval;
        }
        if layer.log_dir.is_some() {
            self.log_dir = layer.log_dir;
        }
        if layer.prompt_dir.is_some() {
            self.prompt_dir = layer.prompt_dir;
        }
    }

    /// Resolved log directory for captured agent output.
    pub fn log_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.log_dir {
            return Ok(dir.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(".swarm").join("logs"))
            .ok_or_else(|| SwarmError::Config("could not determine home directory".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let c = SwarmConfig::default();
        assert!(c.command.contains("{model}"));
        assert!(c.command.contains("{prompt}"));
        assert_eq!(c.result_grace_period, Duration::from_secs(30));
        assert_eq!(c.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn layers_override_field_wise() {
        let mut config = SwarmConfig::default();
        let layer: ConfigLayer =
            toml::from_str("model = \"opus\"\nresult_grace_period = \"5s\"").unwrap();
        config.apply(layer);
        assert_eq!(config.model, "opus");
        assert_eq!(config.result_grace_period, Duration::from_secs(5));
        // Untouched fields keep their defaults.
        assert!(config.command.contains("{prompt}"));
    }

    #[test]
    fn empty_layer_changes_nothing() {
        let mut config = SwarmConfig::default();
        let before = format!("{:?}", config);
        config.apply(ConfigLayer::default());
        assert_eq!(before, format!("{:?}", config));
    }
}
