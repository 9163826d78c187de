//! Shared scaffolding for CLI integration tests
//!
//! Each test gets an isolated project directory, home directory and state
//! dir, plus a stub agent that emits the canonical event stream.

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

pub const AGENT_SCRIPT: &str = r#"echo '{"type":"assistant","usage":{"input_tokens":10,"output_tokens":2}}'
echo '{"type":"result","usage":{"input_tokens":1,"output_tokens":1},"total_cost_usd":0.01}'
"#;

pub const SLOW_AGENT_SCRIPT: &str = "sleep 30\n";

pub struct TestEnv {
    pub dir: TempDir,
    pub project: PathBuf,
}

impl TestEnv {
    /// Project configured with the standard stub agent.
    pub fn new() -> Self {
        Self::with_agent(AGENT_SCRIPT)
    }

    pub fn with_agent(script: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let project = dir.path().join("project");
        std::fs::create_dir_all(project.join(".swarm")).expect("project dir");

        let agent = dir.path().join("agent.sh");
        std::fs::write(&agent, script).expect("agent script");

        let config = format!(
            "command = \"sh '{}'\"\nmodel = \"test-model\"\npoll_interval = \"100ms\"\n",
            agent.display()
        );
        std::fs::write(project.join(".swarm").join("config.toml"), config).expect("config");

        TestEnv { dir, project }
    }

    /// A swarm command wired to this environment.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("swarm").expect("swarm binary");
        cmd.current_dir(&self.project)
            .env("HOME", self.dir.path())
            .env("SWARM_STATE_DIR", self.dir.path().join("state"))
            .env_remove("RUST_LOG");
        cmd
    }
}
