//! Orchestrator configuration.
//!
//! Loaded from `adw.toml` at the repository root when present, with defaults
//! for everything. The GitHub token is environment-only (`GITHUB_TOKEN`) so
//! it never lands in a config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "adw.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdwConfig {
    /// Path of the main repository the orchestrator operates on.
    pub repo_dir: PathBuf,
    /// `owner/repo` slug for the tracker; empty disables tracker calls.
    pub github_repo: String,
    pub remote: String,
    pub base_branch: String,

    pub backend_base_port: u16,
    pub frontend_base_port: u16,
    /// Upper bound on concurrently isolated workflows; beyond this, port
    /// slots are reused.
    pub max_slots: u16,

    pub agent_cmd: String,
    pub agent_flags: Vec<String>,
    pub agent_timeout_secs: u64,

    /// Bound on Test/Review self-correction attempts when auto-resolve is on.
    pub max_resolve_attempts: u32,

    pub push_retries: u32,
    pub push_base_delay_ms: u64,
    /// Deadline for any git subprocess (push, worktree add/remove). A push
    /// hung on a credential prompt must never hang the orchestrator.
    pub git_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for AdwConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("."),
            github_repo: String::new(),
            remote: "origin".to_string(),
            base_branch: "main".to_string(),
            backend_base_port: 9100,
            frontend_base_port: 9200,
            max_slots: 15,
            agent_cmd: "claude".to_string(),
            agent_flags: vec![
                "--print".to_string(),
                "--dangerously-skip-permissions".to_string(),
            ],
            agent_timeout_secs: 1800,
            max_resolve_attempts: 3,
            push_retries: 3,
            push_base_delay_ms: 1000,
            git_timeout_secs: 300,
            http_timeout_secs: 30,
        }
    }
}

impl AdwConfig {
    /// Load from `<repo_dir>/adw.toml` if it exists, else defaults. The
    /// `repo_dir` argument always wins over whatever the file says.
    pub fn load(repo_dir: &Path) -> Result<Self> {
        let path = repo_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.repo_dir = repo_dir.to_path_buf();
        Ok(config)
    }

    pub fn github_token() -> Option<String> {
        std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty())
    }

    pub fn state_dir(&self) -> PathBuf {
        self.repo_dir.join(".adw").join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.repo_dir.join(".adw").join("logs")
    }

    pub fn worktrees_root(&self) -> PathBuf {
        self.repo_dir.join(".worktrees")
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn push_base_delay(&self) -> Duration {
        Duration::from_millis(self.push_base_delay_ms)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
