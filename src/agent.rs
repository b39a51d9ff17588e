//! External coding-agent execution.
//!
//! The agent is an opaque, possibly slow, occasionally-failing subprocess.
//! We hand it a directive and a working directory, stream the prompt over
//! stdin, capture everything it prints, and enforce a deadline so a hung
//! agent can never hang the orchestrator. Transcripts are kept per workflow
//! for post-mortems.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::state::ModelSet;

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub adw_id: String,
    /// Directive name, e.g. "plan", "implement", "test", "resolve_test_failures".
    pub directive: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub model_set: ModelSet,
}

impl AgentRequest {
    pub fn new(
        adw_id: impl Into<String>,
        directive: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            adw_id: adw_id.into(),
            directive: directive.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            model_set: ModelSet::default(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_model_set(mut self, model_set: ModelSet) -> Self {
        self.model_set = model_set;
        self
    }
}

/// Captured outcome of one agent invocation. `success` reflects the agent's
/// exit status; infrastructure failures (cannot spawn) surface as `Err` from
/// the runner instead.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl AgentResult {
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
        }
    }
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, request: &AgentRequest) -> Result<AgentResult>;
}

/// Runs the configured agent command as a subprocess.
pub struct SubprocessAgent {
    cmd: String,
    flags: Vec<String>,
    timeout: Duration,
    logs_root: PathBuf,
}

impl SubprocessAgent {
    pub fn new(
        cmd: impl Into<String>,
        flags: Vec<String>,
        timeout: Duration,
        logs_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cmd: cmd.into(),
            flags,
            timeout,
            logs_root: logs_root.into(),
        }
    }

    fn build_prompt(request: &AgentRequest) -> String {
        let mut prompt = format!("/{}", request.directive);
        for arg in &request.args {
            prompt.push(' ');
            prompt.push_str(arg);
        }
        prompt.push('\n');
        prompt
    }

    /// Best-effort transcript under `<logs_root>/<adw_id>/`; a failed write
    /// never fails the invocation.
    async fn write_transcript(&self, request: &AgentRequest, output: &str) {
        let dir = self.logs_root.join(&request.adw_id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(error = %e, "failed to create agent log dir");
            return;
        }
        let file = dir.join(format!(
            "{}-{}.log",
            request.directive,
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));
        if let Err(e) = tokio::fs::write(&file, output).await {
            tracing::warn!(error = %e, path = %file.display(), "failed to write agent transcript");
        }
    }
}

#[async_trait]
impl AgentRunner for SubprocessAgent {
    async fn run(&self, request: &AgentRequest) -> Result<AgentResult> {
        let prompt = Self::build_prompt(request);

        let mut cmd = Command::new(&self.cmd);
        for flag in &self.flags {
            cmd.arg(flag);
        }
        if request.model_set == ModelSet::Heavy {
            cmd.env("ADW_MODEL_SET", "heavy");
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&request.working_dir)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn agent process: {}", self.cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to agent stdin")?;
            stdin.shutdown().await.context("Failed to close agent stdin")?;
        }

        let directive = request.directive.clone();
        let waited = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        let output = match waited {
            Ok(result) => result.context("Failed to wait for agent process")?,
            Err(_) => {
                // kill_on_drop reaps the child; a hung agent is a classified
                // failure, never an orchestrator hang.
                tracing::error!(
                    directive = %directive,
                    timeout_secs = self.timeout.as_secs(),
                    "agent invocation timed out"
                );
                return Ok(AgentResult::failure(format!(
                    "agent timed out after {}s running {}",
                    self.timeout.as_secs(),
                    directive
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let success = output.status.success();

        let mut transcript = stdout.clone();
        if !stderr.is_empty() {
            transcript.push_str("\n--- stderr ---\n");
            transcript.push_str(&stderr);
        }
        self.write_transcript(request, &transcript).await;

        Ok(AgentResult {
            success,
            output: stdout,
            error: if success {
                None
            } else {
                Some(if stderr.is_empty() {
                    format!("agent exited with {:?}", output.status.code())
                } else {
                    stderr.trim().to_string()
                })
            },
        })
    }
}
