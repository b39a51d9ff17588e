//! Isolated per-workflow worktrees.
//!
//! Each workflow owns an exclusive working directory checked out against its
//! own branch, so concurrent workflows never share mutable files. Worktrees
//! are created through `git worktree add -b` and removed only by the
//! zero-touch Ship phase after a successful merge; every other path leaves
//! them for forensic inspection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait Worktrees: Send + Sync {
    /// Create a worktree for `adw_id` on branch `branch`, or reattach to the
    /// leftovers of an interrupted earlier attempt. Returns the worktree path.
    async fn create(&self, adw_id: &str, branch: &str) -> Result<PathBuf>;

    /// Check that a previously created worktree is still usable.
    async fn validate(&self, path: &Path) -> Result<()>;

    /// Remove a worktree and prune its administrative files.
    async fn remove(&self, path: &Path) -> Result<()>;
}

/// Subprocess-git implementation rooted at the main repository.
pub struct GitWorktrees {
    repo_dir: PathBuf,
    worktrees_root: PathBuf,
    timeout: Duration,
}

impl GitWorktrees {
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        worktrees_root: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            worktrees_root: worktrees_root.into(),
            timeout,
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<std::process::Output> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.repo_dir).kill_on_drop(true);
        tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "git {} timed out after {}s",
                    args.join(" "),
                    self.timeout.as_secs_f64()
                )
            })?
            .with_context(|| format!("Failed to run git {}", args.join(" ")))
    }
}

#[async_trait]
impl Worktrees for GitWorktrees {
    async fn create(&self, adw_id: &str, branch: &str) -> Result<PathBuf> {
        let path = self.worktrees_root.join(adw_id);

        // A crash between worktree creation and the state write leaves the
        // worktree behind with no record of it; a rerun reuses it instead of
        // failing on the existing branch.
        if path.exists() {
            self.validate(&path).await.with_context(|| {
                format!("existing worktree at {} is not reusable", path.display())
            })?;
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.worktrees_root)
            .await
            .context("Failed to create worktrees root")?;

        let path_str = path
            .to_str()
            .context("Worktree path contains invalid UTF-8")?;

        let output = self
            .run_git(&["worktree", "add", "-b", branch, path_str])
            .await?;
        if output.status.success() {
            return Ok(path);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        // The branch can also survive alone when the worktree was pruned;
        // attach to it rather than demanding a fresh one.
        let retry = self.run_git(&["worktree", "add", path_str, branch]).await?;
        if retry.status.success() {
            return Ok(path);
        }

        anyhow::bail!("git worktree add failed: {}", stderr);
    }

    async fn validate(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            anyhow::bail!("worktree {} does not exist", path.display());
        }
        if !path.is_dir() {
            anyhow::bail!("worktree {} is not a directory", path.display());
        }
        // A linked worktree carries a .git file pointing back at the
        // repository's administrative directory.
        if !path.join(".git").exists() {
            anyhow::bail!("worktree {} has no .git link", path.display());
        }
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let path_str = path
            .to_str()
            .context("Worktree path contains invalid UTF-8")?;
        let output = self
            .run_git(&["worktree", "remove", "--force", path_str])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git worktree remove failed: {}", stderr.trim());
        }
        Ok(())
    }
}
