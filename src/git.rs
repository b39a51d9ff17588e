//! Thin, typed wrapper over git primitives.
//!
//! Every operation takes an explicit working-directory argument so multiple
//! workflows can drive git concurrently against their own worktrees; nothing
//! here relies on the process-global cwd. Local operations go through git2;
//! push shells out to `git` (credential helpers, ssh agents) and is retried
//! with exponential backoff since remote pushes hit transient network and
//! lock contention.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use git2::{Repository, Signature, StatusOptions, build::CheckoutBuilder};
use tokio::process::Command;

use crate::errors::GitError;
use crate::retry::retry_with_backoff;

/// Outcome of a commit attempt. An empty index is a legitimate phase outcome
/// (the agent may conclude no change was needed), not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(String),
    NothingToCommit,
}

#[async_trait]
pub trait GitOps: Send + Sync {
    async fn current_branch(&self, dir: &Path) -> Result<String, GitError>;
    /// Create and check out a branch; errors if it already exists.
    async fn create_branch(&self, name: &str, dir: &Path) -> Result<(), GitError>;
    async fn checkout(&self, name: &str, dir: &Path) -> Result<(), GitError>;
    async fn stage_all(&self, dir: &Path) -> Result<(), GitError>;
    async fn commit(&self, message: &str, dir: &Path) -> Result<CommitOutcome, GitError>;
    /// Push with upstream tracking, retried with exponential backoff.
    async fn push(&self, branch: &str, remote: &str, dir: &Path) -> Result<(), GitError>;
    async fn commit_count(&self, dir: &Path) -> Result<usize, GitError>;
    /// True iff there are no staged, unstaged or untracked changes.
    async fn is_clean(&self, dir: &Path) -> Result<bool, GitError>;
}

/// Production implementation.
pub struct Git {
    push_retries: u32,
    push_base_delay: Duration,
    command_timeout: Duration,
    git_cmd: PathBuf,
}

impl Git {
    pub fn new(push_retries: u32, push_base_delay: Duration, command_timeout: Duration) -> Self {
        Self {
            push_retries,
            push_base_delay,
            command_timeout,
            git_cmd: PathBuf::from("git"),
        }
    }

    #[cfg(test)]
    fn with_git_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.git_cmd = cmd.into();
        self
    }

    fn open(dir: &Path) -> Result<Repository, GitError> {
        Repository::open(dir).map_err(|e| GitError::OpenFailed {
            path: dir.to_path_buf(),
            source: e,
        })
    }

    fn signature() -> Result<Signature<'static>, GitError> {
        Ok(Signature::now("adw", "adw@localhost")?)
    }

    async fn push_once(&self, branch: &str, remote: &str, dir: &Path) -> Result<(), GitError> {
        let mut cmd = Command::new(&self.git_cmd);
        cmd.args(["push", "-u", remote, branch])
            .current_dir(dir)
            .kill_on_drop(true);

        // A push stuck on a credential prompt or a dead remote must not hang
        // the workflow; the deadline kills the subprocess.
        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(result) => result
                .map_err(|e| GitError::Command(format!("failed to spawn git push: {}", e)))?,
            Err(_) => {
                return Err(GitError::Command(format!(
                    "git push timed out after {}s",
                    self.command_timeout.as_secs_f64()
                )));
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(GitError::Command(format!(
                "git push exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )))
        }
    }
}

impl Default for Git {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(300))
    }
}

#[async_trait]
impl GitOps for Git {
    async fn current_branch(&self, dir: &Path) -> Result<String, GitError> {
        let repo = Self::open(dir)?;
        let head = repo.head()?;
        head.shorthand()
            .map(|s| s.to_string())
            .ok_or_else(|| GitError::Command("HEAD is not a named branch".into()))
    }

    async fn create_branch(&self, name: &str, dir: &Path) -> Result<(), GitError> {
        let repo = Self::open(dir)?;
        if repo.find_branch(name, git2::BranchType::Local).is_ok() {
            return Err(GitError::BranchExists(name.to_string()));
        }
        let head_commit = repo
            .head()?
            .peel_to_commit()
            .map_err(|_| GitError::Command("cannot branch from unborn HEAD".into()))?;
        repo.branch(name, &head_commit, false)?;
        repo.set_head(&format!("refs/heads/{}", name))?;
        repo.checkout_head(Some(CheckoutBuilder::new().safe()))?;
        Ok(())
    }

    async fn checkout(&self, name: &str, dir: &Path) -> Result<(), GitError> {
        let repo = Self::open(dir)?;
        repo.find_branch(name, git2::BranchType::Local)?;
        repo.set_head(&format!("refs/heads/{}", name))?;
        repo.checkout_head(Some(CheckoutBuilder::new().safe()))?;
        Ok(())
    }

    async fn stage_all(&self, dir: &Path) -> Result<(), GitError> {
        let repo = Self::open(dir)?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;
        Ok(())
    }

    async fn commit(&self, message: &str, dir: &Path) -> Result<CommitOutcome, GitError> {
        let repo = Self::open(dir)?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Self::signature()?;

        // Unborn branch gets an initial commit; otherwise compare trees to
        // detect an empty commit before creating it.
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        if let Some(ref parent) = parent
            && parent.tree_id() == tree_id
        {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let commit_id = match parent {
            Some(parent) => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?,
            None => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?,
        };
        Ok(CommitOutcome::Committed(commit_id.to_string()))
    }

    async fn push(&self, branch: &str, remote: &str, dir: &Path) -> Result<(), GitError> {
        let attempts = self.push_retries + 1;
        retry_with_backoff(
            || self.push_once(branch, remote, dir),
            self.push_retries,
            self.push_base_delay,
        )
        .await
        .map_err(|e| GitError::PushFailed {
            branch: branch.to_string(),
            attempts,
            message: e.to_string(),
        })
    }

    async fn commit_count(&self, dir: &Path) -> Result<usize, GitError> {
        let repo = Self::open(dir)?;
        if repo.head().is_err() {
            return Ok(0);
        }
        let mut walk = repo.revwalk()?;
        walk.push_head()?;
        Ok(walk.count())
    }

    async fn is_clean(&self, dir: &Path) -> Result<bool, GitError> {
        let repo = Self::open(dir)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(statuses.is_empty())
    }
}
