//! CLI command implementations.
//!
//! | Module    | Commands handled    |
//! |-----------|---------------------|
//! | `trigger` | `Trigger`           |
//! | `resume`  | `Resume`            |
//! | `status`  | `Status`            |

pub mod resume;
pub mod status;
pub mod trigger;

pub use resume::cmd_resume;
pub use status::cmd_status;
pub use trigger::cmd_trigger;

use std::sync::Arc;

use anyhow::Result;

use adw::agent::SubprocessAgent;
use adw::config::AdwConfig;
use adw::git::Git;
use adw::phases::PhaseContext;
use adw::state::JsonStateStore;
use adw::tracker::GitHubTracker;
use adw::worktree::GitWorktrees;

/// Wire up the real implementations behind every seam.
pub fn build_context(config: AdwConfig) -> Result<PhaseContext> {
    let tracker = if config.github_repo.is_empty() {
        tracing::warn!("github_repo not configured; tracker integration disabled");
        None
    } else {
        match AdwConfig::github_token() {
            Some(token) => {
                let tracker = GitHubTracker::new(
                    config.github_repo.clone(),
                    token,
                    config.base_branch.clone(),
                    config.http_timeout(),
                )?;
                Some(Arc::new(tracker) as Arc<dyn adw::tracker::IssueTracker>)
            }
            None => {
                tracing::warn!("GITHUB_TOKEN not set; tracker integration disabled");
                None
            }
        }
    };

    Ok(PhaseContext {
        git: Arc::new(Git::new(
            config.push_retries,
            config.push_base_delay(),
            config.git_timeout(),
        )),
        store: Arc::new(JsonStateStore::new(config.state_dir())),
        agent: Arc::new(SubprocessAgent::new(
            config.agent_cmd.clone(),
            config.agent_flags.clone(),
            config.agent_timeout(),
            config.logs_dir(),
        )),
        worktrees: Arc::new(GitWorktrees::new(
            config.repo_dir.clone(),
            config.worktrees_root(),
            config.git_timeout(),
        )),
        tracker,
        config,
    })
}
