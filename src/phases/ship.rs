//! Ship phase: open the pull request and, under zero-touch policy, approve,
//! merge, and reclaim the worktree. PR operations failing here are fatal;
//! worktree cleanup is best-effort.

use chrono::Utc;
use serde_json::json;

use crate::state::{AdwPhase, AdwStatus, StatePatch};

use super::{PhaseContext, PhaseResult, fail_phase, load_for_phase, notify, persist_phase};

/// How far shipping goes once the PR exists.
#[derive(Debug, Clone, Copy)]
pub struct ShipPolicy {
    /// Approve and merge the PR without a human in the loop.
    pub auto_merge: bool,
    /// Remove the workflow's worktree after a successful merge.
    pub cleanup_worktree: bool,
}

impl ShipPolicy {
    pub fn manual() -> Self {
        Self {
            auto_merge: false,
            cleanup_worktree: false,
        }
    }

    pub fn zero_touch() -> Self {
        Self {
            auto_merge: true,
            cleanup_worktree: true,
        }
    }
}

pub async fn run(ctx: &PhaseContext, adw_id: &str, policy: ShipPolicy) -> PhaseResult {
    let state = match load_for_phase(ctx, adw_id, "ship") {
        Ok(state) => state,
        Err(result) => return *result,
    };
    persist_phase(ctx, adw_id, AdwPhase::Shipping, AdwStatus::Active);

    let fail = |message: String| {
        fail_phase(
            ctx,
            adw_id,
            state.issue_number,
            AdwPhase::Shipped,
            "ship",
            message,
        )
    };

    let Some(branch) = state.branch_name.clone() else {
        return fail("branch name not set; nothing to ship".into()).await;
    };
    let Some(tracker) = ctx.tracker.clone() else {
        return fail("no issue tracker configured; cannot open pull request".into()).await;
    };

    // Resume-safe: an existing PR number means a prior attempt got this far.
    let pr_number = match state.pr_number {
        Some(existing) => {
            tracing::info!(adw_id, pr_number = existing, "reusing existing pull request");
            existing
        }
        None => {
            let kind = match state.issue_class {
                crate::state::IssueClass::Feature => "feat",
                crate::state::IssueClass::Bug => "fix",
                crate::state::IssueClass::Chore => "chore",
            };
            let title = format!("{}: {} (#{})", kind, state.issue_title, state.issue_number);
            let body = format!(
                "Automated workflow `{}` for issue #{}.\n\nBranch: `{}`\n\nCloses #{}",
                adw_id, state.issue_number, branch, state.issue_number
            );
            match tracker.create_pr(&branch, &title, &body).await {
                Ok(number) => number,
                Err(e) => return fail(format!("failed to create pull request: {}", e)).await,
            }
        }
    };
    if let Err(e) = ctx.store.update(
        adw_id,
        StatePatch {
            pr_number: Some(pr_number),
            ..Default::default()
        },
    ) {
        return fail(format!("failed to persist PR number: {}", e)).await;
    }

    let mut merged = false;
    if policy.auto_merge {
        if let Err(e) = tracker.approve_pr(pr_number).await {
            return fail(format!("failed to approve PR #{}: {}", pr_number, e)).await;
        }
        if let Err(e) = tracker.merge_pr(pr_number).await {
            return fail(format!("failed to merge PR #{}: {}", pr_number, e)).await;
        }
        merged = true;
        tracing::info!(adw_id, pr_number, "pull request merged");

        if policy.cleanup_worktree
            && let Some(worktree) = &state.worktree_path
            && let Err(e) = ctx.worktrees.remove(worktree).await
        {
            tracing::warn!(adw_id, error = %e, "failed to remove worktree after merge");
        }
    }

    if let Err(e) = ctx.store.update(
        adw_id,
        StatePatch {
            completed_at: Some(Utc::now()),
            ..Default::default()
        },
    ) {
        return fail(format!("failed to persist completion time: {}", e)).await;
    }

    notify(
        ctx,
        state.issue_number,
        &if merged {
            format!("Shipped: PR #{} merged by workflow `{}`", pr_number, adw_id)
        } else {
            format!(
                "PR #{} opened by workflow `{}`; awaiting manual review and merge",
                pr_number, adw_id
            )
        },
    )
    .await;
    persist_phase(ctx, adw_id, AdwPhase::Shipped, AdwStatus::Completed);

    PhaseResult::ok_with(
        if merged {
            format!("PR #{} merged", pr_number)
        } else {
            format!("PR #{} awaiting manual merge", pr_number)
        },
        json!({
            "pr_number": pr_number,
            "merged": merged,
            "requires_manual_merge": !merged,
        }),
    )
}
