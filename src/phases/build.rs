//! Build phase: have the agent implement the plan inside the worktree, then
//! commit and push whatever it produced. An agent run that changes nothing is
//! a successful no-op, not an error.

use serde_json::json;

use crate::agent::AgentRequest;
use crate::state::{AdwPhase, AdwStatus};

use super::{
    PhaseContext, PhaseResult, commit_and_push, commit_message, fail_phase, load_for_phase,
    notify, persist_phase,
};

pub async fn run(ctx: &PhaseContext, adw_id: &str) -> PhaseResult {
    let state = match load_for_phase(ctx, adw_id, "build") {
        Ok(state) => state,
        Err(result) => return *result,
    };
    if super::already_complete(&state, AdwPhase::Built) {
        tracing::info!(adw_id, "build phase already complete; skipping");
        return PhaseResult::ok("build phase already complete");
    }
    persist_phase(ctx, adw_id, AdwPhase::Building, AdwStatus::Active);

    let fail = |message: String| {
        fail_phase(
            ctx,
            adw_id,
            state.issue_number,
            AdwPhase::Built,
            "build",
            message,
        )
    };

    let Some(worktree) = state.worktree_path.clone() else {
        return fail("worktree path not set; plan phase must run first".into()).await;
    };
    if state.branch_name.is_none() {
        return fail("branch name not set; plan phase must run first".into()).await;
    }
    if let Err(e) = ctx.worktrees.validate(&worktree).await {
        return fail(format!("worktree unusable: {}", e)).await;
    }

    let plan_arg = match &state.plan_file {
        Some(plan) if plan.exists() => plan.display().to_string(),
        Some(plan) => {
            tracing::warn!(adw_id, path = %plan.display(), "recorded plan file missing; building without it");
            String::new()
        }
        None => {
            tracing::warn!(adw_id, "no plan file recorded; building without one");
            String::new()
        }
    };

    let mut request =
        AgentRequest::new(adw_id, "implement", &worktree).with_model_set(state.model_set);
    if !plan_arg.is_empty() {
        request = request.with_args(vec![plan_arg]);
    }
    let agent_result = match ctx.agent.run(&request).await {
        Ok(r) => r,
        Err(e) => return fail(format!("failed to invoke agent: {}", e)).await,
    };
    if !agent_result.success {
        return fail(format!(
            "agent implementation failed: {}",
            agent_result.error.unwrap_or_default()
        ))
        .await;
    }

    let committed = match commit_and_push(
        ctx,
        &state,
        &commit_message(&state, &state.issue_title),
    )
    .await
    {
        Ok(committed) => committed,
        Err(e) => return fail(format!("failed to commit implementation: {}", e)).await,
    };
    if !committed {
        tracing::info!(adw_id, "agent made no changes; build is a no-op");
    }

    notify(
        ctx,
        state.issue_number,
        &format!(
            "Build phase complete for `{}`{}",
            adw_id,
            if committed { "" } else { " (no changes)" }
        ),
    )
    .await;
    persist_phase(ctx, adw_id, AdwPhase::Built, AdwStatus::Active);

    PhaseResult::ok_with(
        if committed {
            "implementation committed and pushed"
        } else {
            "agent made no changes"
        }
        .to_string(),
        json!({ "committed": committed }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::*;
    use crate::state::WorkflowType;

    async fn planned_workflow(h: &Harness) -> String {
        let adw_id = seed_workflow(&h.ctx, WorkflowType::Sdlc);
        advance_to(&h.ctx, &adw_id, crate::state::AdwPhase::Planned);
        provision_worktree(h, &adw_id).await;
        adw_id
    }

    #[tokio::test]
    async fn test_build_commits_and_pushes_dirty_tree() {
        let h = harness_with(FakeGit::dirty(), FakeAgent::always_ok());
        let adw_id = planned_workflow(&h).await;

        let result = run(&h.ctx, &adw_id).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.data["committed"], true);

        let commits = h.git.commits.lock().unwrap();
        assert_eq!(commits.len(), 1);
        assert!(commits[0].starts_with("feat: Add user auth (#42)"));
        assert_eq!(h.git.pushes.lock().unwrap().len(), 1);

        let state = h.ctx.store.get(&adw_id).unwrap();
        assert_eq!(state.phase, Some(AdwPhase::Built));
        assert_eq!(state.status, Some(AdwStatus::Active));
    }

    #[tokio::test]
    async fn test_build_clean_tree_is_noop_success() {
        let h = harness_with(FakeGit::clean_tree(), FakeAgent::always_ok());
        let adw_id = planned_workflow(&h).await;

        let result = run(&h.ctx, &adw_id).await;
        assert!(result.success);
        assert_eq!(result.data["committed"], false);
        assert!(h.git.commits.lock().unwrap().is_empty());
        assert!(h.git.pushes.lock().unwrap().is_empty());

        let state = h.ctx.store.get(&adw_id).unwrap();
        assert_eq!(state.phase, Some(AdwPhase::Built));
        assert_eq!(state.status, Some(AdwStatus::Active));
    }

    #[tokio::test]
    async fn test_build_without_worktree_is_hard_failure() {
        let h = harness();
        let adw_id = seed_workflow(&h.ctx, WorkflowType::Sdlc);
        advance_to(&h.ctx, &adw_id, crate::state::AdwPhase::Planned);

        let result = run(&h.ctx, &adw_id).await;
        assert!(!result.success);
        assert!(result.message.contains("worktree path not set"));

        let state = h.ctx.store.get(&adw_id).unwrap();
        assert_eq!(state.phase, Some(AdwPhase::Built));
        assert_eq!(state.status, Some(AdwStatus::Failed));
    }

    #[tokio::test]
    async fn test_build_agent_failure_freezes_built_failed() {
        let h = harness_with(FakeGit::dirty(), FakeAgent::scripted("implement", vec![false]));
        let adw_id = planned_workflow(&h).await;

        let result = run(&h.ctx, &adw_id).await;
        assert!(!result.success);

        let state = h.ctx.store.get(&adw_id).unwrap();
        assert_eq!(state.phase, Some(AdwPhase::Built));
        assert_eq!(state.status, Some(AdwStatus::Failed));
        assert!(h.git.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_push_failure_is_hard_failure() {
        let h = harness_with(FakeGit::dirty(), FakeAgent::always_ok());
        h.git
            .fail_push
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let adw_id = planned_workflow(&h).await;

        let result = run(&h.ctx, &adw_id).await;
        assert!(!result.success);
        assert!(result.message.contains("commit implementation"));

        let state = h.ctx.store.get(&adw_id).unwrap();
        assert_eq!(state.status, Some(AdwStatus::Failed));
    }

    #[tokio::test]
    async fn test_build_comment_failure_does_not_fail_phase() {
        let h = harness_with(FakeGit::dirty(), FakeAgent::always_ok());
        h.tracker
            .fail_comments
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let adw_id = planned_workflow(&h).await;

        let result = run(&h.ctx, &adw_id).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_build_on_terminal_workflow_short_circuits() {
        let h = harness();
        let adw_id = planned_workflow(&h).await;
        h.ctx
            .store
            .update(
                &adw_id,
                crate::state::StatePatch {
                    status: Some(AdwStatus::Failed),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = run(&h.ctx, &adw_id).await;
        assert!(!result.success);
        assert!(result.message.contains("already terminal"));
        assert!(h.agent.calls.lock().unwrap().is_empty());
    }
}
