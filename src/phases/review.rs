//! Review phase: agent-driven code review of the branch, with the same
//! bounded self-correction loop the Test phase uses for its findings.

use serde_json::json;

use crate::state::{AdwPhase, AdwStatus};

use super::{
    PhaseContext, PhaseResult, commit_and_push, commit_message, fail_phase, load_for_phase,
    notify, persist_phase, run_with_self_correction,
};

pub async fn run(ctx: &PhaseContext, adw_id: &str) -> PhaseResult {
    let state = match load_for_phase(ctx, adw_id, "review") {
        Ok(state) => state,
        Err(result) => return *result,
    };
    if super::already_complete(&state, AdwPhase::Reviewed) {
        tracing::info!(adw_id, "review phase already complete; skipping");
        return PhaseResult::ok("review phase already complete");
    }
    persist_phase(ctx, adw_id, AdwPhase::Reviewing, AdwStatus::Active);

    let fail = |message: String| {
        fail_phase(
            ctx,
            adw_id,
            state.issue_number,
            AdwPhase::Reviewed,
            "review",
            message,
        )
    };

    let Some(worktree) = state.worktree_path.clone() else {
        return fail("worktree path not set; plan phase must run first".into()).await;
    };
    if let Err(e) = ctx.worktrees.validate(&worktree).await {
        return fail(format!("worktree unusable: {}", e)).await;
    }

    if let Err(message) =
        run_with_self_correction(ctx, &state, "review", "resolve_review_findings").await
    {
        return fail(message).await;
    }

    let committed = match commit_and_push(
        ctx,
        &state,
        &commit_message(&state, "address review findings"),
    )
    .await
    {
        Ok(committed) => committed,
        Err(e) => return fail(format!("failed to commit review fixes: {}", e)).await,
    };

    notify(
        ctx,
        state.issue_number,
        &format!("Review phase complete for `{}`", adw_id),
    )
    .await;
    persist_phase(ctx, adw_id, AdwPhase::Reviewed, AdwStatus::Active);

    PhaseResult::ok_with(
        "review clean".to_string(),
        json!({ "committed": committed }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::*;
    use crate::state::WorkflowType;

    async fn tested_workflow(h: &Harness) -> String {
        let adw_id = seed_workflow(&h.ctx, WorkflowType::Sdlc);
        advance_to(&h.ctx, &adw_id, AdwPhase::Tested);
        provision_worktree(h, &adw_id).await;
        adw_id
    }

    #[tokio::test]
    async fn test_clean_review_advances_to_reviewed() {
        let h = harness_with(FakeGit::clean_tree(), FakeAgent::always_ok());
        let adw_id = tested_workflow(&h).await;

        let result = run(&h.ctx, &adw_id).await;
        assert!(result.success, "{}", result.message);

        let state = h.ctx.store.get(&adw_id).unwrap();
        assert_eq!(state.phase, Some(AdwPhase::Reviewed));
        assert_eq!(state.status, Some(AdwStatus::Active));
    }

    #[tokio::test]
    async fn test_review_findings_without_auto_resolve_are_fatal() {
        let h = harness_with(
            FakeGit::clean_tree(),
            FakeAgent::scripted("review", vec![false]),
        );
        let adw_id = tested_workflow(&h).await;

        let result = run(&h.ctx, &adw_id).await;
        assert!(!result.success);
        assert_eq!(h.agent.calls_for("resolve_review_findings"), 0);

        let state = h.ctx.store.get(&adw_id).unwrap();
        assert_eq!(state.phase, Some(AdwPhase::Reviewed));
        assert_eq!(state.status, Some(AdwStatus::Failed));
    }

    #[tokio::test]
    async fn test_review_fixes_are_committed() {
        let h = harness_with(FakeGit::dirty(), FakeAgent::always_ok());
        let adw_id = tested_workflow(&h).await;

        let result = run(&h.ctx, &adw_id).await;
        assert!(result.success);
        let commits = h.git.commits.lock().unwrap();
        assert_eq!(commits.len(), 1);
        assert!(commits[0].contains("address review findings"));
    }
}
