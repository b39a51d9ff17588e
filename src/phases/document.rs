//! Document phase: have the agent update docs and changelogs for the change,
//! committing whatever it wrote.

use serde_json::json;

use crate::agent::AgentRequest;
use crate::state::{AdwPhase, AdwStatus};

use super::{
    PhaseContext, PhaseResult, commit_and_push, commit_message, fail_phase, load_for_phase,
    notify, persist_phase,
};

pub async fn run(ctx: &PhaseContext, adw_id: &str) -> PhaseResult {
    let state = match load_for_phase(ctx, adw_id, "document") {
        Ok(state) => state,
        Err(result) => return *result,
    };
    if super::already_complete(&state, AdwPhase::Documented) {
        tracing::info!(adw_id, "document phase already complete; skipping");
        return PhaseResult::ok("document phase already complete");
    }
    persist_phase(ctx, adw_id, AdwPhase::Documenting, AdwStatus::Active);

    let fail = |message: String| {
        fail_phase(
            ctx,
            adw_id,
            state.issue_number,
            AdwPhase::Documented,
            "document",
            message,
        )
    };

    let Some(worktree) = state.worktree_path.clone() else {
        return fail("worktree path not set; plan phase must run first".into()).await;
    };
    if let Err(e) = ctx.worktrees.validate(&worktree).await {
        return fail(format!("worktree unusable: {}", e)).await;
    }

    let request =
        AgentRequest::new(adw_id, "document", &worktree).with_model_set(state.model_set);
    let agent_result = match ctx.agent.run(&request).await {
        Ok(r) => r,
        Err(e) => return fail(format!("failed to invoke agent: {}", e)).await,
    };
    if !agent_result.success {
        return fail(format!(
            "agent documentation failed: {}",
            agent_result.error.unwrap_or_default()
        ))
        .await;
    }

    let committed = match commit_and_push(
        ctx,
        &state,
        &commit_message(&state, "update documentation"),
    )
    .await
    {
        Ok(committed) => committed,
        Err(e) => return fail(format!("failed to commit documentation: {}", e)).await,
    };

    notify(
        ctx,
        state.issue_number,
        &format!("Document phase complete for `{}`", adw_id),
    )
    .await;
    persist_phase(ctx, adw_id, AdwPhase::Documented, AdwStatus::Active);

    PhaseResult::ok_with(
        "documentation updated".to_string(),
        json!({ "committed": committed }),
    )
}
