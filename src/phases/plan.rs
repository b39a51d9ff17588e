//! Plan phase: provision the workflow's isolation (branch, worktree, ports)
//! and have the agent produce an implementation plan committed to the branch.

use std::path::PathBuf;

use serde_json::json;

use crate::agent::AgentRequest;
use crate::branch::generate_branch_name;
use crate::id::ports_for;
use crate::state::{AdwPhase, AdwStatus, StatePatch};

use super::{PhaseContext, PhaseResult, commit_message, load_for_phase, notify, persist_phase};

/// Relative path of the plan document inside the worktree.
pub fn plan_file_path(issue_number: u64, adw_id: &str) -> PathBuf {
    PathBuf::from("specs").join(format!("issue-{}-adw-{}-plan.md", issue_number, adw_id))
}

pub async fn run(ctx: &PhaseContext, adw_id: &str) -> PhaseResult {
    let state = match load_for_phase(ctx, adw_id, "plan") {
        Ok(state) => state,
        Err(result) => return *result,
    };
    if super::already_complete(&state, AdwPhase::Planned) {
        tracing::info!(adw_id, "plan phase already complete; skipping");
        return PhaseResult::ok("plan phase already complete");
    }
    persist_phase(ctx, adw_id, AdwPhase::Planning, AdwStatus::Active);

    let issue_number = state.issue_number;
    let fail = |message: String| {
        super::fail_phase(ctx, adw_id, issue_number, AdwPhase::Planned, "plan", message)
    };

    // Branch name and ports are deterministic from the record, so resuming
    // recomputes identical values and the set-once store accepts them.
    let branch = state.branch_name.clone().unwrap_or_else(|| {
        generate_branch_name(
            state.issue_number,
            adw_id,
            &state.issue_title,
            state.issue_class,
        )
    });
    let (backend_port, frontend_port) = ports_for(
        adw_id,
        ctx.config.backend_base_port,
        ctx.config.frontend_base_port,
        ctx.config.max_slots,
    );
    tracing::info!(adw_id, branch = %branch, backend_port, frontend_port, "provisioning workflow");
    // Slot collisions past max_slots are tolerated, just not silently
    for port in [backend_port, frontend_port] {
        if !crate::id::is_port_available(port) {
            tracing::warn!(adw_id, port, "assigned port is currently in use");
        }
    }

    let worktree = match &state.worktree_path {
        Some(existing) => {
            if let Err(e) = ctx.worktrees.validate(existing).await {
                return fail(format!("existing worktree unusable: {}", e)).await;
            }
            existing.clone()
        }
        None => match ctx.worktrees.create(adw_id, &branch).await {
            Ok(path) => path,
            Err(e) => return fail(format!("failed to create worktree: {}", e)).await,
        },
    };

    if let Err(e) = ctx.store.update(
        adw_id,
        StatePatch {
            branch_name: Some(branch.clone()),
            worktree_path: Some(worktree.clone()),
            backend_port: Some(backend_port),
            frontend_port: Some(frontend_port),
            ..Default::default()
        },
    ) {
        return fail(format!("failed to persist provisioning: {}", e)).await;
    }

    let plan_rel = plan_file_path(state.issue_number, adw_id);
    let request = AgentRequest::new(adw_id, "plan", &worktree)
        .with_args(vec![
            format!("issue #{}: {}", state.issue_number, state.issue_title),
            plan_rel.display().to_string(),
        ])
        .with_model_set(state.model_set);
    let agent_result = match ctx.agent.run(&request).await {
        Ok(r) => r,
        Err(e) => return fail(format!("failed to invoke agent: {}", e)).await,
    };
    if !agent_result.success {
        return fail(format!(
            "agent planning failed: {}",
            agent_result.error.unwrap_or_default()
        ))
        .await;
    }

    let plan_abs = worktree.join(&plan_rel);
    if plan_abs.exists() {
        if let Err(e) = ctx.store.update(
            adw_id,
            StatePatch {
                plan_file: Some(plan_abs.clone()),
                ..Default::default()
            },
        ) {
            return fail(format!("failed to persist plan file: {}", e)).await;
        }
    } else {
        tracing::warn!(adw_id, path = %plan_abs.display(), "agent produced no plan document");
    }

    let current = match ctx.store.get(adw_id) {
        Ok(s) => s,
        Err(e) => return fail(format!("failed to reload state: {}", e)).await,
    };
    let committed = match super::commit_and_push(
        ctx,
        &current,
        &commit_message(&current, "plan implementation"),
    )
    .await
    {
        Ok(committed) => committed,
        Err(e) => return fail(format!("failed to commit plan: {}", e)).await,
    };

    notify(
        ctx,
        state.issue_number,
        &format!(
            "Plan phase complete for `{}`: branch `{}`, ports {}/{}",
            adw_id, branch, backend_port, frontend_port
        ),
    )
    .await;
    persist_phase(ctx, adw_id, AdwPhase::Planned, AdwStatus::Active);

    PhaseResult::ok_with(
        format!("planned on branch {}", branch),
        json!({
            "branch": branch,
            "worktree": worktree.display().to_string(),
            "backend_port": backend_port,
            "frontend_port": frontend_port,
            "committed": committed,
        }),
    )
}
