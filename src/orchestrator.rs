//! Fail-fast orchestration of the phase sequence.
//!
//! Three strategies over the same six executors: plan-build stops after the
//! implementation lands, SDLC runs the full lifecycle and leaves the merge to
//! a human, and ZTE (zero-touch engineering) merges and reclaims the worktree
//! on its own. A phase failure stops the run immediately; the failed phase
//! has already frozen the state record.

use serde_json::json;

use crate::phases::ship::ShipPolicy;
use crate::phases::{self, PhaseContext, PhaseResult};
use crate::state::{AdwStatus, StatePatch, WorkflowType};

/// Outcome of a full orchestrated run: each executed phase's result in order,
/// stopping at the first failure.
#[derive(Debug)]
pub struct RunOutcome {
    pub adw_id: String,
    pub success: bool,
    pub phases: Vec<(&'static str, PhaseResult)>,
}

impl RunOutcome {
    fn record(&mut self, name: &'static str, result: PhaseResult) -> bool {
        let success = result.success;
        if success {
            tracing::info!(adw_id = %self.adw_id, phase = name, "phase complete");
        } else {
            tracing::error!(adw_id = %self.adw_id, phase = name, message = %result.message, "phase failed; halting workflow");
        }
        self.phases.push((name, result));
        self.success = success;
        success
    }

    /// The failing phase's name and message, if the run failed.
    pub fn failure(&self) -> Option<(&'static str, &str)> {
        self.phases
            .last()
            .filter(|(_, r)| !r.success)
            .map(|(name, r)| (*name, r.message.as_str()))
    }
}

/// Dispatch on the workflow's recorded type.
pub async fn run_workflow(ctx: &PhaseContext, adw_id: &str) -> RunOutcome {
    let workflow_type = match ctx.store.get(adw_id) {
        Ok(state) => state.workflow_type,
        Err(e) => {
            let mut outcome = RunOutcome {
                adw_id: adw_id.to_string(),
                success: false,
                phases: Vec::new(),
            };
            outcome.record("load", PhaseResult::failed(format!("cannot load workflow: {}", e)));
            return outcome;
        }
    };
    match workflow_type {
        WorkflowType::PlanBuild => run_plan_build(ctx, adw_id).await,
        WorkflowType::Sdlc => run_sdlc(ctx, adw_id).await,
        WorkflowType::Zte => run_zte(ctx, adw_id).await,
    }
}

/// Plan and build only; the branch is left pushed with no PR.
pub async fn run_plan_build(ctx: &PhaseContext, adw_id: &str) -> RunOutcome {
    let mut outcome = RunOutcome {
        adw_id: adw_id.to_string(),
        success: true,
        phases: Vec::new(),
    };
    if !outcome.record("plan", phases::plan::run(ctx, adw_id).await) {
        return outcome;
    }
    if !outcome.record("build", phases::build::run(ctx, adw_id).await) {
        return outcome;
    }
    // No ship phase runs, so completion is recorded here.
    if let Err(e) = ctx.store.update(
        adw_id,
        StatePatch {
            status: Some(AdwStatus::Completed),
            completed_at: Some(chrono::Utc::now()),
            ..Default::default()
        },
    ) {
        tracing::error!(adw_id, error = %e, "failed to mark plan-build workflow completed");
    }
    outcome.record(
        "done",
        PhaseResult::ok_with(
            "plan-build complete; branch pushed, no PR opened".to_string(),
            json!({ "requires_manual_merge": true }),
        ),
    );
    outcome
}

/// Full lifecycle with a human holding the merge button.
pub async fn run_sdlc(ctx: &PhaseContext, adw_id: &str) -> RunOutcome {
    run_lifecycle(ctx, adw_id, ShipPolicy::manual()).await
}

/// Zero-touch: full lifecycle, automatic merge, worktree reclaimed. A ZTE
/// workflow triggered without auto-ship falls back to a manual merge.
pub async fn run_zte(ctx: &PhaseContext, adw_id: &str) -> RunOutcome {
    let auto_ship = match ctx.store.get(adw_id) {
        Ok(state) => state.auto_ship,
        Err(_) => false,
    };
    let policy = if auto_ship {
        ShipPolicy::zero_touch()
    } else {
        tracing::warn!(
            adw_id,
            "zero-touch workflow triggered without auto-ship; PR will await manual merge"
        );
        ShipPolicy::manual()
    };
    run_lifecycle(ctx, adw_id, policy).await
}

async fn run_lifecycle(ctx: &PhaseContext, adw_id: &str, policy: ShipPolicy) -> RunOutcome {
    let mut outcome = RunOutcome {
        adw_id: adw_id.to_string(),
        success: true,
        phases: Vec::new(),
    };
    if !outcome.record("plan", phases::plan::run(ctx, adw_id).await) {
        return outcome;
    }
    if !outcome.record("build", phases::build::run(ctx, adw_id).await) {
        return outcome;
    }
    if !outcome.record("test", phases::test::run(ctx, adw_id).await) {
        return outcome;
    }
    if !outcome.record("review", phases::review::run(ctx, adw_id).await) {
        return outcome;
    }
    if !outcome.record("document", phases::document::run(ctx, adw_id).await) {
        return outcome;
    }
    outcome.record("ship", phases::ship::run(ctx, adw_id, policy).await);
    outcome
}
