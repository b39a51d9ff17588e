//! `resume`: pick up an interrupted workflow where its state record says it
//! stopped. Phases re-run idempotently; completed or failed workflows refuse
//! to restart.

use anyhow::{Context, Result};

use adw::config::AdwConfig;
use adw::errors::WorkflowError;
use adw::orchestrator;

use super::{build_context, trigger::report};

pub async fn cmd_resume(config: AdwConfig, adw_id: &str) -> Result<()> {
    let ctx = build_context(config)?;
    let state = ctx
        .store
        .get(adw_id)
        .with_context(|| format!("Failed to load workflow {}", adw_id))?;

    if state.is_terminal() {
        let status = state
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        return Err(WorkflowError::Terminal {
            adw_id: adw_id.to_string(),
            status,
        }
        .into());
    }

    tracing::info!(
        adw_id,
        phase = state.phase.map(|p| p.as_str()).unwrap_or("unstarted"),
        "resuming workflow"
    );
    let outcome = orchestrator::run_workflow(&ctx, adw_id).await;
    report(adw_id, &outcome)
}
