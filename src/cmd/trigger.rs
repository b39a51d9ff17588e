//! `trigger`: start a new workflow from a tracker issue.

use anyhow::{Context, Result};

use adw::config::AdwConfig;
use adw::id::generate_adw_id;
use adw::orchestrator;
use adw::state::{WorkflowState, WorkflowType};

use super::build_context;

pub async fn cmd_trigger(
    config: AdwConfig,
    issue_number: u64,
    workflow_override: Option<WorkflowType>,
    auto_resolve: bool,
    auto_ship: bool,
) -> Result<()> {
    let ctx = build_context(config)?;
    let tracker = ctx
        .tracker
        .clone()
        .context("trigger requires a configured tracker (set github_repo and GITHUB_TOKEN)")?;

    let issue = tracker
        .fetch_issue(issue_number)
        .await
        .with_context(|| format!("Failed to fetch issue #{}", issue_number))?;

    // CLI override wins over issue labels; unlabeled issues run the full
    // manual-merge lifecycle.
    let workflow_type = workflow_override
        .or_else(|| issue.workflow_type())
        .unwrap_or(WorkflowType::Sdlc);

    let adw_id = generate_adw_id();
    let mut state = WorkflowState::new(
        &adw_id,
        issue.number,
        &issue.title,
        issue.body.as_deref().unwrap_or(""),
        issue.issue_class(),
        workflow_type,
        auto_resolve,
        auto_ship,
    );
    state.model_set = issue.model_set();
    ctx.store
        .create(&state)
        .with_context(|| format!("Failed to create workflow state for {}", adw_id))?;

    tracing::info!(
        adw_id = %adw_id,
        issue = issue.number,
        workflow = workflow_type.as_str(),
        "workflow triggered"
    );
    println!("Triggered workflow {} for issue #{}", adw_id, issue.number);

    let outcome = orchestrator::run_workflow(&ctx, &adw_id).await;
    report(&adw_id, &outcome)
}

pub(crate) fn report(adw_id: &str, outcome: &orchestrator::RunOutcome) -> Result<()> {
    for (name, result) in &outcome.phases {
        let mark = if result.success { "ok" } else { "FAILED" };
        println!("  {:<10} {:<8} {}", name, mark, result.message);
    }
    match outcome.failure() {
        Some((phase, message)) => {
            anyhow::bail!("workflow {} failed in {} phase: {}", adw_id, phase, message)
        }
        None => {
            println!("Workflow {} completed", adw_id);
            Ok(())
        }
    }
}
