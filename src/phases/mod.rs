//! The six phase executors: Plan, Build, Test, Review, Document, Ship.
//!
//! Every executor follows the same shape: load the workflow state, refuse to
//! act on terminal workflows, validate its preconditions, do its work inside
//! the workflow's worktree, persist the next phase marker, and return a
//! structured `PhaseResult`. A phase never propagates an error past its own
//! boundary; orchestrators only look at the `success` flag.

pub mod build;
pub mod document;
pub mod plan;
pub mod review;
pub mod ship;

use std::sync::Arc;

use serde_json::Value;

use crate::agent::AgentRunner;
use crate::config::AdwConfig;
use crate::errors::WorkflowError;
use crate::git::GitOps;
use crate::state::{AdwPhase, AdwStatus, StatePatch, StateStore, WorkflowState};
use crate::tracker::IssueTracker;
use crate::worktree::Worktrees;

/// Injected handles shared by all phase executors. No global singletons:
/// tests swap in fakes for any seam.
#[derive(Clone)]
pub struct PhaseContext {
    pub git: Arc<dyn GitOps>,
    pub store: Arc<dyn StateStore>,
    pub agent: Arc<dyn AgentRunner>,
    pub worktrees: Arc<dyn Worktrees>,
    pub tracker: Option<Arc<dyn IssueTracker>>,
    pub config: AdwConfig,
}

/// Structured outcome of one phase execution.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub success: bool,
    pub message: String,
    pub data: Value,
}

impl PhaseResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Value::Null,
        }
    }
}

/// Load state for a phase entry. Returns `Err(PhaseResult)` ready to hand
/// back for unknown workflows and for terminal ones (which must short-circuit
/// before any side effect).
pub(crate) fn load_for_phase(
    ctx: &PhaseContext,
    adw_id: &str,
    phase_name: &str,
) -> Result<WorkflowState, Box<PhaseResult>> {
    let state = match ctx.store.get(adw_id) {
        Ok(state) => state,
        Err(WorkflowError::NotFound(_)) => {
            return Err(Box::new(PhaseResult::failed(format!(
                "unknown workflow {}",
                adw_id
            ))));
        }
        Err(e) => {
            return Err(Box::new(PhaseResult::failed(format!(
                "failed to load state for {}: {}",
                adw_id, e
            ))));
        }
    };

    if state.is_terminal() {
        let status = state
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        tracing::warn!(adw_id, phase = phase_name, %status, "workflow already terminal");
        return Err(Box::new(PhaseResult::failed(format!(
            "workflow {} already terminal ({}); {} phase refused",
            adw_id, status, phase_name
        ))));
    }

    Ok(state)
}

/// Resume support: a phase whose exit marker (or anything later) is already
/// recorded has nothing left to do and reports success without side effects.
pub(crate) fn already_complete(state: &WorkflowState, exit_phase: AdwPhase) -> bool {
    state.phase.map(|p| p >= exit_phase).unwrap_or(false)
}

/// Persist a phase marker, logging rather than masking the original outcome
/// if the write itself fails.
pub(crate) fn persist_phase(ctx: &PhaseContext, adw_id: &str, phase: AdwPhase, status: AdwStatus) {
    if let Err(e) = ctx
        .store
        .update(adw_id, StatePatch::phase(phase, status))
    {
        tracing::error!(adw_id, phase = %phase, error = %e, "failed to persist phase marker");
    }
}

/// Best-effort progress comment on the triggering issue. Failures are logged
/// and never fail the phase.
pub(crate) async fn notify(ctx: &PhaseContext, issue_number: u64, body: &str) {
    let Some(tracker) = &ctx.tracker else {
        return;
    };
    if let Err(e) = tracker.post_comment(issue_number, body).await {
        tracing::warn!(issue_number, error = %e, "failed to post issue comment");
    }
}

/// Commit-and-push helper used by phases that may have produced changes.
/// A clean tree is reported as `Ok(false)`; an actual commit pushes and
/// returns `Ok(true)`.
pub(crate) async fn commit_and_push(
    ctx: &PhaseContext,
    state: &WorkflowState,
    message: &str,
) -> anyhow::Result<bool> {
    let Some(worktree) = &state.worktree_path else {
        anyhow::bail!("worktree path not set");
    };
    let Some(branch) = &state.branch_name else {
        anyhow::bail!("branch name not set");
    };

    if ctx.git.is_clean(worktree).await? {
        return Ok(false);
    }

    ctx.git.stage_all(worktree).await?;
    match ctx.git.commit(message, worktree).await? {
        crate::git::CommitOutcome::NothingToCommit => Ok(false),
        crate::git::CommitOutcome::Committed(id) => {
            tracing::info!(adw_id = %state.adw_id, commit = %id, "committed phase changes");
            ctx.git
                .push(branch, &ctx.config.remote, worktree)
                .await?;
            Ok(true)
        }
    }
}

/// Record a hard phase failure: freeze the phase marker at its exit value
/// with `Failed` status, tell the tracker, and hand back the failed result.
pub(crate) async fn fail_phase(
    ctx: &PhaseContext,
    adw_id: &str,
    issue_number: u64,
    exit_phase: AdwPhase,
    label: &str,
    message: String,
) -> PhaseResult {
    tracing::error!(adw_id, phase = label, %message, "phase failed");
    persist_phase(ctx, adw_id, exit_phase, AdwStatus::Failed);
    notify(
        ctx,
        issue_number,
        &format!("{} phase failed for `{}`: {}", label, adw_id, message),
    )
    .await;
    PhaseResult::failed(message)
}

/// Run a checking directive, resolving failures with a corrective directive
/// when auto-resolve is on. Bounded by `max_resolve_attempts`; the error
/// string of the last failing run comes back on exhaustion.
pub(crate) async fn run_with_self_correction(
    ctx: &PhaseContext,
    state: &WorkflowState,
    directive: &str,
    resolve_directive: &str,
) -> Result<(), String> {
    let worktree = state
        .worktree_path
        .as_ref()
        .ok_or_else(|| "worktree path not set".to_string())?;

    let request = crate::agent::AgentRequest::new(&state.adw_id, directive, worktree)
        .with_model_set(state.model_set);
    let mut result = match ctx.agent.run(&request).await {
        Ok(r) => r,
        Err(e) => return Err(format!("failed to invoke agent: {}", e)),
    };
    if result.success {
        return Ok(());
    }
    if !state.auto_resolve {
        return Err(result
            .error
            .unwrap_or_else(|| format!("{} directive failed", directive)));
    }

    for attempt in 1..=ctx.config.max_resolve_attempts {
        tracing::info!(
            adw_id = %state.adw_id,
            directive,
            attempt,
            max = ctx.config.max_resolve_attempts,
            "attempting self-correction"
        );
        let failure = result.error.clone().unwrap_or_default();
        let resolve = crate::agent::AgentRequest::new(&state.adw_id, resolve_directive, worktree)
            .with_args(vec![failure])
            .with_model_set(state.model_set);
        match ctx.agent.run(&resolve).await {
            Ok(_) => {}
            Err(e) => return Err(format!("failed to invoke agent: {}", e)),
        }

        let recheck = crate::agent::AgentRequest::new(&state.adw_id, directive, worktree)
            .with_model_set(state.model_set);
        result = match ctx.agent.run(&recheck).await {
            Ok(r) => r,
            Err(e) => return Err(format!("failed to invoke agent: {}", e)),
        };
        if result.success {
            return Ok(());
        }
    }

    Err(format!(
        "{} still failing after {} resolution attempts: {}",
        directive,
        ctx.config.max_resolve_attempts,
        result.error.unwrap_or_default()
    ))
}

/// Conventional-commit message embedding the issue number.
pub(crate) fn commit_message(state: &WorkflowState, summary: &str) -> String {
    let kind = match state.issue_class {
        crate::state::IssueClass::Feature => "feat",
        crate::state::IssueClass::Bug => "fix",
        crate::state::IssueClass::Chore => "chore",
    };
    format!(
        "{}: {} (#{}) [adw-{}]",
        kind, summary, state.issue_number, state.adw_id
    )
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fakes for phase and orchestrator tests.

    use super::*;
    use crate::agent::{AgentRequest, AgentResult, AgentRunner};
    use crate::errors::GitError;
    use crate::git::CommitOutcome;
    use crate::state::{IssueClass, JsonStateStore, WorkflowType};
    use crate::tracker::TrackedIssue;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Git fake: records calls, reports a configurable clean/dirty tree.
    #[derive(Default)]
    pub struct FakeGit {
        pub clean: AtomicBool,
        pub pushes: Mutex<Vec<String>>,
        pub commits: Mutex<Vec<String>>,
        pub fail_push: AtomicBool,
    }

    impl FakeGit {
        pub fn dirty() -> Self {
            Self {
                clean: AtomicBool::new(false),
                ..Default::default()
            }
        }

        pub fn clean_tree() -> Self {
            Self {
                clean: AtomicBool::new(true),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl GitOps for FakeGit {
        async fn current_branch(&self, _dir: &Path) -> Result<String, GitError> {
            Ok("main".into())
        }
        async fn create_branch(&self, _name: &str, _dir: &Path) -> Result<(), GitError> {
            Ok(())
        }
        async fn checkout(&self, _name: &str, _dir: &Path) -> Result<(), GitError> {
            Ok(())
        }
        async fn stage_all(&self, _dir: &Path) -> Result<(), GitError> {
            Ok(())
        }
        async fn commit(&self, message: &str, _dir: &Path) -> Result<CommitOutcome, GitError> {
            self.commits.lock().unwrap().push(message.to_string());
            Ok(CommitOutcome::Committed("deadbeef".into()))
        }
        async fn push(&self, branch: &str, _remote: &str, _dir: &Path) -> Result<(), GitError> {
            if self.fail_push.load(Ordering::SeqCst) {
                return Err(GitError::PushFailed {
                    branch: branch.into(),
                    attempts: 4,
                    message: "remote down".into(),
                });
            }
            self.pushes.lock().unwrap().push(branch.to_string());
            Ok(())
        }
        async fn commit_count(&self, _dir: &Path) -> Result<usize, GitError> {
            Ok(self.commits.lock().unwrap().len())
        }
        async fn is_clean(&self, _dir: &Path) -> Result<bool, GitError> {
            Ok(self.clean.load(Ordering::SeqCst))
        }
    }

    /// Agent fake: per-directive scripted outcomes, call counting.
    #[derive(Default)]
    pub struct FakeAgent {
        /// directive -> sequence of success flags, consumed in order;
        /// exhausted sequences repeat the last entry.
        pub script: Mutex<HashMap<String, Vec<bool>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeAgent {
        pub fn always_ok() -> Self {
            Self::default()
        }

        pub fn scripted(directive: &str, outcomes: Vec<bool>) -> Self {
            let agent = Self::default();
            agent
                .script
                .lock()
                .unwrap()
                .insert(directive.to_string(), outcomes);
            agent
        }

        pub fn calls_for(&self, directive: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|d| d.as_str() == directive)
                .count()
        }
    }

    #[async_trait]
    impl AgentRunner for FakeAgent {
        async fn run(&self, request: &AgentRequest) -> Result<AgentResult> {
            self.calls.lock().unwrap().push(request.directive.clone());
            let mut script = self.script.lock().unwrap();
            let success = match script.get_mut(&request.directive) {
                Some(seq) if !seq.is_empty() => {
                    if seq.len() > 1 {
                        seq.remove(0)
                    } else {
                        seq[0]
                    }
                }
                _ => true,
            };
            Ok(AgentResult {
                success,
                output: format!("ran {}", request.directive),
                error: if success { None } else { Some("directive failed".into()) },
            })
        }
    }

    /// Worktree fake backed by real temp directories so validation passes.
    pub struct FakeWorktrees {
        pub root: PathBuf,
        pub created: Mutex<Vec<String>>,
        pub removed: Mutex<Vec<PathBuf>>,
    }

    impl FakeWorktrees {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self {
                root: root.into(),
                created: Mutex::new(Vec::new()),
                removed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Worktrees for FakeWorktrees {
        async fn create(&self, adw_id: &str, _branch: &str) -> Result<PathBuf> {
            let path = self.root.join(adw_id);
            std::fs::create_dir_all(&path)?;
            std::fs::write(path.join(".git"), "gitdir: fake")?;
            self.created.lock().unwrap().push(adw_id.to_string());
            Ok(path)
        }
        async fn validate(&self, path: &Path) -> Result<()> {
            if path.join(".git").exists() {
                Ok(())
            } else {
                anyhow::bail!("worktree {} not usable", path.display())
            }
        }
        async fn remove(&self, path: &Path) -> Result<()> {
            std::fs::remove_dir_all(path).ok();
            self.removed.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    /// Tracker fake: records comments and PR operations.
    #[derive(Default)]
    pub struct FakeTracker {
        pub comments: Mutex<Vec<(u64, String)>>,
        pub prs: Mutex<Vec<String>>,
        pub approved: Mutex<Vec<u64>>,
        pub merged: Mutex<Vec<u64>>,
        pub next_pr_number: AtomicU32,
        pub fail_comments: AtomicBool,
        pub fail_prs: AtomicBool,
    }

    impl FakeTracker {
        pub fn new() -> Self {
            Self {
                next_pr_number: AtomicU32::new(100),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl IssueTracker for FakeTracker {
        async fn fetch_issue(&self, number: u64) -> Result<TrackedIssue> {
            Ok(TrackedIssue {
                number,
                title: "Fake issue".into(),
                body: Some("body".into()),
                labels: Vec::new(),
            })
        }
        async fn post_comment(&self, issue_number: u64, body: &str) -> Result<()> {
            if self.fail_comments.load(Ordering::SeqCst) {
                anyhow::bail!("comment API down");
            }
            self.comments
                .lock()
                .unwrap()
                .push((issue_number, body.to_string()));
            Ok(())
        }
        async fn create_pr(&self, head_branch: &str, _title: &str, _body: &str) -> Result<u64> {
            if self.fail_prs.load(Ordering::SeqCst) {
                anyhow::bail!("PR API down");
            }
            self.prs.lock().unwrap().push(head_branch.to_string());
            Ok(self.next_pr_number.fetch_add(1, Ordering::SeqCst) as u64)
        }
        async fn approve_pr(&self, pr_number: u64) -> Result<()> {
            if self.fail_prs.load(Ordering::SeqCst) {
                anyhow::bail!("PR API down");
            }
            self.approved.lock().unwrap().push(pr_number);
            Ok(())
        }
        async fn merge_pr(&self, pr_number: u64) -> Result<()> {
            if self.fail_prs.load(Ordering::SeqCst) {
                anyhow::bail!("PR API down");
            }
            self.merged.lock().unwrap().push(pr_number);
            Ok(())
        }
    }

    /// Assemble a full context over temp dirs with the given fakes.
    pub struct Harness {
        pub ctx: PhaseContext,
        pub git: Arc<FakeGit>,
        pub agent: Arc<FakeAgent>,
        pub worktrees: Arc<FakeWorktrees>,
        pub tracker: Arc<FakeTracker>,
        pub _tmp: tempfile::TempDir,
    }

    pub fn harness_with(git: FakeGit, agent: FakeAgent) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let git = Arc::new(git);
        let agent = Arc::new(agent);
        let worktrees = Arc::new(FakeWorktrees::new(tmp.path().join("worktrees")));
        let tracker = Arc::new(FakeTracker::new());
        let store = Arc::new(JsonStateStore::new(tmp.path().join("state")));
        let mut config = AdwConfig::default();
        config.repo_dir = tmp.path().to_path_buf();
        let ctx = PhaseContext {
            git: git.clone(),
            store,
            agent: agent.clone(),
            worktrees: worktrees.clone(),
            tracker: Some(tracker.clone()),
            config,
        };
        Harness {
            ctx,
            git,
            agent,
            worktrees,
            tracker,
            _tmp: tmp,
        }
    }

    pub fn harness() -> Harness {
        harness_with(FakeGit::dirty(), FakeAgent::always_ok())
    }

    /// Seed a workflow record; returns the id.
    pub fn seed_workflow(ctx: &PhaseContext, workflow_type: WorkflowType) -> String {
        let adw_id = "abc12345".to_string();
        let state = WorkflowState::new(
            &adw_id,
            42,
            "Add user auth",
            "We need login",
            IssueClass::Feature,
            workflow_type,
            false,
            false,
        );
        ctx.store.create(&state).unwrap();
        adw_id
    }

    /// Advance a seeded workflow to the given phase via the store, keeping
    /// transitions legal.
    pub fn advance_to(ctx: &PhaseContext, adw_id: &str, target: AdwPhase) {
        let sequence = [
            AdwPhase::Planning,
            AdwPhase::Planned,
            AdwPhase::Building,
            AdwPhase::Built,
            AdwPhase::Testing,
            AdwPhase::Tested,
            AdwPhase::Reviewing,
            AdwPhase::Reviewed,
            AdwPhase::Documenting,
            AdwPhase::Documented,
            AdwPhase::Shipping,
            AdwPhase::Shipped,
        ];
        for phase in sequence {
            ctx.store
                .update(adw_id, StatePatch::phase(phase, AdwStatus::Active))
                .unwrap();
            if phase == target {
                break;
            }
        }
    }

    /// Give the workflow a live worktree + branch, as the Plan phase would.
    pub async fn provision_worktree(harness: &Harness, adw_id: &str) {
        let path = harness.worktrees.create(adw_id, "feat-42-abc12345-add-user-auth").await.unwrap();
        harness
            .ctx
            .store
            .update(
                adw_id,
                StatePatch {
                    branch_name: Some("feat-42-abc12345-add-user-auth".into()),
                    worktree_path: Some(path),
                    ..Default::default()
                },
            )
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::state::{AdwStatus, StatePatch, WorkflowType};

    #[test]
    fn test_phase_result_constructors() {
        let ok = PhaseResult::ok("done");
        assert!(ok.success);
        assert_eq!(ok.message, "done");

        let failed = PhaseResult::failed("nope");
        assert!(!failed.success);
    }

    #[test]
    fn test_load_for_phase_unknown_workflow() {
        let h = harness();
        let err = load_for_phase(&h.ctx, "missing0", "build").unwrap_err();
        assert!(!err.success);
        assert!(err.message.contains("unknown workflow"));
    }

    #[test]
    fn test_load_for_phase_terminal_short_circuits() {
        let h = harness();
        let adw_id = seed_workflow(&h.ctx, WorkflowType::Sdlc);
        h.ctx
            .store
            .update(
                &adw_id,
                StatePatch {
                    status: Some(AdwStatus::Failed),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = load_for_phase(&h.ctx, &adw_id, "test").unwrap_err();
        assert!(!err.success);
        assert!(err.message.contains("already terminal"));
    }

    #[tokio::test]
    async fn test_notify_without_tracker_is_silent() {
        let mut h = harness();
        h.ctx.tracker = None;
        notify(&h.ctx, 42, "hello").await;
    }

    #[tokio::test]
    async fn test_notify_failure_does_not_panic() {
        let h = harness();
        h.tracker
            .fail_comments
            .store(true, std::sync::atomic::Ordering::SeqCst);
        notify(&h.ctx, 42, "hello").await;
        assert!(h.tracker.comments.lock().unwrap().is_empty());
    }

    #[test]
    fn test_commit_message_embeds_issue_and_id() {
        let h = harness();
        let adw_id = seed_workflow(&h.ctx, WorkflowType::Sdlc);
        let state = h.ctx.store.get(&adw_id).unwrap();
        let msg = commit_message(&state, "implement issue");
        assert_eq!(msg, "feat: implement issue (#42) [adw-abc12345]");
    }
}
