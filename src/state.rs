//! Durable workflow state: the single record driving everything.
//!
//! One `WorkflowState` JSON document per workflow id. Phase and status are
//! closed enums with explicit forward-only transition checks; a terminal
//! status is final. The store applies partial updates atomically via a
//! read-modify-write against a temp file renamed into place.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

/// Classification of the triggering issue, used for the branch prefix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueClass {
    Feature,
    Bug,
    Chore,
}

impl IssueClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Chore => "chore",
        }
    }
}

impl FromStr for IssueClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feature" => Ok(Self::Feature),
            "bug" => Ok(Self::Bug),
            "chore" => Ok(Self::Chore),
            _ => Err(format!("Invalid issue class: {}", s)),
        }
    }
}

/// Which orchestration strategy applies to this workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Plan and build only; no test/review/ship automation.
    PlanBuild,
    /// Full lifecycle, manual merge at the end.
    Sdlc,
    /// Zero-touch: full lifecycle with automatic merge.
    Zte,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanBuild => "plan_build",
            Self::Sdlc => "sdlc",
            Self::Zte => "zte",
        }
    }
}

impl FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan_build" | "plan-build" => Ok(Self::PlanBuild),
            "sdlc" => Ok(Self::Sdlc),
            "zte" => Ok(Self::Zte),
            _ => Err(format!("Invalid workflow type: {}", s)),
        }
    }
}

/// Model tier the agent should run with, resolved from issue labels.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelSet {
    #[default]
    Base,
    Heavy,
}

/// The twelve-stage phase marker. Advances strictly forward, one stage at a
/// time, and freezes at the attempted value on failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AdwPhase {
    Planning,
    Planned,
    Building,
    Built,
    Testing,
    Tested,
    Reviewing,
    Reviewed,
    Documenting,
    Documented,
    Shipping,
    Shipped,
}

impl AdwPhase {
    const SEQUENCE: [AdwPhase; 12] = [
        Self::Planning,
        Self::Planned,
        Self::Building,
        Self::Built,
        Self::Testing,
        Self::Tested,
        Self::Reviewing,
        Self::Reviewed,
        Self::Documenting,
        Self::Documented,
        Self::Shipping,
        Self::Shipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Planned => "planned",
            Self::Building => "building",
            Self::Built => "built",
            Self::Testing => "testing",
            Self::Tested => "tested",
            Self::Reviewing => "reviewing",
            Self::Reviewed => "reviewed",
            Self::Documenting => "documenting",
            Self::Documented => "documented",
            Self::Shipping => "shipping",
            Self::Shipped => "shipped",
        }
    }

    fn ordinal(&self) -> usize {
        Self::SEQUENCE.iter().position(|p| p == self).unwrap_or(0)
    }

    /// Whether moving from `from` (None means freshly created) to `to` is a
    /// legal single forward step.
    pub fn is_valid_transition(from: Option<AdwPhase>, to: AdwPhase) -> bool {
        match from {
            None => to == Self::Planning,
            Some(current) => to.ordinal() == current.ordinal() + 1,
        }
    }
}

impl fmt::Display for AdwPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow status. `Failed` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdwStatus {
    Active,
    Failed,
    Completed,
}

impl AdwStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }
}

/// The durable per-workflow record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub adw_id: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub issue_body: String,
    pub issue_class: IssueClass,
    pub workflow_type: WorkflowType,
    #[serde(default)]
    pub model_set: ModelSet,
    pub branch_name: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub backend_port: Option<u16>,
    pub frontend_port: Option<u16>,
    pub plan_file: Option<PathBuf>,
    pub phase: Option<AdwPhase>,
    pub status: Option<AdwStatus>,
    pub auto_resolve: bool,
    pub auto_ship: bool,
    pub pr_number: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Build the initial record for a freshly triggered workflow.
    /// Phase and status start unset; the first phase executor sets both.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adw_id: impl Into<String>,
        issue_number: u64,
        issue_title: impl Into<String>,
        issue_body: impl Into<String>,
        issue_class: IssueClass,
        workflow_type: WorkflowType,
        auto_resolve: bool,
        auto_ship: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            adw_id: adw_id.into(),
            issue_number,
            issue_title: issue_title.into(),
            issue_body: issue_body.into(),
            issue_class,
            workflow_type,
            model_set: ModelSet::default(),
            branch_name: None,
            worktree_path: None,
            backend_port: None,
            frontend_port: None,
            plan_file: None,
            phase: None,
            status: None,
            auto_resolve,
            auto_ship,
            pr_number: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }
}

/// Partial update applied atomically by the store. Only `Some` fields change.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub phase: Option<AdwPhase>,
    pub status: Option<AdwStatus>,
    pub branch_name: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub backend_port: Option<u16>,
    pub frontend_port: Option<u16>,
    pub plan_file: Option<PathBuf>,
    pub model_set: Option<ModelSet>,
    pub pr_number: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatePatch {
    pub fn phase(phase: AdwPhase, status: AdwStatus) -> Self {
        Self {
            phase: Some(phase),
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Durable, query-by-id store for workflow records.
pub trait StateStore: Send + Sync {
    /// Persist a new record. Errors if the id already exists.
    fn create(&self, state: &WorkflowState) -> Result<(), WorkflowError>;

    /// Full read. Absence of a record is an explicit `NotFound` error.
    fn get(&self, adw_id: &str) -> Result<WorkflowState, WorkflowError>;

    /// Atomic read-modify-write of a partial update. Phase changes are
    /// validated against the forward sequence; set-once fields reject
    /// mutation after first assignment.
    fn update(&self, adw_id: &str, patch: StatePatch) -> Result<WorkflowState, WorkflowError>;
}

/// File-backed store: one pretty-printed JSON document per workflow id,
/// written through a temp file and renamed into place.
pub struct JsonStateStore {
    root: PathBuf,
}

impl JsonStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn state_path(&self, adw_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", adw_id))
    }

    fn write(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        fs::create_dir_all(&self.root).map_err(|e| WorkflowError::WriteFailed {
            adw_id: state.adw_id.clone(),
            source: e,
        })?;
        let json = serde_json::to_string_pretty(state)
            .context("Failed to serialize workflow state")
            .map_err(WorkflowError::Other)?;
        let path = self.state_path(&state.adw_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| WorkflowError::WriteFailed {
            adw_id: state.adw_id.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| WorkflowError::WriteFailed {
            adw_id: state.adw_id.clone(),
            source: e,
        })?;
        Ok(())
    }

    fn read(&self, adw_id: &str) -> Result<WorkflowState, WorkflowError> {
        let path = self.state_path(adw_id);
        if !path.exists() {
            return Err(WorkflowError::NotFound(adw_id.to_string()));
        }
        let content = fs::read_to_string(&path).map_err(|e| WorkflowError::ReadFailed {
            adw_id: adw_id.to_string(),
            source: e,
        })?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file {}", path.display()))
            .map_err(WorkflowError::Other)
    }
}

fn apply_patch(state: &mut WorkflowState, patch: StatePatch) -> Result<(), WorkflowError> {
    if let Some(to) = patch.phase
        && state.phase != Some(to)
    {
        if !AdwPhase::is_valid_transition(state.phase, to) {
            return Err(WorkflowError::InvalidTransition {
                from: state.phase.map(|p| p.as_str().to_string()),
                to: to.as_str().to_string(),
            });
        }
        state.phase = Some(to);
    }
    if let Some(status) = patch.status {
        state.status = Some(status);
    }
    // Set-once fields: first assignment wins, later writes of a different
    // value are a programming error surfaced loudly.
    if let Some(branch) = patch.branch_name {
        if let Some(existing) = &state.branch_name
            && existing != &branch
        {
            return Err(WorkflowError::Other(anyhow::anyhow!(
                "branch_name already set to {} for {}",
                existing,
                state.adw_id
            )));
        }
        state.branch_name = Some(branch);
    }
    if let Some(path) = patch.worktree_path {
        if let Some(existing) = &state.worktree_path
            && existing != &path
        {
            return Err(WorkflowError::Other(anyhow::anyhow!(
                "worktree_path already set for {}",
                state.adw_id
            )));
        }
        state.worktree_path = Some(path);
    }
    if let Some(port) = patch.backend_port {
        if let Some(existing) = state.backend_port
            && existing != port
        {
            return Err(WorkflowError::Other(anyhow::anyhow!(
                "backend_port already set for {}",
                state.adw_id
            )));
        }
        state.backend_port = Some(port);
    }
    if let Some(port) = patch.frontend_port {
        if let Some(existing) = state.frontend_port
            && existing != port
        {
            return Err(WorkflowError::Other(anyhow::anyhow!(
                "frontend_port already set for {}",
                state.adw_id
            )));
        }
        state.frontend_port = Some(port);
    }
    if let Some(plan) = patch.plan_file {
        state.plan_file = Some(plan);
    }
    if let Some(model_set) = patch.model_set {
        state.model_set = model_set;
    }
    if let Some(pr) = patch.pr_number {
        state.pr_number = Some(pr);
    }
    if let Some(at) = patch.completed_at {
        state.completed_at = Some(at);
    }
    state.updated_at = Utc::now();
    Ok(())
}

impl StateStore for JsonStateStore {
    fn create(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        if self.state_path(&state.adw_id).exists() {
            return Err(WorkflowError::AlreadyExists(state.adw_id.clone()));
        }
        self.write(state)
    }

    fn get(&self, adw_id: &str) -> Result<WorkflowState, WorkflowError> {
        self.read(adw_id)
    }

    fn update(&self, adw_id: &str, patch: StatePatch) -> Result<WorkflowState, WorkflowError> {
        let mut state = self.read(adw_id)?;
        apply_patch(&mut state, patch)?;
        self.write(&state)?;
        Ok(state)
    }
}
