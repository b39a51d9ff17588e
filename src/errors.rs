//! Typed error hierarchy for the ADW orchestrator.
//!
//! Two top-level enums cover the fallible subsystems:
//! - `GitError` — local repository and remote push failures
//! - `WorkflowError` — state store and workflow lifecycle failures
//!
//! Phase executors report outcomes through `PhaseResult` rather than errors;
//! only their underlying services speak these types.

use thiserror::Error;

/// Errors from git operations against a workflow's working directory.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to open git repository at {path}: {source}")]
    OpenFailed {
        path: std::path::PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("Branch {0} already exists")]
    BranchExists(String),

    #[error("Push of branch {branch} failed after {attempts} attempts: {message}")]
    PushFailed {
        branch: String,
        attempts: u32,
        message: String,
    },

    #[error("Git command failed: {0}")]
    Command(String),

    #[error(transparent)]
    Git2(#[from] git2::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the state store and workflow lifecycle.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow {0} not found in state store")]
    NotFound(String),

    #[error("Workflow {0} already exists in state store")]
    AlreadyExists(String),

    #[error("Invalid phase transition from {from:?} to {to}")]
    InvalidTransition { from: Option<String>, to: String },

    #[error("Workflow {adw_id} is terminal ({status}); no further phases may run")]
    Terminal { adw_id: String, status: String },

    #[error("No ports available after probing {attempts} ports from {start}")]
    NoPortsAvailable { start: u16, attempts: u16 },

    #[error("Failed to read state for {adw_id}: {source}")]
    ReadFailed {
        adw_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state for {adw_id}: {source}")]
    WriteFailed {
        adw_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
