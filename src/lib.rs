pub mod agent;
pub mod branch;
pub mod config;
pub mod errors;
pub mod git;
pub mod id;
pub mod orchestrator;
pub mod phases;
pub mod retry;
pub mod state;
pub mod tracker;
pub mod worktree;
