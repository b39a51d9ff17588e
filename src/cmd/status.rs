//! `status`: print a workflow's durable record.

use anyhow::{Context, Result};

use adw::config::AdwConfig;
use adw::state::{JsonStateStore, StateStore};

pub fn cmd_status(config: AdwConfig, adw_id: &str) -> Result<()> {
    let store = JsonStateStore::new(config.state_dir());
    let state = store
        .get(adw_id)
        .with_context(|| format!("Failed to load workflow {}", adw_id))?;
    let json = serde_json::to_string_pretty(&state).context("Failed to render workflow state")?;
    println!("{}", json);
    Ok(())
}
