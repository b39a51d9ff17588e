//! Workflow identity and deterministic port allocation.
//!
//! Every workflow gets a short base-36 id that doubles as the join key for
//! state records, worktree paths, branch names and port assignment. Ports are
//! derived from the id by hashing, so a resumed workflow always lands on the
//! same pair.

use sha2::{Digest, Sha256};
use std::net::TcpListener;
use uuid::Uuid;

use crate::errors::WorkflowError;

const ID_LEN: usize = 8;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate an 8-character lowercase base-36 workflow id from random entropy.
///
/// Safe to embed in branch names, file paths and URLs. With 36^8 possible
/// values, collisions between concurrently active workflows are not a
/// practical concern.
pub fn generate_adw_id() -> String {
    let entropy = Uuid::new_v4();
    entropy
        .as_bytes()
        .iter()
        .take(ID_LEN)
        .map(|b| BASE36[(*b as usize) % BASE36.len()] as char)
        .collect()
}

/// Deterministically map a workflow id onto a (backend, frontend) port pair.
///
/// The id is hashed into `[0, max_slots)` and the slot offset is added to each
/// base port. The same id always yields the same pair, which is what makes
/// crash-resume work. More than `max_slots` concurrent workflows means slot
/// reuse; that is an accepted trade-off, not an error. A base close enough to
/// the top of the port space that the slot would overflow saturates at 65535.
pub fn ports_for(id: &str, backend_base: u16, frontend_base: u16, max_slots: u16) -> (u16, u16) {
    let slot = port_slot(id, max_slots);
    (
        backend_base.saturating_add(slot),
        frontend_base.saturating_add(slot),
    )
}

fn port_slot(id: &str, max_slots: u16) -> u16 {
    let digest = Sha256::digest(id.as_bytes());
    let mut value: u64 = 0;
    for byte in digest.iter().take(8) {
        value = (value << 8) | *byte as u64;
    }
    (value % max_slots.max(1) as u64) as u16
}

/// Check whether a port can be bound on localhost right now.
///
/// Binds and immediately releases. Every failure mode (in use, permission,
/// exhausted fds) is reported as unavailable; the caller cannot distinguish
/// and should not try.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Linear-probe from `start` for the first bindable port.
///
/// Returns `WorkflowError::NoPortsAvailable` after `max_attempts` probes, or
/// sooner if the probe window runs off the top of the port space. Each port
/// in the window is probed exactly once.
pub fn find_available_port(start: u16, max_attempts: u16) -> Result<u16, WorkflowError> {
    for offset in 0..max_attempts {
        let Some(port) = start.checked_add(offset) else {
            break;
        };
        if is_port_available(port) {
            return Ok(port);
        }
    }
    Err(WorkflowError::NoPortsAvailable {
        start,
        attempts: max_attempts,
    })
}
