//! Request gate — one active workflow per client.
//!
//! Tested at workflow entry; conflicts surface to the client as
//! `analysis_error {message: "busy"}` without touching any other state. The
//! guard releases on drop so every exit path (success, failure, disconnect)
//! frees the slot.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Default)]
pub struct RequestGate {
    active: Mutex<HashSet<String>>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the client's slot. Returns a guard on success; `None`
    /// means a workflow is already running for this client.
    pub fn try_acquire(self: &Arc<Self>, client_id: &str) -> Option<GateGuard> {
        let mut active = self.active.lock();
        if active.contains(client_id) {
            return None;
        }
        active.insert(client_id.to_string());
        Some(GateGuard {
            gate: Arc::clone(self),
            client_id: client_id.to_string(),
        })
    }

    pub fn is_active(&self, client_id: &str) -> bool {
        self.active.lock().contains(client_id)
    }

    fn release(&self, client_id: &str) {
        self.active.lock().remove(client_id);
    }
}

/// Holds the client's slot; dropping it releases the gate.
pub struct GateGuard {
    gate: Arc<RequestGate>,
    client_id: String,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.release(&self.client_id);
    }
}
