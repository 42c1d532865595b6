// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The read-only view the failover engine consumes to decide partial
//! restart scope (§3 `ConnectionSlot`): which worker each pooled
//! connection is currently load-balancing against. Ownership of the
//! pool slots themselves belongs to the worker children (§1 non-goal);
//! this is just the routing fact the engine needs to read.

use parking_lot::RwLock;
use poolguard_core::BackendId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub usize);

#[derive(Default)]
pub struct ConnectionMatrix {
    routes: RwLock<HashMap<WorkerId, BackendId>>,
}

impl ConnectionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or clear, via a fresh call) which backend `worker` is
    /// currently load-balancing against.
    pub fn set_route(&self, worker: WorkerId, backend: BackendId) {
        self.routes.write().insert(worker, backend);
    }

    pub fn clear_route(&self, worker: WorkerId) {
        self.routes.write().remove(&worker);
    }

    /// Workers whose active pool slot targets `backend` — the partial
    /// restart candidate set for a SWITCHOVER-flagged degeneration.
    pub fn workers_routed_to(&self, backend: BackendId) -> Vec<WorkerId> {
        self.routes
            .read()
            .iter()
            .filter(|(_, &b)| b == backend)
            .map(|(&w, _)| w)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_workers_routed_to_the_target_backend() {
        let matrix = ConnectionMatrix::new();
        matrix.set_route(WorkerId(0), BackendId(1));
        matrix.set_route(WorkerId(1), BackendId(0));
        matrix.set_route(WorkerId(2), BackendId(1));
        let mut routed = matrix.workers_routed_to(BackendId(1));
        routed.sort_by_key(|w| w.0);
        assert_eq!(routed, vec![WorkerId(0), WorkerId(2)]);
    }
}
