// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process tracking and the reaper policy (§4.4). Pairs with
//! `poolguard_adapters::ChildSpawner`, which owns the actual OS-level
//! spawn/signal/wait calls; this module owns the bookkeeping and the
//! exit-kind → respawn-policy decision.

use parking_lot::Mutex;
use poolguard_adapters::ReapedExit;
use poolguard_core::{ChildRecord, ChildRole, ExitKind};
use std::collections::HashMap;

pub struct ChildRegistry {
    children: Mutex<HashMap<u32, ChildRecord>>,
}

impl Default for ChildRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, pid: u32, started_at_ms: u64, role: ChildRole) {
        self.children.lock().insert(pid, ChildRecord::new(pid, started_at_ms, role));
    }

    pub fn remove(&self, pid: u32) -> Option<ChildRecord> {
        self.children.lock().remove(&pid)
    }

    pub fn role_of(&self, pid: u32) -> Option<ChildRole> {
        self.children.lock().get(&pid).map(|c| c.role)
    }

    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children.lock().keys().copied().collect()
    }

    /// Mark every tracked child for cooperative restart at its next
    /// idle point (§3 `need_to_restart`).
    pub fn request_restart_all(&self) {
        for child in self.children.lock().values() {
            child.request_restart();
        }
    }
}

fn classify_exit_kind(exit: ReapedExit) -> ExitKind {
    match exit {
        ReapedExit::ExitedFatal => ExitKind::Fatal,
        ReapedExit::ExitedNoRestart => ExitKind::NoRestart,
        ReapedExit::ExitedOther(_) | ReapedExit::Signaled(_) => ExitKind::Respawn,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapAction {
    /// FATAL exit: supervisor shuts down.
    Shutdown,
    /// NO_RESTART exit: leave it gone.
    NoRespawn,
    /// Respawn the given role.
    Respawn(ChildRole),
    /// The watchdog child exited abnormally: flag cleanup needed.
    CleanupRequired(ChildRole),
}

/// Drain the spawner's reaped-pid list and classify each exit against
/// policy (§4.4 reaper). While `exiting` or `switching`, reaped pids are
/// just cleared — never respawned.
pub fn process_reaped(
    registry: &ChildRegistry,
    reaped: Vec<(u32, ReapedExit)>,
    exiting: bool,
    switching: bool,
) -> Vec<ReapAction> {
    let mut actions = Vec::new();
    for (pid, exit) in reaped {
        let Some(record) = registry.remove(pid) else {
            continue;
        };
        let kind = classify_exit_kind(exit);

        if exiting || switching {
            continue;
        }

        match kind {
            ExitKind::Fatal => actions.push(ReapAction::Shutdown),
            ExitKind::NoRestart => actions.push(ReapAction::NoRespawn),
            ExitKind::Respawn => {
                if record.role == ChildRole::Watchdog && matches!(exit, ReapedExit::Signaled(_)) {
                    actions.push(ReapAction::CleanupRequired(record.role));
                }
                actions.push(ReapAction::Respawn(record.role));
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_exit_yields_shutdown() {
        let registry = ChildRegistry::new();
        registry.register(100, 0, ChildRole::Worker(0));
        let actions = process_reaped(&registry, vec![(100, ReapedExit::ExitedFatal)], false, false);
        assert_eq!(actions, vec![ReapAction::Shutdown]);
        assert!(registry.is_empty());
    }

    #[test]
    fn no_restart_exit_yields_no_respawn() {
        let registry = ChildRegistry::new();
        registry.register(100, 0, ChildRole::Worker(0));
        let actions = process_reaped(&registry, vec![(100, ReapedExit::ExitedNoRestart)], false, false);
        assert_eq!(actions, vec![ReapAction::NoRespawn]);
    }

    #[test]
    fn signal_exit_respawns_unless_exiting() {
        let registry = ChildRegistry::new();
        registry.register(100, 0, ChildRole::Worker(3));
        let actions = process_reaped(&registry, vec![(100, ReapedExit::Signaled(9))], false, false);
        assert_eq!(actions, vec![ReapAction::Respawn(ChildRole::Worker(3))]);
    }

    #[test]
    fn exiting_suppresses_respawn() {
        let registry = ChildRegistry::new();
        registry.register(100, 0, ChildRole::Worker(3));
        let actions = process_reaped(&registry, vec![(100, ReapedExit::Signaled(9))], true, false);
        assert!(actions.is_empty());
        assert!(registry.is_empty(), "pid is still cleared even while exiting");
    }

    #[test]
    fn watchdog_signal_exit_requests_cleanup_and_respawn() {
        let registry = ChildRegistry::new();
        registry.register(100, 0, ChildRole::Watchdog);
        let actions = process_reaped(&registry, vec![(100, ReapedExit::Signaled(11))], false, false);
        assert_eq!(
            actions,
            vec![ReapAction::CleanupRequired(ChildRole::Watchdog), ReapAction::Respawn(ChildRole::Watchdog)]
        );
    }
}
