// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-process replacement for the shared-memory segment of §4.1
//! (per the §9 REDESIGN FLAGS: no real shared memory, no named
//! semaphores — a single record behind ordinary locks, owned explicitly
//! rather than reached through an ambient singleton).

use crate::follow_primary_lock::FollowPrimaryLock;
use crate::queue::RequestQueue;
use parking_lot::Mutex;
use poolguard_core::{BackendTable, NodeSlot, ReplicationMode};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct SharedState {
    pub table: Mutex<BackendTable>,
    pub main_node_id: Mutex<NodeSlot>,
    pub primary_node_id: Mutex<NodeSlot>,
    pub follow_primary_lock: FollowPrimaryLock,
    pub follow_primary_ongoing: AtomicBool,
    pub queue: RequestQueue,
    pub mode: ReplicationMode,
    switching: AtomicBool,
}

impl SharedState {
    pub fn new(table: BackendTable, mode: ReplicationMode) -> Self {
        Self {
            table: Mutex::new(table),
            main_node_id: Mutex::new(NodeSlot::Undiscovered),
            primary_node_id: Mutex::new(NodeSlot::Undiscovered),
            follow_primary_lock: FollowPrimaryLock::new(),
            follow_primary_ongoing: AtomicBool::new(false),
            queue: RequestQueue::default(),
            mode,
            switching: AtomicBool::new(false),
        }
    }

    /// CAS `switching` false->true. Returns `false` if a sweep is
    /// already running (§4.5 entry condition, §8 invariant 2).
    pub fn try_begin_switching(&self) -> bool {
        self.switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_switching(&self) -> bool {
        self.switching.load(Ordering::SeqCst)
    }

    pub fn end_switching(&self) {
        self.switching.store(false, Ordering::SeqCst);
    }

    pub fn recompute_main_node(&self) {
        let table = self.table.lock();
        let next = table.next_main_node(self.mode);
        *self.main_node_id.lock() = match next {
            Some(id) => NodeSlot::Node(id),
            None => NodeSlot::None,
        };
    }

    pub fn main_node(&self) -> NodeSlot {
        *self.main_node_id.lock()
    }

    pub fn primary_node(&self) -> NodeSlot {
        *self.primary_node_id.lock()
    }

    pub fn set_primary_node(&self, slot: NodeSlot) {
        *self.primary_node_id.lock() = slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolguard_core::BackendEntry;

    #[test]
    fn switching_cas_is_exclusive() {
        let state = SharedState::new(BackendTable::new(vec![BackendEntry::new("a", 5432, "/d")]), ReplicationMode::Streaming);
        assert!(state.try_begin_switching());
        assert!(!state.try_begin_switching());
        state.end_switching();
        assert!(state.try_begin_switching());
    }

    #[test]
    fn recompute_main_node_skips_down_backends() {
        let mut table = BackendTable::new(vec![
            BackendEntry::new("a", 5432, "/d"),
            BackendEntry::new("b", 5432, "/d"),
        ]);
        table.mark_down(poolguard_core::BackendId(0), 1);
        let state = SharedState::new(table, ReplicationMode::Streaming);
        state.recompute_main_node();
        assert_eq!(state.main_node(), NodeSlot::Node(poolguard_core::BackendId(1)));
    }
}
