// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fixed-size backend array and the predicates/queries the failover
//! engine and primary discovery run against it (§3, §4.5, §4.6).

use crate::backend::{BackendEntry, BackendStatus, Role};
use crate::ids::BackendId;
use crate::mode::ReplicationMode;

#[derive(Debug, Clone)]
pub struct BackendTable {
    entries: Vec<BackendEntry>,
}

impl BackendTable {
    pub fn new(entries: Vec<BackendEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: BackendId) -> Option<&BackendEntry> {
        self.entries.get(id.get())
    }

    pub fn get_mut(&mut self, id: BackendId) -> Option<&mut BackendEntry> {
        self.entries.get_mut(id.get())
    }

    pub fn ids(&self) -> impl Iterator<Item = BackendId> + '_ {
        (0..self.entries.len()).map(BackendId)
    }

    pub fn in_range(&self, id: BackendId) -> bool {
        id.get() < self.entries.len()
    }

    /// `VALID_BACKEND` / `VALID_BACKEND_RAW` depending on mode.
    pub fn is_valid(&self, id: BackendId, mode: ReplicationMode) -> bool {
        match self.get(id) {
            Some(entry) if mode.is_raw() => entry.is_valid_raw(),
            Some(entry) => entry.is_valid(),
            None => false,
        }
    }

    /// `check_all_backend_down()`.
    pub fn all_down(&self) -> bool {
        self.entries
            .iter()
            .all(|e| matches!(e.status, BackendStatus::Down) || matches!(e.status, BackendStatus::Unused))
    }

    /// `get_next_main_node()`: first entry passing the mode-appropriate
    /// validity predicate, or `None` if no backend qualifies.
    pub fn next_main_node(&self, mode: ReplicationMode) -> Option<BackendId> {
        self.ids().find(|&id| self.is_valid(id, mode))
    }

    /// Mark a backend down, stamping the change time. Returns `false` if the
    /// status was already `Down` (caller uses this to detect no-op sweeps).
    pub fn mark_down(&mut self, id: BackendId, epoch_ms: u64) -> bool {
        let Some(entry) = self.get_mut(id) else {
            return false;
        };
        if matches!(entry.status, BackendStatus::Down) {
            return false;
        }
        entry.status = BackendStatus::Down;
        entry.status_changed_at_ms = epoch_ms;
        true
    }

    /// Mark a backend connect-wait (start of a failback), stamping the
    /// change time.
    pub fn mark_connect_wait(&mut self, id: BackendId, epoch_ms: u64) {
        if let Some(entry) = self.get_mut(id) {
            entry.status = BackendStatus::ConnectWait;
            entry.status_changed_at_ms = epoch_ms;
        }
    }

    pub fn set_quarantine(&mut self, id: BackendId, value: bool) {
        if let Some(entry) = self.get_mut(id) {
            entry.quarantine = value;
        }
    }

    pub fn set_role(&mut self, id: BackendId, role: Role) {
        if let Some(entry) = self.get_mut(id) {
            entry.role = role;
        }
    }

    /// Demote a backend to standby in memory ahead of a fresh primary
    /// discovery (§12: the old primary's role is reset before
    /// `find_primary_node_repeatedly` decides who is primary next).
    pub fn demote(&mut self, id: BackendId) {
        self.set_role(id, Role::Standby);
    }

    pub fn touch(&mut self, id: BackendId, epoch_ms: u64) {
        if let Some(entry) = self.get_mut(id) {
            entry.status_changed_at_ms = epoch_ms;
        }
    }

    pub fn status_vector(&self) -> Vec<BackendStatus> {
        self.entries.iter().map(|e| e.status).collect()
    }

    pub fn primary_candidates(&self, mode: ReplicationMode) -> Vec<BackendId> {
        self.ids()
            .filter(|&id| self.is_valid(id, mode))
            .filter(|&id| self.get(id).map(|e| e.role == Role::Primary).unwrap_or(false))
            .collect()
    }
}
