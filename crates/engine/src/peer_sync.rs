// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer sync (§4.8): catching up backend status from the watchdog
//! cluster's leader when this node just became standby, or when the
//! leader signals it ran a failover that needs a resync.

use crate::error::EngineError;
use crate::shared_state::SharedState;
use poolguard_adapters::{LeaderStatus, Watchdog};
use poolguard_core::{BackendId, BackendStatus, NodeSlot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRestartScope {
    None,
    Partial(Vec<BackendId>),
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSyncOutcome {
    pub restart: PeerRestartScope,
    pub down_list: Vec<BackendId>,
}

/// Pull the leader's authoritative view and reconcile local state
/// against it.
pub async fn reconcile(
    shared: &SharedState,
    watchdog: &dyn Watchdog,
    epoch_ms: u64,
) -> Result<PeerSyncOutcome, EngineError> {
    let leader = match watchdog.get_pg_backend_status_from_leader().await {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(error = %e, "peer sync: leader unreachable, keeping local state");
            return Ok(PeerSyncOutcome {
                restart: PeerRestartScope::None,
                down_list: Vec::new(),
            });
        }
    };

    let mut down_list = Vec::new();
    let mut primary_changed = false;

    {
        let mut table = shared.table.lock();
        for (idx, &leader_status) in leader.status.iter().enumerate() {
            let id = BackendId(idx);
            if !table.in_range(id) {
                continue;
            }
            table.set_quarantine(id, false);

            let local_status = table.get(id).map(|e| e.status);
            match (leader_status, local_status) {
                (BackendStatus::Down, Some(local)) if local != BackendStatus::Down => {
                    table.mark_down(id, epoch_ms);
                    down_list.push(id);
                }
                (BackendStatus::Up, Some(BackendStatus::Down))
                | (BackendStatus::ConnectWait, Some(BackendStatus::Down)) => {
                    table.mark_connect_wait(id, epoch_ms);
                }
                _ => {}
            }
        }

        let leader_primary = leader.primary_node_id.map(BackendId);
        let local_primary = shared.primary_node().node();
        if leader_primary != local_primary {
            if let Some(candidate) = leader_primary {
                let locally_down = table.get(candidate).map(|e| e.status == BackendStatus::Down).unwrap_or(true);
                if !locally_down {
                    shared.set_primary_node(NodeSlot::Node(candidate));
                    primary_changed = true;
                }
            } else {
                shared.set_primary_node(NodeSlot::None);
                primary_changed = true;
            }
        }
    }

    shared.recompute_main_node();

    let restart = if primary_changed || !shared.mode.is_streaming() {
        PeerRestartScope::Full
    } else if !down_list.is_empty() {
        PeerRestartScope::Partial(down_list.clone())
    } else {
        PeerRestartScope::None
    };

    Ok(PeerSyncOutcome { restart, down_list })
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolguard_core::{BackendEntry, ReplicationMode};

    fn state_with(n: usize) -> SharedState {
        let entries = (0..n)
            .map(|i| {
                let mut e = BackendEntry::new(format!("h{i}"), 5432, "/d");
                e.status = BackendStatus::Up;
                e
            })
            .collect();
        SharedState::new(poolguard_core::BackendTable::new(entries), ReplicationMode::Streaming)
    }

    #[tokio::test]
    async fn leader_down_triggers_partial_restart_on_down_list() {
        let state = state_with(3);
        state.set_primary_node(NodeSlot::Node(BackendId(1)));
        let watchdog = poolguard_adapters::FakeWatchdog::new();
        watchdog.set_leader_status(LeaderStatus {
            node_name: "leader".into(),
            node_count: 3,
            primary_node_id: Some(1),
            status: vec![BackendStatus::Down, BackendStatus::Up, BackendStatus::Up],
        });

        let outcome = reconcile(&state, &watchdog, 42).await.unwrap();
        assert_eq!(outcome.down_list, vec![BackendId(0)]);
        assert_eq!(outcome.restart, PeerRestartScope::Partial(vec![BackendId(0)]));
    }

    #[tokio::test]
    async fn primary_change_forces_full_restart() {
        let state = state_with(2);
        state.set_primary_node(NodeSlot::Node(BackendId(0)));
        let watchdog = poolguard_adapters::FakeWatchdog::new();
        watchdog.set_leader_status(LeaderStatus {
            node_name: "leader".into(),
            node_count: 2,
            primary_node_id: Some(1),
            status: vec![BackendStatus::Up, BackendStatus::Up],
        });

        let outcome = reconcile(&state, &watchdog, 1).await.unwrap();
        assert_eq!(outcome.restart, PeerRestartScope::Full);
        assert_eq!(state.primary_node(), NodeSlot::Node(BackendId(1)));
    }

    #[tokio::test]
    async fn unreachable_leader_keeps_local_state() {
        let state = state_with(1);
        let watchdog = poolguard_adapters::FakeWatchdog::new();
        let outcome = reconcile(&state, &watchdog, 1).await.unwrap();
        assert_eq!(outcome.restart, PeerRestartScope::None);
    }
}
