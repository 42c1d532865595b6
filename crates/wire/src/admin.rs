// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-socket protocol spoken between `poolguardctl` and the
//! supervisor (§6's PCP-worker-facing surface). This crate owns the
//! request/response envelope and the queueing side; the RPC worker's
//! business logic itself is someone else's job (§1 non-goal).

use poolguard_core::{BackendId, BackendStatus, NodeSlot, Request, RequestFlags, RequestKind, Role};
use serde::{Deserialize, Serialize};

/// One line-delimited JSON request sent over the control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AdminRequest {
    /// `switchover` marks the degeneration as a planned switchover
    /// rather than a failure: the failover engine only considers a
    /// partial restart when this is set and none of `ids` is the
    /// current primary (§4.5).
    NodeDown { ids: Vec<BackendId>, switchover: bool },
    NodeUp { ids: Vec<BackendId> },
    Quarantine { ids: Vec<BackendId> },
    Promote { id: BackendId },
    CloseIdle,
    Status,
}

impl AdminRequest {
    /// Translate the admin-facing request into the engine's queue entry
    /// shape. `Status`/`CloseIdle` have no node-targeted form of their
    /// own beyond `CloseIdle`, which does carry a queue entry (it still
    /// needs to reach every worker); `Status` is answered directly by
    /// the daemon and never touches the queue.
    pub fn into_queue_entry(self) -> Option<Request> {
        match self {
            AdminRequest::NodeDown { ids, switchover } => {
                let flags = if switchover { RequestFlags::SWITCHOVER } else { RequestFlags::empty() };
                Some(Request::new(RequestKind::NodeDown, ids, flags))
            }
            AdminRequest::NodeUp { ids } => {
                Some(Request::new(RequestKind::NodeUp, ids, RequestFlags::empty()))
            }
            AdminRequest::Quarantine { ids } => Some(Request::new(
                RequestKind::NodeQuarantine,
                ids,
                RequestFlags::empty(),
            )),
            AdminRequest::Promote { id } => {
                Some(Request::new(RequestKind::Promote, vec![id], RequestFlags::empty()))
            }
            AdminRequest::CloseIdle => {
                Some(Request::new(RequestKind::CloseIdle, Vec::new(), RequestFlags::empty()))
            }
            AdminRequest::Status => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSnapshot {
    pub id: BackendId,
    pub host: String,
    pub port: u16,
    pub status: BackendStatus,
    pub role: Role,
    pub quarantine: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub backends: Vec<BackendSnapshot>,
    pub main_node_id: NodeSlot,
    pub primary_node_id: NodeSlot,
    pub switching: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdminResponse {
    Accepted,
    Rejected { reason: String },
    QueueFull,
    Status(StatusSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_down_translates_to_a_queue_entry() {
        let req = AdminRequest::NodeDown {
            ids: vec![BackendId(0)],
            switchover: false,
        };
        let entry = req.into_queue_entry().unwrap();
        assert_eq!(entry.kind, RequestKind::NodeDown);
        assert_eq!(entry.node_ids, vec![BackendId(0)]);
        assert!(!entry.flags.contains(RequestFlags::SWITCHOVER));
    }

    #[test]
    fn node_down_switchover_sets_the_flag() {
        let req = AdminRequest::NodeDown {
            ids: vec![BackendId(0)],
            switchover: true,
        };
        let entry = req.into_queue_entry().unwrap();
        assert!(entry.flags.contains(RequestFlags::SWITCHOVER));
    }

    #[test]
    fn status_has_no_queue_entry() {
        assert!(AdminRequest::Status.into_queue_entry().is_none());
    }

    #[test]
    fn admin_request_round_trips_through_json() {
        let req = AdminRequest::Promote { id: BackendId(2) };
        let json = serde_json::to_string(&req).unwrap();
        let back: AdminRequest = serde_json::from_str(&json).unwrap();
        matches!(back, AdminRequest::Promote { id } if id == BackendId(2));
    }
}
