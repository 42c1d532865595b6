// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-queue entry shape (§3 `RequestQueue`, §6 "child request queue
//! entry"). The queue itself (ring buffer + bound) lives in
//! `poolguard-engine`; this crate only owns the entry's data shape so
//! `poolguard-wire` can serialize the same type the engine consumes.

use crate::ids::BackendId;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    NodeUp,
    NodeDown,
    NodeQuarantine,
    Promote,
    CloseIdle,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RequestFlags: u8 {
        /// This degeneration is a switchover: avoid full restart when the
        /// target isn't the primary (§4.5 restart-scope decision).
        const SWITCHOVER = 0b0000_0001;
        /// Request has been confirmed by a health check, not just proposed.
        const CONFIRMED = 0b0000_0010;
        /// NODE_UP is a post-quarantine resynthesis, not an operator failback.
        const UPDATE_ONLY = 0b0000_0100;
        /// Request originated from the watchdog cluster rather than locally.
        const FROM_WATCHDOG = 0b0000_1000;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub kind: RequestKind,
    pub node_ids: Vec<BackendId>,
    pub flags: RequestFlags,
}

impl Request {
    pub fn new(kind: RequestKind, node_ids: Vec<BackendId>, flags: RequestFlags) -> Self {
        Self {
            kind,
            node_ids,
            flags,
        }
    }

    /// The queue's legacy single-node accessor (`node_id_set[0]` in the
    /// original): most request kinds only ever carry one id.
    pub fn primary_target(&self) -> Option<BackendId> {
        self.node_ids.first().copied()
    }
}
