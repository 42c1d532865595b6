// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replication topology mode. Drives which validity predicate and which
//! restart-scope rules apply (§4.5, §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMode {
    /// Streaming (or logical) replication: primary discovery, follow-primary
    /// and the avoid-rediscovery shortcuts all apply.
    Streaming,
    /// Raw mode: no replication-aware behavior; `VALID_BACKEND_RAW` is used
    /// in place of `VALID_BACKEND` for failback eligibility.
    Raw,
}

impl ReplicationMode {
    pub fn is_streaming(self) -> bool {
        matches!(self, ReplicationMode::Streaming)
    }

    pub fn is_raw(self) -> bool {
        matches!(self, ReplicationMode::Raw)
    }
}
