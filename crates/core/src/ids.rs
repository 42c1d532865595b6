// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small index newtypes. Backends are a fixed-size array indexed by id
//! (§3 `BackendEntry`), so `BackendId` is a plain `usize` wrapper rather
//! than a generated identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into the backend table. Valid range is `0..num_backends`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BackendId(pub usize);

impl BackendId {
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for BackendId {
    fn from(v: usize) -> Self {
        BackendId(v)
    }
}

/// `Req_info->primary_node_id` / `main_node_id` use -2 (not yet discovered)
/// and -1 (no primary/main) as sentinels alongside valid backend ids. This
/// models that without resorting to a raw `i64` sprinkled through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeSlot {
    /// No discovery attempt has run yet (initial state, -2 in the original).
    Undiscovered,
    /// Discovery ran and found nothing usable (-1 in the original).
    None,
    /// A concrete backend.
    Node(BackendId),
}

impl NodeSlot {
    pub fn node(self) -> Option<BackendId> {
        match self {
            NodeSlot::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_node(self, id: BackendId) -> bool {
        matches!(self, NodeSlot::Node(n) if n == id)
    }
}

impl fmt::Display for NodeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeSlot::Undiscovered => write!(f, "undiscovered"),
            NodeSlot::None => write!(f, "none"),
            NodeSlot::Node(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_slot_distinguishes_sentinels_from_nodes() {
        assert_eq!(NodeSlot::Node(BackendId(0)).node(), Some(BackendId(0)));
        assert_eq!(NodeSlot::None.node(), None);
        assert_eq!(NodeSlot::Undiscovered.node(), None);
        assert!(NodeSlot::Node(BackendId(2)).is_node(BackendId(2)));
        assert!(!NodeSlot::Node(BackendId(2)).is_node(BackendId(3)));
    }
}
