// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The failover state machine: the request queue, the follow-primary
//! lock, primary discovery, the failover engine sweep, child tracking,
//! and peer sync (§4.3-§4.8). This is "the core, and hard part" the
//! supervisor is built around.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod child_registry;
pub mod connection_matrix;
pub mod error;
pub mod failover;
pub mod follow_primary_lock;
pub mod peer_sync;
pub mod primary_discovery;
pub mod queue;
pub mod shared_state;

pub use child_registry::{process_reaped, ChildRegistry, ReapAction};
pub use connection_matrix::{ConnectionMatrix, WorkerId};
pub use error::EngineError;
pub use failover::{FailoverConfig, FailoverEngine, RestartScope, SweepOutcome};
pub use follow_primary_lock::{FollowPrimaryLock, LockState};
pub use peer_sync::{reconcile, PeerRestartScope, PeerSyncOutcome};
pub use primary_discovery::{find_primary_node, find_primary_node_repeatedly, DiscoveryOutcome};
pub use queue::{QueueFull, RequestQueue, DEFAULT_QUEUE_CAPACITY};
pub use shared_state::SharedState;
