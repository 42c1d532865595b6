// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The watchdog cluster interface (§6 "Watchdog interface consumed").
//! Quorum/membership is explicitly out of scope (§1); this crate only
//! owns the shape of the calls the engine makes against it.

use async_trait::async_trait;
use poolguard_core::BackendStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Leader,
    Standby,
    Initializing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumState {
    Quorate,
    NotQuorate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResource {
    FollowPrimary,
}

#[derive(Debug, Clone)]
pub struct LeaderStatus {
    pub node_name: String,
    pub node_count: usize,
    pub primary_node_id: Option<usize>,
    pub status: Vec<BackendStatus>,
}

#[async_trait]
pub trait Watchdog: Send + Sync + 'static {
    async fn failover_start(&self);
    async fn failover_end(&self);
    async fn get_pg_backend_status_from_leader(&self) -> Result<LeaderStatus, WatchdogError>;
    async fn get_local_state(&self) -> LocalState;
    async fn get_quorum_state(&self) -> QuorumState;
    /// Request the named resource be locked on every standby peer.
    /// Returns `false` if a peer already holds it (§4.7 remote-acquire
    /// rules are enforced on the peer side; this call just reports the
    /// outcome it was given).
    async fn lock_standby(&self, resource: LockResource) -> Result<bool, WatchdogError>;
    async fn unlock_standby(&self, resource: LockResource) -> Result<(), WatchdogError>;
    async fn set_cleanup_needed(&self);
}

/// Real implementation for a deployment with no peer watchdog cluster
/// configured: this node is always the leader, the lock always grants
/// locally, and there is no leader to ask for remote backend status
/// (§6: the quorum/membership protocol itself is someone else's job —
/// this is what "no peers" looks like from the engine's point of view).
#[derive(Debug, Default)]
pub struct StandaloneWatchdog {
    lock_held: std::sync::atomic::AtomicBool,
}

impl StandaloneWatchdog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Watchdog for StandaloneWatchdog {
    async fn failover_start(&self) {}

    async fn failover_end(&self) {}

    async fn get_pg_backend_status_from_leader(&self) -> Result<LeaderStatus, WatchdogError> {
        Err(WatchdogError::PeerUnreachable("no watchdog peers configured".into()))
    }

    async fn get_local_state(&self) -> LocalState {
        LocalState::Leader
    }

    async fn get_quorum_state(&self) -> QuorumState {
        QuorumState::Quorate
    }

    async fn lock_standby(&self, _resource: LockResource) -> Result<bool, WatchdogError> {
        use std::sync::atomic::Ordering;
        Ok(self
            .lock_held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }

    async fn unlock_standby(&self, _resource: LockResource) -> Result<(), WatchdogError> {
        self.lock_held.store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn set_cleanup_needed(&self) {}
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    struct FakeWatchdogState {
        failover_start_calls: u32,
        failover_end_calls: u32,
        cleanup_needed_calls: u32,
        lock_held: bool,
    }

    #[derive(Clone)]
    pub struct FakeWatchdog {
        state: Arc<Mutex<FakeWatchdogState>>,
        local_state: Arc<Mutex<LocalState>>,
        quorum: Arc<Mutex<QuorumState>>,
        leader_status: Arc<Mutex<Option<LeaderStatus>>>,
    }

    impl Default for FakeWatchdog {
        fn default() -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeWatchdogState::default())),
                local_state: Arc::new(Mutex::new(LocalState::Leader)),
                quorum: Arc::new(Mutex::new(QuorumState::Quorate)),
                leader_status: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl FakeWatchdog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_local_state(&self, s: LocalState) {
            *self.local_state.lock() = s;
        }

        pub fn set_leader_status(&self, status: LeaderStatus) {
            *self.leader_status.lock() = Some(status);
        }

        pub fn failover_start_calls(&self) -> u32 {
            self.state.lock().failover_start_calls
        }

        pub fn failover_end_calls(&self) -> u32 {
            self.state.lock().failover_end_calls
        }
    }

    #[async_trait]
    impl Watchdog for FakeWatchdog {
        async fn failover_start(&self) {
            self.state.lock().failover_start_calls += 1;
        }

        async fn failover_end(&self) {
            self.state.lock().failover_end_calls += 1;
        }

        async fn get_pg_backend_status_from_leader(&self) -> Result<LeaderStatus, WatchdogError> {
            self.leader_status
                .lock()
                .clone()
                .ok_or_else(|| WatchdogError::PeerUnreachable("no leader scripted".into()))
        }

        async fn get_local_state(&self) -> LocalState {
            *self.local_state.lock()
        }

        async fn get_quorum_state(&self) -> QuorumState {
            *self.quorum.lock()
        }

        async fn lock_standby(&self, _resource: LockResource) -> Result<bool, WatchdogError> {
            let mut state = self.state.lock();
            if state.lock_held {
                return Ok(false);
            }
            state.lock_held = true;
            Ok(true)
        }

        async fn unlock_standby(&self, _resource: LockResource) -> Result<(), WatchdogError> {
            self.state.lock().lock_held = false;
            Ok(())
        }

        async fn set_cleanup_needed(&self) {
            self.state.lock().cleanup_needed_calls += 1;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeWatchdog;
