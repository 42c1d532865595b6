// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The follow-primary advisory lock (§4.7, §9 "dual primary/remote
//! lock"). Serializes follow-primary execution against primary
//! re-discovery, with a pending-transfer state for remote requests
//! arriving while the local holder still has it.

use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Free,
    HeldLocal,
    HeldRemote,
    /// Locally held, but a remote acquire is waiting to take over on
    /// local release.
    HeldLocalRemotePending,
}

pub struct FollowPrimaryLock {
    state: Mutex<LockState>,
}

impl Default for FollowPrimaryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl FollowPrimaryLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::Free),
        }
    }

    pub fn state(&self) -> LockState {
        *self.state.lock()
    }

    /// Local acquire, non-blocking: fails if the lock is held in any form.
    pub fn try_acquire_local(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LockState::Free {
            *state = LockState::HeldLocal;
            true
        } else {
            false
        }
    }

    /// Local acquire, blocking: spin-sleeps until free. `sleep_fn` is
    /// injected so tests don't need a real 1-second sleep per attempt.
    pub async fn acquire_local_blocking<F, Fut>(&self, mut sleep_fn: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            if self.try_acquire_local() {
                return;
            }
            sleep_fn().await;
        }
    }

    /// Real-clock convenience wrapper: spin-sleeps on a 1-second cadence.
    pub async fn acquire_local_blocking_realtime(&self) {
        self.acquire_local_blocking(|| tokio::time::sleep(Duration::from_secs(1)))
            .await;
    }

    /// Remote acquire: fails immediately if already held by anyone; if
    /// held locally, marks a pending transfer instead of failing flatly
    /// (the caller still observes failure now, but release will hand it
    /// over).
    pub fn try_acquire_remote(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            LockState::Free => {
                *state = LockState::HeldRemote;
                true
            }
            LockState::HeldLocal => {
                *state = LockState::HeldLocalRemotePending;
                false
            }
            LockState::HeldRemote | LockState::HeldLocalRemotePending => false,
        }
    }

    /// Local release: if a remote acquire is pending, transfer ownership
    /// to it rather than freeing the lock outright.
    pub fn release_local(&self) {
        let mut state = self.state.lock();
        *state = match *state {
            LockState::HeldLocalRemotePending => LockState::HeldRemote,
            _ => LockState::Free,
        };
    }

    /// Remote release: only clears the lock if it is currently held
    /// remotely; a local-holder release path doesn't go through here.
    pub fn release_remote(&self) {
        let mut state = self.state.lock();
        if *state == LockState::HeldRemote {
            *state = LockState::Free;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_acquire_then_release_restores_free() {
        let lock = FollowPrimaryLock::new();
        assert!(lock.try_acquire_local());
        assert_eq!(lock.state(), LockState::HeldLocal);
        lock.release_local();
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn nonblocking_local_acquire_fails_while_held() {
        let lock = FollowPrimaryLock::new();
        assert!(lock.try_acquire_local());
        assert!(!lock.try_acquire_local());
    }

    #[test]
    fn remote_acquire_against_local_holder_sets_pending_and_reports_failure() {
        let lock = FollowPrimaryLock::new();
        assert!(lock.try_acquire_local());
        assert!(!lock.try_acquire_remote());
        assert_eq!(lock.state(), LockState::HeldLocalRemotePending);
    }

    #[test]
    fn local_release_with_pending_transfers_to_remote() {
        let lock = FollowPrimaryLock::new();
        lock.try_acquire_local();
        lock.try_acquire_remote();
        lock.release_local();
        assert_eq!(lock.state(), LockState::HeldRemote);
    }

    #[test]
    fn remote_release_only_clears_when_held_remotely() {
        let lock = FollowPrimaryLock::new();
        lock.try_acquire_local();
        lock.release_remote();
        assert_eq!(lock.state(), LockState::HeldLocal, "release_remote must not clear a local hold");
        lock.release_local();
        lock.try_acquire_remote();
        lock.release_remote();
        assert_eq!(lock.state(), LockState::Free);
    }

    #[tokio::test]
    async fn blocking_acquire_waits_for_release() {
        let lock = std::sync::Arc::new(FollowPrimaryLock::new());
        assert!(lock.try_acquire_local());

        let lock2 = lock.clone();
        let waiter = tokio::spawn(async move {
            lock2.acquire_local_blocking(tokio::task::yield_now).await;
        });

        tokio::task::yield_now().await;
        lock.release_local();
        waiter.await.unwrap();
        assert_eq!(lock.state(), LockState::HeldLocal);
    }
}
