// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process roles and records (§3 `ChildRecord`, §4.4 reaper).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildRole {
    Worker(usize),
    Pcp,
    WorkerSingleton,
    HealthCheck(usize),
    Follow,
    Watchdog,
    WdLifecheck,
    Logger,
}

impl ChildRole {
    pub fn label(&self) -> String {
        match self {
            ChildRole::Worker(i) => format!("worker[{i}]"),
            ChildRole::Pcp => "pcp".to_string(),
            ChildRole::WorkerSingleton => "worker-singleton".to_string(),
            ChildRole::HealthCheck(i) => format!("health_check[{i}]"),
            ChildRole::Follow => "follow".to_string(),
            ChildRole::Watchdog => "watchdog".to_string(),
            ChildRole::WdLifecheck => "wd_lifecheck".to_string(),
            ChildRole::Logger => "logger".to_string(),
        }
    }

    /// Stable per-family key, with the per-instance index stripped —
    /// every `Worker(i)` shares one configured command, as does every
    /// `HealthCheck(i)`.
    pub fn family_key(&self) -> &'static str {
        match self {
            ChildRole::Worker(_) => "worker",
            ChildRole::Pcp => "pcp",
            ChildRole::WorkerSingleton => "worker-singleton",
            ChildRole::HealthCheck(_) => "health_check",
            ChildRole::Follow => "follow",
            ChildRole::Watchdog => "watchdog",
            ChildRole::WdLifecheck => "wd_lifecheck",
            ChildRole::Logger => "logger",
        }
    }
}

/// How a child's exit should be handled by the reaper (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Normal exit with a fatal status: supervisor shuts down.
    Fatal,
    /// Normal exit requesting no respawn.
    NoRestart,
    /// Signal exit, or any other normal exit code: respawn unless exiting
    /// or switching.
    Respawn,
}

/// One record per tracked OS process. `need_to_restart` is set by the
/// supervisor and consumed cooperatively by the child at its next idle
/// point — single-writer (supervisor), single-reader (child) per slot, so
/// a bare `AtomicBool` is enough (no need for a lock).
#[derive(Debug)]
pub struct ChildRecord {
    pub pid: u32,
    pub started_at_ms: u64,
    pub role: ChildRole,
    need_to_restart: AtomicBool,
}

impl ChildRecord {
    pub fn new(pid: u32, started_at_ms: u64, role: ChildRole) -> Self {
        Self {
            pid,
            started_at_ms,
            role,
            need_to_restart: AtomicBool::new(false),
        }
    }

    pub fn request_restart(&self) {
        self.need_to_restart.store(true, Ordering::SeqCst);
    }

    pub fn needs_restart(&self) -> bool {
        self.need_to_restart.load(Ordering::SeqCst)
    }

    pub fn clear_restart_flag(&self) {
        self.need_to_restart.store(false, Ordering::SeqCst);
    }
}
