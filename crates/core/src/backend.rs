// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `BackendEntry` and the flags fixed at config load (§3).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendStatus {
    Unused,
    ConnectWait,
    Up,
    Down,
}

impl BackendStatus {
    pub fn as_ascii(self) -> &'static str {
        match self {
            BackendStatus::Unused => "unused",
            BackendStatus::ConnectWait => "up",
            BackendStatus::Up => "up",
            BackendStatus::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Primary,
    Standby,
}

bitflags! {
    /// Immutable-after-load per-backend flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BackendFlags: u8 {
        /// Config override: this node is always treated as primary by
        /// discovery (§4.6 step 1), short-circuiting the probe round.
        const ALWAYS_PRIMARY = 0b0000_0001;
        /// Node may never be chosen as a failover target.
        const DISALLOW_TO_FAILOVER = 0b0000_0010;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEntry {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub flags: BackendFlags,
    pub status: BackendStatus,
    pub role: Role,
    pub quarantine: bool,
    /// Epoch milliseconds of the last status transition, per `Clock::epoch_ms`.
    pub status_changed_at_ms: u64,
}

impl BackendEntry {
    pub fn new(host: impl Into<String>, port: u16, data_dir: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            data_dir: data_dir.into(),
            flags: BackendFlags::empty(),
            status: BackendStatus::ConnectWait,
            role: Role::Standby,
            quarantine: false,
            status_changed_at_ms: 0,
        }
    }

    /// `VALID_BACKEND`: usable in non-raw mode.
    pub fn is_valid(&self) -> bool {
        matches!(self.status, BackendStatus::Up | BackendStatus::ConnectWait) && !self.quarantine
    }

    /// `VALID_BACKEND_RAW`: usable in raw mode — quarantine is still
    /// disqualifying, but the status set is the same as non-raw mode for
    /// this implementation since raw mode has no load-balancing notion
    /// distinct from plain validity.
    pub fn is_valid_raw(&self) -> bool {
        self.is_valid()
    }
}
