// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trait interfaces (and, where real, implementations) for the
//! collaborators the engine talks to but does not own the logic of:
//! the backend probe, the external command runner, the watchdog
//! cluster, and child process spawning.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod backend_probe;
pub mod child_spawner;
pub mod command_runner;
pub mod watchdog;

pub use backend_probe::{BackendProbe, PgBackendProbe, ProbeError, RecoveryState, WalReceiverStatus};
pub use child_spawner::{ChildSpawner, ProcessChildSpawner, ReapedExit, RoleCommandTable, Signal, SpawnError};
pub use command_runner::{expand_template, CommandContext, CommandError, CommandRunner, ShellCommandRunner};
pub use watchdog::{
    LeaderStatus, LocalState, LockResource, QuorumState, StandaloneWatchdog, Watchdog, WatchdogError,
};

#[cfg(any(test, feature = "test-support"))]
pub use backend_probe::{FakeBackendProbe, FakeBackendState};
#[cfg(any(test, feature = "test-support"))]
pub use child_spawner::{FakeChildSpawner, SignalCall, SpawnCall};
#[cfg(any(test, feature = "test-support"))]
pub use command_runner::{FakeCommandRunner, RecordedRun};
#[cfg(any(test, feature = "test-support"))]
pub use watchdog::FakeWatchdog;
