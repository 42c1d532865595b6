// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process spawning (§4.4 fork discipline). Children here are
//! separate executables either way, so the fork/exec discipline becomes
//! `tokio::process::Command` rather than a raw `fork()` + role dispatch;
//! what the lifecycle manager still owns is *which* children exist and
//! when they get signaled or respawned (`poolguard-engine`).

use async_trait::async_trait;
use poolguard_core::ChildRole;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {role}: {source}")]
    Spawn {
        role: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Quit,
    Usr1,
    Usr2,
    Kill,
}

#[async_trait]
pub trait ChildSpawner: Send + Sync + 'static {
    /// Spawn a child for `role`, returning its OS pid.
    async fn spawn(&self, role: ChildRole) -> Result<u32, SpawnError>;

    /// Deliver `signal` to a live pid. Errors (e.g. `ESRCH` because the
    /// child already exited) are swallowed by the caller, consistent
    /// with the reaper racing signal delivery against exit (§4.4).
    fn signal(&self, pid: u32, signal: Signal) -> std::io::Result<()>;

    /// Non-blocking reap of any exited children, `waitpid(-1, WNOHANG)`
    /// in spirit: returns `(pid, exit_kind)` pairs for everything that
    /// has exited since the last call.
    fn reap(&self) -> Vec<(u32, ReapedExit)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapedExit {
    ExitedFatal,
    ExitedNoRestart,
    ExitedOther(i32),
    Signaled(i32),
}

/// Maps a role to the executable + arguments that implement it. The
/// supervisor's own config decides what actually runs for each role
/// (§1 non-goal: the worker/PCP/health-check binaries' own logic); this
/// table is just the fork-target address book.
#[derive(Debug, Clone, Default)]
pub struct RoleCommandTable {
    entries: std::collections::HashMap<&'static str, (String, Vec<String>)>,
}

impl RoleCommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, role_label: &'static str, program: impl Into<String>, args: Vec<String>) {
        self.entries.insert(role_label, (program.into(), args));
    }

    fn lookup(&self, role: ChildRole) -> Option<&(String, Vec<String>)> {
        self.entries.get(role.family_key())
    }
}

/// Spawns children as real OS processes via `tokio::process`, and
/// signals/reaps them via `nix`. This is the fork discipline of §4.4
/// reimagined: no shared address space to clear, no inherited
/// semaphores to worry about, since these are genuinely separate
/// executables rather than a forked copy of the supervisor.
pub struct ProcessChildSpawner {
    table: RoleCommandTable,
    children: parking_lot::Mutex<std::collections::HashMap<u32, tokio::process::Child>>,
}

impl ProcessChildSpawner {
    pub fn new(table: RoleCommandTable) -> Self {
        Self {
            table,
            children: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[async_trait]
impl ChildSpawner for ProcessChildSpawner {
    async fn spawn(&self, role: ChildRole) -> Result<u32, SpawnError> {
        let (program, args) = self.table.lookup(role).ok_or_else(|| SpawnError::Spawn {
            role: role.label(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no command configured for role",
            ),
        })?;

        let mut command = tokio::process::Command::new(program);
        command.args(args);
        if let ChildRole::Worker(i) | ChildRole::HealthCheck(i) = role {
            command.arg("--index").arg(i.to_string());
        }

        let child = command
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                role: role.label(),
                source,
            })?;

        let pid = child.id().ok_or_else(|| SpawnError::Spawn {
            role: role.label(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "child has no pid"),
        })?;

        self.children.lock().insert(pid, child);
        Ok(pid)
    }

    fn signal(&self, pid: u32, signal: Signal) -> std::io::Result<()> {
        use nix::sys::signal::{self, Signal as NixSignal};
        use nix::unistd::Pid;

        let nix_signal = match signal {
            Signal::Term => NixSignal::SIGTERM,
            Signal::Quit => NixSignal::SIGQUIT,
            Signal::Usr1 => NixSignal::SIGUSR1,
            Signal::Usr2 => NixSignal::SIGUSR2,
            Signal::Kill => NixSignal::SIGKILL,
        };

        // ESRCH means the child already exited; the reaper will pick
        // that up on its own, so this is not an error worth surfacing.
        match signal::kill(Pid::from_raw(pid as i32), nix_signal) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(std::io::Error::from_raw_os_error(e as i32)),
        }
    }

    fn reap(&self) -> Vec<(u32, ReapedExit)> {
        let mut reaped = Vec::new();
        let mut children = self.children.lock();
        let pids: Vec<u32> = children.keys().copied().collect();
        for pid in pids {
            let Some(child) = children.get_mut(&pid) else {
                continue;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    children.remove(&pid);
                    let exit = classify_exit(status);
                    reaped.push((pid, exit));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(pid, error = %e, "failed to poll child status");
                }
            }
        }
        reaped
    }
}

fn classify_exit(status: std::process::ExitStatus) -> ReapedExit {
    use std::os::unix::process::ExitStatusExt;

    const FATAL_EXIT_CODE: i32 = 2;
    const NO_RESTART_EXIT_CODE: i32 = 3;

    if let Some(signal) = status.signal() {
        return ReapedExit::Signaled(signal);
    }
    match status.code() {
        Some(FATAL_EXIT_CODE) => ReapedExit::ExitedFatal,
        Some(NO_RESTART_EXIT_CODE) => ReapedExit::ExitedNoRestart,
        Some(code) => ReapedExit::ExitedOther(code),
        None => ReapedExit::ExitedOther(-1),
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct SpawnCall {
        pub role: ChildRole,
        pub pid: u32,
    }

    #[derive(Debug, Clone)]
    pub struct SignalCall {
        pub pid: u32,
        pub signal: Signal,
    }

    #[derive(Clone, Default)]
    pub struct FakeChildSpawner {
        next_pid: Arc<AtomicU32>,
        spawns: Arc<Mutex<Vec<SpawnCall>>>,
        signals: Arc<Mutex<Vec<SignalCall>>>,
        pending_reaps: Arc<Mutex<VecDeque<(u32, ReapedExit)>>>,
    }

    impl FakeChildSpawner {
        pub fn new() -> Self {
            Self {
                next_pid: Arc::new(AtomicU32::new(1000)),
                ..Default::default()
            }
        }

        pub fn spawns(&self) -> Vec<SpawnCall> {
            self.spawns.lock().clone()
        }

        pub fn signals(&self) -> Vec<SignalCall> {
            self.signals.lock().clone()
        }

        /// Script a pid as having exited, to be surfaced on the next `reap()`.
        pub fn simulate_exit(&self, pid: u32, exit: ReapedExit) {
            self.pending_reaps.lock().push_back((pid, exit));
        }
    }

    #[async_trait]
    impl ChildSpawner for FakeChildSpawner {
        async fn spawn(&self, role: ChildRole) -> Result<u32, SpawnError> {
            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            self.spawns.lock().push(SpawnCall { role, pid });
            Ok(pid)
        }

        fn signal(&self, pid: u32, signal: Signal) -> std::io::Result<()> {
            self.signals.lock().push(SignalCall { pid, signal });
            Ok(())
        }

        fn reap(&self) -> Vec<(u32, ReapedExit)> {
            self.pending_reaps.lock().drain(..).collect()
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeChildSpawner, SignalCall, SpawnCall};
