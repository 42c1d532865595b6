// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: wires `SharedState`, the failover engine, the
//! child registry and the real adapters together, and owns the
//! reaper/restart glue the engine itself doesn't (§4.4).

use crate::config::SupervisorConfig;
use poolguard_adapters::{
    ChildSpawner, CommandRunner, PgBackendProbe, ProcessChildSpawner, RoleCommandTable,
    ShellCommandRunner, StandaloneWatchdog,
};
use poolguard_core::{BackendTable, ChildRole, Clock, SystemClock};
use poolguard_engine::{
    process_reaped, ChildRegistry, ConnectionMatrix, FailoverConfig, FailoverEngine, ReapAction,
    SharedState,
};
use std::sync::Arc;

pub struct Supervisor {
    pub shared: Arc<SharedState>,
    pub engine: Arc<FailoverEngine<SystemClock>>,
    pub registry: Arc<ChildRegistry>,
    pub child_spawner: Arc<dyn ChildSpawner>,
    pub config: Arc<SupervisorConfig>,
    exiting: std::sync::atomic::AtomicBool,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let config = Arc::new(config);
        let table = BackendTable::new(config.backends.clone());
        let shared = Arc::new(SharedState::new(table, config.replication_mode));
        let matrix = Arc::new(ConnectionMatrix::new());

        let mut commands = RoleCommandTable::new();
        if let Some((program, args)) = SupervisorConfig::split_command(&config.worker_command) {
            commands.set("worker", program, args);
        }
        if let Some((program, args)) = SupervisorConfig::split_command(&config.worker_singleton_command) {
            commands.set("worker-singleton", program, args);
        }
        if let Some((program, args)) = SupervisorConfig::split_command(&config.health_check_command) {
            commands.set("health_check", program, args);
        }
        if let Some((program, args)) = SupervisorConfig::split_command(&config.pcp_command) {
            commands.set("pcp", program, args);
        }
        let child_spawner: Arc<dyn ChildSpawner> = Arc::new(ProcessChildSpawner::new(commands));
        let command_runner: Arc<dyn CommandRunner> = Arc::new(ShellCommandRunner);
        let probe = Arc::new(PgBackendProbe::new(
            "poolguard",
            "postgres",
            std::time::Duration::from_secs(5),
        ));
        let watchdog = Arc::new(StandaloneWatchdog::new());

        let engine = Arc::new(FailoverEngine {
            shared: Arc::clone(&shared),
            matrix,
            clock: SystemClock,
            probe,
            command_runner,
            child_spawner: Arc::clone(&child_spawner),
            watchdog,
            config: FailoverConfig {
                detach_false_primary: config.detach_false_primary,
                search_primary_node_timeout: std::time::Duration::from_secs(
                    config.search_primary_node_timeout_secs,
                ),
                failback_command: config.failback_command.clone(),
                failover_command: config.failover_command.clone(),
                follow_primary_command: config.follow_primary_command.clone(),
                status_file_path: config.status_file_path.clone(),
                num_workers: config.num_init_children,
            },
        });

        Self {
            shared,
            engine,
            registry: Arc::new(ChildRegistry::new()),
            child_spawner,
            config,
            exiting: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Fork the initial child set: one worker per `num_init_children`,
    /// the worker-singleton, the PCP worker, and one health-check per
    /// backend (§4.4 startup).
    pub async fn spawn_initial_children(&self) {
        for i in 0..self.config.num_init_children {
            self.spawn_tracked(ChildRole::Worker(i)).await;
        }
        self.spawn_tracked(ChildRole::WorkerSingleton).await;
        self.spawn_tracked(ChildRole::Pcp).await;
        for id in self.shared.table.lock().ids() {
            self.spawn_tracked(ChildRole::HealthCheck(id.get())).await;
        }
    }

    async fn spawn_tracked(&self, role: ChildRole) {
        match self.child_spawner.spawn(role).await {
            Ok(pid) => self.registry.register(pid, SystemClock.epoch_ms(), role),
            Err(e) => tracing::warn!(?role, error = %e, "failed to spawn child"),
        }
    }

    /// Non-blocking reap pass (§4.4 reaper), run from the event loop on
    /// SIGCHLD or the periodic wakeup. While `exiting`, reaped pids are
    /// only cleared, never respawned.
    pub async fn reap_once(&self) {
        use std::sync::atomic::Ordering;
        let exiting = self.exiting.load(Ordering::SeqCst);
        let reaped = self.child_spawner.reap();
        if reaped.is_empty() {
            return;
        }
        let actions = process_reaped(&self.registry, reaped, exiting, self.shared.is_switching());
        for action in actions {
            match action {
                ReapAction::Shutdown => {
                    tracing::error!("child exited FATAL, shutting down");
                    self.exiting.store(true, Ordering::SeqCst);
                }
                ReapAction::NoRespawn => {}
                ReapAction::Respawn(role) => self.spawn_tracked(role).await,
                ReapAction::CleanupRequired(role) => {
                    tracing::warn!(?role, "watchdog child exited abnormally, cleanup required");
                }
            }
        }
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// SIGTERM/INT/QUIT path (§5 cancellation): stop accepting new
    /// work, signal every tracked child, and wait for them to drain.
    pub async fn shutdown(&self) {
        self.exiting.store(true, std::sync::atomic::Ordering::SeqCst);
        for pid in self.registry.pids() {
            let _ = self.child_spawner.signal(pid, poolguard_adapters::Signal::Term);
        }
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
        while !self.registry.is_empty() && tokio::time::Instant::now() < deadline {
            self.reap_once().await;
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        let statuses = self.shared.table.lock().status_vector();
        if let Err(e) = poolguard_storage::write_status_file(&self.config.status_file_path, &statuses) {
            tracing::warn!(error = %e, "failed to persist status file during shutdown");
        }
    }
}
