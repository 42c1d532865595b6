// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The failover engine (§4.5) — the crux of the whole supervisor. Drains
//! the request queue inside one `switching=true` window, decides restart
//! scope, runs primary discovery, and steps the follow-primary child.

use crate::connection_matrix::{ConnectionMatrix, WorkerId};
use crate::error::EngineError;
use crate::primary_discovery::{find_primary_node_repeatedly, DiscoveryOutcome};
use crate::shared_state::SharedState;
use poolguard_adapters::{
    BackendProbe, ChildSpawner, CommandContext, CommandRunner, Signal, Watchdog,
};
use poolguard_core::{BackendId, Clock, NodeSlot, Request, RequestFlags, RequestKind, Role};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartScope {
    None,
    Partial(Vec<WorkerId>),
    Full,
}

impl RestartScope {
    fn escalate(self, other: RestartScope) -> RestartScope {
        use RestartScope::*;
        match (self, other) {
            (Full, _) | (_, Full) => Full,
            (None, x) | (x, None) => x,
            (Partial(mut a), Partial(b)) => {
                a.extend(b);
                Partial(a)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub already_running: bool,
    pub processed: usize,
    pub topology_changed: bool,
    pub restart: RestartScope,
    pub close_idle: bool,
    pub new_primary: NodeSlot,
    pub rejected: usize,
}

impl SweepOutcome {
    fn already_running() -> Self {
        Self {
            already_running: true,
            processed: 0,
            topology_changed: false,
            restart: RestartScope::None,
            close_idle: false,
            new_primary: NodeSlot::Undiscovered,
            rejected: 0,
        }
    }
}

pub struct FailoverConfig {
    pub detach_false_primary: bool,
    pub search_primary_node_timeout: Duration,
    pub failback_command: Option<String>,
    pub failover_command: Option<String>,
    pub follow_primary_command: Option<String>,
    pub status_file_path: PathBuf,
    pub num_workers: usize,
}

pub struct FailoverEngine<C: Clock> {
    pub shared: Arc<SharedState>,
    pub matrix: Arc<ConnectionMatrix>,
    pub clock: C,
    pub probe: Arc<dyn BackendProbe>,
    pub command_runner: Arc<dyn CommandRunner>,
    pub child_spawner: Arc<dyn ChildSpawner>,
    pub watchdog: Arc<dyn Watchdog>,
    pub config: FailoverConfig,
}

impl<C: Clock> FailoverEngine<C> {
    /// Entry point: CAS `switching` true, drain the queue, reassert
    /// `switching=false` atomically with the empty check (§4.5).
    pub async fn run_sweep(&self) -> Result<SweepOutcome, EngineError> {
        if !self.shared.try_begin_switching() {
            return Ok(SweepOutcome::already_running());
        }

        self.watchdog.failover_start().await;

        let mut processed = 0;
        let mut rejected = 0;
        let mut topology_changed = false;
        let mut restart = RestartScope::None;
        let mut close_idle = false;
        let mut downed_this_sweep: HashSet<BackendId> = HashSet::new();
        let mut failover_targets: HashSet<BackendId> = HashSet::new();
        let mut old_primary_downed = false;
        let old_primary = self.shared.primary_node().node();
        let old_main = self.shared.main_node().node();
        let all_down_before = self.shared.table.lock().all_down();
        let mut promote_target: Option<BackendId> = None;
        let mut sync_required = false;

        while let Some(request) = self.shared.queue.dequeue() {
            processed += 1;
            match request.kind {
                RequestKind::CloseIdle => {
                    // §12: bypasses the whole node-resolution path.
                    close_idle = true;
                    continue;
                }
                RequestKind::NodeUp => {
                    match self.handle_node_up(&request, old_primary, old_main, all_down_before).await? {
                        Some(scope) => {
                            topology_changed = true;
                            sync_required = true;
                            restart = restart.escalate(scope);
                        }
                        None => rejected += 1,
                    }
                }
                RequestKind::NodeDown | RequestKind::NodeQuarantine => {
                    let changed = self.handle_node_down_or_quarantine(&request, old_primary);
                    if !changed.is_empty() {
                        topology_changed = true;
                        sync_required = true;
                        for id in &changed {
                            downed_this_sweep.insert(*id);
                            if Some(*id) == old_primary {
                                old_primary_downed = true;
                            }
                            if request.kind == RequestKind::NodeDown {
                                failover_targets.insert(*id);
                            }
                        }
                        let scope = self.restart_scope_for_down_request(&changed, request.flags, old_primary);
                        restart = restart.escalate(scope);
                        self.persist_status()?;
                    } else {
                        rejected += 1;
                    }
                }
                RequestKind::Promote => {
                    if self.handle_promote(&request) {
                        promote_target = request.primary_target();
                        topology_changed = true;
                        sync_required = true;
                        restart = restart.escalate(RestartScope::Full);
                    } else {
                        rejected += 1;
                    }
                }
            }
        }

        self.shared.recompute_main_node();

        let new_primary = self
            .determine_new_primary(old_primary, old_primary_downed, &downed_this_sweep, promote_target)
            .await;
        self.shared.set_primary_node(new_primary);
        if let Some(id) = new_primary.node() {
            if Some(id) != old_primary {
                if let Some(prev) = old_primary {
                    self.shared.table.lock().demote(prev);
                }
            }
            self.shared.table.lock().set_role(id, Role::Primary);
        }

        if !failover_targets.is_empty() {
            if let Some(cmd) = &self.config.failover_command {
                let new_main = self.shared.main_node().node();
                for id in &failover_targets {
                    let ctx = self.build_command_context(Some(*id), new_main, old_primary, old_main);
                    let _ = self.command_runner.run(cmd, &ctx).await;
                }
            }
        }

        if self.follow_primary_applies(old_primary_downed, old_primary, new_primary, promote_target.is_some()) {
            self.run_follow_primary_step(old_primary, new_primary.node(), promote_target, old_main).await?;
            self.shared.recompute_main_node();
        }

        self.execute_restart(&restart, close_idle).await;

        if topology_changed {
            self.restart_pcp().await;
        }

        self.shared.end_switching();

        if sync_required {
            self.watchdog.failover_end().await;
        }

        Ok(SweepOutcome {
            already_running: false,
            processed,
            topology_changed,
            restart,
            close_idle,
            new_primary,
            rejected,
        })
    }

    /// NODE_UP (failback). Returns the restart scope it contributes, or
    /// `None` if the request was rejected outright.
    async fn handle_node_up(
        &self,
        request: &Request,
        old_primary: Option<BackendId>,
        old_main: Option<BackendId>,
        all_down_before: bool,
    ) -> Result<Option<RestartScope>, EngineError> {
        let Some(id) = request.primary_target() else {
            return Ok(None);
        };
        let mode = self.shared.mode;

        enum NodeUpAction {
            Rejected,
            UpdateOnly,
            Reconnect(Option<BackendId>),
        }

        // Scoped (rather than `drop()`-ed) so the `MutexGuard` cannot be
        // mistaken for live across the `.await` points below — it never
        // crosses one either way, but keeping it lexically confined to
        // this block is what lets the compiler see that.
        let action = {
            let mut table = self.shared.table.lock();
            if !table.in_range(id) {
                NodeUpAction::Rejected
            } else if table.is_valid(id, mode) {
                NodeUpAction::Rejected
            } else if mode.is_raw()
                && !table.get(id).map(|e| e.status == poolguard_core::BackendStatus::Down).unwrap_or(false)
            {
                NodeUpAction::Rejected
            } else if request.flags.contains(RequestFlags::UPDATE_ONLY) {
                table.set_quarantine(id, false);
                NodeUpAction::UpdateOnly
            } else {
                table.mark_connect_wait(id, self.clock.epoch_ms());
                let new_main = table.next_main_node(mode);
                NodeUpAction::Reconnect(new_main)
            }
        };

        match action {
            NodeUpAction::Rejected => return Ok(None),
            NodeUpAction::UpdateOnly => {
                self.shared.recompute_main_node();
                let restore_primary = {
                    let table = self.shared.table.lock();
                    let was_primary = table.get(id).map(|e| e.role == Role::Primary).unwrap_or(false);
                    was_primary && self.shared.primary_node().node().is_none()
                };
                if restore_primary {
                    self.shared.set_primary_node(NodeSlot::Node(id));
                }
            }
            NodeUpAction::Reconnect(new_main) => {
                self.persist_status()?;
                if let Some(cmd) = &self.config.failback_command {
                    let ctx = self.build_command_context(Some(id), new_main, old_primary, old_main);
                    let _ = self.command_runner.run(cmd, &ctx).await;
                }
            }
        }
        Ok(Some(self.restart_scope_for_up_request(id, request.flags, old_primary, all_down_before)))
    }

    /// NODE_DOWN / NODE_QUARANTINE. Returns the set of ids that actually
    /// transitioned, empty if nothing changed (§4.5: "if no id changed, skip").
    fn handle_node_down_or_quarantine(&self, request: &Request, old_primary: Option<BackendId>) -> Vec<BackendId> {
        let mode = self.shared.mode;
        let mut table = self.shared.table.lock();
        let is_quarantine = request.kind == RequestKind::NodeQuarantine;
        let mut changed = Vec::new();

        for &id in &request.node_ids {
            let eligible = table.is_valid(id, mode) || table.get(id).map(|e| e.quarantine).unwrap_or(false);
            if !eligible {
                continue;
            }
            let was_down = table.get(id).map(|e| e.status == poolguard_core::BackendStatus::Down).unwrap_or(true);
            table.mark_down(id, self.clock.epoch_ms());
            if is_quarantine {
                table.set_quarantine(id, true);
            }
            // §12: quarantining the current primary preserves role=Primary
            // on the quarantined node and clears primary_node_id.
            if is_quarantine && Some(id) == old_primary {
                table.set_role(id, Role::Primary);
            }
            if !was_down || is_quarantine {
                changed.push(id);
            }
        }
        changed
    }

    /// PROMOTE: target must be VALID.
    fn handle_promote(&self, request: &Request) -> bool {
        let Some(id) = request.primary_target() else {
            return false;
        };
        self.shared.table.lock().is_valid(id, self.shared.mode)
    }

    async fn determine_new_primary(
        &self,
        old_primary: Option<BackendId>,
        old_primary_downed: bool,
        downed_this_sweep: &HashSet<BackendId>,
        promote_target: Option<BackendId>,
    ) -> NodeSlot {
        if let Some(target) = promote_target {
            return NodeSlot::Node(target);
        }

        if old_primary_downed {
            // Quarantine of the current primary clears primary id; a
            // plain NODE_DOWN of the primary falls through to discovery.
            let was_quarantined = old_primary
                .and_then(|id| self.shared.table.lock().get(id).map(|e| e.quarantine))
                .unwrap_or(false);
            if was_quarantined {
                return NodeSlot::None;
            }
        }

        let mode = self.shared.mode;
        if mode.is_streaming() {
            if !downed_this_sweep.is_empty() && !old_primary_downed {
                // Standby-only DOWN with a valid current primary: keep it,
                // avoiding an expensive rediscovery (§4.5, §12).
                if let Some(primary) = old_primary {
                    if self.shared.table.lock().is_valid(primary, mode) {
                        return NodeSlot::Node(primary);
                    }
                }
            }
        }

        if downed_this_sweep.is_empty() && promote_target.is_none() {
            return self.shared.primary_node();
        }

        if old_primary_downed {
            if let Some(id) = old_primary {
                self.shared.table.lock().demote(id);
            }
        }

        let table = self.shared.table.lock().clone();
        let outcome: DiscoveryOutcome = find_primary_node_repeatedly(
            &table,
            self.probe.as_ref(),
            mode,
            self.config.detach_false_primary,
            &self.shared.follow_primary_lock,
            &self.shared.follow_primary_ongoing,
            old_primary,
            self.config.search_primary_node_timeout,
        )
        .await;

        if !outcome.invalid.is_empty() {
            let mut table = self.shared.table.lock();
            for id in &outcome.invalid {
                table.mark_down(*id, self.clock.epoch_ms());
            }
        }

        outcome.as_node_slot()
    }

    fn follow_primary_applies(
        &self,
        old_primary_downed: bool,
        old_primary: Option<BackendId>,
        new_primary: NodeSlot,
        is_promote: bool,
    ) -> bool {
        if self.config.follow_primary_command.is_none() {
            return false;
        }
        is_promote || old_primary_downed || (old_primary.is_none() && new_primary.node().is_some())
    }

    async fn run_follow_primary_step(
        &self,
        old_primary: Option<BackendId>,
        new_primary: Option<BackendId>,
        promote_target: Option<BackendId>,
        old_main: Option<BackendId>,
    ) -> Result<(), EngineError> {
        let Some(new_primary_id) = new_primary.or(promote_target) else {
            return Ok(());
        };

        let mut follow_cnt = 0;
        {
            let mut table = self.shared.table.lock();
            for id in table.ids().collect::<Vec<_>>() {
                if id == new_primary_id {
                    continue;
                }
                if table.mark_down(id, self.clock.epoch_ms()) {
                    follow_cnt += 1;
                }
            }
        }
        self.persist_status()?;

        // §12: nothing degenerated means no follow child is forked at all.
        if follow_cnt == 0 {
            return Ok(());
        }

        if self.watchdog.lock_standby(poolguard_adapters::LockResource::FollowPrimary).await.is_ok() {
            self.shared.follow_primary_lock.acquire_local_blocking_realtime().await;
            self.shared.follow_primary_ongoing.store(true, std::sync::atomic::Ordering::SeqCst);

            if let Some(cmd) = &self.config.follow_primary_command {
                let ctx = self.build_command_context(old_primary, Some(new_primary_id), old_primary, old_main);
                let _ = self.command_runner.run(cmd, &ctx).await;
            }
            let _ = self.child_spawner.spawn(poolguard_core::ChildRole::Follow).await;

            self.shared.follow_primary_ongoing.store(false, std::sync::atomic::Ordering::SeqCst);
            self.shared.follow_primary_lock.release_local();
            let _ = self.watchdog.unlock_standby(poolguard_adapters::LockResource::FollowPrimary).await;
        }
        Ok(())
    }

    /// Restart scope for one NODE_DOWN/NODE_QUARANTINE request (§4.5):
    /// partial restart applies only when the request itself carries
    /// SWITCHOVER and none of its targets is the (pre-sweep) primary.
    /// `old_primary` must be captured before `set_primary_node()` runs,
    /// or every degeneration looks like it spared the primary.
    fn restart_scope_for_down_request(
        &self,
        changed: &[BackendId],
        flags: RequestFlags,
        old_primary: Option<BackendId>,
    ) -> RestartScope {
        if changed.is_empty() {
            return RestartScope::None;
        }
        let mode = self.shared.mode;
        if mode.is_streaming() && flags.contains(RequestFlags::SWITCHOVER) {
            let targets_primary = changed.iter().any(|id| old_primary == Some(*id));
            if !targets_primary {
                let workers: Vec<WorkerId> =
                    changed.iter().flat_map(|&id| self.matrix.workers_routed_to(id)).collect();
                if !workers.is_empty() {
                    return RestartScope::Partial(workers);
                }
            }
        }
        RestartScope::Full
    }

    /// Restart scope for one NODE_UP request (§4.5): the no-restart
    /// optimization applies only when streaming, not every backend was
    /// down before this sweep, a primary already exists and isn't the
    /// node being brought back, and the request isn't a quarantine
    /// resynthesis (`UPDATE_ONLY` always needs a restart to pick the
    /// node back up).
    fn restart_scope_for_up_request(
        &self,
        id: BackendId,
        flags: RequestFlags,
        old_primary: Option<BackendId>,
        all_down_before: bool,
    ) -> RestartScope {
        let mode = self.shared.mode;
        if mode.is_streaming()
            && !all_down_before
            && !flags.contains(RequestFlags::UPDATE_ONLY)
            && old_primary.map(|p| p != id).unwrap_or(false)
        {
            return RestartScope::None;
        }
        RestartScope::Full
    }

    async fn execute_restart(&self, scope: &RestartScope, close_idle: bool) {
        match scope {
            RestartScope::None => {}
            RestartScope::Full => {
                for i in 0..self.config.num_workers {
                    let _ = self.child_spawner.spawn(poolguard_core::ChildRole::Worker(i)).await;
                }
            }
            RestartScope::Partial(_workers) => {
                // Cooperative restart: flagged via `ChildRecord::request_restart`
                // by the lifecycle manager, which owns the pid table this
                // engine doesn't.
            }
        }
        if !matches!(scope, RestartScope::None) || close_idle {
            let _ = self.child_spawner.spawn(poolguard_core::ChildRole::WorkerSingleton).await;
        }
    }

    async fn restart_pcp(&self) {
        let _ = self.child_spawner.spawn(poolguard_core::ChildRole::Pcp).await;
    }

    fn persist_status(&self) -> Result<(), EngineError> {
        let statuses = self.shared.table.lock().status_vector();
        poolguard_storage::write_status_file(&self.config.status_file_path, &statuses)?;
        Ok(())
    }

    fn build_command_context(
        &self,
        failed: Option<BackendId>,
        new_main: Option<BackendId>,
        old_primary: Option<BackendId>,
        old_main: Option<BackendId>,
    ) -> CommandContext {
        let table = self.shared.table.lock();
        let describe = |id: Option<BackendId>| -> (Option<String>, Option<String>, Option<String>) {
            match id.and_then(|id| table.get(id).map(|e| (id, e))) {
                Some((id, entry)) => (Some(id.to_string()), Some(entry.host.clone()), Some(entry.port.to_string())),
                None => (None, None, None),
            }
        };
        let (failed_id, failed_host, failed_port) = describe(failed);
        let (new_main_id, new_main_host, new_main_port) = describe(new_main);
        let (old_primary_id, old_primary_host, old_primary_port) = describe(old_primary);
        CommandContext {
            failed_id,
            failed_host,
            failed_port,
            failed_data_dir: failed.and_then(|id| table.get(id).map(|e| e.data_dir.clone())),
            new_main_id,
            new_main_host,
            new_main_port,
            new_main_data_dir: new_main.and_then(|id| table.get(id).map(|e| e.data_dir.clone())),
            old_main_id: old_main.map(|id| id.to_string()),
            old_primary_id,
            old_primary_host,
            old_primary_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolguard_adapters::{FakeBackendProbe, FakeChildSpawner, FakeCommandRunner, FakeWatchdog};
    use poolguard_core::{BackendEntry, FakeClock, ReplicationMode, RequestFlags};
    use tempfile::tempdir;

    fn engine_with(
        entries: Vec<BackendEntry>,
        status_file_path: std::path::PathBuf,
    ) -> (FailoverEngine<FakeClock>, Arc<FakeChildSpawner>, Arc<FakeCommandRunner>, Arc<FakeBackendProbe>) {
        let table = poolguard_core::BackendTable::new(entries);
        let shared = Arc::new(SharedState::new(table, ReplicationMode::Streaming));
        let spawner = Arc::new(FakeChildSpawner::new());
        let runner = Arc::new(FakeCommandRunner::new());
        let probe = Arc::new(FakeBackendProbe::new());
        let engine = FailoverEngine {
            shared,
            matrix: Arc::new(ConnectionMatrix::new()),
            clock: FakeClock::new(),
            probe: probe.clone(),
            command_runner: runner.clone(),
            child_spawner: spawner.clone(),
            watchdog: Arc::new(FakeWatchdog::new()),
            config: FailoverConfig {
                detach_false_primary: true,
                search_primary_node_timeout: Duration::from_millis(10),
                failback_command: Some("failback".into()),
                failover_command: Some("failover".into()),
                follow_primary_command: Some("follow".into()),
                status_file_path,
                num_workers: 2,
            },
        };
        (engine, spawner, runner, probe)
    }

    fn primary(host: &str) -> BackendEntry {
        let mut e = BackendEntry::new(host, 5432, "/d");
        e.status = poolguard_core::BackendStatus::Up;
        e.role = Role::Primary;
        e
    }

    fn standby(host: &str) -> BackendEntry {
        let mut e = BackendEntry::new(host, 5432, "/d");
        e.status = poolguard_core::BackendStatus::Up;
        e.role = Role::Standby;
        e
    }

    #[tokio::test]
    async fn node_down_on_primary_promotes_standby_and_writes_status() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pgpool_status");
        let (engine, spawner, _, probe) = engine_with(vec![primary("a"), standby("b")], path.clone());
        engine.shared.set_primary_node(NodeSlot::Node(BackendId(0)));
        probe.set(
            "b",
            5432,
            poolguard_adapters::FakeBackendState { recovery: Some(false), ..Default::default() },
        );

        engine
            .shared
            .queue
            .enqueue(Request::new(RequestKind::NodeDown, vec![BackendId(0)], RequestFlags::empty()))
            .unwrap();

        let outcome = engine.run_sweep().await.unwrap();
        assert!(!outcome.already_running);
        assert!(outcome.topology_changed);
        assert_eq!(engine.shared.main_node(), NodeSlot::Node(BackendId(1)));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "down\nup\n");
        assert!(!spawner.spawns().is_empty(), "full restart should have forked workers");
    }

    #[tokio::test]
    async fn switchover_on_standby_triggers_partial_restart_when_routed() {
        let dir = tempdir().unwrap();
        let (engine, _, _, _probe) = engine_with(vec![primary("a"), standby("b")], dir.path().join("status"));
        engine.shared.set_primary_node(NodeSlot::Node(BackendId(0)));
        engine.matrix.set_route(WorkerId(0), BackendId(1));

        engine
            .shared
            .queue
            .enqueue(Request::new(
                RequestKind::NodeDown,
                vec![BackendId(1)],
                RequestFlags::SWITCHOVER,
            ))
            .unwrap();

        let outcome = engine.run_sweep().await.unwrap();
        assert_eq!(outcome.restart, RestartScope::Partial(vec![WorkerId(0)]));
        // Primary untouched by a standby-only degeneration.
        assert_eq!(engine.shared.main_node(), NodeSlot::Node(BackendId(0)));
    }

    #[tokio::test]
    async fn promote_sets_new_primary() {
        let dir = tempdir().unwrap();
        let (engine, _, _, _probe) = engine_with(vec![primary("a"), standby("b")], dir.path().join("status"));

        engine
            .shared
            .queue
            .enqueue(Request::new(RequestKind::Promote, vec![BackendId(1)], RequestFlags::empty()))
            .unwrap();

        let outcome = engine.run_sweep().await.unwrap();
        assert_eq!(outcome.new_primary, NodeSlot::Node(BackendId(1)));
    }

    #[tokio::test]
    async fn close_idle_bypasses_node_resolution() {
        let dir = tempdir().unwrap();
        let (engine, _, _, _probe) = engine_with(vec![primary("a"), standby("b")], dir.path().join("status"));

        engine
            .shared
            .queue
            .enqueue(Request::new(RequestKind::CloseIdle, Vec::new(), RequestFlags::empty()))
            .unwrap();

        let outcome = engine.run_sweep().await.unwrap();
        assert!(outcome.close_idle);
        assert!(!outcome.topology_changed);
    }

    #[tokio::test]
    async fn reentrant_sweep_is_a_no_op() {
        let dir = tempdir().unwrap();
        let (engine, _, _, _probe) = engine_with(vec![primary("a")], dir.path().join("status"));
        assert!(engine.shared.try_begin_switching());

        let outcome = engine.run_sweep().await.unwrap();
        assert!(outcome.already_running);
        assert_eq!(outcome.processed, 0);
    }

    #[tokio::test]
    async fn node_down_on_primary_without_switchover_is_a_full_restart_even_with_routes() {
        let dir = tempdir().unwrap();
        let (engine, _, _, _probe) = engine_with(vec![primary("a"), standby("b")], dir.path().join("status"));
        engine.shared.set_primary_node(NodeSlot::Node(BackendId(0)));
        engine.matrix.set_route(WorkerId(0), BackendId(0));

        engine
            .shared
            .queue
            .enqueue(Request::new(RequestKind::NodeDown, vec![BackendId(0)], RequestFlags::empty()))
            .unwrap();

        let outcome = engine.run_sweep().await.unwrap();
        assert_eq!(outcome.restart, RestartScope::Full);
    }

    #[tokio::test]
    async fn switchover_on_primary_is_still_a_full_restart() {
        let dir = tempdir().unwrap();
        let (engine, _, _, _probe) = engine_with(vec![primary("a"), standby("b")], dir.path().join("status"));
        engine.shared.set_primary_node(NodeSlot::Node(BackendId(0)));
        engine.matrix.set_route(WorkerId(0), BackendId(0));

        engine
            .shared
            .queue
            .enqueue(Request::new(
                RequestKind::NodeDown,
                vec![BackendId(0)],
                RequestFlags::SWITCHOVER,
            ))
            .unwrap();

        let outcome = engine.run_sweep().await.unwrap();
        assert_eq!(outcome.restart, RestartScope::Full);
    }

    #[tokio::test]
    async fn node_down_fires_failover_command_but_quarantine_does_not() {
        let dir = tempdir().unwrap();
        let (engine, _, runner, probe) = engine_with(vec![primary("a"), standby("b")], dir.path().join("status"));
        engine.shared.set_primary_node(NodeSlot::Node(BackendId(0)));
        probe.set(
            "b",
            5432,
            poolguard_adapters::FakeBackendState { recovery: Some(false), ..Default::default() },
        );

        engine
            .shared
            .queue
            .enqueue(Request::new(RequestKind::NodeDown, vec![BackendId(0)], RequestFlags::empty()))
            .unwrap();
        engine.run_sweep().await.unwrap();
        assert!(runner.runs().iter().any(|r| r.template == "failover"));

        let dir2 = tempdir().unwrap();
        let (engine2, _, runner2, _probe2) = engine_with(vec![primary("a"), standby("b")], dir2.path().join("status"));
        engine2
            .shared
            .queue
            .enqueue(Request::new(RequestKind::NodeQuarantine, vec![BackendId(1)], RequestFlags::empty()))
            .unwrap();
        engine2.run_sweep().await.unwrap();
        assert!(!runner2.runs().iter().any(|r| r.template == "failover"));
    }

    #[tokio::test]
    async fn node_up_failback_without_existing_primary_is_a_full_restart() {
        let dir = tempdir().unwrap();
        let mut down_a = primary("a");
        down_a.status = poolguard_core::BackendStatus::Down;
        let (engine, spawner, runner, _probe) = engine_with(vec![down_a, standby("b")], dir.path().join("status"));

        engine
            .shared
            .queue
            .enqueue(Request::new(RequestKind::NodeUp, vec![BackendId(0)], RequestFlags::empty()))
            .unwrap();

        let outcome = engine.run_sweep().await.unwrap();
        assert!(outcome.topology_changed);
        assert_eq!(outcome.restart, RestartScope::Full);
        assert!(!spawner.spawns().is_empty());
        assert!(runner.runs().iter().any(|r| r.template == "failback"));
    }

    #[tokio::test]
    async fn follow_primary_command_receives_old_main_id() {
        let dir = tempdir().unwrap();
        let table = poolguard_core::BackendTable::new(vec![primary("a"), standby("b"), standby("c")]);
        let shared = Arc::new(SharedState::new(table, ReplicationMode::Streaming));
        let runner = Arc::new(poolguard_adapters::FakeCommandRunner::new());
        let probe = Arc::new(FakeBackendProbe::new());
        let engine = FailoverEngine {
            shared: shared.clone(),
            matrix: Arc::new(ConnectionMatrix::new()),
            clock: FakeClock::new(),
            probe: probe.clone(),
            command_runner: runner.clone(),
            child_spawner: Arc::new(FakeChildSpawner::new()),
            watchdog: Arc::new(FakeWatchdog::new()),
            config: FailoverConfig {
                detach_false_primary: true,
                search_primary_node_timeout: Duration::from_millis(10),
                failback_command: None,
                failover_command: None,
                follow_primary_command: Some("old-main=%M".into()),
                status_file_path: dir.path().join("status"),
                num_workers: 2,
            },
        };
        shared.set_primary_node(NodeSlot::Node(BackendId(0)));
        shared.recompute_main_node();
        probe.set(
            "b",
            5432,
            poolguard_adapters::FakeBackendState { recovery: Some(false), ..Default::default() },
        );
        probe.set(
            "c",
            5432,
            poolguard_adapters::FakeBackendState { recovery: Some(true), ..Default::default() },
        );

        shared
            .queue
            .enqueue(Request::new(RequestKind::NodeDown, vec![BackendId(0)], RequestFlags::empty()))
            .unwrap();
        engine.run_sweep().await.unwrap();

        let runs = runner.runs();
        let run = runs.iter().find(|r| r.template == "old-main=%M").unwrap();
        assert_eq!(run.expanded, "old-main=0");
    }

    #[tokio::test]
    async fn node_up_already_valid_is_rejected() {
        let dir = tempdir().unwrap();
        let (engine, _, _, _probe) = engine_with(vec![primary("a"), standby("b")], dir.path().join("status"));

        engine
            .shared
            .queue
            .enqueue(Request::new(RequestKind::NodeUp, vec![BackendId(0)], RequestFlags::empty()))
            .unwrap();

        let outcome = engine.run_sweep().await.unwrap();
        assert_eq!(outcome.rejected, 1);
        assert!(!outcome.topology_changed);
    }
}
