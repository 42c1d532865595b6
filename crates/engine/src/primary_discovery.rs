// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Primary discovery and multi-primary resolution (§4.6).

use crate::follow_primary_lock::FollowPrimaryLock;
use poolguard_adapters::BackendProbe;
use poolguard_core::{BackendFlags, BackendId, BackendTable, NodeSlot, ReplicationMode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Result of one discovery pass: the resolved primary (or `None`) plus
/// any backend ids that should be degenerated because they turned out
/// to be a false primary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    pub primary: Option<BackendId>,
    pub invalid: Vec<BackendId>,
}

impl DiscoveryOutcome {
    pub fn as_node_slot(&self) -> NodeSlot {
        match self.primary {
            Some(id) => NodeSlot::Node(id),
            None => NodeSlot::None,
        }
    }
}

/// `find_primary_node()`: only meaningful in streaming/logical mode.
pub async fn find_primary_node(
    table: &BackendTable,
    probe: &dyn BackendProbe,
    mode: ReplicationMode,
    detach_false_primary: bool,
) -> DiscoveryOutcome {
    if !mode.is_streaming() {
        return DiscoveryOutcome::default();
    }

    // Step 1: config override.
    if let Some(id) = table
        .ids()
        .find(|&id| table.get(id).map(|e| e.flags.contains(BackendFlags::ALWAYS_PRIMARY)).unwrap_or(false))
    {
        return DiscoveryOutcome {
            primary: Some(id),
            invalid: Vec::new(),
        };
    }

    // Step 2-3: probe every valid backend.
    let mut primaries = Vec::new();
    let mut standbys = Vec::new();
    for id in table.ids() {
        if !table.is_valid(id, mode) {
            continue;
        }
        let Some(entry) = table.get(id) else { continue };
        match probe.is_in_recovery(&entry.host, entry.port).await {
            Ok(false) => primaries.push(id),
            Ok(true) => standbys.push(id),
            Err(_) => {
                tracing::warn!(backend = %id, "primary discovery probe failed, treating as not visible");
            }
        }
    }

    match (primaries.len(), standbys.is_empty()) {
        (0, _) => DiscoveryOutcome::default(),
        (1, _) => DiscoveryOutcome {
            primary: Some(primaries[0]),
            invalid: Vec::new(),
        },
        (_, true) if !detach_false_primary => DiscoveryOutcome {
            primary: primaries.into_iter().min(),
            invalid: Vec::new(),
        },
        (_, true) => {
            let winner = *primaries.iter().min().expect("checked len > 1 above");
            let invalid = primaries.into_iter().filter(|&id| id != winner).collect();
            DiscoveryOutcome {
                primary: Some(winner),
                invalid,
            }
        }
        (_, false) => resolve_via_wal_receiver(table, probe, &primaries, &standbys).await,
    }
}

async fn resolve_via_wal_receiver(
    table: &BackendTable,
    probe: &dyn BackendProbe,
    primaries: &[BackendId],
    standbys: &[BackendId],
) -> DiscoveryOutcome {
    // pg_stat_wal_receiver requires 9.6+; check against the first standby,
    // since all backends in a cluster run the same major version in
    // practice.
    if let Some(&first_standby) = standbys.first() {
        if let Some(entry) = table.get(first_standby) {
            match probe.server_version(&entry.host, entry.port).await {
                Ok((major, minor)) if (major, minor) < (9, 6) => {
                    return DiscoveryOutcome {
                        primary: primaries.iter().copied().min(),
                        invalid: Vec::new(),
                    };
                }
                Err(_) => {
                    return DiscoveryOutcome {
                        primary: primaries.iter().copied().min(),
                        invalid: Vec::new(),
                    };
                }
                _ => {}
            }
        }
    }

    let mut owned_by: HashMap<BackendId, usize> = primaries.iter().map(|&id| (id, 0)).collect();

    for &standby_id in standbys {
        let Some(entry) = table.get(standby_id) else { continue };
        let status = match probe.wal_receiver_status(&entry.host, entry.port).await {
            Ok(Some(s)) => s,
            _ => continue,
        };
        if status.status != "streaming" {
            continue;
        }
        let (host, port) = parse_conninfo_host_port(&status.conninfo);
        for &primary_id in primaries {
            if let Some(primary_entry) = table.get(primary_id) {
                if hosts_match(&primary_entry.host, &host) && port_matches(primary_entry.port, port.as_deref()) {
                    *owned_by.entry(primary_id).or_insert(0) += 1;
                }
            }
        }
    }

    let total_standbys = standbys.len();
    let winner = owned_by
        .iter()
        .find(|(_, &count)| count == total_standbys)
        .map(|(&id, _)| id);

    match winner {
        Some(winner_id) => {
            let invalid = primaries.iter().copied().filter(|&id| id != winner_id).collect();
            DiscoveryOutcome {
                primary: Some(winner_id),
                invalid,
            }
        }
        // No single primary owns every standby: no resolution, leave
        // everyone alone rather than guessing.
        None => DiscoveryOutcome {
            primary: primaries.iter().copied().min(),
            invalid: Vec::new(),
        },
    }
}

fn hosts_match(backend_host: &str, conninfo_host: &str) -> bool {
    if conninfo_host.starts_with('/') {
        // A unix socket directory is equivalent to localhost.
        return backend_host == "localhost" || backend_host == "127.0.0.1";
    }
    backend_host == conninfo_host
}

fn port_matches(backend_port: u16, conninfo_port: Option<&str>) -> bool {
    match conninfo_port {
        Some(p) => p.parse::<u16>().map(|parsed| parsed == backend_port).unwrap_or(false),
        None => true,
    }
}

/// `conninfo` is a libpq keyword/value string, e.g. `host=10.0.0.1 port=5432 ...`.
fn parse_conninfo_host_port(conninfo: &str) -> (String, Option<String>) {
    let mut host = String::new();
    let mut port = None;
    for token in conninfo.split_whitespace() {
        if let Some(v) = token.strip_prefix("host=") {
            host = v.to_string();
        } else if let Some(v) = token.strip_prefix("port=") {
            port = Some(v.to_string());
        }
    }
    (host, port)
}

/// `find_primary_node_repeatedly()`: acquires the follow-primary lock in
/// blocking mode, retries on a fixed cadence until a primary resolves or
/// `timeout` elapses (`Duration::ZERO` means unbounded). Short-circuits
/// without probing if `follow_primary_ongoing` is set, to avoid
/// deadlocking against the follow child holding the lock (§4.6).
pub async fn find_primary_node_repeatedly(
    table: &BackendTable,
    probe: &dyn BackendProbe,
    mode: ReplicationMode,
    detach_false_primary: bool,
    lock: &FollowPrimaryLock,
    follow_primary_ongoing: &AtomicBool,
    current_primary: Option<BackendId>,
    timeout: Duration,
) -> DiscoveryOutcome {
    if follow_primary_ongoing.load(Ordering::SeqCst) {
        return DiscoveryOutcome {
            primary: current_primary,
            invalid: Vec::new(),
        };
    }

    lock.acquire_local_blocking_realtime().await;
    let deadline = if timeout.is_zero() {
        None
    } else {
        Some(tokio::time::Instant::now() + timeout)
    };

    let outcome = loop {
        let attempt = find_primary_node(table, probe, mode, detach_false_primary).await;
        if attempt.primary.is_some() {
            break attempt;
        }
        if let Some(deadline) = deadline {
            if tokio::time::Instant::now() >= deadline {
                break attempt;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    };

    lock.release_local();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolguard_adapters::{FakeBackendProbe, FakeBackendState};
    use poolguard_core::{BackendEntry, Role};

    fn table_with(entries: Vec<BackendEntry>) -> BackendTable {
        BackendTable::new(entries)
    }

    fn up_entry(host: &str, port: u16) -> BackendEntry {
        let mut e = BackendEntry::new(host, port, "/data");
        e.status = poolguard_core::BackendStatus::Up;
        e
    }

    #[tokio::test]
    async fn always_primary_flag_short_circuits_probing() {
        let mut entry = up_entry("a", 5432);
        entry.flags = BackendFlags::ALWAYS_PRIMARY;
        let table = table_with(vec![entry, up_entry("b", 5432)]);
        let probe = FakeBackendProbe::new();
        let outcome = find_primary_node(&table, &probe, ReplicationMode::Streaming, false).await;
        assert_eq!(outcome.primary, Some(BackendId(0)));
        assert!(outcome.invalid.is_empty());
    }

    #[tokio::test]
    async fn single_primary_resolves_cleanly() {
        let table = table_with(vec![up_entry("a", 5432), up_entry("b", 5432)]);
        let probe = FakeBackendProbe::new();
        probe.set("a", 5432, FakeBackendState { recovery: Some(false), ..Default::default() });
        probe.set("b", 5432, FakeBackendState { recovery: Some(true), ..Default::default() });
        let outcome = find_primary_node(&table, &probe, ReplicationMode::Streaming, false).await;
        assert_eq!(outcome.primary, Some(BackendId(0)));
    }

    #[tokio::test]
    async fn no_primary_returns_none() {
        let table = table_with(vec![up_entry("a", 5432)]);
        let probe = FakeBackendProbe::new();
        probe.set("a", 5432, FakeBackendState { recovery: Some(true), ..Default::default() });
        let outcome = find_primary_node(&table, &probe, ReplicationMode::Streaming, false).await;
        assert_eq!(outcome.primary, None);
    }

    #[tokio::test]
    async fn multi_primary_no_standby_detach_off_keeps_all() {
        let table = table_with(vec![up_entry("a", 5432), up_entry("b", 5432)]);
        let probe = FakeBackendProbe::new();
        probe.set("a", 5432, FakeBackendState { recovery: Some(false), ..Default::default() });
        probe.set("b", 5432, FakeBackendState { recovery: Some(false), ..Default::default() });
        let outcome = find_primary_node(&table, &probe, ReplicationMode::Streaming, false).await;
        assert_eq!(outcome.primary, Some(BackendId(0)));
        assert!(outcome.invalid.is_empty());
    }

    #[tokio::test]
    async fn multi_primary_no_standby_detach_on_invalidates_others() {
        let table = table_with(vec![up_entry("a", 5432), up_entry("b", 5432)]);
        let probe = FakeBackendProbe::new();
        probe.set("a", 5432, FakeBackendState { recovery: Some(false), ..Default::default() });
        probe.set("b", 5432, FakeBackendState { recovery: Some(false), ..Default::default() });
        let outcome = find_primary_node(&table, &probe, ReplicationMode::Streaming, true).await;
        assert_eq!(outcome.primary, Some(BackendId(0)));
        assert_eq!(outcome.invalid, vec![BackendId(1)]);
    }

    #[tokio::test]
    async fn wal_receiver_resolution_picks_primary_owning_all_standbys() {
        let mut b = up_entry("b", 5432);
        b.role = Role::Standby;
        let table = table_with(vec![up_entry("primary-a", 5432), up_entry("primary-b", 5433), b]);
        let probe = FakeBackendProbe::new();
        probe.set("primary-a", 5432, FakeBackendState { recovery: Some(false), version: (14, 0), ..Default::default() });
        probe.set("primary-b", 5433, FakeBackendState { recovery: Some(false), version: (14, 0), ..Default::default() });
        probe.set(
            "b",
            5432,
            FakeBackendState {
                recovery: Some(true),
                version: (14, 0),
                wal_receiver: Some(poolguard_adapters::WalReceiverStatus {
                    status: "streaming".into(),
                    conninfo: "host=primary-a port=5432".into(),
                }),
                ..Default::default()
            },
        );
        let outcome = find_primary_node(&table, &probe, ReplicationMode::Streaming, true).await;
        assert_eq!(outcome.primary, Some(BackendId(0)));
        assert_eq!(outcome.invalid, vec![BackendId(1)]);
    }

    #[tokio::test]
    async fn wal_receiver_resolution_falls_back_before_9_6() {
        let mut b = up_entry("b", 5432);
        b.role = Role::Standby;
        let table = table_with(vec![up_entry("primary-a", 5432), up_entry("primary-b", 5433), b]);
        let probe = FakeBackendProbe::new();
        probe.set("primary-a", 5432, FakeBackendState { recovery: Some(false), version: (9, 5), ..Default::default() });
        probe.set("primary-b", 5433, FakeBackendState { recovery: Some(false), version: (9, 5), ..Default::default() });
        probe.set(
            "b",
            5432,
            FakeBackendState {
                recovery: Some(true),
                version: (9, 5),
                wal_receiver: Some(poolguard_adapters::WalReceiverStatus {
                    status: "streaming".into(),
                    conninfo: "host=primary-a port=5432".into(),
                }),
                ..Default::default()
            },
        );
        let outcome = find_primary_node(&table, &probe, ReplicationMode::Streaming, true).await;
        // Version gate fails below 9.6: no wal-receiver-based invalidation.
        assert_eq!(outcome.primary, Some(BackendId(0)));
        assert!(outcome.invalid.is_empty());
    }

    #[tokio::test]
    async fn follow_primary_ongoing_short_circuits_without_probing() {
        let table = table_with(vec![up_entry("a", 5432)]);
        let probe = FakeBackendProbe::new();
        let lock = FollowPrimaryLock::new();
        let ongoing = AtomicBool::new(true);
        let outcome = find_primary_node_repeatedly(
            &table,
            &probe,
            ReplicationMode::Streaming,
            false,
            &lock,
            &ongoing,
            Some(BackendId(3)),
            Duration::from_secs(0),
        )
        .await;
        assert_eq!(outcome.primary, Some(BackendId(3)));
        assert_eq!(lock.state(), crate::follow_primary_lock::LockState::Free);
    }
}
