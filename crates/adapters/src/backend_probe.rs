// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The collaborator that actually talks Postgres wire protocol to a
//! backend (§1 non-goal: wire-level frame handling lives elsewhere).
//! Primary discovery (§4.6) only ever needs three facts per backend:
//! whether it's reachable, whether it thinks it's in recovery, and —
//! when resolving a multi-primary split — who its WAL receiver is
//! streaming from.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// `pg_is_in_recovery()`: `false` means primary, `true` means standby.
pub type RecoveryState = bool;

/// One row of `pg_stat_wal_receiver` on a standby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalReceiverStatus {
    pub status: String,
    pub conninfo: String,
}

#[async_trait]
pub trait BackendProbe: Send + Sync + 'static {
    /// Open a short-lived connection and run `SELECT pg_is_in_recovery()`.
    /// A connection failure is "not visible", not an error the caller
    /// should propagate (§7: transient probe failures don't change state
    /// on their own).
    async fn is_in_recovery(&self, host: &str, port: u16) -> Result<RecoveryState, ProbeError>;

    /// Read `pg_stat_wal_receiver` on a standby, used only during
    /// multi-primary resolution (§4.6 step 4, server version ≥ 9.6).
    async fn wal_receiver_status(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Option<WalReceiverStatus>, ProbeError>;

    /// Server version as `(major, minor)`, used to gate the
    /// `pg_stat_wal_receiver` path on ≥ 9.6.
    async fn server_version(&self, host: &str, port: u16) -> Result<(u32, u32), ProbeError>;
}

/// Real implementation: opens a short-lived `tokio-postgres` connection
/// per probe rather than holding a pool open, since probes are
/// infrequent and a stale cached connection would defeat the point of
/// "is this backend reachable right now" (§4.6).
#[derive(Clone, Copy, Debug, Default)]
pub struct PgBackendProbe {
    pub user: &'static str,
    pub dbname: &'static str,
    pub connect_timeout: std::time::Duration,
}

impl PgBackendProbe {
    pub fn new(user: &'static str, dbname: &'static str, connect_timeout: std::time::Duration) -> Self {
        Self { user, dbname, connect_timeout }
    }

    async fn connect(&self, host: &str, port: u16) -> Result<tokio_postgres::Client, ProbeError> {
        let config = format!(
            "host={host} port={port} user={} dbname={} connect_timeout={}",
            self.user,
            self.dbname,
            self.connect_timeout.as_secs().max(1),
        );
        let (client, connection) = tokio::time::timeout(
            self.connect_timeout,
            tokio_postgres::connect(&config, tokio_postgres::NoTls),
        )
        .await
        .map_err(|_| ProbeError::ConnectFailed(format!("{host}:{port} timed out")))?
        .map_err(|e| ProbeError::ConnectFailed(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "probe connection closed");
            }
        });
        Ok(client)
    }
}

#[async_trait]
impl BackendProbe for PgBackendProbe {
    async fn is_in_recovery(&self, host: &str, port: u16) -> Result<RecoveryState, ProbeError> {
        let client = self.connect(host, port).await?;
        let row = client
            .query_one("SELECT pg_is_in_recovery()", &[])
            .await
            .map_err(|e| ProbeError::QueryFailed(e.to_string()))?;
        Ok(row.get(0))
    }

    async fn wal_receiver_status(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Option<WalReceiverStatus>, ProbeError> {
        let client = self.connect(host, port).await?;
        let rows = client
            .query("SELECT status, conninfo FROM pg_stat_wal_receiver", &[])
            .await
            .map_err(|e| ProbeError::QueryFailed(e.to_string()))?;
        Ok(rows.first().map(|row| WalReceiverStatus {
            status: row.get(0),
            conninfo: row.get(1),
        }))
    }

    async fn server_version(&self, host: &str, port: u16) -> Result<(u32, u32), ProbeError> {
        let client = self.connect(host, port).await?;
        let row = client
            .query_one("SHOW server_version_num", &[])
            .await
            .map_err(|e| ProbeError::QueryFailed(e.to_string()))?;
        let raw: String = row.get(0);
        let num: u32 = raw.parse().map_err(|_| ProbeError::QueryFailed(format!("unparseable version {raw}")))?;
        Ok((num / 10000, num % 10000))
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{BackendProbe, ProbeError, RecoveryState, WalReceiverStatus};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    pub struct FakeBackendState {
        pub recovery: Option<RecoveryState>,
        pub wal_receiver: Option<WalReceiverStatus>,
        pub version: (u32, u32),
        pub unreachable: bool,
    }

    /// Scripted probe responses keyed by `host:port`.
    #[derive(Clone, Default)]
    pub struct FakeBackendProbe {
        inner: Arc<Mutex<HashMap<String, FakeBackendState>>>,
    }

    impl FakeBackendProbe {
        pub fn new() -> Self {
            Self::default()
        }

        fn key(host: &str, port: u16) -> String {
            format!("{host}:{port}")
        }

        pub fn set(&self, host: &str, port: u16, state: FakeBackendState) {
            self.inner.lock().insert(Self::key(host, port), state);
        }
    }

    #[async_trait]
    impl BackendProbe for FakeBackendProbe {
        async fn is_in_recovery(&self, host: &str, port: u16) -> Result<RecoveryState, ProbeError> {
            let guard = self.inner.lock();
            match guard.get(&Self::key(host, port)) {
                Some(s) if s.unreachable => Err(ProbeError::ConnectFailed(format!("{host}:{port}"))),
                Some(s) => s
                    .recovery
                    .ok_or_else(|| ProbeError::QueryFailed("no recovery state scripted".into())),
                None => Err(ProbeError::ConnectFailed(format!("{host}:{port}"))),
            }
        }

        async fn wal_receiver_status(
            &self,
            host: &str,
            port: u16,
        ) -> Result<Option<WalReceiverStatus>, ProbeError> {
            let guard = self.inner.lock();
            match guard.get(&Self::key(host, port)) {
                Some(s) if s.unreachable => Err(ProbeError::ConnectFailed(format!("{host}:{port}"))),
                Some(s) => Ok(s.wal_receiver.clone()),
                None => Err(ProbeError::ConnectFailed(format!("{host}:{port}"))),
            }
        }

        async fn server_version(&self, host: &str, port: u16) -> Result<(u32, u32), ProbeError> {
            let guard = self.inner.lock();
            match guard.get(&Self::key(host, port)) {
                Some(s) if s.unreachable => Err(ProbeError::ConnectFailed(format!("{host}:{port}"))),
                Some(s) => Ok(s.version),
                None => Err(ProbeError::ConnectFailed(format!("{host}:{port}"))),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBackendProbe, FakeBackendState};
