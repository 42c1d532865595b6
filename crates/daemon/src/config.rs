// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor configuration (§1 non-goal: no HBA/grammar validation lives
//! here, just a TOML file into a typed record).

use poolguard_core::{BackendEntry, BackendFlags, ReplicationMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
    #[error("config has no backends")]
    NoBackends,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    #[serde(default)]
    pub always_primary: bool,
    #[serde(default)]
    pub disallow_to_failover: bool,
}

impl BackendConfig {
    fn into_entry(self) -> BackendEntry {
        let mut entry = BackendEntry::new(self.host, self.port, self.data_dir);
        if self.always_primary {
            entry.flags |= BackendFlags::ALWAYS_PRIMARY;
        }
        if self.disallow_to_failover {
            entry.flags |= BackendFlags::DISALLOW_TO_FAILOVER;
        }
        entry
    }
}

fn default_replication_mode() -> ReplicationMode {
    ReplicationMode::Streaming
}

fn default_num_init_children() -> usize {
    32
}

fn default_listen_backlog_multiplier() -> usize {
    2
}

fn default_search_primary_node_timeout_secs() -> u64 {
    10
}

fn default_log_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_log_retain() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub backends: Vec<BackendConfig>,
    #[serde(default = "default_replication_mode")]
    pub replication_mode: ReplicationMode,
    #[serde(default)]
    pub detach_false_primary: bool,
    #[serde(default = "default_num_init_children")]
    pub num_init_children: usize,
    #[serde(default = "default_listen_backlog_multiplier")]
    pub listen_backlog_multiplier: usize,
    #[serde(default = "default_search_primary_node_timeout_secs")]
    pub search_primary_node_timeout_secs: u64,
    pub failback_command: Option<String>,
    pub failover_command: Option<String>,
    pub follow_primary_command: Option<String>,
    /// `program arg1 arg2 ...` the supervisor execs for each role.
    /// None means the role is never spawned — acceptable for a
    /// deployment that doesn't run, say, health checks out-of-process
    /// (§1 non-goal: the binaries' own logic is someone else's job).
    pub worker_command: Option<String>,
    pub worker_singleton_command: Option<String>,
    pub health_check_command: Option<String>,
    pub pcp_command: Option<String>,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Rotate `poolguard.log` once it reaches this size.
    #[serde(default = "default_log_max_bytes")]
    pub log_max_bytes: u64,
    /// How many rotated generations (`.1`, `.2`, ...) to keep.
    #[serde(default = "default_log_retain")]
    pub log_retain: u32,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/run/poolguard")
}

/// Fully resolved configuration the rest of the daemon consumes.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub backends: Vec<BackendEntry>,
    pub replication_mode: ReplicationMode,
    pub detach_false_primary: bool,
    pub num_init_children: usize,
    pub listen_backlog: usize,
    pub search_primary_node_timeout_secs: u64,
    pub failback_command: Option<String>,
    pub failover_command: Option<String>,
    pub follow_primary_command: Option<String>,
    pub worker_command: Option<String>,
    pub worker_singleton_command: Option<String>,
    pub health_check_command: Option<String>,
    pub pcp_command: Option<String>,
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub status_file_path: PathBuf,
    pub log_path: PathBuf,
    pub log_max_bytes: u64,
    pub log_retain: u32,
}

/// Backlog is capped at 10000 regardless of `num_init_children *
/// listen_backlog_multiplier` (§6).
const MAX_LISTEN_BACKLOG: usize = 10000;

impl SupervisorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| ConfigError::Load { path: path.to_path_buf(), source })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        let backends = raw.backends.into_iter().map(BackendConfig::into_entry).collect();
        let listen_backlog =
            (raw.num_init_children * raw.listen_backlog_multiplier).min(MAX_LISTEN_BACKLOG);

        Ok(Self {
            backends,
            replication_mode: raw.replication_mode,
            detach_false_primary: raw.detach_false_primary,
            num_init_children: raw.num_init_children,
            listen_backlog,
            search_primary_node_timeout_secs: raw.search_primary_node_timeout_secs,
            failback_command: raw.failback_command,
            failover_command: raw.failover_command,
            follow_primary_command: raw.follow_primary_command,
            worker_command: raw.worker_command,
            worker_singleton_command: raw.worker_singleton_command,
            health_check_command: raw.health_check_command,
            pcp_command: raw.pcp_command,
            socket_path: raw.state_dir.join("poolguard.sock"),
            lock_path: raw.state_dir.join("poolguard.pid"),
            status_file_path: raw.state_dir.join("pgpool_status"),
            log_path: raw.state_dir.join("poolguard.log"),
            log_max_bytes: raw.log_max_bytes,
            log_retain: raw.log_retain,
            state_dir: raw.state_dir,
        })
    }
}

impl SupervisorConfig {
    /// Parse a `program arg1 arg2` command string. Empty/`None` means
    /// the role has no configured command.
    pub fn split_command(command: &Option<String>) -> Option<(String, Vec<String>)> {
        let command = command.as_ref()?;
        let mut parts = command.split_whitespace();
        let program = parts.next()?.to_string();
        Some((program, parts.map(str::to_string).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn loads_backends_and_defaults() {
        let file = write_toml(
            r#"
            [[backends]]
            host = "a"
            port = 5432
            data_dir = "/data/a"

            [[backends]]
            host = "b"
            port = 5432
            data_dir = "/data/b"
            always_primary = true
            "#,
        );
        let config = SupervisorConfig::load(file.path()).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert!(config.backends[1].flags.contains(BackendFlags::ALWAYS_PRIMARY));
        assert_eq!(config.replication_mode, ReplicationMode::Streaming);
        assert_eq!(config.listen_backlog, 64);
    }

    #[test]
    fn backlog_is_capped_at_10000() {
        let file = write_toml(
            r#"
            num_init_children = 10000
            listen_backlog_multiplier = 10

            [[backends]]
            host = "a"
            port = 5432
            data_dir = "/data/a"
            "#,
        );
        let config = SupervisorConfig::load(file.path()).unwrap();
        assert_eq!(config.listen_backlog, MAX_LISTEN_BACKLOG);
    }

    #[test]
    fn empty_backend_list_is_rejected() {
        let file = write_toml("backends = []\n");
        assert!(matches!(SupervisorConfig::load(file.path()), Err(ConfigError::NoBackends)));
    }
}
