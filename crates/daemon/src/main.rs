// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! poolguardd — the supervisor core: a signal-driven event loop around
//! the failover engine, the child reaper, and the admin control socket.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod lock;
mod listener;
mod signals;
mod supervisor;

use crate::config::SupervisorConfig;
use crate::lock::{LockError, PidLock};
use crate::listener::{ListenCtx, Listener};
use crate::signals::Signals;
use crate::supervisor::Supervisor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("poolguardd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("poolguardd {}", env!("CARGO_PKG_VERSION"));
                println!("Connection-pool failover supervisor.");
                println!();
                println!("USAGE:");
                println!("    poolguardd <config-path>");
                println!();
                println!("Typically started by an init system, not invoked directly.");
                println!("Control is via poolguardctl against the admin socket.");
                return Ok(());
            }
            _ => {}
        }
    }

    let config_path = std::env::args()
        .nth(1)
        .ok_or("usage: poolguardd <config-path>")?;
    let config = SupervisorConfig::load(Path::new(&config_path))?;

    rotate_log_if_oversized(&config.log_path, config.log_max_bytes, config.log_retain);
    emit_startup_banner(&config)?;
    let _log_guard = init_tracing(&config)?;

    info!(backends = config.backends.len(), socket = %config.socket_path.display(), "starting poolguardd");

    let _pid_lock = match PidLock::acquire(&config.lock_path) {
        Ok(lock) => lock,
        Err(LockError::AlreadyRunning(path)) => {
            eprintln!("poolguardd is already running (lock held at {})", path.display());
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to acquire pid lock");
            return Err(e.into());
        }
    };

    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let unix_listener = UnixListener::bind(&config.socket_path)?;

    let supervisor = Arc::new(Supervisor::new(config));
    supervisor.spawn_initial_children().await;

    let listen_ctx = Arc::new(ListenCtx {
        shared: Arc::clone(&supervisor.shared),
        engine: Arc::clone(&supervisor.engine),
    });
    let admin_shutdown = CancellationToken::new();
    let listener = Listener::new(unix_listener, listen_ctx);
    tokio::spawn(listener.run(admin_shutdown.clone()));

    let mut signals = Signals::install()?;

    info!(socket = %supervisor.config.socket_path.display(), "poolguardd ready");
    println!("READY");

    // §5: 3-second wake even without a signal, to re-examine state.
    let mut idle_wake = tokio::time::interval(std::time::Duration::from_secs(3));

    loop {
        tokio::select! {
            _ = signals.hup.recv() => {
                info!("SIGHUP received, reload is a restart of poolguardd in this implementation");
            }
            _ = signals.usr1.recv() => {
                if !supervisor.shared.is_switching() {
                    if let Err(e) = supervisor.engine.run_sweep().await {
                        error!(error = %e, "sweep failed");
                    }
                }
            }
            _ = signals.usr2.recv() => {
                for pid in supervisor.registry.pids() {
                    let _ = supervisor.child_spawner.signal(pid, poolguard_adapters::Signal::Usr2);
                }
            }
            _ = signals.chld.recv() => {
                supervisor.reap_once().await;
            }
            _ = signals.term.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = signals.int.recv() => {
                info!("SIGINT received, shutting down");
                break;
            }
            _ = signals.quit.recv() => {
                info!("SIGQUIT received, shutting down");
                break;
            }
            _ = idle_wake.tick() => {
                supervisor.reap_once().await;
            }
        }

        if supervisor.is_exiting() {
            break;
        }
    }

    admin_shutdown.cancel();
    supervisor.shutdown().await;
    info!("poolguardd stopped");
    Ok(())
}

/// Appends `.N` to a log path for its Nth-oldest rotated generation.
fn numbered_log_path(log_path: &Path, generation: u32) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Shifts every rotated generation up by one and moves the live log into
/// `.1`, dropping whatever falls off the end of `retain`. Best-effort:
/// a supervisor restart shouldn't be blocked by a rotation failure, so
/// every fallible step here is swallowed rather than propagated.
fn rotate_log_if_oversized(log_path: &Path, max_bytes: u64, retain: u32) {
    let oversized = std::fs::metadata(log_path).map(|m| m.len() >= max_bytes).unwrap_or(false);
    if !oversized || retain == 0 {
        return;
    }

    for generation in (1..retain).rev() {
        let from = numbered_log_path(log_path, generation);
        let to = numbered_log_path(log_path, generation + 1);
        let _ = std::fs::rename(from, to);
    }
    let _ = std::fs::rename(log_path, numbered_log_path(log_path, 1));
}

/// Writes one line to the (possibly just-rotated) log file recording
/// this launch, so a support engineer grepping the log can find every
/// process boundary without cross-referencing the process table.
fn emit_startup_banner(config: &SupervisorConfig) -> std::io::Result<()> {
    use std::io::Write;
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&config.log_path)?;
    writeln!(
        file,
        "poolguardd pid={} backends={} socket={} launched",
        std::process::id(),
        config.backends.len(),
        config.socket_path.display(),
    )
}

/// Builds the tracing subscriber: a non-blocking file writer over
/// `config.log_path`, filtered by `POOLGUARD_LOG` if set, falling back
/// to `RUST_LOG`, falling back to `info`.
fn init_tracing(config: &SupervisorConfig) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "log path has no parent"))?;
    std::fs::create_dir_all(dir)?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "log path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = std::env::var("POOLGUARD_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .init();

    Ok(guard)
}
