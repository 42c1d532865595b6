// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! poolguardctl — sends one admin request to a running `poolguardd` over
//! its Unix control socket and prints the response (§6).

use clap::{Parser, Subcommand};
use poolguard_core::BackendId;
use poolguard_wire::{codec, AdminRequest, AdminResponse, BackendSnapshot};
use std::path::PathBuf;
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "poolguardctl", version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")))]
struct Cli {
    /// Path to the supervisor's admin control socket.
    #[arg(long, default_value = "/var/run/poolguard/poolguard.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mark backends down, removing them from routing.
    NodeDown {
        ids: Vec<usize>,
        /// Treat this as a planned switchover: the supervisor only
        /// considers a partial restart, and only when none of `ids` is
        /// the current primary.
        #[arg(long)]
        switchover: bool,
    },
    /// Mark backends up, rejoining them to routing.
    NodeUp { ids: Vec<usize> },
    /// Quarantine backends, preserving their discovered role.
    Quarantine { ids: Vec<usize> },
    /// Promote a standby to primary.
    Promote { id: usize },
    /// Ask every worker to close idle connections.
    CloseIdle,
    /// Print the current backend table and failover state.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let request = match cli.command {
        Command::NodeDown { ids, switchover } => {
            AdminRequest::NodeDown { ids: to_backend_ids(ids), switchover }
        }
        Command::NodeUp { ids } => AdminRequest::NodeUp { ids: to_backend_ids(ids) },
        Command::Quarantine { ids } => AdminRequest::Quarantine { ids: to_backend_ids(ids) },
        Command::Promote { id } => AdminRequest::Promote { id: BackendId(id) },
        Command::CloseIdle => AdminRequest::CloseIdle,
        Command::Status => AdminRequest::Status,
    };

    let mut stream = UnixStream::connect(&cli.socket).await.map_err(|e| {
        anyhow::anyhow!("failed to connect to {}: {e}", cli.socket.display())
    })?;

    codec::write_message(&mut stream, &request).await?;
    let response: AdminResponse = codec::read_message(&mut stream).await?;

    match response {
        AdminResponse::Accepted => println!("accepted"),
        AdminResponse::Rejected { reason } => {
            eprintln!("rejected: {reason}");
            std::process::exit(1);
        }
        AdminResponse::QueueFull => {
            eprintln!("rejected: request queue is full");
            std::process::exit(1);
        }
        AdminResponse::Status(snapshot) => {
            println!("main_node: {}  primary_node: {}  switching: {}",
                snapshot.main_node_id, snapshot.primary_node_id, snapshot.switching);
            for backend in &snapshot.backends {
                print_backend(backend);
            }
        }
    }

    Ok(())
}

fn to_backend_ids(ids: Vec<usize>) -> Vec<BackendId> {
    ids.into_iter().map(BackendId).collect()
}

fn print_backend(backend: &BackendSnapshot) {
    println!(
        "  [{}] {}:{}  status={:?}  role={:?}  quarantine={}",
        backend.id, backend.host, backend.port, backend.status, backend.role, backend.quarantine,
    );
}
