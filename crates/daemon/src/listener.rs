// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The admin control socket (§6): accepts `poolguardctl` connections,
//! decodes one `AdminRequest` per connection, and either answers
//! directly (`Status`) or pushes the translated queue entry and signals
//! the supervisor to run a sweep.

use poolguard_engine::{EngineError, FailoverEngine, SharedState};
use poolguard_wire::{
    codec, AdminRequest, AdminResponse, BackendSnapshot, StatusSnapshot,
};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct ListenCtx<C: poolguard_core::Clock> {
    pub shared: Arc<SharedState>,
    pub engine: Arc<FailoverEngine<C>>,
}

pub struct Listener<C: poolguard_core::Clock> {
    unix: UnixListener,
    ctx: Arc<ListenCtx<C>>,
}

impl<C: poolguard_core::Clock> Listener<C> {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx<C>>) -> Self {
        Self { unix, ctx }
    }

    /// Accept connections until `shutdown` fires. Each connection is
    /// handled on its own spawned task so a slow `poolguardctl` client
    /// never blocks the engine loop.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                result = self.unix.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &ctx).await {
                                    log_error(e);
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "admin socket accept failed"),
                    }
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ConnError {
    #[error(transparent)]
    Codec(#[from] codec::CodecError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn log_error(e: ConnError) {
    match e {
        ConnError::Codec(codec::CodecError::ConnectionClosed) => debug!("client disconnected"),
        e => warn!(error = %e, "admin connection error"),
    }
}

async fn handle_connection<C: poolguard_core::Clock>(
    mut stream: UnixStream,
    ctx: &ListenCtx<C>,
) -> Result<(), ConnError> {
    let request: AdminRequest = codec::read_message(&mut stream).await?;
    let response = dispatch(request, ctx).await?;
    codec::write_message(&mut stream, &response).await?;
    Ok(())
}

async fn dispatch<C: poolguard_core::Clock>(
    request: AdminRequest,
    ctx: &ListenCtx<C>,
) -> Result<AdminResponse, EngineError> {
    if matches!(request, AdminRequest::Status) {
        return Ok(AdminResponse::Status(status_snapshot(&ctx.shared)));
    }

    let Some(entry) = request.into_queue_entry() else {
        return Ok(AdminResponse::Accepted);
    };

    if ctx.shared.queue.enqueue(entry).is_err() {
        return Ok(AdminResponse::QueueFull);
    }

    // §4.3: if nobody else is mid-sweep, run it inline rather than
    // waiting for the next event-loop wakeup — the admin client gets a
    // response only once the sweep it asked for has actually happened.
    if !ctx.shared.is_switching() {
        ctx.engine.run_sweep().await?;
    }

    Ok(AdminResponse::Accepted)
}

fn status_snapshot(shared: &SharedState) -> StatusSnapshot {
    let table = shared.table.lock();
    let backends = table
        .ids()
        .filter_map(|id| {
            table.get(id).map(|e| BackendSnapshot {
                id,
                host: e.host.clone(),
                port: e.port,
                status: e.status,
                role: e.role,
                quarantine: e.quarantine,
            })
        })
        .collect();
    StatusSnapshot {
        backends,
        main_node_id: shared.main_node(),
        primary_node_id: shared.primary_node(),
        switching: shared.is_switching(),
    }
}
