// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal bridge (§5): translates the supervisor's accepted signal set
//! into `tokio::signal::unix` streams the main loop selects over. There
//! is no self-pipe here — tokio's signal handling already does the
//! signal-safe write-a-byte-to-an-fd translation for us — but the
//! handler-sets-a-flag discipline the original relies on is preserved in
//! spirit: each signal only ever causes the corresponding `Signals`
//! field to become ready, never runs handler logic itself.

use tokio::signal::unix::{signal, SignalKind};

pub struct Signals {
    pub hup: tokio::signal::unix::Signal,
    pub usr1: tokio::signal::unix::Signal,
    pub usr2: tokio::signal::unix::Signal,
    pub chld: tokio::signal::unix::Signal,
    pub term: tokio::signal::unix::Signal,
    pub int: tokio::signal::unix::Signal,
    pub quit: tokio::signal::unix::Signal,
}

impl Signals {
    pub fn install() -> std::io::Result<Self> {
        // SIGPIPE (§5) is ignored by the Rust runtime's own startup
        // before main() ever runs; nothing to install here.
        Ok(Self {
            hup: signal(SignalKind::hangup())?,
            usr1: signal(SignalKind::user_defined1())?,
            usr2: signal(SignalKind::user_defined2())?,
            chld: signal(SignalKind::child())?,
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
            quit: signal(SignalKind::quit())?,
        })
    }
}
