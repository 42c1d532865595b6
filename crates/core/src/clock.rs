// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so status-changed timestamps are testable.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// A clock that provides the current time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Fake clock for deterministic tests. `now()` and `epoch_ms()` advance
/// together so ordering assertions on either view agree.
#[derive(Clone)]
pub struct FakeClock {
    started: Instant,
    offset_ms: Arc<Mutex<u64>>,
    epoch_base_ms: u64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            offset_ms: Arc::new(Mutex::new(0)),
            epoch_base_ms: 1_000_000,
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        *self.offset_ms.lock() += ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.started + std::time::Duration::from_millis(*self.offset_ms.lock())
    }

    fn epoch_ms(&self) -> u64 {
        self.epoch_base_ms + *self.offset_ms.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_both_views_of_time() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        let e0 = clock.epoch_ms();
        clock.advance_ms(500);
        assert!(clock.now() > t0);
        assert_eq!(clock.epoch_ms(), e0 + 500);
    }
}
