// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Clock Abstraction
//!
//! Wall-clock source used by EID generation. Injected so that tests can pin
//! the current EID period.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(millis_since_epoch)
            .unwrap_or(0)
    }
}

/// Whole milliseconds in `elapsed`, saturating at `i64::MAX`.
fn millis_since_epoch(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

/// Manually driven clock for tests.
#[derive(Debug, Default)]
pub struct MockClock {
    now_millis: AtomicI64,
}

impl MockClock {
    /// Creates a clock fixed at `now_millis`.
    pub fn new(now_millis: i64) -> Self {
        MockClock {
            now_millis: AtomicI64::new(now_millis),
        }
    }

    /// Sets the current time.
    pub fn set_now_millis(&self, now_millis: i64) {
        self.now_millis.store(now_millis, Ordering::SeqCst);
    }

    /// Moves the clock forward by `delta_millis`.
    pub fn advance_millis(&self, delta_millis: i64) {
        self.now_millis.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_millis(&self) -> i64 {
        self.now_millis.load(Ordering::SeqCst)
    }
}
