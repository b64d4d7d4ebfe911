// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event Loop Seams
//!
//! Task posting and one-shot timers. Every connection-level completion in
//! this crate is delivered through one of these, never synchronously from
//! inside the request that caused it.

mod mock;
#[cfg(feature = "tokio-runtime")]
mod tokio_runtime;

use std::time::Duration;

pub use mock::{MockTaskRunner, MockTimerFactory, MockTimerHandle};
#[cfg(feature = "tokio-runtime")]
pub use tokio_runtime::{TokioTaskRunner, TokioTimerFactory};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Posts tasks to run on a later turn of the owning event loop.
pub trait TaskRunner {
    /// Queues `task` to run after the current task completes.
    fn post_task(&self, task: Task);
}

/// A timer that fires its callback once.
///
/// Stopping or dropping a running timer discards the callback.
pub trait OneShotTimer {
    /// Starts (or restarts) the timer. A restart discards the previous callback.
    fn start(&mut self, delay: Duration, callback: Task);

    /// Stops the timer without firing.
    fn stop(&mut self);

    /// Whether the timer is started and has not fired yet.
    fn is_running(&self) -> bool;
}

/// Creates timers. Injected so tests can fire timers by hand.
pub trait TimerFactory {
    /// Creates a new, stopped timer.
    fn create_one_shot_timer(&self) -> Box<dyn OneShotTimer>;
}
