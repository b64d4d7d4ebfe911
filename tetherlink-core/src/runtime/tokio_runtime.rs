// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tokio-backed task runner and timers.
//!
//! Both spawn onto the current `LocalSet`; callers must be running inside
//! one (`LocalSet::run_until` or `LocalSet::block_on`).

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{OneShotTimer, Task, TaskRunner, TimerFactory};

/// Posts tasks with `tokio::task::spawn_local`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTaskRunner;

impl TaskRunner for TokioTaskRunner {
    fn post_task(&self, task: Task) {
        tokio::task::spawn_local(async move {
            task();
        });
    }
}

/// Creates timers backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimerFactory;

impl TimerFactory for TokioTimerFactory {
    fn create_one_shot_timer(&self) -> Box<dyn OneShotTimer> {
        Box::new(TokioOneShotTimer::default())
    }
}

#[derive(Default)]
struct TokioOneShotTimer {
    handle: Option<JoinHandle<()>>,
    running: Rc<Cell<bool>>,
}

impl OneShotTimer for TokioOneShotTimer {
    fn start(&mut self, delay: Duration, callback: Task) {
        self.stop();

        let running = Rc::new(Cell::new(true));
        self.running = running.clone();
        self.handle = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            running.set(false);
            callback();
        }));
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.running.set(false);
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }
}

impl Drop for TokioOneShotTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
