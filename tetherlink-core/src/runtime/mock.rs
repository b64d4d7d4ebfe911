// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock task runner and timers for tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use super::{OneShotTimer, Task, TaskRunner, TimerFactory};

/// Task runner that queues tasks until the test drains them.
#[derive(Default)]
pub struct MockTaskRunner {
    queue: RefCell<VecDeque<Task>>,
}

impl MockTaskRunner {
    /// Creates an empty runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending_tasks(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs queued tasks, including ones posted while draining, until the
    /// queue is empty. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl TaskRunner for MockTaskRunner {
    fn post_task(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }
}

#[derive(Default)]
struct MockTimerState {
    delay: Option<Duration>,
    callback: Option<Task>,
}

/// Test-side view of a timer created by [`MockTimerFactory`].
#[derive(Clone)]
pub struct MockTimerHandle {
    state: Rc<RefCell<MockTimerState>>,
}

impl MockTimerHandle {
    /// Whether the timer is started and has not fired or been stopped.
    pub fn is_running(&self) -> bool {
        self.state.borrow().callback.is_some()
    }

    /// Delay passed to the most recent `start`.
    pub fn delay(&self) -> Option<Duration> {
        self.state.borrow().delay
    }

    /// Fires the timer. Returns false if it was not running.
    pub fn fire(&self) -> bool {
        let callback = self.state.borrow_mut().callback.take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

struct MockOneShotTimer {
    state: Rc<RefCell<MockTimerState>>,
}

impl OneShotTimer for MockOneShotTimer {
    fn start(&mut self, delay: Duration, callback: Task) {
        let mut state = self.state.borrow_mut();
        state.delay = Some(delay);
        state.callback = Some(callback);
    }

    fn stop(&mut self) {
        self.state.borrow_mut().callback = None;
    }

    fn is_running(&self) -> bool {
        self.state.borrow().callback.is_some()
    }
}

impl Drop for MockOneShotTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Timer factory that records every timer it creates.
#[derive(Default)]
pub struct MockTimerFactory {
    timers: RefCell<Vec<MockTimerHandle>>,
}

impl MockTimerFactory {
    /// Creates a factory with no timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// All timers created so far, in creation order.
    pub fn timers(&self) -> Vec<MockTimerHandle> {
        self.timers.borrow().clone()
    }

    /// The most recently created timer.
    pub fn last_timer(&self) -> Option<MockTimerHandle> {
        self.timers.borrow().last().cloned()
    }

    /// Timers that are currently running.
    pub fn running_timers(&self) -> Vec<MockTimerHandle> {
        self.timers
            .borrow()
            .iter()
            .filter(|t| t.is_running())
            .cloned()
            .collect()
    }
}

impl TimerFactory for MockTimerFactory {
    fn create_one_shot_timer(&self) -> Box<dyn OneShotTimer> {
        let state = Rc::new(RefCell::new(MockTimerState::default()));
        self.timers.borrow_mut().push(MockTimerHandle {
            state: state.clone(),
        });
        Box::new(MockOneShotTimer { state })
    }
}
