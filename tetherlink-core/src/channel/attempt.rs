// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connection Attempt
//!
//! A pending request for a [`ClientChannel`]. The requester owns the
//! `ConnectionAttempt` and must set a delegate right away; the producer
//! owns the one-shot [`ConnectionAttemptResolver`]. Dropping the attempt
//! before it resolves cancels it.
//!
//! ```text
//! PENDING --notify_failure-----> FAILED
//!         --notify_connection--> CONNECTED
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error};

use super::ClientChannel;
use crate::runtime::Task;

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionAttemptFailureReason {
    AuthenticationError,
    GattConnectionError,
    /// The remote device was not found before the medium gave up scanning.
    TimeoutFindingDevice,
    AdapterNotPresent,
    AdapterDisabled,
    LocalDeviceInvalidPublicKey,
    LocalDeviceInvalidBeaconSeeds,
    RemoteDeviceInvalidPublicKey,
    RemoteDeviceInvalidBeaconSeeds,
}

/// Transient failure kinds that are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryableFailure {
    /// A scan finished without seeing the device.
    EmptyScan,
    /// The device was seen but the GATT connection failed.
    GattConnection,
}

impl ConnectionAttemptFailureReason {
    /// The retry bucket of this failure; `None` for terminal failures.
    pub fn retryable_failure(self) -> Option<RetryableFailure> {
        match self {
            ConnectionAttemptFailureReason::TimeoutFindingDevice => {
                Some(RetryableFailure::EmptyScan)
            }
            ConnectionAttemptFailureReason::GattConnectionError => {
                Some(RetryableFailure::GattConnection)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionAttemptFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthenticationError => "authentication error",
            Self::GattConnectionError => "GATT connection error",
            Self::TimeoutFindingDevice => "timeout finding device",
            Self::AdapterNotPresent => "adapter not present",
            Self::AdapterDisabled => "adapter disabled",
            Self::LocalDeviceInvalidPublicKey => "local device has invalid public key",
            Self::LocalDeviceInvalidBeaconSeeds => "local device has invalid beacon seeds",
            Self::RemoteDeviceInvalidPublicKey => "remote device has invalid public key",
            Self::RemoteDeviceInvalidBeaconSeeds => "remote device has invalid beacon seeds",
        };
        f.write_str(name)
    }
}

/// Receives the outcome of a [`ConnectionAttempt`]. Exactly one method is
/// called, exactly once.
pub trait ConnectionAttemptDelegate {
    fn on_connection_attempt_failure(&mut self, reason: ConnectionAttemptFailureReason);

    fn on_connection(&mut self, channel: ClientChannel);
}

#[derive(Default)]
struct AttemptState {
    delegate: Option<Box<dyn ConnectionAttemptDelegate>>,
    is_resolved: bool,
    cancel_handler: Option<Task>,
}

pub struct ConnectionAttempt {
    state: Rc<RefCell<AttemptState>>,
}

impl ConnectionAttempt {
    /// Creates a pending attempt and its resolver.
    pub fn new() -> (Self, ConnectionAttemptResolver) {
        let state = Rc::new(RefCell::new(AttemptState::default()));
        let resolver = ConnectionAttemptResolver {
            state: Rc::downgrade(&state),
        };
        (ConnectionAttempt { state }, resolver)
    }

    /// Like [`ConnectionAttempt::new`]; `on_cancel` runs if the attempt is
    /// dropped before it resolves.
    pub fn with_cancel_handler(
        on_cancel: impl FnOnce() + 'static,
    ) -> (Self, ConnectionAttemptResolver) {
        let (attempt, resolver) = Self::new();
        attempt.state.borrow_mut().cancel_handler = Some(Box::new(on_cancel));
        (attempt, resolver)
    }

    pub fn set_delegate(&mut self, delegate: Box<dyn ConnectionAttemptDelegate>) {
        let mut state = self.state.borrow_mut();
        debug_assert!(
            !state.is_resolved,
            "delegate set on an already resolved connection attempt"
        );
        state.delegate = Some(delegate);
    }

    pub fn is_resolved(&self) -> bool {
        self.state.borrow().is_resolved
    }
}

impl Drop for ConnectionAttempt {
    fn drop(&mut self) {
        let (cancel_handler, delegate) = {
            let mut state = self.state.borrow_mut();
            let cancel_handler = if state.is_resolved {
                None
            } else {
                state.cancel_handler.take()
            };
            (cancel_handler, state.delegate.take())
        };
        drop(delegate);

        if let Some(cancel_handler) = cancel_handler {
            debug!("connection attempt dropped before resolution, cancelling");
            cancel_handler();
        }
    }
}

/// Producer side of a [`ConnectionAttempt`]. Consumed on resolution.
pub struct ConnectionAttemptResolver {
    state: Weak<RefCell<AttemptState>>,
}

impl ConnectionAttemptResolver {
    /// Whether the requester dropped the attempt.
    pub fn is_cancelled(&self) -> bool {
        self.state.strong_count() == 0
    }

    pub fn notify_failure(self, reason: ConnectionAttemptFailureReason) {
        if let Some((_state, mut delegate)) = self.resolve() {
            delegate.on_connection_attempt_failure(reason);
        }
    }

    /// Hands `channel` to the delegate. If the attempt was cancelled the
    /// channel is dropped, which disconnects it.
    pub fn notify_connection(self, channel: ClientChannel) {
        if let Some((_state, mut delegate)) = self.resolve() {
            delegate.on_connection(channel);
        }
    }

    // The upgraded state is returned alongside the delegate so the attempt's
    // state outlives the callback even if the delegate drops the attempt.
    fn resolve(
        &self,
    ) -> Option<(Rc<RefCell<AttemptState>>, Box<dyn ConnectionAttemptDelegate>)> {
        let Some(state) = self.state.upgrade() else {
            debug!("connection attempt already cancelled");
            return None;
        };
        let delegate = {
            let mut inner = state.borrow_mut();
            inner.is_resolved = true;
            inner.cancel_handler = None;
            inner.delegate.take()
        };
        debug_assert!(
            delegate.is_some(),
            "connection attempt resolved before a delegate was set"
        );
        let Some(delegate) = delegate else {
            error!("connection attempt resolved before a delegate was set");
            return None;
        };
        Some((state, delegate))
    }
}
