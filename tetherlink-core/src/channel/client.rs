// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure Channel Client
//!
//! Entry point for features that need a channel to a remote device.
//! `MultiplexingSecureChannelClient` reuses a live connection to the same
//! device pair when one exists and otherwise asks the [`ConnectionMedium`]
//! for a new one, sharing the outcome between every request for that pair.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use super::{
    ConnectionAttempt, ConnectionAttemptFailureReason, ConnectionAttemptResolver,
    ConnectionPriority, MultiplexedConnection,
};
use crate::device::{DeviceIdPair, RemoteDeviceRef};
use crate::runtime::TaskRunner;

/// Which side of the connection this device takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// This device scans for and connects to the remote device.
    Initiator,
    /// This device advertises and waits for the remote device.
    Listener,
}

pub trait SecureChannelClient {
    /// Connects to `device_to_connect`, acting as initiator.
    fn initiate_connection_to_device(
        &self,
        device_to_connect: &RemoteDeviceRef,
        local_device: &RemoteDeviceRef,
        feature: &str,
        priority: ConnectionPriority,
    ) -> ConnectionAttempt;

    /// Waits for `device_to_connect` to connect, acting as listener.
    fn listen_for_connection_from_device(
        &self,
        device_to_connect: &RemoteDeviceRef,
        local_device: &RemoteDeviceRef,
        feature: &str,
        priority: ConnectionPriority,
    ) -> ConnectionAttempt;
}

/// Result of a connection request to the medium.
pub type ConnectionOutcome = Result<MultiplexedConnection, ConnectionAttemptFailureReason>;

/// Completion callback of [`ConnectionMedium::request_connection`].
pub type ConnectionCallback = Box<dyn FnOnce(ConnectionOutcome)>;

/// Establishes authenticated physical connections (the BLE connection
/// manager). The callback must be invoked from a later task, never from
/// inside `request_connection`.
pub trait ConnectionMedium {
    fn request_connection(
        &self,
        pair: &DeviceIdPair,
        role: ConnectionRole,
        priority: ConnectionPriority,
        callback: ConnectionCallback,
    );

    /// Every request for `pair` was cancelled.
    fn cancel_connection_request(&self, _pair: &DeviceIdPair) {}

    /// A request for `pair` with a higher priority arrived.
    fn update_connection_priority(&self, _pair: &DeviceIdPair, _priority: ConnectionPriority) {}
}

struct PendingRequest {
    id: u64,
    feature: String,
    resolver: ConnectionAttemptResolver,
}

struct PendingPair {
    priority: ConnectionPriority,
    requests: Vec<PendingRequest>,
}

#[derive(Default)]
struct ClientState {
    connections: HashMap<DeviceIdPair, MultiplexedConnection>,
    pending: HashMap<DeviceIdPair, PendingPair>,
    next_request_id: u64,
}

struct ClientInner {
    medium: Rc<dyn ConnectionMedium>,
    task_runner: Rc<dyn TaskRunner>,
    state: RefCell<ClientState>,
}

pub struct MultiplexingSecureChannelClient {
    inner: Rc<ClientInner>,
}

impl MultiplexingSecureChannelClient {
    pub fn new(medium: Rc<dyn ConnectionMedium>, task_runner: Rc<dyn TaskRunner>) -> Self {
        MultiplexingSecureChannelClient {
            inner: Rc::new(ClientInner {
                medium,
                task_runner,
                state: RefCell::new(ClientState::default()),
            }),
        }
    }

    /// Live connection for `pair`, if any.
    pub fn connection_for(&self, pair: &DeviceIdPair) -> Option<MultiplexedConnection> {
        self.inner.live_connection(pair)
    }

    /// Number of requests waiting on the medium for `pair`.
    pub fn pending_request_count(&self, pair: &DeviceIdPair) -> usize {
        self.inner
            .state
            .borrow()
            .pending
            .get(pair)
            .map_or(0, |pending| pending.requests.len())
    }

    fn request(
        &self,
        device_to_connect: &RemoteDeviceRef,
        local_device: &RemoteDeviceRef,
        feature: &str,
        priority: ConnectionPriority,
        role: ConnectionRole,
    ) -> ConnectionAttempt {
        let pair = DeviceIdPair::new(device_to_connect.device_id(), local_device.device_id());
        let request_id = {
            let mut state = self.inner.state.borrow_mut();
            let id = state.next_request_id;
            state.next_request_id += 1;
            id
        };

        let weak_inner = Rc::downgrade(&self.inner);
        let cancelled_pair = pair.clone();
        let (attempt, resolver) = ConnectionAttempt::with_cancel_handler(move || {
            if let Some(inner) = weak_inner.upgrade() {
                inner.cancel_request(&cancelled_pair, request_id);
            }
        });

        if let Some(reason) = validate_request(device_to_connect, local_device, role) {
            warn!(pair = %pair, %reason, "rejecting connection request");
            self.inner
                .task_runner
                .post_task(Box::new(move || resolver.notify_failure(reason)));
            return attempt;
        }

        debug!(pair = %pair, feature, ?role, %priority, "connection requested");
        let request = PendingRequest {
            id: request_id,
            feature: feature.to_string(),
            resolver,
        };
        if self.inner.live_connection(&pair).is_some() {
            ClientInner::post_resolution_from_live_connection(&self.inner, pair, request, role, priority);
        } else {
            ClientInner::enqueue(&self.inner, pair, request, role, priority);
        }
        attempt
    }
}

impl SecureChannelClient for MultiplexingSecureChannelClient {
    fn initiate_connection_to_device(
        &self,
        device_to_connect: &RemoteDeviceRef,
        local_device: &RemoteDeviceRef,
        feature: &str,
        priority: ConnectionPriority,
    ) -> ConnectionAttempt {
        self.request(device_to_connect, local_device, feature, priority, ConnectionRole::Initiator)
    }

    fn listen_for_connection_from_device(
        &self,
        device_to_connect: &RemoteDeviceRef,
        local_device: &RemoteDeviceRef,
        feature: &str,
        priority: ConnectionPriority,
    ) -> ConnectionAttempt {
        self.request(device_to_connect, local_device, feature, priority, ConnectionRole::Listener)
    }
}

fn validate_request(
    device_to_connect: &RemoteDeviceRef,
    local_device: &RemoteDeviceRef,
    role: ConnectionRole,
) -> Option<ConnectionAttemptFailureReason> {
    if local_device.public_key.is_empty() {
        return Some(ConnectionAttemptFailureReason::LocalDeviceInvalidPublicKey);
    }
    if device_to_connect.public_key.is_empty() {
        return Some(ConnectionAttemptFailureReason::RemoteDeviceInvalidPublicKey);
    }
    // A listener advertises with the remote device's seeds; an initiator
    // builds its scan filter from its own.
    match role {
        ConnectionRole::Listener if device_to_connect.beacon_seeds.is_empty() => {
            Some(ConnectionAttemptFailureReason::RemoteDeviceInvalidBeaconSeeds)
        }
        ConnectionRole::Initiator if local_device.beacon_seeds.is_empty() => {
            Some(ConnectionAttemptFailureReason::LocalDeviceInvalidBeaconSeeds)
        }
        _ => None,
    }
}

impl ClientInner {
    fn live_connection(&self, pair: &DeviceIdPair) -> Option<MultiplexedConnection> {
        let mut state = self.state.borrow_mut();
        match state.connections.get(pair) {
            Some(connection) if !connection.is_disconnected() => Some(connection.clone()),
            Some(_) => {
                state.connections.remove(pair);
                None
            }
            None => None,
        }
    }

    fn post_resolution_from_live_connection(
        this: &Rc<Self>,
        pair: DeviceIdPair,
        request: PendingRequest,
        role: ConnectionRole,
        priority: ConnectionPriority,
    ) {
        let weak_inner = Rc::downgrade(this);
        this.task_runner.post_task(Box::new(move || {
            let Some(inner) = weak_inner.upgrade() else {
                return;
            };
            if request.resolver.is_cancelled() {
                return;
            }
            let channel = inner
                .live_connection(&pair)
                .map(|connection| connection.add_client_channel(&request.feature));
            match channel {
                Some(Ok(channel)) => {
                    debug!(pair = %pair, feature = %request.feature, "reusing live connection");
                    request.resolver.notify_connection(channel);
                }
                _ => Self::enqueue(&inner, pair, request, role, priority),
            }
        }));
    }

    fn enqueue(
        this: &Rc<Self>,
        pair: DeviceIdPair,
        request: PendingRequest,
        role: ConnectionRole,
        priority: ConnectionPriority,
    ) {
        enum MediumCall {
            Request,
            RaisePriority,
            Nothing,
        }

        let call = {
            let mut state = this.state.borrow_mut();
            match state.pending.get_mut(&pair) {
                Some(pending) => {
                    pending.requests.push(request);
                    if priority > pending.priority {
                        pending.priority = priority;
                        MediumCall::RaisePriority
                    } else {
                        MediumCall::Nothing
                    }
                }
                None => {
                    state.pending.insert(
                        pair.clone(),
                        PendingPair {
                            priority,
                            requests: vec![request],
                        },
                    );
                    MediumCall::Request
                }
            }
        };

        match call {
            MediumCall::Request => {
                let weak_inner: Weak<Self> = Rc::downgrade(this);
                let completed_pair = pair.clone();
                this.medium.request_connection(
                    &pair,
                    role,
                    priority,
                    Box::new(move |outcome| {
                        if let Some(inner) = weak_inner.upgrade() {
                            inner.on_connection_outcome(completed_pair, outcome);
                        }
                    }),
                );
            }
            MediumCall::RaisePriority => this.medium.update_connection_priority(&pair, priority),
            MediumCall::Nothing => {}
        }
    }

    fn on_connection_outcome(&self, pair: DeviceIdPair, outcome: ConnectionOutcome) {
        let requests = {
            let mut state = self.state.borrow_mut();
            let requests = state
                .pending
                .remove(&pair)
                .map(|pending| pending.requests)
                .unwrap_or_default();
            if let Ok(connection) = &outcome {
                state.connections.insert(pair.clone(), connection.clone());
            }
            requests
        };

        match outcome {
            Ok(connection) => {
                info!(pair = %pair, requests = requests.len(), "connection established");
                let mut delivered = 0;
                for request in requests {
                    if request.resolver.is_cancelled() {
                        continue;
                    }
                    match connection.add_client_channel(&request.feature) {
                        Ok(channel) => {
                            delivered += 1;
                            request.resolver.notify_connection(channel);
                        }
                        Err(e) => {
                            warn!(pair = %pair, error = %e, "connection lost before channel handoff");
                            request
                                .resolver
                                .notify_failure(ConnectionAttemptFailureReason::GattConnectionError);
                        }
                    }
                }
                if delivered == 0 && connection.release_if_unused() {
                    debug!(pair = %pair, "connection established with no waiting requests");
                    self.state.borrow_mut().connections.remove(&pair);
                }
            }
            Err(reason) => {
                warn!(pair = %pair, %reason, requests = requests.len(), "connection failed");
                for request in requests {
                    request.resolver.notify_failure(reason);
                }
            }
        }
    }

    fn cancel_request(&self, pair: &DeviceIdPair, request_id: u64) {
        let cancel_medium = {
            let mut state = self.state.borrow_mut();
            let Some(pending) = state.pending.get_mut(pair) else {
                return;
            };
            pending.requests.retain(|request| request.id != request_id);
            if pending.requests.is_empty() {
                state.pending.remove(pair);
                true
            } else {
                false
            }
        };

        if cancel_medium {
            debug!(pair = %pair, "all requests cancelled");
            self.medium.cancel_connection_request(pair);
        }
    }
}
