// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock channel collaborators for tests.

use std::cell::RefCell;
use std::rc::Rc;

use super::{
    ChannelTransport, ClientChannel, ClientChannelHandle, ConnectionAttempt,
    ConnectionAttemptResolver, ConnectionCallback, ConnectionMedium, ConnectionOutcome,
    ConnectionPriority, ConnectionRole, PhysicalLink, SecureChannelClient, SecureContext,
};
use crate::device::{DeviceIdPair, RemoteDeviceRef};

#[derive(Default)]
struct MockTransportState {
    sent_messages: Vec<Vec<u8>>,
    metadata_requests: usize,
    disconnected: bool,
}

/// Transport that records what the channel asks of it. Clones share state.
#[derive(Clone, Default)]
pub struct MockChannelTransport {
    state: Rc<RefCell<MockTransportState>>,
}

impl MockChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel over a fresh mock transport.
    pub fn create_channel() -> (ClientChannel, ClientChannelHandle, MockChannelTransport) {
        let transport = MockChannelTransport::new();
        let (channel, handle) = ClientChannel::new(Box::new(transport.clone()));
        (channel, handle, transport)
    }

    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.state.borrow().sent_messages.clone()
    }

    pub fn metadata_requests(&self) -> usize {
        self.state.borrow().metadata_requests
    }

    /// Whether the channel released the transport.
    pub fn was_disconnected(&self) -> bool {
        self.state.borrow().disconnected
    }
}

impl ChannelTransport for MockChannelTransport {
    fn send_message(&mut self, payload: Vec<u8>) {
        self.state.borrow_mut().sent_messages.push(payload);
    }

    fn request_connection_metadata(&mut self) {
        self.state.borrow_mut().metadata_requests += 1;
    }

    fn disconnect(&mut self) {
        self.state.borrow_mut().disconnected = true;
    }
}

/// Reversible stand-in for an encrypted session: prepends a marker.
#[derive(Debug, Clone, Default)]
pub struct MockSecureContext;

impl MockSecureContext {
    pub const MARKER: &'static [u8] = b"enc:";
}

impl SecureContext for MockSecureContext {
    fn encode(&mut self, message: &[u8]) -> Vec<u8> {
        let mut encoded = Self::MARKER.to_vec();
        encoded.extend_from_slice(message);
        encoded
    }

    fn decode(&mut self, encoded: &[u8]) -> Option<Vec<u8>> {
        encoded.strip_prefix(Self::MARKER).map(<[u8]>::to_vec)
    }

    fn channel_binding_data(&self) -> Vec<u8> {
        b"mock-binding".to_vec()
    }
}

#[derive(Default)]
struct MockLinkState {
    sent: Vec<Vec<u8>>,
    disconnected: bool,
}

/// Physical link that records writes. Clones share state.
#[derive(Clone, Default)]
pub struct MockPhysicalLink {
    state: Rc<RefCell<MockLinkState>>,
}

impl MockPhysicalLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.borrow().sent.clone()
    }

    pub fn was_disconnected(&self) -> bool {
        self.state.borrow().disconnected
    }
}

impl PhysicalLink for MockPhysicalLink {
    fn send(&mut self, bytes: Vec<u8>) {
        self.state.borrow_mut().sent.push(bytes);
    }

    fn disconnect(&mut self) {
        self.state.borrow_mut().disconnected = true;
    }
}

/// Arguments of one connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub remote_device_id: String,
    pub local_device_id: String,
    pub feature: String,
    pub priority: ConnectionPriority,
    pub role: ConnectionRole,
}

/// Client that hands out attempts and lets the test resolve them.
#[derive(Default)]
pub struct MockSecureChannelClient {
    requests: RefCell<Vec<ConnectionRequest>>,
    resolvers: RefCell<Vec<(String, ConnectionAttemptResolver)>>,
}

impl MockSecureChannelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request made so far.
    pub fn requests(&self) -> Vec<ConnectionRequest> {
        self.requests.borrow().clone()
    }

    pub fn requests_for(&self, remote_device_id: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|request| request.remote_device_id == remote_device_id)
            .count()
    }

    /// Takes the resolver of the newest unresolved attempt for a device.
    pub fn take_resolver(&self, remote_device_id: &str) -> Option<ConnectionAttemptResolver> {
        let mut resolvers = self.resolvers.borrow_mut();
        let index = resolvers
            .iter()
            .rposition(|(device_id, _)| device_id == remote_device_id)?;
        Some(resolvers.remove(index).1)
    }

    fn record(
        &self,
        device_to_connect: &RemoteDeviceRef,
        local_device: &RemoteDeviceRef,
        feature: &str,
        priority: ConnectionPriority,
        role: ConnectionRole,
    ) -> ConnectionAttempt {
        self.requests.borrow_mut().push(ConnectionRequest {
            remote_device_id: device_to_connect.device_id().to_string(),
            local_device_id: local_device.device_id().to_string(),
            feature: feature.to_string(),
            priority,
            role,
        });
        let (attempt, resolver) = ConnectionAttempt::new();
        self.resolvers
            .borrow_mut()
            .push((device_to_connect.device_id().to_string(), resolver));
        attempt
    }
}

impl SecureChannelClient for MockSecureChannelClient {
    fn initiate_connection_to_device(
        &self,
        device_to_connect: &RemoteDeviceRef,
        local_device: &RemoteDeviceRef,
        feature: &str,
        priority: ConnectionPriority,
    ) -> ConnectionAttempt {
        self.record(device_to_connect, local_device, feature, priority, ConnectionRole::Initiator)
    }

    fn listen_for_connection_from_device(
        &self,
        device_to_connect: &RemoteDeviceRef,
        local_device: &RemoteDeviceRef,
        feature: &str,
        priority: ConnectionPriority,
    ) -> ConnectionAttempt {
        self.record(device_to_connect, local_device, feature, priority, ConnectionRole::Listener)
    }
}

/// Medium that records requests and completes them on demand.
#[derive(Default)]
pub struct MockConnectionMedium {
    requests: RefCell<Vec<(DeviceIdPair, ConnectionRole, ConnectionPriority)>>,
    callbacks: RefCell<Vec<(DeviceIdPair, ConnectionCallback)>>,
    cancelled: RefCell<Vec<DeviceIdPair>>,
    priority_updates: RefCell<Vec<(DeviceIdPair, ConnectionPriority)>>,
}

impl MockConnectionMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<(DeviceIdPair, ConnectionRole, ConnectionPriority)> {
        self.requests.borrow().clone()
    }

    pub fn cancelled(&self) -> Vec<DeviceIdPair> {
        self.cancelled.borrow().clone()
    }

    pub fn priority_updates(&self) -> Vec<(DeviceIdPair, ConnectionPriority)> {
        self.priority_updates.borrow().clone()
    }

    /// Completes the oldest outstanding request for `pair`. Returns false if
    /// there was none.
    pub fn complete(&self, pair: &DeviceIdPair, outcome: ConnectionOutcome) -> bool {
        let callback = {
            let mut callbacks = self.callbacks.borrow_mut();
            callbacks
                .iter()
                .position(|(pending, _)| pending == pair)
                .map(|index| callbacks.remove(index).1)
        };
        match callback {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }
}

impl ConnectionMedium for MockConnectionMedium {
    fn request_connection(
        &self,
        pair: &DeviceIdPair,
        role: ConnectionRole,
        priority: ConnectionPriority,
        callback: ConnectionCallback,
    ) {
        self.requests
            .borrow_mut()
            .push((pair.clone(), role, priority));
        self.callbacks.borrow_mut().push((pair.clone(), callback));
    }

    fn cancel_connection_request(&self, pair: &DeviceIdPair) {
        self.cancelled.borrow_mut().push(pair.clone());
        self.callbacks
            .borrow_mut()
            .retain(|(pending, _)| pending != pair);
    }

    fn update_connection_priority(&self, pair: &DeviceIdPair, priority: ConnectionPriority) {
        self.priority_updates
            .borrow_mut()
            .push((pair.clone(), priority));
    }
}
