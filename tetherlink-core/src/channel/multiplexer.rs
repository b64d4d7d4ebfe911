// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Feature Multiplexer
//!
//! Shares one authenticated physical connection between several features.
//! Every outbound payload is wrapped in a frame tagged with its feature
//! name, then encoded by the [`SecureContext`]. Inbound frames are handed
//! only to channels registered for the frame's feature.
//!
//! The link is released when its last channel is dropped, or when the
//! connection is established but no channel is ever handed out.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{ChannelError, ChannelResult};
use super::{
    ChannelTransport, ClientChannel, ClientChannelHandle, ConnectionMetadata, PhysicalLink,
    SecureContext,
};
use crate::device::RemoteDevice;
use crate::runtime::TaskRunner;

#[derive(Debug, Serialize, Deserialize)]
struct FeatureFrame {
    feature: String,
    payload: Vec<u8>,
}

struct FeatureChannel {
    id: u64,
    feature: String,
    handle: ClientChannelHandle,
}

struct MuxState {
    context: Box<dyn SecureContext>,
    channels: Vec<FeatureChannel>,
    in_flight_sends: VecDeque<u64>,
    metadata: ConnectionMetadata,
    next_channel_id: u64,
    is_disconnected: bool,
}

struct MuxInner {
    remote_device_id: String,
    state: RefCell<MuxState>,
    link: RefCell<Box<dyn PhysicalLink>>,
    task_runner: Rc<dyn TaskRunner>,
}

/// One authenticated connection carrying any number of feature channels.
///
/// Clones share the same connection. The owner of the physical link feeds
/// link events in through `on_bytes_received`, `on_bytes_sent` and
/// `on_link_disconnected`.
#[derive(Clone)]
pub struct MultiplexedConnection {
    inner: Rc<MuxInner>,
}

impl MultiplexedConnection {
    pub fn new(
        remote_device_id: &str,
        link: Box<dyn PhysicalLink>,
        context: Box<dyn SecureContext>,
        metadata: ConnectionMetadata,
        task_runner: Rc<dyn TaskRunner>,
    ) -> Self {
        MultiplexedConnection {
            inner: Rc::new(MuxInner {
                remote_device_id: remote_device_id.to_string(),
                state: RefCell::new(MuxState {
                    context,
                    channels: Vec::new(),
                    in_flight_sends: VecDeque::new(),
                    metadata,
                    next_channel_id: 0,
                    is_disconnected: false,
                }),
                link: RefCell::new(link),
                task_runner,
            }),
        }
    }

    pub fn remote_device_id(&self) -> &str {
        &self.inner.remote_device_id
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.state.borrow().is_disconnected
    }

    /// Open channels registered for `feature`.
    pub fn channel_count(&self, feature: &str) -> usize {
        self.inner
            .state
            .borrow()
            .channels
            .iter()
            .filter(|channel| channel.feature == feature && channel.handle.is_open())
            .count()
    }

    /// Opens a new channel for `feature` on this connection.
    pub fn add_client_channel(&self, feature: &str) -> ChannelResult<ClientChannel> {
        let channel_id = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_disconnected {
                return Err(ChannelError::Disconnected);
            }
            let id = state.next_channel_id;
            state.next_channel_id += 1;
            id
        };

        let transport = FeatureChannelTransport {
            mux: Rc::downgrade(&self.inner),
            channel_id,
            feature: feature.to_string(),
        };
        let (channel, handle) = ClientChannel::new(Box::new(transport));
        self.inner.state.borrow_mut().channels.push(FeatureChannel {
            id: channel_id,
            feature: feature.to_string(),
            handle,
        });

        debug!(
            remote_device = %RemoteDevice::truncate_device_id_for_logs(&self.inner.remote_device_id),
            feature,
            "feature channel added"
        );
        Ok(channel)
    }

    /// Releases the link if no channel is open on it. Returns whether the
    /// link was released by this call.
    pub fn release_if_unused(&self) -> bool {
        self.inner.release_if_unused()
    }

    /// Replaces the metadata reported to channels.
    pub fn update_connection_metadata(&self, metadata: ConnectionMetadata) {
        self.inner.state.borrow_mut().metadata = metadata;
    }

    /// Decodes a frame from the link and dispatches it by feature.
    /// Frames that fail to decode are dropped.
    pub fn on_bytes_received(&self, bytes: &[u8]) {
        let frame = match self.inner.decode_frame(bytes) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                warn!(
                    remote_device = %RemoteDevice::truncate_device_id_for_logs(&self.inner.remote_device_id),
                    error = %e,
                    "dropping inbound frame"
                );
                return;
            }
        };

        let handles: Vec<ClientChannelHandle> = self
            .inner
            .state
            .borrow()
            .channels
            .iter()
            .filter(|channel| channel.feature == frame.feature)
            .map(|channel| channel.handle.clone())
            .collect();
        if handles.is_empty() {
            debug!(feature = %frame.feature, "no channel registered for inbound frame");
            return;
        }
        for handle in handles {
            handle.notify_message_received(&frame.payload);
        }
    }

    /// The link confirmed the oldest outstanding write.
    pub fn on_bytes_sent(&self) {
        let handle = {
            let mut state = self.inner.state.borrow_mut();
            let Some(channel_id) = state.in_flight_sends.pop_front() else {
                debug!("write confirmation without an outstanding write");
                return;
            };
            state
                .channels
                .iter()
                .find(|channel| channel.id == channel_id)
                .map(|channel| channel.handle.clone())
        };
        if let Some(handle) = handle {
            handle.notify_message_sent();
        }
    }

    /// The link dropped. Every channel is disconnected.
    pub fn on_link_disconnected(&self) {
        let channels = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_disconnected {
                return;
            }
            state.is_disconnected = true;
            state.in_flight_sends.clear();
            mem::take(&mut state.channels)
        };

        info!(
            remote_device = %RemoteDevice::truncate_device_id_for_logs(&self.inner.remote_device_id),
            channels = channels.len(),
            "physical link lost"
        );
        for channel in channels {
            channel.handle.notify_disconnected();
        }
    }
}

impl MuxInner {
    fn decode_frame(&self, bytes: &[u8]) -> ChannelResult<Option<FeatureFrame>> {
        let mut state = self.state.borrow_mut();
        if state.is_disconnected {
            return Ok(None);
        }
        let decoded = state
            .context
            .decode(bytes)
            .ok_or(ChannelError::DecryptionFailed)?;
        bincode::deserialize(&decoded)
            .map(Some)
            .map_err(|e| ChannelError::FrameDecoding(e.to_string()))
    }

    fn send_frame(&self, channel_id: u64, feature: &str, payload: Vec<u8>) -> ChannelResult<()> {
        let frame = FeatureFrame {
            feature: feature.to_string(),
            payload,
        };
        let serialized =
            bincode::serialize(&frame).map_err(|e| ChannelError::FrameEncoding(e.to_string()))?;

        let encoded = {
            let mut state = self.state.borrow_mut();
            if state.is_disconnected {
                return Err(ChannelError::Disconnected);
            }
            state.in_flight_sends.push_back(channel_id);
            state.context.encode(&serialized)
        };
        self.link.borrow_mut().send(encoded);
        Ok(())
    }

    fn remove_channel(&self, channel_id: u64) {
        self.state
            .borrow_mut()
            .channels
            .retain(|channel| channel.id != channel_id);
        self.release_if_unused();
    }

    fn release_if_unused(&self) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.is_disconnected || state.channels.iter().any(|channel| channel.handle.is_open()) {
                return false;
            }
            state.is_disconnected = true;
            state.in_flight_sends.clear();
            state.channels.clear();
        }

        info!(
            remote_device = %RemoteDevice::truncate_device_id_for_logs(&self.remote_device_id),
            "no open channels, releasing physical link"
        );
        self.link.borrow_mut().disconnect();
        true
    }
}

struct FeatureChannelTransport {
    mux: Weak<MuxInner>,
    channel_id: u64,
    feature: String,
}

impl ChannelTransport for FeatureChannelTransport {
    fn send_message(&mut self, payload: Vec<u8>) {
        let Some(mux) = self.mux.upgrade() else {
            return;
        };
        if let Err(e) = mux.send_frame(self.channel_id, &self.feature, payload) {
            warn!(feature = %self.feature, error = %e, "failed to send frame");
        }
    }

    fn request_connection_metadata(&mut self) {
        let Some(mux) = self.mux.upgrade() else {
            return;
        };
        let weak_mux = self.mux.clone();
        let channel_id = self.channel_id;
        mux.task_runner.post_task(Box::new(move || {
            let Some(mux) = weak_mux.upgrade() else {
                return;
            };
            let answer = {
                let state = mux.state.borrow();
                state
                    .channels
                    .iter()
                    .find(|channel| channel.id == channel_id)
                    .map(|channel| {
                        let mut metadata = state.metadata.clone();
                        metadata.channel_binding_data = state.context.channel_binding_data();
                        (channel.handle.clone(), metadata)
                    })
            };
            if let Some((handle, metadata)) = answer {
                handle.notify_connection_metadata(metadata);
            }
        }));
    }

    fn disconnect(&mut self) {
        if let Some(mux) = self.mux.upgrade() {
            mux.remove_channel(self.channel_id);
        }
    }
}
