// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Client Channel
//!
//! The feature client's end of an authenticated connection. The channel is
//! owned by whoever holds the `ClientChannel`; dropping it tears the
//! connection down. The transport side reports events through a
//! [`ClientChannelHandle`], which stops doing anything once the channel is
//! gone or disconnected.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::error::{ChannelError, ChannelResult};
use crate::runtime::Task;

/// Facts about how a connection was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionCreationDetail {
    /// The remote device was found through a background advertisement.
    RemoteDeviceUsedBackgroundBleAdvertisement,
}

/// Metadata of the underlying connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionMetadata {
    pub creation_details: Vec<ConnectionCreationDetail>,
    /// Latest received signal strength, if the medium reports one.
    pub rssi: Option<i32>,
    /// Data that binds the secure session to this connection.
    pub channel_binding_data: Vec<u8>,
}

/// Receives channel events. Methods take `&self`; implementations use
/// interior mutability for state.
pub trait ClientChannelObserver {
    /// The connection is gone. Called at most once per observer.
    fn on_disconnected(&self);

    /// A message arrived for this channel's feature.
    fn on_message_received(&self, payload: &[u8]);
}

/// The secure connection beneath a channel.
///
/// Completions are reported through the channel's [`ClientChannelHandle`]
/// and must not be reported from inside the call that requested them.
pub trait ChannelTransport {
    /// Writes `payload`. Confirm with `ClientChannelHandle::notify_message_sent`,
    /// in send order.
    fn send_message(&mut self, payload: Vec<u8>);

    /// Answer with `ClientChannelHandle::notify_connection_metadata`.
    fn request_connection_metadata(&mut self);

    /// The channel was dropped; release the connection.
    fn disconnect(&mut self);
}

type MetadataCallback = Box<dyn FnOnce(ConnectionMetadata)>;

#[derive(Default)]
struct ChannelState {
    observers: Vec<Rc<dyn ClientChannelObserver>>,
    pending_sends: VecDeque<Task>,
    pending_metadata_requests: VecDeque<MetadataCallback>,
    is_disconnected: bool,
}

struct ChannelInner {
    state: RefCell<ChannelState>,
    transport: RefCell<Box<dyn ChannelTransport>>,
}

pub struct ClientChannel {
    inner: Rc<ChannelInner>,
}

impl ClientChannel {
    /// Creates an open channel over `transport`, plus the handle the
    /// transport uses to report events.
    pub fn new(transport: Box<dyn ChannelTransport>) -> (Self, ClientChannelHandle) {
        let inner = Rc::new(ChannelInner {
            state: RefCell::new(ChannelState::default()),
            transport: RefCell::new(transport),
        });
        let handle = ClientChannelHandle {
            inner: Rc::downgrade(&inner),
        };
        (ClientChannel { inner }, handle)
    }

    /// Sends `payload`; `on_sent` runs once the transport confirms the write.
    ///
    /// Fails without side effects once the channel is disconnected.
    pub fn send_message(&self, payload: Vec<u8>, on_sent: impl FnOnce() + 'static) -> ChannelResult<()> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.is_disconnected {
                return Err(ChannelError::Disconnected);
            }
            state.pending_sends.push_back(Box::new(on_sent));
        }
        self.inner.transport.borrow_mut().send_message(payload);
        Ok(())
    }

    /// Requests connection metadata, delivered to `callback`.
    ///
    /// Fails without side effects once the channel is disconnected.
    pub fn get_connection_metadata(
        &self,
        callback: impl FnOnce(ConnectionMetadata) + 'static,
    ) -> ChannelResult<()> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.is_disconnected {
                return Err(ChannelError::Disconnected);
            }
            state.pending_metadata_requests.push_back(Box::new(callback));
        }
        self.inner.transport.borrow_mut().request_connection_metadata();
        Ok(())
    }

    pub fn add_observer(&self, observer: Rc<dyn ClientChannelObserver>) {
        self.inner.state.borrow_mut().observers.push(observer);
    }

    /// Removes `observer`. Removing an unregistered observer does nothing.
    pub fn remove_observer(&self, observer: &Rc<dyn ClientChannelObserver>) {
        self.inner
            .state
            .borrow_mut()
            .observers
            .retain(|existing| !Rc::ptr_eq(existing, observer));
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.state.borrow().is_disconnected
    }
}

impl Drop for ClientChannel {
    fn drop(&mut self) {
        let (pending_sends, pending_metadata_requests) = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_disconnected {
                return;
            }
            state.is_disconnected = true;
            state.observers.clear();
            (
                mem::take(&mut state.pending_sends),
                mem::take(&mut state.pending_metadata_requests),
            )
        };
        drop(pending_sends);
        drop(pending_metadata_requests);

        debug!("client channel dropped, disconnecting transport");
        self.inner.transport.borrow_mut().disconnect();
    }
}

/// Transport-side handle of a [`ClientChannel`].
#[derive(Clone)]
pub struct ClientChannelHandle {
    inner: Weak<ChannelInner>,
}

impl ClientChannelHandle {
    /// Whether the channel still exists and is connected.
    pub fn is_open(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| !inner.state.borrow().is_disconnected)
    }

    /// Confirms the oldest unconfirmed send.
    pub fn notify_message_sent(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let callback = {
            let mut state = inner.state.borrow_mut();
            if state.is_disconnected {
                return;
            }
            state.pending_sends.pop_front()
        };
        match callback {
            Some(callback) => callback(),
            None => debug!("send confirmation without a pending send"),
        }
    }

    /// Answers the oldest metadata request.
    pub fn notify_connection_metadata(&self, metadata: ConnectionMetadata) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let callback = {
            let mut state = inner.state.borrow_mut();
            if state.is_disconnected {
                return;
            }
            state.pending_metadata_requests.pop_front()
        };
        if let Some(callback) = callback {
            callback(metadata);
        }
    }

    /// Delivers an inbound message to every observer.
    ///
    /// Observers are snapshotted first; an observer removed (or a channel
    /// dropped) by an earlier observer is skipped.
    pub fn notify_message_received(&self, payload: &[u8]) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let observers = {
            let state = inner.state.borrow();
            if state.is_disconnected {
                return;
            }
            state.observers.clone()
        };
        let payload = payload.to_vec();

        for observer in observers {
            if !Self::still_registered(&inner, &observer) {
                continue;
            }
            observer.on_message_received(&payload);
        }
    }

    /// Marks the channel disconnected and tells each observer once.
    /// Later calls do nothing.
    pub fn notify_disconnected(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let (observers, pending_sends, pending_metadata_requests) = {
            let mut state = inner.state.borrow_mut();
            if state.is_disconnected {
                return;
            }
            state.is_disconnected = true;
            (
                state.observers.clone(),
                mem::take(&mut state.pending_sends),
                mem::take(&mut state.pending_metadata_requests),
            )
        };
        drop(pending_sends);
        drop(pending_metadata_requests);

        for observer in observers {
            if !Self::still_registered(&inner, &observer) {
                continue;
            }
            observer.on_disconnected();
        }
    }

    fn still_registered(inner: &ChannelInner, observer: &Rc<dyn ClientChannelObserver>) -> bool {
        inner
            .state
            .borrow()
            .observers
            .iter()
            .any(|existing| Rc::ptr_eq(existing, observer))
    }
}
