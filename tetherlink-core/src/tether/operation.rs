// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Message Transfer Operation
//!
//! Generic engine that connects to a set of remote devices, exchanges
//! tether messages with each, and reports when every device is done. The
//! protocol itself lives in an [`OperationHandler`]; the engine owns the
//! connection lifecycle, retries and timeouts.
//!
//! Per-device state:
//!
//! ```text
//! CONNECTING --connection------------------> AUTHENTICATED (timer running)
//! CONNECTING --empty scan / GATT failure---> CONNECTING (retry, below limit)
//! CONNECTING --other failure / limit hit---> UNREGISTERED
//! AUTHENTICATED --timeout / disconnect-----> UNREGISTERED
//! any --unregister_device------------------> UNREGISTERED
//! ```
//!
//! Connection requests go out at construction. A device that authenticates
//! before `initialize` is held, and gets its timer and
//! `on_device_authenticated` call when `initialize` runs.
//!
//! Hooks run while the engine is borrowed. Work queued with
//! [`OperationContext::defer`] runs once the engine step is over, so an
//! observer called from there may query, drive or drop its operation.

use std::cell::{Ref, RefCell};
use std::collections::{HashMap, HashSet};
use std::mem;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{MessageType, MessageWrapper};
use crate::channel::{
    ClientChannel, ClientChannelObserver, ConnectionAttempt, ConnectionAttemptDelegate,
    ConnectionAttemptFailureReason, ConnectionPriority, RetryableFailure, SecureChannelClient,
};
use crate::config::TetherConfig;
use crate::device::RemoteDeviceRef;
use crate::runtime::{OneShotTimer, Task, TimerFactory};

/// Failed scans tolerated per device before it is unregistered.
pub const MAX_EMPTY_SCANS_PER_DEVICE: u32 = 3;

/// Failed GATT connections tolerated per device before it is unregistered.
pub const MAX_GATT_CONNECTION_ATTEMPTS_PER_DEVICE: u32 = 6;

/// Protocol-specific behaviour plugged into a [`MessageTransferOperation`].
///
/// Every hook runs on the event loop and may send messages and unregister
/// devices through its [`OperationContext`]. Observer notifications belong
/// in [`OperationContext::defer`].
pub trait OperationHandler: 'static {
    /// Message type this operation exchanges, for log lines.
    fn message_type_for_connection(&self) -> MessageType;

    /// Per-device response timeout. `None` uses the configured default.
    fn timeout_seconds(&self) -> Option<u32> {
        None
    }

    /// Runs once, from the first `initialize` call.
    fn on_operation_started(&mut self, _ctx: &mut OperationContext<'_>) {}

    /// A device authenticated and its response timer started.
    fn on_device_authenticated(&mut self, _ctx: &mut OperationContext<'_>, _device: &RemoteDeviceRef) {}

    /// A well-formed message arrived from a registered device.
    fn on_message_received(
        &mut self,
        _ctx: &mut OperationContext<'_>,
        _message: MessageWrapper,
        _device: &RemoteDeviceRef,
    ) {
    }

    /// The message with `sequence_number` was written to the connection.
    fn on_message_sent(&mut self, _ctx: &mut OperationContext<'_>, _sequence_number: u32) {}

    /// Every device is unregistered. Runs at most once, and never while the
    /// operation is being dropped.
    fn on_operation_finished(&mut self, _ctx: &mut OperationContext<'_>) {}
}

enum DeviceState {
    Connecting {
        attempt: ConnectionAttempt,
    },
    Authenticated {
        channel: ClientChannel,
        observer: Rc<dyn ClientChannelObserver>,
        timer: Option<Box<dyn OneShotTimer>>,
    },
}

struct DeviceEntry {
    device: RemoteDeviceRef,
    state: DeviceState,
    empty_scan_attempts: u32,
    gatt_connection_attempts: u32,
}

/// Engine state reachable from handler hooks.
struct OperationCore {
    id: Uuid,
    local_device: RemoteDeviceRef,
    remote_devices: Vec<RemoteDeviceRef>,
    entries: HashMap<String, DeviceEntry>,
    client: Rc<dyn SecureChannelClient>,
    timer_factory: Rc<dyn TimerFactory>,
    feature: String,
    priority: ConnectionPriority,
    timeout: Duration,
    message_type: MessageType,
    next_sequence_number: u32,
    initialized: bool,
    shutting_down: bool,
    finished_notified: bool,
    finish_pending: bool,
    deferred: Vec<Task>,
    sink: Weak<dyn OperationEventSink>,
}

/// Access to the engine from inside a handler hook.
pub struct OperationContext<'a> {
    core: &'a mut OperationCore,
}

impl OperationContext<'_> {
    /// Drops all connection state for `device`. Returns false if it was not
    /// registered.
    pub fn unregister_device(&mut self, device: &RemoteDeviceRef) -> bool {
        self.core.unregister_device(device.device_id())
    }

    /// Sends `message` to an authenticated device. Returns the sequence
    /// number later passed to `on_message_sent`, or `None` if the message
    /// could not be sent.
    pub fn send_message_to_device(
        &mut self,
        device: &RemoteDeviceRef,
        message: &MessageWrapper,
    ) -> Option<u32> {
        self.core.send_message_to_device(device, message)
    }

    /// Devices that are still registered.
    pub fn remote_devices(&self) -> &[RemoteDeviceRef] {
        &self.core.remote_devices
    }

    pub fn local_device(&self) -> &RemoteDeviceRef {
        &self.core.local_device
    }

    pub fn operation_id(&self) -> Uuid {
        self.core.id
    }

    /// Queues `task` to run after the current engine step, outside the
    /// engine borrow. Tasks run in queue order.
    pub fn defer(&mut self, task: impl FnOnce() + 'static) {
        self.core.deferred.push(Box::new(task));
    }
}

impl OperationCore {
    fn request_connection(&self, device: &RemoteDeviceRef) -> ConnectionAttempt {
        let mut attempt = self.client.listen_for_connection_from_device(
            device,
            &self.local_device,
            &self.feature,
            self.priority,
        );
        attempt.set_delegate(Box::new(AttemptDelegate {
            sink: self.sink.clone(),
            device_id: device.device_id().to_string(),
        }));
        attempt
    }

    fn start_timer(&mut self, device_id: &str) {
        let mut timer = self.timer_factory.create_one_shot_timer();
        let sink = self.sink.clone();
        let timed_out_id = device_id.to_string();
        timer.start(
            self.timeout,
            Box::new(move || {
                if let Some(sink) = sink.upgrade() {
                    sink.on_timeout(&timed_out_id);
                }
            }),
        );

        if let Some(DeviceEntry {
            state: DeviceState::Authenticated { timer: slot, .. },
            ..
        }) = self.entries.get_mut(device_id)
        {
            *slot = Some(timer);
        }
    }

    fn unregister_device(&mut self, device_id: &str) -> bool {
        let Some(position) = self
            .remote_devices
            .iter()
            .position(|device| device.device_id() == device_id)
        else {
            return false;
        };
        let device = self.remote_devices.remove(position);

        if let Some(entry) = self.entries.remove(device_id) {
            match entry.state {
                DeviceState::Connecting { attempt } => drop(attempt),
                DeviceState::Authenticated {
                    channel,
                    observer,
                    timer,
                } => {
                    if let Some(mut timer) = timer {
                        timer.stop();
                    }
                    channel.remove_observer(&observer);
                    drop(channel);
                }
            }
        }

        info!(
            operation = %self.id,
            message_type = %self.message_type,
            remote_device = %device.truncated_device_id(),
            remaining = self.remote_devices.len(),
            "device unregistered"
        );
        self.check_finished();
        true
    }

    fn send_message_to_device(
        &mut self,
        device: &RemoteDeviceRef,
        message: &MessageWrapper,
    ) -> Option<u32> {
        let Some(DeviceEntry {
            state: DeviceState::Authenticated { channel, .. },
            ..
        }) = self.entries.get(device.device_id())
        else {
            warn!(
                operation = %self.id,
                remote_device = %device.truncated_device_id(),
                "cannot send to a device that is not authenticated"
            );
            return None;
        };

        let raw = match message.to_raw_message() {
            Ok(raw) => raw,
            Err(e) => {
                error!(operation = %self.id, error = %e, "failed to serialize message");
                return None;
            }
        };

        let sequence_number = self.next_sequence_number;
        self.next_sequence_number += 1;

        let sink = self.sink.clone();
        let sent = channel.send_message(raw, move || {
            if let Some(sink) = sink.upgrade() {
                sink.on_message_sent(sequence_number);
            }
        });
        match sent {
            Ok(()) => {
                debug!(
                    operation = %self.id,
                    remote_device = %device.truncated_device_id(),
                    message_type = %message.message_type(),
                    sequence_number,
                    "message sent"
                );
                Some(sequence_number)
            }
            Err(e) => {
                warn!(
                    operation = %self.id,
                    remote_device = %device.truncated_device_id(),
                    error = %e,
                    "failed to send message"
                );
                None
            }
        }
    }

    fn check_finished(&mut self) {
        if self.initialized
            && !self.shutting_down
            && !self.finished_notified
            && self.remote_devices.is_empty()
        {
            self.finished_notified = true;
            self.finish_pending = true;
        }
    }
}

struct OperationInner<H: OperationHandler> {
    core: OperationCore,
    handler: H,
}

impl<H: OperationHandler> OperationInner<H> {
    fn with_handler(&mut self, hook: impl FnOnce(&mut H, &mut OperationContext<'_>)) {
        let OperationInner { core, handler } = self;
        let mut ctx = OperationContext { core };
        hook(handler, &mut ctx);
        self.flush_finished();
    }

    fn flush_finished(&mut self) {
        if mem::take(&mut self.core.finish_pending) {
            info!(
                operation = %self.core.id,
                message_type = %self.core.message_type,
                "operation finished"
            );
            let OperationInner { core, handler } = self;
            handler.on_operation_finished(&mut OperationContext { core });
        }
    }

    fn initialize(&mut self) {
        if self.core.initialized {
            return;
        }
        self.core.initialized = true;
        info!(
            operation = %self.core.id,
            message_type = %self.core.message_type,
            devices = self.core.remote_devices.len(),
            "operation started"
        );
        self.with_handler(|handler, ctx| handler.on_operation_started(ctx));

        let already_authenticated: Vec<RemoteDeviceRef> = self
            .core
            .remote_devices
            .iter()
            .filter(|device| {
                matches!(
                    self.core.entries.get(device.device_id()),
                    Some(DeviceEntry {
                        state: DeviceState::Authenticated { timer: None, .. },
                        ..
                    })
                )
            })
            .cloned()
            .collect();
        for device in already_authenticated {
            if self.core.entries.contains_key(device.device_id()) {
                self.on_authenticated(&device);
            }
        }

        self.core.check_finished();
        self.flush_finished();
    }

    fn on_authenticated(&mut self, device: &RemoteDeviceRef) {
        self.core.start_timer(device.device_id());
        self.with_handler(|handler, ctx| handler.on_device_authenticated(ctx, device));
    }

    fn handle_connection(&mut self, device_id: &str, channel: ClientChannel) {
        let sink = self.core.sink.clone();
        let Some(entry) = self.core.entries.get_mut(device_id) else {
            debug!("connection for a device that is no longer registered");
            return;
        };
        if !matches!(entry.state, DeviceState::Connecting { .. }) {
            warn!(
                remote_device = %entry.device.truncated_device_id(),
                "ignoring second connection for an authenticated device"
            );
            return;
        }

        let device = entry.device.clone();
        if channel.is_disconnected() {
            warn!(
                remote_device = %device.truncated_device_id(),
                "connection arrived already disconnected"
            );
            self.core.unregister_device(device_id);
            self.flush_finished();
            return;
        }

        let observer: Rc<dyn ClientChannelObserver> = Rc::new(ChannelObserver {
            sink,
            device_id: device_id.to_string(),
        });
        channel.add_observer(observer.clone());
        entry.state = DeviceState::Authenticated {
            channel,
            observer,
            timer: None,
        };
        entry.empty_scan_attempts = 0;
        entry.gatt_connection_attempts = 0;

        info!(
            operation = %self.core.id,
            message_type = %self.core.message_type,
            remote_device = %device.truncated_device_id(),
            "device authenticated"
        );
        if self.core.initialized {
            self.on_authenticated(&device);
        }
        self.flush_finished();
    }

    fn handle_connection_failure(&mut self, device_id: &str, reason: ConnectionAttemptFailureReason) {
        let Some(entry) = self.core.entries.get_mut(device_id) else {
            return;
        };

        let retry = match reason.retryable_failure() {
            Some(RetryableFailure::EmptyScan) => {
                entry.empty_scan_attempts += 1;
                entry.empty_scan_attempts < MAX_EMPTY_SCANS_PER_DEVICE
            }
            Some(RetryableFailure::GattConnection) => {
                entry.gatt_connection_attempts += 1;
                entry.gatt_connection_attempts < MAX_GATT_CONNECTION_ATTEMPTS_PER_DEVICE
            }
            None => false,
        };
        let device = entry.device.clone();
        warn!(
            operation = %self.core.id,
            remote_device = %device.truncated_device_id(),
            %reason,
            empty_scans = entry.empty_scan_attempts,
            gatt_attempts = entry.gatt_connection_attempts,
            retry,
            "connection attempt failed"
        );

        if retry {
            let attempt = self.core.request_connection(&device);
            if let Some(entry) = self.core.entries.get_mut(device_id) {
                entry.state = DeviceState::Connecting { attempt };
            }
        } else {
            self.core.unregister_device(device_id);
        }
        self.flush_finished();
    }

    fn handle_channel_message(&mut self, device_id: &str, payload: &[u8]) {
        let Some(device) = self.core.entries.get(device_id).map(|entry| entry.device.clone()) else {
            return;
        };
        match MessageWrapper::from_raw_message(payload) {
            Ok(message) => {
                debug!(
                    operation = %self.core.id,
                    remote_device = %device.truncated_device_id(),
                    message_type = %message.message_type(),
                    "message received"
                );
                self.with_handler(|handler, ctx| handler.on_message_received(ctx, message, &device));
            }
            Err(e) => warn!(
                operation = %self.core.id,
                remote_device = %device.truncated_device_id(),
                error = %e,
                "dropping malformed message"
            ),
        }
    }

    fn handle_channel_disconnected(&mut self, device_id: &str) {
        if self.core.unregister_device(device_id) {
            info!(operation = %self.core.id, "remote device disconnected");
        }
        self.flush_finished();
    }

    fn handle_timeout(&mut self, device_id: &str) {
        warn!(
            operation = %self.core.id,
            message_type = %self.core.message_type,
            timeout_seconds = self.core.timeout.as_secs(),
            "timed out waiting for device"
        );
        self.core.unregister_device(device_id);
        self.flush_finished();
    }

    fn handle_message_sent(&mut self, sequence_number: u32) {
        self.with_handler(|handler, ctx| handler.on_message_sent(ctx, sequence_number));
    }
}

/// Events from attempts, channels and timers, routed back into the engine.
trait OperationEventSink {
    fn on_connection_attempt_failure(&self, device_id: &str, reason: ConnectionAttemptFailureReason);
    fn on_connection(&self, device_id: &str, channel: ClientChannel);
    fn on_channel_message(&self, device_id: &str, payload: &[u8]);
    fn on_channel_disconnected(&self, device_id: &str);
    fn on_timeout(&self, device_id: &str);
    fn on_message_sent(&self, sequence_number: u32);
}

/// Runs one engine step, then the work it deferred.
fn with_inner<H: OperationHandler, R: Default>(
    cell: &RefCell<OperationInner<H>>,
    event: &str,
    f: impl FnOnce(&mut OperationInner<H>) -> R,
) -> R {
    let (result, deferred) = match cell.try_borrow_mut() {
        Ok(mut inner) => {
            let result = f(&mut inner);
            (result, mem::take(&mut inner.core.deferred))
        }
        Err(_) => {
            error!(event, "operation event delivered re-entrantly; dropping it");
            if cfg!(debug_assertions) {
                panic!("operation event {event} delivered re-entrantly");
            }
            return R::default();
        }
    };
    for task in deferred {
        task();
    }
    result
}

impl<H: OperationHandler> OperationEventSink for RefCell<OperationInner<H>> {
    fn on_connection_attempt_failure(&self, device_id: &str, reason: ConnectionAttemptFailureReason) {
        with_inner(self, "connection failure", |inner| {
            inner.handle_connection_failure(device_id, reason)
        });
    }

    fn on_connection(&self, device_id: &str, channel: ClientChannel) {
        with_inner(self, "connection", |inner| inner.handle_connection(device_id, channel));
    }

    fn on_channel_message(&self, device_id: &str, payload: &[u8]) {
        with_inner(self, "message", |inner| inner.handle_channel_message(device_id, payload));
    }

    fn on_channel_disconnected(&self, device_id: &str) {
        with_inner(self, "disconnect", |inner| inner.handle_channel_disconnected(device_id));
    }

    fn on_timeout(&self, device_id: &str) {
        with_inner(self, "timeout", |inner| inner.handle_timeout(device_id));
    }

    fn on_message_sent(&self, sequence_number: u32) {
        with_inner(self, "message sent", |inner| inner.handle_message_sent(sequence_number));
    }
}

struct AttemptDelegate {
    sink: Weak<dyn OperationEventSink>,
    device_id: String,
}

impl ConnectionAttemptDelegate for AttemptDelegate {
    fn on_connection_attempt_failure(&mut self, reason: ConnectionAttemptFailureReason) {
        if let Some(sink) = self.sink.upgrade() {
            sink.on_connection_attempt_failure(&self.device_id, reason);
        }
    }

    fn on_connection(&mut self, channel: ClientChannel) {
        if let Some(sink) = self.sink.upgrade() {
            sink.on_connection(&self.device_id, channel);
        }
    }
}

struct ChannelObserver {
    sink: Weak<dyn OperationEventSink>,
    device_id: String,
}

impl ClientChannelObserver for ChannelObserver {
    fn on_disconnected(&self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.on_channel_disconnected(&self.device_id);
        }
    }

    fn on_message_received(&self, payload: &[u8]) {
        if let Some(sink) = self.sink.upgrade() {
            sink.on_channel_message(&self.device_id, payload);
        }
    }
}

/// Runs an [`OperationHandler`] against a set of remote devices.
///
/// Dropping the operation unregisters every remaining device without
/// calling `on_operation_finished`.
pub struct MessageTransferOperation<H: OperationHandler> {
    inner: Rc<RefCell<OperationInner<H>>>,
}

impl<H: OperationHandler> MessageTransferOperation<H> {
    /// Creates the operation and requests a connection to each distinct
    /// device in `devices_to_connect`, keeping first-occurrence order.
    pub fn new(
        devices_to_connect: &[RemoteDeviceRef],
        local_device: RemoteDeviceRef,
        client: Rc<dyn SecureChannelClient>,
        timer_factory: Rc<dyn TimerFactory>,
        config: &TetherConfig,
        handler: H,
    ) -> Self {
        let mut seen = HashSet::new();
        let remote_devices: Vec<RemoteDeviceRef> = devices_to_connect
            .iter()
            .filter(|device| seen.insert(device.device_id().to_string()))
            .cloned()
            .collect();
        let timeout_seconds = handler
            .timeout_seconds()
            .unwrap_or(config.default_timeout_seconds);
        let message_type = handler.message_type_for_connection();

        let inner = Rc::new_cyclic(|weak: &Weak<RefCell<OperationInner<H>>>| {
            let sink: Weak<dyn OperationEventSink> = weak.clone();
            RefCell::new(OperationInner {
                core: OperationCore {
                    id: Uuid::new_v4(),
                    local_device,
                    remote_devices: remote_devices.clone(),
                    entries: HashMap::new(),
                    client,
                    timer_factory,
                    feature: config.feature_name.clone(),
                    priority: config.connection_priority,
                    timeout: Duration::from_secs(u64::from(timeout_seconds)),
                    message_type,
                    next_sequence_number: 0,
                    initialized: false,
                    shutting_down: false,
                    finished_notified: false,
                    finish_pending: false,
                    deferred: Vec::new(),
                    sink,
                },
                handler,
            })
        });

        {
            let mut guard = inner.borrow_mut();
            let core = &mut guard.core;
            debug!(
                operation = %core.id,
                %message_type,
                devices = remote_devices.len(),
                "requesting connections"
            );
            for device in remote_devices {
                let attempt = core.request_connection(&device);
                core.entries.insert(
                    device.device_id().to_string(),
                    DeviceEntry {
                        device,
                        state: DeviceState::Connecting { attempt },
                        empty_scan_attempts: 0,
                        gatt_connection_attempts: 0,
                    },
                );
            }
        }

        MessageTransferOperation { inner }
    }

    /// Starts the operation. Later calls do nothing.
    pub fn initialize(&self) {
        let inner = self.inner.clone();
        with_inner(&inner, "initialize", |inner| inner.initialize());
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().core.initialized
    }

    /// Whether `on_operation_finished` has run.
    pub fn is_finished(&self) -> bool {
        self.inner.borrow().core.finished_notified
    }

    /// Devices that are still registered.
    pub fn remote_devices(&self) -> Vec<RemoteDeviceRef> {
        self.inner.borrow().core.remote_devices.clone()
    }

    pub fn is_authenticated(&self, device: &RemoteDeviceRef) -> bool {
        matches!(
            self.inner.borrow().core.entries.get(device.device_id()),
            Some(DeviceEntry {
                state: DeviceState::Authenticated { .. },
                ..
            })
        )
    }

    pub fn operation_id(&self) -> Uuid {
        self.inner.borrow().core.id
    }

    pub fn timeout(&self) -> Duration {
        self.inner.borrow().core.timeout
    }

    /// Sends a message outside of a handler hook.
    pub fn send_message_to_device(
        &self,
        device: &RemoteDeviceRef,
        message: &MessageWrapper,
    ) -> Option<u32> {
        let inner = self.inner.clone();
        with_inner(&inner, "send message", |inner| {
            let sequence_number = inner.core.send_message_to_device(device, message);
            inner.flush_finished();
            sequence_number
        })
    }

    /// Unregisters a device outside of a handler hook.
    pub fn unregister_device(&self, device: &RemoteDeviceRef) -> bool {
        let inner = self.inner.clone();
        with_inner(&inner, "unregister", |inner| {
            let unregistered = inner.core.unregister_device(device.device_id());
            inner.flush_finished();
            unregistered
        })
    }

    /// Read access to the handler.
    pub fn handler(&self) -> Ref<'_, H> {
        Ref::map(self.inner.borrow(), |inner| &inner.handler)
    }
}

impl<H: OperationHandler> Drop for MessageTransferOperation<H> {
    fn drop(&mut self) {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            error!("operation dropped while handling an event");
            return;
        };
        inner.core.shutting_down = true;
        let remaining = inner.core.remote_devices.clone();
        for device in remaining {
            inner.core.unregister_device(device.device_id());
        }
    }
}
