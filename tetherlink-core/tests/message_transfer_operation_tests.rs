// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for tether::operation

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use common::{device_ref, device_refs};
use tetherlink_core::channel::{
    ClientChannelHandle, ConnectionAttemptFailureReason, ConnectionPriority, ConnectionRole,
    MockChannelTransport, MockSecureChannelClient,
};
use tetherlink_core::runtime::MockTimerFactory;
use tetherlink_core::tether::*;
use tetherlink_core::{RemoteDeviceRef, TetherConfig};

use ConnectionAttemptFailureReason::{AuthenticationError, GattConnectionError, TimeoutFindingDevice};

#[derive(Default)]
struct Events {
    started: usize,
    finished: usize,
    authenticated: Vec<String>,
    received: Vec<(String, MessageWrapper)>,
    sent: Vec<u32>,
    sequence_numbers: Vec<Option<u32>>,
}

#[derive(Default)]
struct TestHandler {
    events: Rc<RefCell<Events>>,
    timeout_seconds: Option<u32>,
    send_on_authenticated: bool,
    unregister_on_message: bool,
}

impl OperationHandler for TestHandler {
    fn message_type_for_connection(&self) -> MessageType {
        MessageType::KeepAliveTickle
    }

    fn timeout_seconds(&self) -> Option<u32> {
        self.timeout_seconds
    }

    fn on_operation_started(&mut self, _ctx: &mut OperationContext<'_>) {
        self.events.borrow_mut().started += 1;
    }

    fn on_device_authenticated(&mut self, ctx: &mut OperationContext<'_>, device: &RemoteDeviceRef) {
        self.events
            .borrow_mut()
            .authenticated
            .push(device.device_id().to_string());
        if self.send_on_authenticated {
            let sequence_number =
                ctx.send_message_to_device(device, &MessageWrapper::empty(MessageType::KeepAliveTickle));
            self.events.borrow_mut().sequence_numbers.push(sequence_number);
        }
    }

    fn on_message_received(
        &mut self,
        ctx: &mut OperationContext<'_>,
        message: MessageWrapper,
        device: &RemoteDeviceRef,
    ) {
        self.events
            .borrow_mut()
            .received
            .push((device.device_id().to_string(), message));
        if self.unregister_on_message {
            ctx.unregister_device(device);
        }
    }

    fn on_message_sent(&mut self, _ctx: &mut OperationContext<'_>, sequence_number: u32) {
        self.events.borrow_mut().sent.push(sequence_number);
    }

    fn on_operation_finished(&mut self, _ctx: &mut OperationContext<'_>) {
        self.events.borrow_mut().finished += 1;
    }
}

struct Harness {
    client: Rc<MockSecureChannelClient>,
    timers: Rc<MockTimerFactory>,
    local: RemoteDeviceRef,
    config: TetherConfig,
    events: Rc<RefCell<Events>>,
}

impl Harness {
    fn new() -> Self {
        common::init_test_logging();
        Harness {
            client: Rc::new(MockSecureChannelClient::new()),
            timers: Rc::new(MockTimerFactory::new()),
            local: device_ref("chromebook"),
            config: TetherConfig::default(),
            events: Rc::new(RefCell::new(Events::default())),
        }
    }

    fn handler(&self) -> TestHandler {
        TestHandler {
            events: self.events.clone(),
            ..TestHandler::default()
        }
    }

    fn create(&self, devices: &[RemoteDeviceRef]) -> MessageTransferOperation<TestHandler> {
        self.create_with(devices, self.handler())
    }

    fn create_with(
        &self,
        devices: &[RemoteDeviceRef],
        handler: TestHandler,
    ) -> MessageTransferOperation<TestHandler> {
        MessageTransferOperation::new(
            devices,
            self.local.clone(),
            self.client.clone(),
            self.timers.clone(),
            &self.config,
            handler,
        )
    }

    /// Resolves the pending attempt for `device` with a fresh channel.
    fn connect(&self, device: &RemoteDeviceRef) -> (ClientChannelHandle, MockChannelTransport) {
        let (channel, handle, transport) = MockChannelTransport::create_channel();
        self.client
            .take_resolver(device.device_id())
            .unwrap()
            .notify_connection(channel);
        (handle, transport)
    }

    fn fail(&self, device: &RemoteDeviceRef, reason: ConnectionAttemptFailureReason) {
        self.client
            .take_resolver(device.device_id())
            .unwrap()
            .notify_failure(reason);
    }

    fn finished(&self) -> usize {
        self.events.borrow().finished
    }
}

fn raw(message: &MessageWrapper) -> Vec<u8> {
    message.to_raw_message().unwrap()
}

// ============================================================
// Construction and initialization
// ============================================================

#[test]
fn test_requests_listener_connection_per_device() {
    let harness = Harness::new();
    let devices = device_refs(&["phone", "tablet"]);

    let _operation = harness.create(&devices);

    let requests = harness.client.requests();
    assert_eq!(requests.len(), 2);
    for (request, device) in requests.iter().zip(&devices) {
        assert_eq!(request.remote_device_id, device.device_id());
        assert_eq!(request.local_device_id, harness.local.device_id());
        assert_eq!(request.feature, "magic_tether");
        assert_eq!(request.priority, ConnectionPriority::Low);
        assert_eq!(request.role, ConnectionRole::Listener);
    }
}

#[test]
fn test_duplicate_devices_are_requested_once() {
    let harness = Harness::new();
    let phone = device_ref("phone");

    let operation = harness.create(&[phone.clone(), phone.clone()]);
    operation.initialize();
    let (handle, _transport) = harness.connect(&phone);

    assert_eq!(harness.client.requests_for(phone.device_id()), 1);
    assert_eq!(operation.remote_devices(), vec![phone.clone()]);
    assert_eq!(harness.events.borrow().authenticated, vec![phone.device_id().to_string()]);

    handle.notify_message_received(&raw(&MessageWrapper::empty(MessageType::KeepAliveTickleResponse)));
    assert_eq!(harness.events.borrow().received.len(), 1);

    assert!(operation.unregister_device(&phone));
    assert_eq!(harness.finished(), 1);

    assert!(!operation.unregister_device(&phone));
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_initialize_is_idempotent() {
    let harness = Harness::new();
    let operation = harness.create(&device_refs(&["phone"]));

    assert!(!operation.is_initialized());
    operation.initialize();
    operation.initialize();

    assert!(operation.is_initialized());
    assert_eq!(harness.events.borrow().started, 1);
}

#[test]
fn test_empty_device_list_finishes_on_initialize() {
    let harness = Harness::new();
    let operation = harness.create(&[]);

    assert_eq!(harness.finished(), 0);
    operation.initialize();

    assert!(operation.is_finished());
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_operation_ids_are_unique() {
    let harness = Harness::new();

    let first = harness.create(&[]);
    let second = harness.create(&[]);

    assert_ne!(first.operation_id(), second.operation_id());
}

// ============================================================
// Authentication and timeouts
// ============================================================

#[test]
fn test_authentication_starts_timer_and_notifies_handler() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();

    harness.connect(&phone);

    assert!(operation.is_authenticated(&phone));
    assert_eq!(harness.events.borrow().authenticated, vec![phone.device_id().to_string()]);
    let timer = harness.timers.last_timer().unwrap();
    assert!(timer.is_running());
    assert_eq!(timer.delay(), Some(Duration::from_secs(10)));
}

#[test]
fn test_authentication_before_initialize_is_held() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);

    harness.connect(&phone);

    assert!(operation.is_authenticated(&phone));
    assert!(harness.events.borrow().authenticated.is_empty());
    assert!(harness.timers.timers().is_empty());

    operation.initialize();

    assert_eq!(harness.events.borrow().authenticated, vec![phone.device_id().to_string()]);
    assert_eq!(harness.timers.running_timers().len(), 1);
}

#[test]
fn test_timeout_unregisters_device() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();
    let (_handle, transport) = harness.connect(&phone);

    assert!(harness.timers.last_timer().unwrap().fire());

    assert!(operation.remote_devices().is_empty());
    assert!(transport.was_disconnected());
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_handler_timeout_overrides_default() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let handler = TestHandler {
        timeout_seconds: Some(30),
        ..harness.handler()
    };
    let operation = harness.create_with(&[phone.clone()], handler);
    operation.initialize();
    harness.connect(&phone);

    assert_eq!(operation.timeout(), Duration::from_secs(30));
    assert_eq!(
        harness.timers.last_timer().unwrap().delay(),
        Some(Duration::from_secs(30))
    );
}

#[test]
fn test_configured_default_timeout() {
    let mut harness = Harness::new();
    harness.config = TetherConfig::default().with_default_timeout_seconds(25);

    let operation = harness.create(&device_refs(&["phone"]));

    assert_eq!(operation.timeout(), Duration::from_secs(25));
}

#[test]
fn test_remote_disconnect_unregisters_device() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();
    let (handle, _transport) = harness.connect(&phone);

    handle.notify_disconnected();

    assert!(operation.remote_devices().is_empty());
    assert!(harness.timers.running_timers().is_empty());
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_channel_disconnected_on_arrival_unregisters_device() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();

    let (channel, handle, _transport) = MockChannelTransport::create_channel();
    handle.notify_disconnected();
    harness
        .client
        .take_resolver(phone.device_id())
        .unwrap()
        .notify_connection(channel);

    assert!(operation.remote_devices().is_empty());
    assert!(harness.events.borrow().authenticated.is_empty());
    assert_eq!(harness.finished(), 1);
}

// ============================================================
// Connection failures
// ============================================================

#[test]
fn test_empty_scans_retry_until_limit() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();

    harness.fail(&phone, TimeoutFindingDevice);
    harness.fail(&phone, TimeoutFindingDevice);

    assert_eq!(operation.remote_devices().len(), 1);
    assert_eq!(harness.client.requests_for(phone.device_id()), 3);
    assert_eq!(harness.finished(), 0);

    harness.fail(&phone, TimeoutFindingDevice);

    assert!(operation.remote_devices().is_empty());
    assert_eq!(harness.client.requests_for(phone.device_id()), 3);
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_gatt_failures_retry_until_limit() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();

    for _ in 0..MAX_GATT_CONNECTION_ATTEMPTS_PER_DEVICE - 1 {
        harness.fail(&phone, GattConnectionError);
    }
    assert_eq!(operation.remote_devices().len(), 1);

    harness.fail(&phone, GattConnectionError);

    assert!(operation.remote_devices().is_empty());
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_failure_kinds_are_counted_separately() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();

    for _ in 0..MAX_EMPTY_SCANS_PER_DEVICE - 1 {
        harness.fail(&phone, TimeoutFindingDevice);
    }
    for _ in 0..MAX_GATT_CONNECTION_ATTEMPTS_PER_DEVICE - 1 {
        harness.fail(&phone, GattConnectionError);
    }
    assert_eq!(operation.remote_devices().len(), 1);

    harness.fail(&phone, TimeoutFindingDevice);

    assert!(operation.remote_devices().is_empty());
}

#[test]
fn test_terminal_failure_unregisters_immediately() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();

    harness.fail(&phone, AuthenticationError);

    assert!(operation.remote_devices().is_empty());
    assert_eq!(harness.client.requests_for(phone.device_id()), 1);
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_finished_reported_once_after_last_device() {
    let harness = Harness::new();
    let devices = device_refs(&["phone", "tablet"]);
    let operation = harness.create(&devices);
    operation.initialize();

    harness.fail(&devices[0], AuthenticationError);
    assert_eq!(harness.finished(), 0);

    harness.fail(&devices[1], AuthenticationError);
    assert_eq!(harness.finished(), 1);
    assert!(!operation.unregister_device(&devices[1]));
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_failures_before_initialize_finish_at_initialize() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);

    harness.fail(&phone, AuthenticationError);
    assert_eq!(harness.finished(), 0);

    operation.initialize();

    assert_eq!(harness.events.borrow().started, 1);
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_late_connection_after_unregister_is_released() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();

    assert!(operation.unregister_device(&phone));
    let (_handle, transport) = harness.connect(&phone);

    assert!(transport.was_disconnected());
    assert!(harness.events.borrow().authenticated.is_empty());
}

// ============================================================
// Messages
// ============================================================

#[test]
fn test_messages_reach_handler() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();
    let (handle, _transport) = harness.connect(&phone);
    let message = MessageWrapper::new(MessageType::TetherAvailabilityResponse, b"ok".to_vec());

    handle.notify_message_received(&raw(&message));

    assert_eq!(
        harness.events.borrow().received,
        vec![(phone.device_id().to_string(), message)]
    );
}

#[test]
fn test_malformed_message_dropped() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();
    let (handle, _transport) = harness.connect(&phone);

    handle.notify_message_received(b"not a tether message");
    handle.notify_message_received(br#"{"type":99,"data":""}"#);

    assert!(harness.events.borrow().received.is_empty());
    assert_eq!(operation.remote_devices().len(), 1);
}

#[test]
fn test_handler_may_unregister_from_message_hook() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let handler = TestHandler {
        unregister_on_message: true,
        ..harness.handler()
    };
    let operation = harness.create_with(&[phone.clone()], handler);
    operation.initialize();
    let (handle, transport) = harness.connect(&phone);

    handle.notify_message_received(&raw(&MessageWrapper::empty(MessageType::KeepAliveTickleResponse)));

    assert!(operation.remote_devices().is_empty());
    assert!(transport.was_disconnected());
    assert_eq!(harness.finished(), 1);
}

#[test]
fn test_sequence_numbers_increase_and_confirm() {
    let harness = Harness::new();
    let devices = device_refs(&["phone", "tablet"]);
    let handler = TestHandler {
        send_on_authenticated: true,
        ..harness.handler()
    };
    let operation = harness.create_with(&devices, handler);
    operation.initialize();
    let (phone_handle, phone_transport) = harness.connect(&devices[0]);
    let (tablet_handle, _tablet_transport) = harness.connect(&devices[1]);

    assert_eq!(harness.events.borrow().sequence_numbers, vec![Some(0), Some(1)]);
    let sent = MessageWrapper::from_raw_message(&phone_transport.sent_messages()[0]).unwrap();
    assert_eq!(sent.message_type(), MessageType::KeepAliveTickle);

    tablet_handle.notify_message_sent();
    phone_handle.notify_message_sent();

    assert_eq!(harness.events.borrow().sent, vec![1, 0]);
}

#[test]
fn test_send_to_unauthenticated_device_fails() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();

    let sequence_number =
        operation.send_message_to_device(&phone, &MessageWrapper::empty(MessageType::KeepAliveTickle));

    assert_eq!(sequence_number, None);
}

#[test]
fn test_send_from_outside_hook() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let operation = harness.create(&[phone.clone()]);
    operation.initialize();
    let (_handle, transport) = harness.connect(&phone);

    let sequence_number =
        operation.send_message_to_device(&phone, &MessageWrapper::empty(MessageType::KeepAliveTickle));

    assert_eq!(sequence_number, Some(0));
    assert_eq!(transport.sent_messages().len(), 1);
}

// ============================================================
// Teardown
// ============================================================

#[test]
fn test_drop_releases_devices_without_finishing() {
    let harness = Harness::new();
    let devices = device_refs(&["phone", "tablet"]);
    let operation = harness.create(&devices);
    operation.initialize();
    let (_handle, transport) = harness.connect(&devices[0]);

    drop(operation);

    assert!(transport.was_disconnected());
    assert!(harness.timers.running_timers().is_empty());
    assert_eq!(harness.finished(), 0);
}

#[test]
fn test_unregister_unknown_device_returns_false() {
    let harness = Harness::new();
    let operation = harness.create(&device_refs(&["phone"]));

    assert!(!operation.unregister_device(&device_ref("stranger")));
}
