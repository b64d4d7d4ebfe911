// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for tether::{availability, connect, disconnect}

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use common::{device_ref, device_refs};
use tetherlink_core::channel::{
    ClientChannelHandle, ConnectionAttemptFailureReason, MockChannelTransport,
    MockSecureChannelClient,
};
use tetherlink_core::runtime::MockTimerFactory;
use tetherlink_core::tether::*;
use tetherlink_core::{RemoteDeviceRef, TetherConfig};

struct Harness {
    client: Rc<MockSecureChannelClient>,
    timers: Rc<MockTimerFactory>,
    local: RemoteDeviceRef,
    config: TetherConfig,
}

impl Harness {
    fn new() -> Self {
        common::init_test_logging();
        Harness {
            client: Rc::new(MockSecureChannelClient::new()),
            timers: Rc::new(MockTimerFactory::new()),
            local: device_ref("chromebook"),
            config: TetherConfig::default(),
        }
    }

    fn create<H: OperationHandler>(
        &self,
        devices: &[RemoteDeviceRef],
        handler: H,
    ) -> MessageTransferOperation<H> {
        MessageTransferOperation::new(
            devices,
            self.local.clone(),
            self.client.clone(),
            self.timers.clone(),
            &self.config,
            handler,
        )
    }

    fn connect(&self, device: &RemoteDeviceRef) -> (ClientChannelHandle, MockChannelTransport) {
        let (channel, handle, transport) = MockChannelTransport::create_channel();
        self.client
            .take_resolver(device.device_id())
            .unwrap()
            .notify_connection(channel);
        (handle, transport)
    }
}

fn sent_types(transport: &MockChannelTransport) -> Vec<MessageType> {
    transport
        .sent_messages()
        .iter()
        .map(|raw| MessageWrapper::from_raw_message(raw).unwrap().message_type())
        .collect()
}

fn reply(handle: &ClientChannelHandle, message: MessageWrapper) {
    handle.notify_message_received(&message.to_raw_message().unwrap());
}

// ============================================================
// Tether availability
// ============================================================

#[derive(Default)]
struct AvailabilityRecorder {
    responses: RefCell<Vec<(Vec<String>, bool)>>,
}

impl TetherAvailabilityObserver for AvailabilityRecorder {
    fn on_tether_availability_response(
        &self,
        scanned_devices: &[ScannedDevice],
        is_final_scan_result: bool,
    ) {
        let ids = scanned_devices
            .iter()
            .map(|scanned| scanned.device.device_id().to_string())
            .collect();
        self.responses.borrow_mut().push((ids, is_final_scan_result));
    }
}

#[test]
fn test_availability_request_sent_on_authentication() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(AvailabilityRecorder::default());
    let operation: TetherAvailabilityOperation =
        harness.create(&[phone.clone()], TetherAvailabilityHandler::new(recorder.clone()));
    operation.initialize();

    let (_handle, transport) = harness.connect(&phone);

    assert_eq!(sent_types(&transport), vec![MessageType::TetherAvailabilityRequest]);
}

#[test]
fn test_availability_reports_each_response_then_final_result() {
    let harness = Harness::new();
    let devices = device_refs(&["phone", "tablet"]);
    let recorder = Rc::new(AvailabilityRecorder::default());
    let operation: TetherAvailabilityOperation =
        harness.create(&devices, TetherAvailabilityHandler::new(recorder.clone()));
    operation.initialize();
    let (phone_handle, _) = harness.connect(&devices[0]);
    harness.connect(&devices[1]);

    reply(
        &phone_handle,
        MessageWrapper::new(MessageType::TetherAvailabilityResponse, b"ready".to_vec()),
    );

    assert_eq!(
        *recorder.responses.borrow(),
        vec![(vec![devices[0].device_id().to_string()], false)]
    );
    assert_eq!(operation.remote_devices(), vec![devices[1].clone()]);

    harness.timers.last_timer().unwrap().fire();

    assert_eq!(
        recorder.responses.borrow().last(),
        Some(&(vec![devices[0].device_id().to_string()], true))
    );
    let handler = operation.handler();
    assert_eq!(handler.scanned_devices().len(), 1);
    assert_eq!(handler.scanned_devices()[0].response, b"ready".to_vec());
}

#[test]
fn test_availability_ignores_other_message_types() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(AvailabilityRecorder::default());
    let operation: TetherAvailabilityOperation =
        harness.create(&[phone.clone()], TetherAvailabilityHandler::new(recorder.clone()));
    operation.initialize();
    let (handle, _) = harness.connect(&phone);

    reply(&handle, MessageWrapper::empty(MessageType::KeepAliveTickleResponse));

    assert!(recorder.responses.borrow().is_empty());
    assert_eq!(operation.remote_devices().len(), 1);
}

#[test]
fn test_availability_with_no_responders_reports_empty_final_result() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(AvailabilityRecorder::default());
    let operation: TetherAvailabilityOperation =
        harness.create(&[phone.clone()], TetherAvailabilityHandler::new(recorder.clone()));
    operation.initialize();

    harness
        .client
        .take_resolver(phone.device_id())
        .unwrap()
        .notify_failure(ConnectionAttemptFailureReason::AuthenticationError);

    assert_eq!(*recorder.responses.borrow(), vec![(Vec::new(), true)]);
}

// ============================================================
// Connect tethering
// ============================================================

#[derive(Default)]
struct ConnectRecorder {
    requests_sent: RefCell<usize>,
    responses: RefCell<Vec<Vec<u8>>>,
    failures: RefCell<Vec<ConnectTetheringError>>,
}

impl ConnectTetheringObserver for ConnectRecorder {
    fn on_connect_tethering_request_sent(&self, _device: &RemoteDeviceRef) {
        *self.requests_sent.borrow_mut() += 1;
    }

    fn on_connect_tethering_response(&self, _device: &RemoteDeviceRef, response: &[u8]) {
        self.responses.borrow_mut().push(response.to_vec());
    }

    fn on_connect_tethering_failure(&self, _device: &RemoteDeviceRef, error: ConnectTetheringError) {
        self.failures.borrow_mut().push(error);
    }
}

fn connect_operation(
    harness: &Harness,
    device: &RemoteDeviceRef,
    setup_required: bool,
    recorder: &Rc<ConnectRecorder>,
) -> ConnectTetheringOperation {
    let handler = ConnectTetheringHandler::new(
        device.clone(),
        setup_required,
        b"request".to_vec(),
        recorder.clone(),
    );
    harness.create(&[device.clone()], handler)
}

#[test]
fn test_connect_timeout_depends_on_setup() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(ConnectRecorder::default());

    let quick = connect_operation(&harness, &phone, false, &recorder);
    let with_setup = connect_operation(&harness, &phone, true, &recorder);

    assert_eq!(quick.timeout(), Duration::from_secs(15));
    assert_eq!(with_setup.timeout(), Duration::from_secs(90));
}

#[test]
fn test_connect_sends_request_body() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(ConnectRecorder::default());
    let operation = connect_operation(&harness, &phone, false, &recorder);
    operation.initialize();

    let (_handle, transport) = harness.connect(&phone);

    let sent = MessageWrapper::from_raw_message(&transport.sent_messages()[0]).unwrap();
    assert_eq!(sent.message_type(), MessageType::ConnectTetheringRequest);
    assert_eq!(sent.body(), b"request");
    assert_eq!(operation.handler().device(), &phone);
}

#[test]
fn test_connect_reports_request_sent_and_response() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(ConnectRecorder::default());
    let operation = connect_operation(&harness, &phone, false, &recorder);
    operation.initialize();
    let (handle, transport) = harness.connect(&phone);

    handle.notify_message_sent();
    assert_eq!(*recorder.requests_sent.borrow(), 1);

    reply(
        &handle,
        MessageWrapper::new(MessageType::ConnectTetheringResponse, b"ssid".to_vec()),
    );

    assert_eq!(*recorder.responses.borrow(), vec![b"ssid".to_vec()]);
    assert!(recorder.failures.borrow().is_empty());
    assert!(operation.is_finished());
    assert!(transport.was_disconnected());
}

/// Owns its operation and releases it from inside the response callback.
#[derive(Default)]
struct OwningConnectObserver {
    operation: RefCell<Option<ConnectTetheringOperation>>,
    state_at_response: RefCell<Option<(usize, bool)>>,
    failures: RefCell<usize>,
}

impl ConnectTetheringObserver for OwningConnectObserver {
    fn on_connect_tethering_request_sent(&self, _device: &RemoteDeviceRef) {}

    fn on_connect_tethering_response(&self, _device: &RemoteDeviceRef, _response: &[u8]) {
        let state = self
            .operation
            .borrow()
            .as_ref()
            .map(|operation| (operation.remote_devices().len(), operation.is_finished()));
        *self.state_at_response.borrow_mut() = state;
        self.operation.borrow_mut().take();
    }

    fn on_connect_tethering_failure(&self, _device: &RemoteDeviceRef, _error: ConnectTetheringError) {
        *self.failures.borrow_mut() += 1;
    }
}

#[test]
fn test_connect_observer_may_query_and_drop_operation_from_response() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let owner = Rc::new(OwningConnectObserver::default());
    let handler =
        ConnectTetheringHandler::new(phone.clone(), false, b"request".to_vec(), owner.clone());
    let operation: ConnectTetheringOperation = harness.create(&[phone.clone()], handler);
    operation.initialize();
    *owner.operation.borrow_mut() = Some(operation);
    let (handle, transport) = harness.connect(&phone);

    reply(
        &handle,
        MessageWrapper::new(MessageType::ConnectTetheringResponse, b"ssid".to_vec()),
    );

    assert_eq!(*owner.state_at_response.borrow(), Some((0, true)));
    assert!(owner.operation.borrow().is_none());
    assert_eq!(*owner.failures.borrow(), 0);
    assert!(transport.was_disconnected());
}

#[test]
fn test_connect_timeout_reports_no_response() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(ConnectRecorder::default());
    let operation = connect_operation(&harness, &phone, true, &recorder);
    operation.initialize();
    harness.connect(&phone);

    let timer = harness.timers.last_timer().unwrap();
    assert_eq!(timer.delay(), Some(Duration::from_secs(90)));
    timer.fire();

    assert_eq!(
        *recorder.failures.borrow(),
        vec![ConnectTetheringError::NoResponse]
    );
    assert!(recorder.responses.borrow().is_empty());
}

#[test]
fn test_connect_failure_to_reach_host_reports_no_response() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(ConnectRecorder::default());
    let operation = connect_operation(&harness, &phone, false, &recorder);
    operation.initialize();

    harness
        .client
        .take_resolver(phone.device_id())
        .unwrap()
        .notify_failure(ConnectionAttemptFailureReason::AuthenticationError);

    assert_eq!(
        *recorder.failures.borrow(),
        vec![ConnectTetheringError::NoResponse]
    );
    assert_eq!(*recorder.requests_sent.borrow(), 0);
}

// ============================================================
// Disconnect tethering
// ============================================================

#[derive(Default)]
struct DisconnectRecorder {
    results: RefCell<Vec<(String, bool)>>,
}

impl DisconnectTetheringObserver for DisconnectRecorder {
    fn on_disconnect_tethering_finished(&self, device_id: &str, success: bool) {
        self.results.borrow_mut().push((device_id.to_string(), success));
    }
}

#[test]
fn test_disconnect_succeeds_once_request_written() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(DisconnectRecorder::default());
    let operation: DisconnectTetheringOperation = harness.create(
        &[phone.clone()],
        DisconnectTetheringHandler::new(phone.clone(), recorder.clone()),
    );
    operation.initialize();
    let (handle, transport) = harness.connect(&phone);

    assert_eq!(sent_types(&transport), vec![MessageType::DisconnectTetheringRequest]);
    assert!(recorder.results.borrow().is_empty());

    handle.notify_message_sent();

    assert_eq!(
        *recorder.results.borrow(),
        vec![(phone.device_id().to_string(), true)]
    );
    assert!(transport.was_disconnected());
}

#[test]
fn test_disconnect_before_request_written_fails() {
    let harness = Harness::new();
    let phone = device_ref("phone");
    let recorder = Rc::new(DisconnectRecorder::default());
    let operation: DisconnectTetheringOperation = harness.create(
        &[phone.clone()],
        DisconnectTetheringHandler::new(phone.clone(), recorder.clone()),
    );
    operation.initialize();
    let (handle, _transport) = harness.connect(&phone);

    handle.notify_disconnected();

    assert_eq!(
        *recorder.results.borrow(),
        vec![(phone.device_id().to_string(), false)]
    );
}
