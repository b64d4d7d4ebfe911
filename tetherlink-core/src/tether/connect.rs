// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connect Tethering
//!
//! Asks one host to turn on its hotspot and waits for the answer.

use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use super::{MessageTransferOperation, MessageType, MessageWrapper, OperationContext, OperationHandler};
use crate::device::RemoteDeviceRef;

/// Response timeout when the host already completed first-time setup.
pub const SETUP_NOT_REQUIRED_RESPONSE_TIMEOUT_SECONDS: u32 = 15;

/// Response timeout when the host must walk its user through setup first.
pub const SETUP_REQUIRED_RESPONSE_TIMEOUT_SECONDS: u32 = 90;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTetheringError {
    #[error("Host did not respond to the connect tethering request")]
    NoResponse,
}

pub trait ConnectTetheringObserver {
    /// The request reached the connection.
    fn on_connect_tethering_request_sent(&self, device: &RemoteDeviceRef);

    /// The host answered; the body is passed through untouched.
    fn on_connect_tethering_response(&self, device: &RemoteDeviceRef, response: &[u8]);

    fn on_connect_tethering_failure(&self, device: &RemoteDeviceRef, error: ConnectTetheringError);
}

pub struct ConnectTetheringHandler {
    device: RemoteDeviceRef,
    setup_required: bool,
    request_body: Vec<u8>,
    request_sequence_number: Option<u32>,
    response_received: bool,
    observer: Rc<dyn ConnectTetheringObserver>,
}

pub type ConnectTetheringOperation = MessageTransferOperation<ConnectTetheringHandler>;

impl ConnectTetheringHandler {
    pub fn new(
        device: RemoteDeviceRef,
        setup_required: bool,
        request_body: Vec<u8>,
        observer: Rc<dyn ConnectTetheringObserver>,
    ) -> Self {
        ConnectTetheringHandler {
            device,
            setup_required,
            request_body,
            request_sequence_number: None,
            response_received: false,
            observer,
        }
    }

    pub fn device(&self) -> &RemoteDeviceRef {
        &self.device
    }
}

impl OperationHandler for ConnectTetheringHandler {
    fn message_type_for_connection(&self) -> MessageType {
        MessageType::ConnectTetheringRequest
    }

    fn timeout_seconds(&self) -> Option<u32> {
        Some(if self.setup_required {
            SETUP_REQUIRED_RESPONSE_TIMEOUT_SECONDS
        } else {
            SETUP_NOT_REQUIRED_RESPONSE_TIMEOUT_SECONDS
        })
    }

    fn on_device_authenticated(&mut self, ctx: &mut OperationContext<'_>, device: &RemoteDeviceRef) {
        let request = MessageWrapper::new(
            MessageType::ConnectTetheringRequest,
            self.request_body.clone(),
        );
        self.request_sequence_number = ctx.send_message_to_device(device, &request);
    }

    fn on_message_sent(&mut self, ctx: &mut OperationContext<'_>, sequence_number: u32) {
        if self.request_sequence_number == Some(sequence_number) {
            let observer = self.observer.clone();
            let device = self.device.clone();
            ctx.defer(move || observer.on_connect_tethering_request_sent(&device));
        }
    }

    fn on_message_received(
        &mut self,
        ctx: &mut OperationContext<'_>,
        message: MessageWrapper,
        device: &RemoteDeviceRef,
    ) {
        if message.message_type() != MessageType::ConnectTetheringResponse {
            debug!(message_type = %message.message_type(), "ignoring unexpected message");
            return;
        }

        info!(remote_device = %device.truncated_device_id(), "connect tethering response received");
        self.response_received = true;
        let observer = self.observer.clone();
        let responder = device.clone();
        let response = message.into_body();
        ctx.defer(move || observer.on_connect_tethering_response(&responder, &response));
        ctx.unregister_device(device);
    }

    fn on_operation_finished(&mut self, ctx: &mut OperationContext<'_>) {
        if !self.response_received {
            let observer = self.observer.clone();
            let device = self.device.clone();
            ctx.defer(move || {
                observer.on_connect_tethering_failure(&device, ConnectTetheringError::NoResponse)
            });
        }
    }
}
