// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Disconnect Tethering
//!
//! Tells one host to turn its hotspot off. The host does not answer; the
//! operation succeeds once the request has been written.

use std::rc::Rc;

use super::{MessageTransferOperation, MessageType, MessageWrapper, OperationContext, OperationHandler};
use crate::device::RemoteDeviceRef;

pub trait DisconnectTetheringObserver {
    fn on_disconnect_tethering_finished(&self, device_id: &str, success: bool);
}

pub struct DisconnectTetheringHandler {
    device: RemoteDeviceRef,
    request_sequence_number: Option<u32>,
    request_sent: bool,
    observer: Rc<dyn DisconnectTetheringObserver>,
}

pub type DisconnectTetheringOperation = MessageTransferOperation<DisconnectTetheringHandler>;

impl DisconnectTetheringHandler {
    pub fn new(device: RemoteDeviceRef, observer: Rc<dyn DisconnectTetheringObserver>) -> Self {
        DisconnectTetheringHandler {
            device,
            request_sequence_number: None,
            request_sent: false,
            observer,
        }
    }
}

impl OperationHandler for DisconnectTetheringHandler {
    fn message_type_for_connection(&self) -> MessageType {
        MessageType::DisconnectTetheringRequest
    }

    fn on_device_authenticated(&mut self, ctx: &mut OperationContext<'_>, device: &RemoteDeviceRef) {
        self.request_sequence_number = ctx.send_message_to_device(
            device,
            &MessageWrapper::empty(MessageType::DisconnectTetheringRequest),
        );
    }

    fn on_message_sent(&mut self, ctx: &mut OperationContext<'_>, sequence_number: u32) {
        if self.request_sequence_number != Some(sequence_number) {
            return;
        }
        self.request_sent = true;
        let device = self.device.clone();
        ctx.unregister_device(&device);
    }

    fn on_operation_finished(&mut self, ctx: &mut OperationContext<'_>) {
        let observer = self.observer.clone();
        let device_id = self.device.device_id().to_string();
        let success = self.request_sent;
        ctx.defer(move || observer.on_disconnect_tethering_finished(&device_id, success));
    }
}
