// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tether Availability (host scan)
//!
//! Asks every candidate host whether it can provide a tether connection.
//! Each responding host is recorded and released; observers see the
//! growing result list after every response and once more when the scan
//! is over.

use std::rc::Rc;

use tracing::debug;

use super::{MessageTransferOperation, MessageType, MessageWrapper, OperationContext, OperationHandler};
use crate::device::RemoteDeviceRef;

/// A host that answered, with its opaque availability response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub device: RemoteDeviceRef,
    pub response: Vec<u8>,
}

pub trait TetherAvailabilityObserver {
    /// `is_final_scan_result` is true exactly once, after every device is done.
    fn on_tether_availability_response(
        &self,
        scanned_devices: &[ScannedDevice],
        is_final_scan_result: bool,
    );
}

pub struct TetherAvailabilityHandler {
    observer: Rc<dyn TetherAvailabilityObserver>,
    scanned_devices: Vec<ScannedDevice>,
}

pub type TetherAvailabilityOperation = MessageTransferOperation<TetherAvailabilityHandler>;

impl TetherAvailabilityHandler {
    pub fn new(observer: Rc<dyn TetherAvailabilityObserver>) -> Self {
        TetherAvailabilityHandler {
            observer,
            scanned_devices: Vec::new(),
        }
    }

    pub fn scanned_devices(&self) -> &[ScannedDevice] {
        &self.scanned_devices
    }

    fn notify_observer(&self, ctx: &mut OperationContext<'_>, is_final_scan_result: bool) {
        let observer = self.observer.clone();
        let scanned_devices = self.scanned_devices.clone();
        ctx.defer(move || {
            observer.on_tether_availability_response(&scanned_devices, is_final_scan_result)
        });
    }
}

impl OperationHandler for TetherAvailabilityHandler {
    fn message_type_for_connection(&self) -> MessageType {
        MessageType::TetherAvailabilityRequest
    }

    fn on_device_authenticated(&mut self, ctx: &mut OperationContext<'_>, device: &RemoteDeviceRef) {
        ctx.send_message_to_device(
            device,
            &MessageWrapper::empty(MessageType::TetherAvailabilityRequest),
        );
    }

    fn on_message_received(
        &mut self,
        ctx: &mut OperationContext<'_>,
        message: MessageWrapper,
        device: &RemoteDeviceRef,
    ) {
        if message.message_type() != MessageType::TetherAvailabilityResponse {
            debug!(message_type = %message.message_type(), "ignoring unexpected message during host scan");
            return;
        }

        self.scanned_devices.push(ScannedDevice {
            device: device.clone(),
            response: message.into_body(),
        });
        self.notify_observer(ctx, false);
        ctx.unregister_device(device);
    }

    fn on_operation_finished(&mut self, ctx: &mut OperationContext<'_>) {
        self.notify_observer(ctx, true);
    }
}
