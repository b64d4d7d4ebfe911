// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tether Module
//!
//! Typed tether messages, the generic message transfer engine, and the
//! operations built on it.

mod availability;
mod connect;
mod disconnect;
mod error;
mod message;
mod operation;

pub use availability::{
    ScannedDevice, TetherAvailabilityHandler, TetherAvailabilityObserver,
    TetherAvailabilityOperation,
};
pub use connect::{
    ConnectTetheringError, ConnectTetheringHandler, ConnectTetheringObserver,
    ConnectTetheringOperation, SETUP_NOT_REQUIRED_RESPONSE_TIMEOUT_SECONDS,
    SETUP_REQUIRED_RESPONSE_TIMEOUT_SECONDS,
};
pub use disconnect::{
    DisconnectTetheringHandler, DisconnectTetheringObserver, DisconnectTetheringOperation,
};
pub use error::MessageError;
pub use message::{MessageType, MessageWrapper};
pub use operation::{
    MessageTransferOperation, OperationContext, OperationHandler,
    MAX_EMPTY_SCANS_PER_DEVICE, MAX_GATT_CONNECTION_ATTEMPTS_PER_DEVICE,
};
