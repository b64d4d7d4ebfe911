// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tether Messages
//!
//! Typed envelope around an opaque message body. On the wire:
//!
//! ```json
//! {"type": 5, "data": "<base64 body>"}
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use super::error::MessageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    ConnectTetheringRequest,
    ConnectTetheringResponse,
    DisconnectTetheringRequest,
    KeepAliveTickle,
    TetherAvailabilityRequest,
    TetherAvailabilityResponse,
    KeepAliveTickleResponse,
}

impl MessageType {
    /// Wire code.
    pub fn code(self) -> i32 {
        match self {
            MessageType::ConnectTetheringRequest => 1,
            MessageType::ConnectTetheringResponse => 2,
            MessageType::DisconnectTetheringRequest => 3,
            MessageType::KeepAliveTickle => 4,
            MessageType::TetherAvailabilityRequest => 5,
            MessageType::TetherAvailabilityResponse => 6,
            MessageType::KeepAliveTickleResponse => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(MessageType::ConnectTetheringRequest),
            2 => Some(MessageType::ConnectTetheringResponse),
            3 => Some(MessageType::DisconnectTetheringRequest),
            4 => Some(MessageType::KeepAliveTickle),
            5 => Some(MessageType::TetherAvailabilityRequest),
            6 => Some(MessageType::TetherAvailabilityResponse),
            7 => Some(MessageType::KeepAliveTickleResponse),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::ConnectTetheringRequest => "ConnectTetheringRequest",
            MessageType::ConnectTetheringResponse => "ConnectTetheringResponse",
            MessageType::DisconnectTetheringRequest => "DisconnectTetheringRequest",
            MessageType::KeepAliveTickle => "KeepAliveTickle",
            MessageType::TetherAvailabilityRequest => "TetherAvailabilityRequest",
            MessageType::TetherAvailabilityResponse => "TetherAvailabilityResponse",
            MessageType::KeepAliveTickleResponse => "KeepAliveTickleResponse",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    message_type: i32,
    data: String,
}

/// A tether message: type plus opaque body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWrapper {
    message_type: MessageType,
    body: Vec<u8>,
}

impl MessageWrapper {
    pub fn new(message_type: MessageType, body: Vec<u8>) -> Self {
        MessageWrapper { message_type, body }
    }

    /// A message with an empty body.
    pub fn empty(message_type: MessageType) -> Self {
        Self::new(message_type, Vec::new())
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Serializes to the wire form.
    pub fn to_raw_message(&self) -> Result<Vec<u8>, MessageError> {
        let raw = RawMessage {
            message_type: self.message_type.code(),
            data: BASE64.encode(&self.body),
        };
        Ok(serde_json::to_vec(&raw)?)
    }

    /// Parses the wire form.
    pub fn from_raw_message(raw: &[u8]) -> Result<Self, MessageError> {
        let raw: RawMessage = serde_json::from_slice(raw)?;
        let message_type =
            MessageType::from_code(raw.message_type).ok_or(MessageError::UnknownType(raw.message_type))?;
        let body = BASE64.decode(raw.data.as_bytes())?;
        Ok(MessageWrapper { message_type, body })
    }
}
