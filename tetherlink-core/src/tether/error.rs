// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tether Error Types

use thiserror::Error;

/// Errors decoding or encoding a tether message.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Invalid message JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(i32),

    #[error("Invalid message body encoding: {0}")]
    InvalidBody(#[from] base64::DecodeError),
}
