// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Channel Error Types

use thiserror::Error;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel is disconnected")]
    Disconnected,

    #[error("Frame encoding failed: {0}")]
    FrameEncoding(String),

    #[error("Frame decoding failed: {0}")]
    FrameDecoding(String),

    #[error("Secure context rejected inbound bytes")]
    DecryptionFailed,
}
