// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure Channel Module
//!
//! Connection attempts, client channels, and the multiplexer that lets
//! several features share one authenticated connection.

mod attempt;
mod client;
mod client_channel;
mod error;
mod mock;
mod multiplexer;
mod priority;
mod secure_context;

pub use attempt::{
    ConnectionAttempt, ConnectionAttemptDelegate, ConnectionAttemptFailureReason,
    ConnectionAttemptResolver, RetryableFailure,
};
pub use client::{
    ConnectionCallback, ConnectionMedium, ConnectionOutcome, ConnectionRole,
    MultiplexingSecureChannelClient, SecureChannelClient,
};
pub use client_channel::{
    ChannelTransport, ClientChannel, ClientChannelHandle, ClientChannelObserver,
    ConnectionCreationDetail, ConnectionMetadata,
};
pub use error::{ChannelError, ChannelResult};
pub use mock::{
    ConnectionRequest, MockChannelTransport, MockConnectionMedium, MockPhysicalLink,
    MockSecureChannelClient, MockSecureContext,
};
pub use multiplexer::MultiplexedConnection;
pub use priority::ConnectionPriority;
pub use secure_context::{PhysicalLink, SecureContext};
