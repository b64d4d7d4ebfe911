// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Collaborators beneath a multiplexed connection.

/// Authenticated encryption session established with the remote device.
pub trait SecureContext {
    fn encode(&mut self, message: &[u8]) -> Vec<u8>;

    /// `None` if `encoded` does not authenticate.
    fn decode(&mut self, encoded: &[u8]) -> Option<Vec<u8>>;

    /// Data that uniquely binds this session.
    fn channel_binding_data(&self) -> Vec<u8>;
}

/// The physical connection (for example a GATT connection).
///
/// Write confirmations, inbound bytes and loss of the link are reported to
/// the owning `MultiplexedConnection`.
pub trait PhysicalLink {
    fn send(&mut self, bytes: Vec<u8>);

    fn disconnect(&mut self);
}
