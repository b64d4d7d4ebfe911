// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device id pairs.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::RemoteDevice;

/// A (remote device, local device) pairing, used as a connection key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdPair {
    pub remote_device_id: String,
    pub local_device_id: String,
}

/// Set of pairs, iterated in a stable order.
pub type DeviceIdPairSet = BTreeSet<DeviceIdPair>;

impl DeviceIdPair {
    pub fn new(remote_device_id: &str, local_device_id: &str) -> Self {
        DeviceIdPair {
            remote_device_id: remote_device_id.to_string(),
            local_device_id: local_device_id.to_string(),
        }
    }
}

impl fmt::Display for DeviceIdPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{remote: {}, local: {}}}",
            RemoteDevice::truncate_device_id_for_logs(&self.remote_device_id),
            RemoteDevice::truncate_device_id_for_logs(&self.local_device_id)
        )
    }
}
