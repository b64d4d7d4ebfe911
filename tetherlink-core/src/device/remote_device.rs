// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Remote Device Snapshots
//!
//! A `RemoteDevice` is one synced device of the account as last reported by
//! the device sync source. Snapshots are immutable once shared; a newer sync
//! produces a new snapshot rather than mutating the old one.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// Software feature advertised by a device that can act as a tether host.
pub const MAGIC_TETHER_HOST_FEATURE: &str = "magic_tether_host";

/// Support level of a software feature on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SoftwareFeatureState {
    #[default]
    NotSupported,
    Supported,
    Enabled,
}

impl SoftwareFeatureState {
    /// Supported or enabled.
    pub fn is_supported(self) -> bool {
        !matches!(self, SoftwareFeatureState::NotSupported)
    }
}

/// Key material a device uses to derive its rotating ephemeral ids over a
/// time window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconSeed {
    pub data: Vec<u8>,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
}

impl BeaconSeed {
    pub fn new(data: Vec<u8>, start_time_millis: i64, end_time_millis: i64) -> Self {
        BeaconSeed {
            data,
            start_time_millis,
            end_time_millis,
        }
    }

    /// Whether `time_millis` lies in `[start, end)`.
    pub fn contains(&self, time_millis: i64) -> bool {
        self.start_time_millis <= time_millis && time_millis < self.end_time_millis
    }
}

/// Snapshot of one synced device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RemoteDevice {
    /// Human-readable device name.
    pub name: String,
    /// Long-term public key. The device id is derived from it.
    pub public_key: Vec<u8>,
    /// Seeds used to derive this device's EIDs.
    pub beacon_seeds: Vec<BeaconSeed>,
    /// Software feature name to support level.
    pub software_features: BTreeMap<String, SoftwareFeatureState>,
    /// Whether the device reported a usable mobile hotspot.
    pub supports_mobile_hotspot: bool,
    /// When the sync source last updated this record.
    pub last_update_time_millis: i64,
}

impl RemoteDevice {
    /// Creates a device with a name and public key and no other data.
    pub fn new(name: &str, public_key: Vec<u8>) -> Self {
        RemoteDevice {
            name: name.to_string(),
            public_key,
            ..Default::default()
        }
    }

    pub fn with_beacon_seeds(mut self, beacon_seeds: Vec<BeaconSeed>) -> Self {
        self.beacon_seeds = beacon_seeds;
        self
    }

    pub fn with_software_feature(mut self, feature: &str, state: SoftwareFeatureState) -> Self {
        self.software_features.insert(feature.to_string(), state);
        self
    }

    pub fn with_mobile_hotspot(mut self, supports_mobile_hotspot: bool) -> Self {
        self.supports_mobile_hotspot = supports_mobile_hotspot;
        self
    }

    pub fn with_last_update_time_millis(mut self, last_update_time_millis: i64) -> Self {
        self.last_update_time_millis = last_update_time_millis;
        self
    }

    /// Device id: standard base64 of the public key.
    pub fn device_id(&self) -> String {
        Self::generate_device_id(&self.public_key)
    }

    /// Derives a device id from a public key.
    pub fn generate_device_id(public_key: &[u8]) -> String {
        BASE64.encode(public_key)
    }

    /// Recovers the public key from a device id, if the id is well formed.
    pub fn public_key_from_device_id(device_id: &str) -> Option<Vec<u8>> {
        BASE64.decode(device_id).ok()
    }

    /// Shortened id for log lines.
    pub fn truncate_device_id_for_logs(device_id: &str) -> String {
        const EDGE: usize = 5;
        let chars: Vec<char> = device_id.chars().collect();
        if chars.len() <= 2 * EDGE {
            return device_id.to_string();
        }
        let head: String = chars[..EDGE].iter().collect();
        let tail: String = chars[chars.len() - EDGE..].iter().collect();
        format!("{}...{}", head, tail)
    }

    /// Support level of `feature`; unknown features are not supported.
    pub fn software_feature_state(&self, feature: &str) -> SoftwareFeatureState {
        self.software_features
            .get(feature)
            .copied()
            .unwrap_or_default()
    }
}

/// Shared handle to an immutable [`RemoteDevice`] snapshot.
///
/// Two refs compare, order and hash by device id only, so refs to an older
/// and a newer snapshot of the same device are interchangeable as keys.
#[derive(Clone)]
pub struct RemoteDeviceRef {
    device: Arc<RemoteDevice>,
    device_id: Arc<str>,
}

impl RemoteDeviceRef {
    pub fn new(device: RemoteDevice) -> Self {
        let device_id: Arc<str> = Arc::from(device.device_id());
        RemoteDeviceRef {
            device: Arc::new(device),
            device_id,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Truncated id for log lines.
    pub fn truncated_device_id(&self) -> String {
        RemoteDevice::truncate_device_id_for_logs(&self.device_id)
    }

    /// Whether both refs point at the same snapshot (not just the same device).
    pub fn same_snapshot(&self, other: &RemoteDeviceRef) -> bool {
        Arc::ptr_eq(&self.device, &other.device)
    }
}

impl Deref for RemoteDeviceRef {
    type Target = RemoteDevice;

    fn deref(&self) -> &RemoteDevice {
        &self.device
    }
}

impl From<RemoteDevice> for RemoteDeviceRef {
    fn from(device: RemoteDevice) -> Self {
        RemoteDeviceRef::new(device)
    }
}

impl PartialEq for RemoteDeviceRef {
    fn eq(&self, other: &Self) -> bool {
        self.device_id == other.device_id
    }
}

impl Eq for RemoteDeviceRef {}

impl Hash for RemoteDeviceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.device_id.hash(state);
    }
}

impl PartialOrd for RemoteDeviceRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RemoteDeviceRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.device_id.cmp(&other.device_id)
    }
}

impl fmt::Debug for RemoteDeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteDeviceRef")
            .field("device_id", &self.truncated_device_id())
            .field("name", &self.device.name)
            .finish()
    }
}
