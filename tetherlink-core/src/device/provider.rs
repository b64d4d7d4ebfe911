// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Synced device source.

use parking_lot::RwLock;

use super::RemoteDevice;

/// Source of the account's synced device list.
pub trait RemoteDeviceProvider: Send + Sync {
    /// Every device currently synced to the account, the local one included.
    fn synced_devices(&self) -> Vec<RemoteDevice>;

    /// Metadata of this device, once the sync source knows it.
    fn local_device_metadata(&self) -> Option<RemoteDevice>;
}

/// Receives device sync notifications.
pub trait DeviceSyncObserver: Send + Sync {
    /// The synced device list or the local device metadata changed.
    fn on_synced_devices_changed(&self);
}

/// In-memory provider for tests.
#[derive(Default)]
pub struct MockRemoteDeviceProvider {
    synced_devices: RwLock<Vec<RemoteDevice>>,
    local_device: RwLock<Option<RemoteDevice>>,
}

impl MockRemoteDeviceProvider {
    pub fn new(synced_devices: Vec<RemoteDevice>, local_device: Option<RemoteDevice>) -> Self {
        MockRemoteDeviceProvider {
            synced_devices: RwLock::new(synced_devices),
            local_device: RwLock::new(local_device),
        }
    }

    pub fn set_synced_devices(&self, devices: Vec<RemoteDevice>) {
        *self.synced_devices.write() = devices;
    }

    pub fn set_local_device(&self, device: Option<RemoteDevice>) {
        *self.local_device.write() = device;
    }
}

impl RemoteDeviceProvider for MockRemoteDeviceProvider {
    fn synced_devices(&self) -> Vec<RemoteDevice> {
        self.synced_devices.read().clone()
    }

    fn local_device_metadata(&self) -> Option<RemoteDevice> {
        self.local_device.read().clone()
    }
}
