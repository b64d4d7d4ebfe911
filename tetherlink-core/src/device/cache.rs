// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Remote Device Cache
//!
//! Canonical id -> snapshot map. Entries are replaced by newer snapshots but
//! never removed, so any ref handed out stays resolvable by id.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{RemoteDevice, RemoteDeviceRef};

/// Shared, append-only cache of device snapshots.
#[derive(Default)]
pub struct RemoteDeviceCache {
    devices: RwLock<HashMap<String, RemoteDeviceRef>>,
}

impl RemoteDeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces each device. Devices absent from `devices` keep
    /// their existing entries. An unchanged device keeps its snapshot.
    pub fn set_remote_devices(&self, devices: &[RemoteDevice]) {
        let mut map = self.devices.write();
        for device in devices {
            Self::insert_locked(&mut map, device);
        }
    }

    /// Inserts or replaces a single device.
    pub fn set_remote_device(&self, device: &RemoteDevice) {
        let mut map = self.devices.write();
        Self::insert_locked(&mut map, device);
    }

    /// All cached devices, ordered by device id.
    pub fn get_remote_devices(&self) -> Vec<RemoteDeviceRef> {
        let mut devices: Vec<RemoteDeviceRef> = self.devices.read().values().cloned().collect();
        devices.sort();
        devices
    }

    /// Current snapshot for `device_id`.
    pub fn get_remote_device(&self, device_id: &str) -> Option<RemoteDeviceRef> {
        self.devices.read().get(device_id).cloned()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.read().contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    fn insert_locked(map: &mut HashMap<String, RemoteDeviceRef>, device: &RemoteDevice) {
        let device_id = device.device_id();
        if let Some(existing) = map.get(&device_id) {
            if **existing == *device {
                return;
            }
        }
        debug!(
            device_id = %RemoteDevice::truncate_device_id_for_logs(&device_id),
            "caching remote device snapshot"
        );
        map.insert(device_id, RemoteDeviceRef::new(device.clone()));
    }
}
