// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Expiring Remote Device Cache
//!
//! Wraps [`RemoteDeviceCache`] and tracks which ids the latest full sync
//! reported. Devices that dropped out of the sync are "expired": still
//! resolvable by id, but no longer listed as current.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{RemoteDevice, RemoteDeviceCache, RemoteDeviceRef};

#[derive(Default)]
pub struct ExpiringRemoteDeviceCache {
    cache: Arc<RemoteDeviceCache>,
    device_ids_from_last_set_call: RwLock<HashSet<String>>,
}

impl ExpiringRemoteDeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing cache, with every cached device initially expired.
    pub fn with_cache(cache: Arc<RemoteDeviceCache>) -> Self {
        ExpiringRemoteDeviceCache {
            cache,
            device_ids_from_last_set_call: RwLock::new(HashSet::new()),
        }
    }

    /// Caches `devices` and makes them the only non-expired devices.
    pub fn set_remote_devices_and_invalidate_old_entries(&self, devices: &[RemoteDevice]) {
        let mut ids = self.device_ids_from_last_set_call.write();
        self.cache.set_remote_devices(devices);
        *ids = devices.iter().map(RemoteDevice::device_id).collect();
    }

    /// Caches one device and marks it non-expired. Other devices keep their
    /// expiry status.
    pub fn update_remote_device(&self, device: &RemoteDevice) {
        let mut ids = self.device_ids_from_last_set_call.write();
        self.cache.set_remote_device(device);
        ids.insert(device.device_id());
    }

    /// Non-expired devices, ordered by device id.
    pub fn get_non_expired_remote_devices(&self) -> Vec<RemoteDeviceRef> {
        let ids = self.device_ids_from_last_set_call.read();
        self.cache
            .get_remote_devices()
            .into_iter()
            .filter(|device| ids.contains(device.device_id()))
            .collect()
    }

    /// Latest snapshot for `device_id`, expired or not.
    pub fn get_remote_device(&self, device_id: &str) -> Option<RemoteDeviceRef> {
        self.cache.get_remote_device(device_id)
    }

    pub fn is_expired(&self, device_id: &str) -> bool {
        !self.device_ids_from_last_set_call.read().contains(device_id)
    }

    /// The underlying append-only cache, for components that resolve ids
    /// regardless of expiry.
    pub fn cache(&self) -> &Arc<RemoteDeviceCache> {
        &self.cache
    }
}
