// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Directory
//!
//! Keeps an [`ExpiringRemoteDeviceCache`] in step with the device sync
//! source and answers the lookups the rest of the crate needs: the local
//! device, a device by id, and its public key.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{
    DeviceSyncObserver, ExpiringRemoteDeviceCache, RemoteDevice, RemoteDeviceProvider,
    RemoteDeviceRef,
};

/// Notified after the directory has reconciled with the sync source.
pub trait DeviceDirectoryObserver: Send + Sync {
    fn on_devices_refreshed(&self);
}

pub struct DeviceDirectory {
    provider: Arc<dyn RemoteDeviceProvider>,
    cache: Arc<ExpiringRemoteDeviceCache>,
    local_device_id: RwLock<Option<String>>,
    observers: RwLock<Vec<Weak<dyn DeviceDirectoryObserver>>>,
}

impl DeviceDirectory {
    /// Creates a directory with its own cache and loads the current sync state.
    pub fn new(provider: Arc<dyn RemoteDeviceProvider>) -> Self {
        Self::with_cache(provider, Arc::new(ExpiringRemoteDeviceCache::new()))
    }

    /// Creates a directory over a shared cache and loads the current sync state.
    pub fn with_cache(
        provider: Arc<dyn RemoteDeviceProvider>,
        cache: Arc<ExpiringRemoteDeviceCache>,
    ) -> Self {
        let directory = DeviceDirectory {
            provider,
            cache,
            local_device_id: RwLock::new(None),
            observers: RwLock::new(Vec::new()),
        };
        directory.reload();
        directory
    }

    /// Reconciles the cache with the sync source and notifies observers.
    pub fn refresh(&self) {
        self.reload();

        let observers: Vec<Arc<dyn DeviceDirectoryObserver>> = {
            let mut observers = self.observers.write();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            observer.on_devices_refreshed();
        }
    }

    /// Registers an observer. Dropped observers are pruned on the next refresh.
    pub fn add_observer(&self, observer: Weak<dyn DeviceDirectoryObserver>) {
        self.observers.write().push(observer);
    }

    /// This device, if the sync source has reported it.
    pub fn local_device(&self) -> Option<RemoteDeviceRef> {
        let id = self.local_device_id.read().clone()?;
        self.cache.get_remote_device(&id)
    }

    /// Latest snapshot of `device_id`, expired or not.
    pub fn remote_device(&self, device_id: &str) -> Option<RemoteDeviceRef> {
        self.cache.get_remote_device(device_id)
    }

    pub fn public_key_for(&self, device_id: &str) -> Option<Vec<u8>> {
        self.remote_device(device_id)
            .map(|device| device.public_key.clone())
    }

    /// Devices in the latest sync other than this device.
    pub fn non_expired_devices(&self) -> Vec<RemoteDeviceRef> {
        let local_id = self.local_device_id.read().clone();
        self.cache
            .get_non_expired_remote_devices()
            .into_iter()
            .filter(|device| Some(device.device_id()) != local_id.as_deref())
            .collect()
    }

    pub fn cache(&self) -> &Arc<ExpiringRemoteDeviceCache> {
        &self.cache
    }

    fn reload(&self) {
        let synced = self.provider.synced_devices();
        self.cache
            .set_remote_devices_and_invalidate_old_entries(&synced);

        let local = self.provider.local_device_metadata();
        if let Some(local) = &local {
            self.cache.update_remote_device(local);
        }
        *self.local_device_id.write() = local.as_ref().map(RemoteDevice::device_id);

        match &local {
            Some(local) => info!(
                synced_devices = synced.len(),
                local_device = %RemoteDevice::truncate_device_id_for_logs(&local.device_id()),
                "device directory refreshed"
            ),
            None => debug!(
                synced_devices = synced.len(),
                "device directory refreshed without local device metadata"
            ),
        }
    }
}

impl DeviceSyncObserver for DeviceDirectory {
    fn on_synced_devices_changed(&self) {
        self.refresh();
    }
}
