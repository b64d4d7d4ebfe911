// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tether Host Fetcher
//!
//! Narrows the directory's current devices to those that can share their
//! mobile data connection.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{
    DeviceDirectory, DeviceDirectoryObserver, RemoteDeviceRef, MAGIC_TETHER_HOST_FEATURE,
};

pub trait TetherHostFetcherObserver: Send + Sync {
    fn on_tether_hosts_updated(&self);
}

pub struct TetherHostFetcher {
    directory: Arc<DeviceDirectory>,
    hosts: RwLock<Vec<RemoteDeviceRef>>,
    observers: RwLock<Vec<Arc<dyn TetherHostFetcherObserver>>>,
}

impl TetherHostFetcher {
    /// Creates a fetcher and subscribes it to directory refreshes.
    pub fn new(directory: Arc<DeviceDirectory>) -> Arc<Self> {
        let hosts = Self::compute_hosts(&directory);
        let fetcher = Arc::new(TetherHostFetcher {
            directory: directory.clone(),
            hosts: RwLock::new(hosts),
            observers: RwLock::new(Vec::new()),
        });
        let weak = Arc::downgrade(&fetcher);
        directory.add_observer(weak);
        fetcher
    }

    /// All current tether hosts, ordered by device id.
    pub fn fetch_all_tether_hosts(&self) -> Vec<RemoteDeviceRef> {
        self.hosts.read().clone()
    }

    /// The tether host with `device_id`, if it is one.
    pub fn fetch_tether_host(&self, device_id: &str) -> Option<RemoteDeviceRef> {
        self.hosts
            .read()
            .iter()
            .find(|host| host.device_id() == device_id)
            .cloned()
    }

    pub fn has_synced_tether_hosts(&self) -> bool {
        !self.hosts.read().is_empty()
    }

    pub fn add_observer(&self, observer: Arc<dyn TetherHostFetcherObserver>) {
        self.observers.write().push(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn TetherHostFetcherObserver>) {
        self.observers
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }

    fn compute_hosts(directory: &DeviceDirectory) -> Vec<RemoteDeviceRef> {
        directory
            .non_expired_devices()
            .into_iter()
            .filter(|device| {
                device
                    .software_feature_state(MAGIC_TETHER_HOST_FEATURE)
                    .is_supported()
            })
            .collect()
    }
}

impl DeviceDirectoryObserver for TetherHostFetcher {
    fn on_devices_refreshed(&self) {
        let updated = Self::compute_hosts(&self.directory);
        {
            let mut hosts = self.hosts.write();
            let unchanged = hosts.len() == updated.len()
                && hosts.iter().zip(&updated).all(|(old, new)| **old == **new);
            if unchanged {
                return;
            }
            *hosts = updated;
            info!(tether_hosts = hosts.len(), "tether host list changed");
        }

        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_tether_hosts_updated();
        }
    }
}
