// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Devices Module
//!
//! Remote device snapshots, the caches that hold them, and the lookup glue
//! that keeps them in step with the account's device sync.

mod cache;
mod directory;
mod expiring_cache;
mod host_fetcher;
mod id_pair;
mod provider;
mod remote_device;

pub use cache::RemoteDeviceCache;
pub use directory::{DeviceDirectory, DeviceDirectoryObserver};
pub use expiring_cache::ExpiringRemoteDeviceCache;
pub use host_fetcher::{TetherHostFetcher, TetherHostFetcherObserver};
pub use id_pair::{DeviceIdPair, DeviceIdPairSet};
pub use provider::{DeviceSyncObserver, MockRemoteDeviceProvider, RemoteDeviceProvider};
pub use remote_device::{
    BeaconSeed, RemoteDevice, RemoteDeviceRef, SoftwareFeatureState, MAGIC_TETHER_HOST_FEATURE,
};
