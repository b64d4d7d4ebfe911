// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Device fixtures and logging setup shared across test modules.

#![allow(dead_code)]

pub mod strategies;

use tetherlink_core::device::MAGIC_TETHER_HOST_FEATURE;
use tetherlink_core::{BeaconSeed, RemoteDevice, RemoteDeviceRef, SoftwareFeatureState};

pub const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Five minutes into a 15-minute period, halfway through the first seed.
pub const TEST_NOW_MILLIS: i64 = DAY_MILLIS / 2 + 5 * 60 * 1000;

/// Two consecutive one-day seeds starting at the epoch.
pub fn beacon_seeds(label: &str) -> Vec<BeaconSeed> {
    vec![
        BeaconSeed::new(format!("{}-seed-0", label).into_bytes(), 0, DAY_MILLIS),
        BeaconSeed::new(
            format!("{}-seed-1", label).into_bytes(),
            DAY_MILLIS,
            2 * DAY_MILLIS,
        ),
    ]
}

/// A device with a name-derived public key and beacon seeds.
pub fn create_device(name: &str) -> RemoteDevice {
    RemoteDevice::new(name, format!("public-key-{}", name).into_bytes())
        .with_beacon_seeds(beacon_seeds(name))
}

/// A device that advertises support for hosting tether connections.
pub fn create_tether_host(name: &str) -> RemoteDevice {
    create_device(name)
        .with_software_feature(MAGIC_TETHER_HOST_FEATURE, SoftwareFeatureState::Supported)
        .with_mobile_hotspot(true)
}

pub fn device_ref(name: &str) -> RemoteDeviceRef {
    RemoteDeviceRef::new(create_device(name))
}

pub fn device_refs(names: &[&str]) -> Vec<RemoteDeviceRef> {
    names.iter().map(|name| device_ref(name)).collect()
}

/// Routes `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
