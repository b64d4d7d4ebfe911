// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! BLE Service Data Helper
//!
//! Decides what this device advertises to a given remote device, and which
//! remote device (if any) sent a received advertisement.
//!
//! Service data sizes select the generator:
//! - fewer than 2 bytes: ignored
//! - 2 or 3 bytes: background advertisement
//! - 4 or more bytes: foreground advertisement

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::TetherConfig;
use crate::device::{
    DeviceIdPair, DeviceIdPairSet, RemoteDevice, RemoteDeviceCache, RemoteDeviceRef,
};
use crate::eid::{
    BackgroundEidGenerator, DataWithTimestamp, ForegroundEidGenerator,
    HmacBackgroundEidGenerator, HmacForegroundEidGenerator, EID_LENGTH,
    FOREGROUND_ADVERTISEMENT_LENGTH, MAX_BACKGROUND_SERVICE_DATA_LENGTH,
};

/// Fewest bytes of service data worth examining.
pub const MIN_SERVICE_DATA_LENGTH: usize = EID_LENGTH;

/// A remote device recognised from its advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifiedDevice {
    pub device: RemoteDeviceRef,
    /// Whether it was recognised from a background advertisement.
    pub is_background_advertisement: bool,
}

pub struct BleServiceDataHelper<F = HmacForegroundEidGenerator, B = HmacBackgroundEidGenerator> {
    cache: Arc<RemoteDeviceCache>,
    foreground_generator: F,
    background_generator: B,
    background_advertising_supported: bool,
}

impl BleServiceDataHelper {
    /// Creates a helper with the HMAC generators on the system clock.
    pub fn new(cache: Arc<RemoteDeviceCache>, config: &TetherConfig) -> Self {
        Self::with_generators(
            cache,
            HmacForegroundEidGenerator::default(),
            HmacBackgroundEidGenerator::default(),
            config,
        )
    }
}

impl<F: ForegroundEidGenerator, B: BackgroundEidGenerator> BleServiceDataHelper<F, B> {
    pub fn with_generators(
        cache: Arc<RemoteDeviceCache>,
        foreground_generator: F,
        background_generator: B,
        config: &TetherConfig,
    ) -> Self {
        BleServiceDataHelper {
            cache,
            foreground_generator,
            background_generator,
            background_advertising_supported: config.background_advertising_supported,
        }
    }

    pub fn foreground_generator(&self) -> &F {
        &self.foreground_generator
    }

    pub fn background_generator(&self) -> &B {
        &self.background_generator
    }

    /// Foreground advertisement the local device of `pair` should send to
    /// its remote device. `None` if either device is unknown or has no
    /// usable key material.
    pub fn generate_foreground_advertisement(
        &self,
        pair: &DeviceIdPair,
    ) -> Option<DataWithTimestamp> {
        let Some(local_device) = self.cache.get_remote_device(&pair.local_device_id) else {
            warn!(pair = %pair, "cannot advertise: local device not in cache");
            return None;
        };
        let Some(remote_device) = self.cache.get_remote_device(&pair.remote_device_id) else {
            warn!(pair = %pair, "cannot advertise: remote device not in cache");
            return None;
        };

        self.foreground_generator
            .generate_advertisement(&local_device.public_key, &remote_device.beacon_seeds)
    }

    /// Identifies which remote device of `pairs` sent `service_data`.
    ///
    /// Pairs are grouped by local device; each group is tried with the
    /// foreground generator first, then the background one. The first match
    /// wins. Pairs whose devices are not cached are skipped.
    pub fn identify_remote_device(
        &self,
        service_data: &[u8],
        pairs: &DeviceIdPairSet,
    ) -> Option<IdentifiedDevice> {
        let len = service_data.len();
        let try_foreground = len >= FOREGROUND_ADVERTISEMENT_LENGTH;
        let try_background = self.background_advertising_supported
            && (MIN_SERVICE_DATA_LENGTH..=MAX_BACKGROUND_SERVICE_DATA_LENGTH).contains(&len);
        if !try_foreground && !try_background {
            debug!(len, "service data size outside advertisement bands");
            return None;
        }

        let mut remote_ids_by_local_id: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for pair in pairs {
            remote_ids_by_local_id
                .entry(pair.local_device_id.as_str())
                .or_default()
                .push(pair.remote_device_id.as_str());
        }

        for (local_id, remote_ids) in remote_ids_by_local_id {
            let Some(local_device) = self.cache.get_remote_device(local_id) else {
                warn!(
                    local_device = %RemoteDevice::truncate_device_id_for_logs(local_id),
                    "skipping pairs for uncached local device"
                );
                continue;
            };

            let remote_devices: Vec<RemoteDeviceRef> = remote_ids
                .into_iter()
                .filter_map(|remote_id| {
                    let device = self.cache.get_remote_device(remote_id);
                    if device.is_none() {
                        warn!(
                            remote_device = %RemoteDevice::truncate_device_id_for_logs(remote_id),
                            "skipping uncached remote device"
                        );
                    }
                    device
                })
                .collect();
            if remote_devices.is_empty() {
                continue;
            }

            if try_foreground {
                if let Some(identified) =
                    self.identify_foreground(service_data, &local_device, &remote_devices)
                {
                    return Some(identified);
                }
            }

            if try_background {
                if let Some(identified) = self.identify_background(service_data, &remote_devices)
                {
                    return Some(identified);
                }
            }
        }

        debug!(service_data = %hex::encode(service_data), "no remote device identified");
        None
    }

    fn identify_foreground(
        &self,
        service_data: &[u8],
        local_device: &RemoteDeviceRef,
        remote_devices: &[RemoteDeviceRef],
    ) -> Option<IdentifiedDevice> {
        let remote_ids: Vec<String> = remote_devices
            .iter()
            .map(|device| device.device_id().to_string())
            .collect();
        let identified_id = self.foreground_generator.identify_remote_device_by_advertisement(
            service_data,
            &remote_ids,
            &local_device.beacon_seeds,
        )?;

        let device = find_by_id(remote_devices, &identified_id)?;
        info!(
            remote_device = %device.truncated_device_id(),
            "identified remote device from foreground advertisement"
        );
        Some(IdentifiedDevice {
            device,
            is_background_advertisement: false,
        })
    }

    fn identify_background(
        &self,
        service_data: &[u8],
        remote_devices: &[RemoteDeviceRef],
    ) -> Option<IdentifiedDevice> {
        let identified_id = self
            .background_generator
            .identify_remote_device_by_advertisement(service_data, remote_devices)?;

        let device = find_by_id(remote_devices, &identified_id)?;
        info!(
            remote_device = %device.truncated_device_id(),
            "identified remote device from background advertisement"
        );
        Some(IdentifiedDevice {
            device,
            is_background_advertisement: true,
        })
    }
}

fn find_by_id(devices: &[RemoteDeviceRef], device_id: &str) -> Option<RemoteDeviceRef> {
    devices
        .iter()
        .find(|device| device.device_id() == device_id)
        .cloned()
}
