// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Background EID Generator
//!
//! A background advertisement is a bare 2-byte EID derived from the
//! advertiser's own beacon seeds and public key. It carries no scan-filter
//! prefix, so identification goes straight to the candidate list.

use std::sync::Arc;

use super::raw::{self, EID_LENGTH};
use super::DataWithTimestamp;
use crate::clock::{Clock, SystemClock};
use crate::device::{BeaconSeed, RemoteDeviceRef};

/// Largest service data size still treated as a background advertisement.
pub const MAX_BACKGROUND_SERVICE_DATA_LENGTH: usize = 3;

pub trait BackgroundEidGenerator {
    /// EID for the current period of the advertiser's seeds.
    fn generate_advertisement(
        &self,
        advertising_device_public_key: &[u8],
        advertising_device_beacon_seeds: &[BeaconSeed],
    ) -> Option<DataWithTimestamp>;

    /// EIDs for the previous, current and next periods, where covered.
    fn generate_nearest_eids(
        &self,
        advertising_device_public_key: &[u8],
        advertising_device_beacon_seeds: &[BeaconSeed],
    ) -> Vec<DataWithTimestamp>;

    /// Id of the candidate that sent `service_data`, if any.
    fn identify_remote_device_by_advertisement(
        &self,
        service_data: &[u8],
        remote_devices: &[RemoteDeviceRef],
    ) -> Option<String>;
}

pub struct HmacBackgroundEidGenerator {
    clock: Arc<dyn Clock>,
}

impl Default for HmacBackgroundEidGenerator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl HmacBackgroundEidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        HmacBackgroundEidGenerator { clock }
    }
}

impl BackgroundEidGenerator for HmacBackgroundEidGenerator {
    fn generate_advertisement(
        &self,
        advertising_device_public_key: &[u8],
        advertising_device_beacon_seeds: &[BeaconSeed],
    ) -> Option<DataWithTimestamp> {
        if advertising_device_public_key.is_empty() {
            return None;
        }
        let period = raw::period_at(advertising_device_beacon_seeds, self.clock.now_millis())?;
        Some(raw::eid_for_period(
            &period,
            Some(advertising_device_public_key),
        ))
    }

    fn generate_nearest_eids(
        &self,
        advertising_device_public_key: &[u8],
        advertising_device_beacon_seeds: &[BeaconSeed],
    ) -> Vec<DataWithTimestamp> {
        if advertising_device_public_key.is_empty() {
            return Vec::new();
        }
        let Some(current) =
            raw::period_at(advertising_device_beacon_seeds, self.clock.now_millis())
        else {
            return Vec::new();
        };

        [
            raw::previous_period(advertising_device_beacon_seeds, &current),
            Some(current),
            raw::next_period(advertising_device_beacon_seeds, &current),
        ]
        .iter()
        .flatten()
        .map(|period| raw::eid_for_period(period, Some(advertising_device_public_key)))
        .collect()
    }

    fn identify_remote_device_by_advertisement(
        &self,
        service_data: &[u8],
        remote_devices: &[RemoteDeviceRef],
    ) -> Option<String> {
        if service_data.len() < EID_LENGTH
            || service_data.len() > MAX_BACKGROUND_SERVICE_DATA_LENGTH
        {
            return None;
        }

        let eid = &service_data[..EID_LENGTH];
        remote_devices
            .iter()
            .find(|device| {
                self.generate_nearest_eids(&device.public_key, &device.beacon_seeds)
                    .iter()
                    .any(|nearest| nearest.data == eid)
            })
            .map(|device| device.device_id().to_string())
    }
}
