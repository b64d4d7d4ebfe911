// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Foreground EID Generator
//!
//! A foreground advertisement is addressed to one scanning device:
//!
//! ```text
//! [ scan filter (2 bytes) | advertiser EID (2 bytes) ]
//! ```
//!
//! Both halves come from the *scanning* device's beacon seeds. The scan
//! filter uses no extra entropy, so the scanner can recognise ads meant for
//! it before looking at candidates; the advertiser EID mixes in the
//! advertiser's public key.

use std::sync::Arc;

use tracing::debug;

use super::raw::{self, EID_LENGTH};
use super::{DataWithTimestamp, EidData};
use crate::clock::{Clock, SystemClock};
use crate::device::{BeaconSeed, RemoteDevice};

/// Bytes in a foreground advertisement.
pub const FOREGROUND_ADVERTISEMENT_LENGTH: usize = 2 * EID_LENGTH;

pub trait ForegroundEidGenerator {
    /// Current and adjacent scan filters of the scanning device.
    fn generate_background_scan_filter(&self, scanning_device_beacon_seeds: &[BeaconSeed])
        -> Option<EidData>;

    /// Advertisement for the current period. `None` if the key is empty or
    /// no seed covers the current time.
    fn generate_advertisement(
        &self,
        advertising_device_public_key: &[u8],
        scanning_device_beacon_seeds: &[BeaconSeed],
    ) -> Option<DataWithTimestamp>;

    /// Every advertisement the advertiser could currently be sending.
    fn generate_possible_advertisements(
        &self,
        advertising_device_public_key: &[u8],
        scanning_device_beacon_seeds: &[BeaconSeed],
    ) -> Vec<Vec<u8>>;

    /// Id of the candidate that sent `service_data`, if any.
    fn identify_remote_device_by_advertisement(
        &self,
        service_data: &[u8],
        remote_device_ids: &[String],
        scanning_device_beacon_seeds: &[BeaconSeed],
    ) -> Option<String>;
}

/// HMAC-SHA256 foreground generator.
pub struct HmacForegroundEidGenerator {
    clock: Arc<dyn Clock>,
}

impl Default for HmacForegroundEidGenerator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl HmacForegroundEidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        HmacForegroundEidGenerator { clock }
    }
}

impl ForegroundEidGenerator for HmacForegroundEidGenerator {
    fn generate_background_scan_filter(
        &self,
        scanning_device_beacon_seeds: &[BeaconSeed],
    ) -> Option<EidData> {
        let now = self.clock.now_millis();
        let current = raw::period_at(scanning_device_beacon_seeds, now)?;
        let adjacent = raw::adjacent_period(scanning_device_beacon_seeds, &current, now);

        Some(EidData {
            current: raw::eid_for_period(&current, None),
            adjacent: adjacent.map(|period| raw::eid_for_period(&period, None)),
        })
    }

    fn generate_advertisement(
        &self,
        advertising_device_public_key: &[u8],
        scanning_device_beacon_seeds: &[BeaconSeed],
    ) -> Option<DataWithTimestamp> {
        if advertising_device_public_key.is_empty() {
            return None;
        }
        let now = self.clock.now_millis();
        let period = raw::period_at(scanning_device_beacon_seeds, now)?;
        Some(advertisement_for_period(
            &period,
            advertising_device_public_key,
        ))
    }

    fn generate_possible_advertisements(
        &self,
        advertising_device_public_key: &[u8],
        scanning_device_beacon_seeds: &[BeaconSeed],
    ) -> Vec<Vec<u8>> {
        if advertising_device_public_key.is_empty() {
            return Vec::new();
        }
        let now = self.clock.now_millis();
        let Some(current) = raw::period_at(scanning_device_beacon_seeds, now) else {
            return Vec::new();
        };

        let mut advertisements =
            vec![advertisement_for_period(&current, advertising_device_public_key).data];
        if let Some(adjacent) = raw::adjacent_period(scanning_device_beacon_seeds, &current, now)
        {
            advertisements
                .push(advertisement_for_period(&adjacent, advertising_device_public_key).data);
        }
        advertisements
    }

    fn identify_remote_device_by_advertisement(
        &self,
        service_data: &[u8],
        remote_device_ids: &[String],
        scanning_device_beacon_seeds: &[BeaconSeed],
    ) -> Option<String> {
        if service_data.len() < FOREGROUND_ADVERTISEMENT_LENGTH {
            return None;
        }

        let scan_filter = self.generate_background_scan_filter(scanning_device_beacon_seeds)?;
        if !scan_filter.matches(&service_data[..EID_LENGTH]) {
            debug!(
                service_data = %hex::encode(service_data),
                "advertisement not addressed to this device"
            );
            return None;
        }

        let advertisement = &service_data[..FOREGROUND_ADVERTISEMENT_LENGTH];
        remote_device_ids
            .iter()
            .find(|device_id| {
                RemoteDevice::public_key_from_device_id(device_id).is_some_and(|public_key| {
                    self.generate_possible_advertisements(
                        &public_key,
                        scanning_device_beacon_seeds,
                    )
                    .iter()
                    .any(|possible| possible.as_slice() == advertisement)
                })
            })
            .cloned()
    }
}

fn advertisement_for_period(
    period: &raw::EidPeriod<'_>,
    advertising_device_public_key: &[u8],
) -> DataWithTimestamp {
    let mut data = raw::generate_eid(&period.seed.data, period.start_millis, None);
    data.extend(raw::generate_eid(
        &period.seed.data,
        period.start_millis,
        Some(advertising_device_public_key),
    ));
    DataWithTimestamp::new(data, period.start_millis, period.end_millis)
}
