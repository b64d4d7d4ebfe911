// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock EID generators that return canned answers and count calls.

use std::cell::{Cell, RefCell};

use super::{BackgroundEidGenerator, DataWithTimestamp, EidData, ForegroundEidGenerator};
use crate::device::{BeaconSeed, RemoteDeviceRef};

/// Arguments of the last identify call made on a mock generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyCall {
    pub service_data: Vec<u8>,
    pub remote_device_ids: Vec<String>,
}

#[derive(Default)]
pub struct MockForegroundEidGenerator {
    background_scan_filter: RefCell<Option<EidData>>,
    advertisement: RefCell<Option<DataWithTimestamp>>,
    possible_advertisements: RefCell<Vec<Vec<u8>>>,
    identified_device_id: RefCell<Option<String>>,
    num_identify_calls: Cell<usize>,
    last_identify_call: RefCell<Option<IdentifyCall>>,
}

impl MockForegroundEidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_background_scan_filter(&self, filter: Option<EidData>) {
        *self.background_scan_filter.borrow_mut() = filter;
    }

    pub fn set_advertisement(&self, advertisement: Option<DataWithTimestamp>) {
        *self.advertisement.borrow_mut() = advertisement;
    }

    pub fn set_possible_advertisements(&self, advertisements: Vec<Vec<u8>>) {
        *self.possible_advertisements.borrow_mut() = advertisements;
    }

    /// Id returned by the next identify calls.
    pub fn set_identified_device_id(&self, device_id: Option<&str>) {
        *self.identified_device_id.borrow_mut() = device_id.map(str::to_string);
    }

    pub fn num_identify_calls(&self) -> usize {
        self.num_identify_calls.get()
    }

    pub fn last_identify_call(&self) -> Option<IdentifyCall> {
        self.last_identify_call.borrow().clone()
    }
}

impl ForegroundEidGenerator for MockForegroundEidGenerator {
    fn generate_background_scan_filter(&self, _: &[BeaconSeed]) -> Option<EidData> {
        self.background_scan_filter.borrow().clone()
    }

    fn generate_advertisement(&self, _: &[u8], _: &[BeaconSeed]) -> Option<DataWithTimestamp> {
        self.advertisement.borrow().clone()
    }

    fn generate_possible_advertisements(&self, _: &[u8], _: &[BeaconSeed]) -> Vec<Vec<u8>> {
        self.possible_advertisements.borrow().clone()
    }

    fn identify_remote_device_by_advertisement(
        &self,
        service_data: &[u8],
        remote_device_ids: &[String],
        _: &[BeaconSeed],
    ) -> Option<String> {
        self.num_identify_calls.set(self.num_identify_calls.get() + 1);
        *self.last_identify_call.borrow_mut() = Some(IdentifyCall {
            service_data: service_data.to_vec(),
            remote_device_ids: remote_device_ids.to_vec(),
        });

        let identified = self.identified_device_id.borrow().clone()?;
        remote_device_ids
            .iter()
            .any(|id| *id == identified)
            .then_some(identified)
    }
}

#[derive(Default)]
pub struct MockBackgroundEidGenerator {
    advertisement: RefCell<Option<DataWithTimestamp>>,
    nearest_eids: RefCell<Vec<DataWithTimestamp>>,
    identified_device_id: RefCell<Option<String>>,
    num_identify_calls: Cell<usize>,
    last_identify_call: RefCell<Option<IdentifyCall>>,
}

impl MockBackgroundEidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_advertisement(&self, advertisement: Option<DataWithTimestamp>) {
        *self.advertisement.borrow_mut() = advertisement;
    }

    pub fn set_nearest_eids(&self, eids: Vec<DataWithTimestamp>) {
        *self.nearest_eids.borrow_mut() = eids;
    }

    pub fn set_identified_device_id(&self, device_id: Option<&str>) {
        *self.identified_device_id.borrow_mut() = device_id.map(str::to_string);
    }

    pub fn num_identify_calls(&self) -> usize {
        self.num_identify_calls.get()
    }

    pub fn last_identify_call(&self) -> Option<IdentifyCall> {
        self.last_identify_call.borrow().clone()
    }
}

impl BackgroundEidGenerator for MockBackgroundEidGenerator {
    fn generate_advertisement(&self, _: &[u8], _: &[BeaconSeed]) -> Option<DataWithTimestamp> {
        self.advertisement.borrow().clone()
    }

    fn generate_nearest_eids(&self, _: &[u8], _: &[BeaconSeed]) -> Vec<DataWithTimestamp> {
        self.nearest_eids.borrow().clone()
    }

    fn identify_remote_device_by_advertisement(
        &self,
        service_data: &[u8],
        remote_devices: &[RemoteDeviceRef],
    ) -> Option<String> {
        self.num_identify_calls.set(self.num_identify_calls.get() + 1);
        let remote_device_ids: Vec<String> = remote_devices
            .iter()
            .map(|device| device.device_id().to_string())
            .collect();
        *self.last_identify_call.borrow_mut() = Some(IdentifyCall {
            service_data: service_data.to_vec(),
            remote_device_ids: remote_device_ids.clone(),
        });

        let identified = self.identified_device_id.borrow().clone()?;
        remote_device_ids
            .contains(&identified)
            .then_some(identified)
    }
}
