// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies
//!
//! Reusable proptest strategies for property-based testing.

use proptest::prelude::*;

use tetherlink_core::RemoteDevice;

use super::create_device;

/// Device names, short enough to keep ids readable in failure output.
pub fn device_name_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

/// Arbitrary advertisement service data, including sizes outside every band.
pub fn service_data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..12)
}

/// Distinct devices built from distinct names.
pub fn devices_strategy(max: usize) -> impl Strategy<Value = Vec<RemoteDevice>> {
    prop::collection::btree_set(device_name_strategy(), 0..=max)
        .prop_map(|names| names.iter().map(|name| create_device(name)).collect())
}

/// A sequence of sync snapshots, each a subset of a fixed device pool.
pub fn sync_history_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0usize..6, 0..6), 1..6)
}
