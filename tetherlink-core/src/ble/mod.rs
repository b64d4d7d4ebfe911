// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! BLE Advertisement Module
//!
//! Generation and identification of advertisement service data.

mod service_data_helper;

pub use service_data_helper::{BleServiceDataHelper, IdentifiedDevice, MIN_SERVICE_DATA_LENGTH};
