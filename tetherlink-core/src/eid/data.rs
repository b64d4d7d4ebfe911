// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! EID value types.

use std::fmt;

/// Bytes that are valid over a half-open time window.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DataWithTimestamp {
    pub data: Vec<u8>,
    pub start_timestamp_millis: i64,
    pub end_timestamp_millis: i64,
}

impl DataWithTimestamp {
    pub fn new(data: Vec<u8>, start_timestamp_millis: i64, end_timestamp_millis: i64) -> Self {
        DataWithTimestamp {
            data,
            start_timestamp_millis,
            end_timestamp_millis,
        }
    }

    pub fn contains(&self, time_millis: i64) -> bool {
        self.start_timestamp_millis <= time_millis && time_millis < self.end_timestamp_millis
    }

    pub fn data_in_hex(&self) -> String {
        hex::encode(&self.data)
    }
}

impl fmt::Debug for DataWithTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataWithTimestamp {{ data: 0x{}, window: [{}, {}) }}",
            self.data_in_hex(),
            self.start_timestamp_millis,
            self.end_timestamp_millis
        )
    }
}

/// The EID for the current period plus the one for the nearest adjacent
/// period, if the seeds cover it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EidData {
    pub current: DataWithTimestamp,
    pub adjacent: Option<DataWithTimestamp>,
}

impl EidData {
    /// Whether `data` equals either EID.
    pub fn matches(&self, data: &[u8]) -> bool {
        self.current.data == data
            || self
                .adjacent
                .as_ref()
                .is_some_and(|adjacent| adjacent.data == data)
    }
}
