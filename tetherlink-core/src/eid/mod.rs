// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ephemeral Ids (EIDs)
//!
//! Short rotating identifiers carried in BLE advertisement service data.
//! Only devices that share the beacon seeds can produce or recognise them.

mod background;
mod data;
mod foreground;
mod mock;

#[cfg(feature = "testing")]
pub mod raw;
#[cfg(not(feature = "testing"))]
mod raw;

pub use background::{
    BackgroundEidGenerator, HmacBackgroundEidGenerator, MAX_BACKGROUND_SERVICE_DATA_LENGTH,
};
pub use data::{DataWithTimestamp, EidData};
pub use foreground::{
    ForegroundEidGenerator, HmacForegroundEidGenerator, FOREGROUND_ADVERTISEMENT_LENGTH,
};
pub use mock::{IdentifyCall, MockBackgroundEidGenerator, MockForegroundEidGenerator};
pub use raw::{generate_eid, EID_LENGTH, EID_PERIOD_MILLIS};
