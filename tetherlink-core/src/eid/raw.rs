// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Raw EID Derivation
//!
//! EID = first `EID_LENGTH` bytes of
//! HMAC-SHA256(key = seed data, msg = [extra entropy ||] period start millis, big endian).
//!
//! Periods are `EID_PERIOD_MILLIS` long, aligned to the start of the seed
//! that covers them and clipped to its end.

use ring::hmac;

use super::DataWithTimestamp;
use crate::device::BeaconSeed;

/// Length of one EID period.
pub const EID_PERIOD_MILLIS: i64 = 15 * 60 * 1000;

/// Bytes in one EID.
pub const EID_LENGTH: usize = 2;

/// One EID period inside a beacon seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EidPeriod<'a> {
    pub seed: &'a BeaconSeed,
    pub start_millis: i64,
    pub end_millis: i64,
}

/// Derives one EID.
pub fn generate_eid(
    seed_data: &[u8],
    period_start_millis: i64,
    extra_entropy: Option<&[u8]>,
) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, seed_data);
    let mut message = Vec::with_capacity(extra_entropy.map_or(0, <[u8]>::len) + 8);
    if let Some(entropy) = extra_entropy {
        message.extend_from_slice(entropy);
    }
    message.extend_from_slice(&period_start_millis.to_be_bytes());

    let tag = hmac::sign(&key, &message);
    tag.as_ref()[..EID_LENGTH].to_vec()
}

/// The period containing `time_millis`, if a non-empty seed covers it.
/// Seeds whose span does not fit in an `i64` have no periods.
pub fn period_at(seeds: &[BeaconSeed], time_millis: i64) -> Option<EidPeriod<'_>> {
    let seed = seeds
        .iter()
        .find(|seed| !seed.data.is_empty() && seed.contains(time_millis))?;

    let offset = time_millis.checked_sub(seed.start_time_millis)?;
    let start_millis = (offset / EID_PERIOD_MILLIS)
        .checked_mul(EID_PERIOD_MILLIS)
        .and_then(|aligned| seed.start_time_millis.checked_add(aligned))?;
    let end_millis = start_millis
        .saturating_add(EID_PERIOD_MILLIS)
        .min(seed.end_time_millis);
    Some(EidPeriod {
        seed,
        start_millis,
        end_millis,
    })
}

pub fn previous_period<'a>(seeds: &'a [BeaconSeed], period: &EidPeriod<'_>) -> Option<EidPeriod<'a>> {
    period_at(seeds, period.start_millis.checked_sub(1)?)
}

pub fn next_period<'a>(seeds: &'a [BeaconSeed], period: &EidPeriod<'_>) -> Option<EidPeriod<'a>> {
    period_at(seeds, period.end_millis)
}

/// Previous period while `now_millis` is in the first half of `current`,
/// the next one afterwards.
pub fn adjacent_period<'a>(
    seeds: &'a [BeaconSeed],
    current: &EidPeriod<'_>,
    now_millis: i64,
) -> Option<EidPeriod<'a>> {
    let half = current.end_millis.saturating_sub(current.start_millis) / 2;
    if now_millis.saturating_sub(current.start_millis) < half {
        previous_period(seeds, current)
    } else {
        next_period(seeds, current)
    }
}

/// EID for `period`, stamped with the period window.
pub fn eid_for_period(period: &EidPeriod<'_>, extra_entropy: Option<&[u8]>) -> DataWithTimestamp {
    DataWithTimestamp::new(
        generate_eid(&period.seed.data, period.start_millis, extra_entropy),
        period.start_millis,
        period.end_millis,
    )
}
