//! The `DealInfo` index record and its companion opaque blob.
//!
//! `DealInfo` is the scan hot-path: every field is `Copy` and the struct
//! is kept small and flat so a table scan touching millions of them stays
//! cache-friendly. The blob itself (`DealData`) never participates in
//! filtering; it is only fetched for records that survive the scan.

use crate::codes::{code_to_country, code_to_iata, country_to_code, iata_to_code};
use crate::dates::{date_to_int, weekday_bitmask};
use crate::error::{Error, Result};
use crate::table::Locator;

/// Sentinel for `stay_days` on a one-way deal (no return date).
pub const STAY_DAYS_UNDEFINED: u8 = 255;

/// A single flight-offer index record. Never mutated in place after
/// insertion; a newer, cheaper (or equally-priced refresh) deal for the
/// same group is a *new* `DealInfo`, not an edit of this one (see
/// [`crate::aggregate`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealInfo {
    /// Seconds since epoch, insertion time — the scan's expiry and
    /// `max_lifetime_sec` filter both read this field.
    pub timestamp: u32,
    /// Packed 3-letter IATA code.
    pub origin: u32,
    /// Packed 3-letter IATA code. Invariant: `origin != destination`.
    pub destination: u32,
    /// Index into [`crate::codes::COUNTRIES`]; invariant: `< COUNTRY_COUNT`.
    pub destination_country: u8,
    /// `YYYYMMDD`.
    pub departure_date: u32,
    /// `YYYYMMDD`, or `0` for a one-way deal.
    pub return_date: u32,
    pub price: u32,
    /// `0..254`, or [`STAY_DAYS_UNDEFINED`] exactly when `return_date == 0`.
    pub stay_days: u8,
    /// 7-bit mask, exactly one bit set.
    pub departure_day_of_week: u8,
    /// 7-bit mask, exactly one bit set; `0` when one-way.
    pub return_day_of_week: u8,
    pub direct: bool,
    /// Set by an aggregator when a newer record ties the existing price
    /// for its group and replaces it. Never set on a strictly-cheaper
    /// replacement.
    pub overridden: bool,
    pub blob: Locator,
}

impl DealInfo {
    /// Builds a `DealInfo` from validated request parameters. Derives
    /// `stay_days` and both weekday masks rather than taking them from
    /// the caller, matching §4.4 of the design.
    pub fn new(
        origin: &str,
        destination: &str,
        destination_country: &str,
        departure_date: &str,
        return_date: Option<&str>,
        direct: bool,
        price: u32,
        blob: Locator,
        timestamp: u32,
    ) -> Result<Self> {
        let origin_code = iata_to_code(origin)?;
        let destination_code = iata_to_code(destination)?;
        if origin_code == destination_code {
            return Err(Error::bad_parameter("destination", "must differ from origin"));
        }
        let country_code = country_to_code(destination_country)?;
        let departure = date_to_int(departure_date)?;
        let (return_packed, stay_days) = match return_date {
            Some(rd) => {
                let r = date_to_int(rd)?;
                (r, stay_days_between(departure, r)?)
            }
            None => (0, STAY_DAYS_UNDEFINED),
        };

        Ok(DealInfo {
            timestamp,
            origin: origin_code,
            destination: destination_code,
            destination_country: country_code,
            departure_date: departure,
            return_date: return_packed,
            price,
            stay_days,
            departure_day_of_week: weekday_bitmask(departure),
            return_day_of_week: if return_packed == 0 { 0 } else { weekday_bitmask(return_packed) },
            direct,
            overridden: false,
            blob,
        })
    }

    pub fn origin_iata(&self) -> String {
        code_to_iata(self.origin)
    }

    pub fn destination_iata(&self) -> String {
        code_to_iata(self.destination)
    }

    pub fn destination_country_code(&self) -> &'static str {
        code_to_country(self.destination_country).unwrap_or("??")
    }

    pub fn is_roundtrip(&self) -> bool {
        self.return_date != 0
    }
}

/// Whole-days between two packed `YYYYMMDD` dates using a proleptic
/// day-number conversion, capped at `254` so it always fits `stay_days`
/// (a multi-year "stay" is nonsensical input but must not panic or wrap).
fn stay_days_between(departure: u32, return_date: u32) -> Result<u8> {
    if return_date < departure {
        return Err(Error::bad_parameter("return_date", "must not precede departure_date"));
    }
    let days = julian_day(return_date) - julian_day(departure);
    Ok(days.clamp(0, STAY_DAYS_UNDEFINED as i64 - 1) as u8)
}

/// Days since an arbitrary epoch for a packed `YYYYMMDD` date, good
/// enough for differences within the lifetime of this process (matches
/// the day-counting approach `day_of_week` already uses for its Zeller
/// calculation).
fn julian_day(date: u32) -> i64 {
    let year = (date / 10_000) as i64;
    let month = ((date / 100) % 100) as i64;
    let day = (date % 100) as i64;
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    day + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32045
}

/// A deal together with its fetched blob, the final shape handed back
/// from [`crate::store::DealsStore::search`] to callers.
#[derive(Debug, Clone)]
pub struct DealWithBlob {
    pub info: DealInfo,
    pub data: Vec<u8>,
}
