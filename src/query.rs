//! The query parameter bundle and the per-record filter it compiles to.
//!
//! A [`DealsQuery`] validates everything up front at construction time —
//! bad combinations surface as `BadParameter` before a single record is
//! scanned — then [`DealsQuery::matches`] runs the thirteen-step
//! conjunction from §4.5 against one [`DealInfo`] at a time, short-
//! circuiting on the first failing step.

use std::collections::HashSet;

use crate::codes::{country_to_code, iata_to_code};
use crate::dates::{date_to_int, weekdays_bitmask_from_str};
use crate::deal::DealInfo;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct Range<T> {
    pub from: T,
    pub to: T,
}

impl<T: PartialOrd + Copy> Range<T> {
    fn new(from: T, to: T, field: &str) -> Result<Self> {
        if from > to {
            return Err(Error::bad_parameter(field, "range 'from' must not exceed 'to'"));
        }
        Ok(Range { from, to })
    }

    fn contains(&self, value: T) -> bool {
        value >= self.from && value <= self.to
    }
}

/// The compiled, validated parameters of one `/deals/top` request.
/// Required/optional mirrors §4.5's table: `origin` is required,
/// everything else is `Option`.
#[derive(Debug, Clone)]
pub struct DealsQuery {
    pub origin: u32,
    pub destinations: Option<HashSet<u32>>,
    pub destination_countries: Option<HashSet<u8>>,
    pub departure_dates: Option<Range<u32>>,
    pub return_dates: Option<Range<u32>>,
    pub exact_date: Option<u32>,
    pub departure_weekdays: Option<u8>,
    pub return_weekdays: Option<u8>,
    pub stay_days: Option<Range<u8>>,
    pub direct_flights: Option<bool>,
    pub roundtrip_flights: Option<bool>,
    pub price: Option<Range<u32>>,
    pub max_lifetime_sec: Option<u32>,
    pub limit: usize,
}

/// Builder mirroring the HTTP query-string parameters 1:1 (§6.1); every
/// setter validates and returns `Self` so construction reads like the
/// wire form while still failing fast on a bad combination.
#[derive(Debug, Clone, Default)]
pub struct DealsQueryBuilder {
    origin: Option<String>,
    destinations: Option<Vec<String>>,
    destination_countries: Option<Vec<String>>,
    departure_date_from: Option<String>,
    departure_date_to: Option<String>,
    return_date_from: Option<String>,
    return_date_to: Option<String>,
    exact_date: Option<String>,
    departure_days_of_week: Option<String>,
    return_days_of_week: Option<String>,
    stay_from: Option<u8>,
    stay_to: Option<u8>,
    direct_flights: Option<bool>,
    roundtrip_flights: Option<bool>,
    price_from: Option<u32>,
    price_to: Option<u32>,
    max_lifetime_sec: Option<u32>,
    limit: Option<usize>,
}

pub const DEFAULT_DEALS_LIMIT: usize = 10;

impl DealsQueryBuilder {
    pub fn new(origin: impl Into<String>) -> Self {
        DealsQueryBuilder { origin: Some(origin.into()), ..Default::default() }
    }

    pub fn destinations(mut self, csv: impl Into<String>) -> Self {
        self.destinations = Some(csv.into().split(',').map(str::to_string).collect());
        self
    }

    pub fn destination_countries(mut self, csv: impl Into<String>) -> Self {
        self.destination_countries = Some(csv.into().split(',').map(str::to_string).collect());
        self
    }

    pub fn departure_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.departure_date_from = Some(from.into());
        self.departure_date_to = Some(to.into());
        self
    }

    pub fn return_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.return_date_from = Some(from.into());
        self.return_date_to = Some(to.into());
        self
    }

    /// A single `YYYY-MM-DD` date that must equal either the departure or
    /// the return date (matching either side is enough — see `matches`).
    pub fn exact_date(mut self, date: impl Into<String>) -> Self {
        self.exact_date = Some(date.into());
        self
    }

    pub fn departure_weekdays(mut self, csv: impl Into<String>) -> Self {
        self.departure_days_of_week = Some(csv.into());
        self
    }

    pub fn return_weekdays(mut self, csv: impl Into<String>) -> Self {
        self.return_days_of_week = Some(csv.into());
        self
    }

    pub fn stay_range(mut self, from: u8, to: u8) -> Self {
        self.stay_from = Some(from);
        self.stay_to = Some(to);
        self
    }

    pub fn direct_flights(mut self, direct: bool) -> Self {
        self.direct_flights = Some(direct);
        self
    }

    pub fn roundtrip_flights(mut self, roundtrip: bool) -> Self {
        self.roundtrip_flights = Some(roundtrip);
        self
    }

    /// `price_to == 0` means "unbounded upper end" (the original's
    /// `SearchQuery::price` treats a zero `price_to` as `UINT32_MAX`); a
    /// zero `price_from` with a zero `price_to` has no filtering effect
    /// and is left unset rather than rejected.
    pub fn price_range(mut self, from: u32, to: u32) -> Self {
        self.price_from = Some(from);
        self.price_to = Some(to);
        self
    }

    pub fn max_lifetime_sec(mut self, secs: u32) -> Self {
        self.max_lifetime_sec = Some(secs);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(self) -> Result<DealsQuery> {
        let origin_iata = self.origin.ok_or_else(|| Error::bad_parameter("origin", "required"))?;
        let origin = iata_to_code(&origin_iata)?;

        let destinations = self
            .destinations
            .map(|codes| codes.iter().map(|c| iata_to_code(c)).collect::<Result<HashSet<_>>>())
            .transpose()?;

        let destination_countries = self
            .destination_countries
            .map(|codes| codes.iter().map(|c| country_to_code(c)).collect::<Result<HashSet<_>>>())
            .transpose()?;

        let departure_dates = match (self.departure_date_from, self.departure_date_to) {
            (Some(from), Some(to)) => {
                Some(Range::new(date_to_int(&from)?, date_to_int(&to)?, "departure_date")?)
            }
            (None, None) => None,
            _ => return Err(Error::bad_parameter("departure_date", "both 'from' and 'to' must be set together")),
        };

        let return_dates = match (self.return_date_from, self.return_date_to) {
            (Some(from), Some(to)) => Some(Range::new(date_to_int(&from)?, date_to_int(&to)?, "return_date")?),
            (None, None) => None,
            _ => return Err(Error::bad_parameter("return_date", "both 'from' and 'to' must be set together")),
        };

        let departure_weekdays =
            self.departure_days_of_week.map(|csv| weekdays_bitmask_from_str(&csv)).transpose()?;
        let return_weekdays = self.return_days_of_week.map(|csv| weekdays_bitmask_from_str(&csv)).transpose()?;

        let stay_days = match (self.stay_from, self.stay_to) {
            (Some(from), Some(to)) => Some(Range::new(from, to, "stay_days")?),
            (None, None) => None,
            _ => return Err(Error::bad_parameter("stay_days", "both 'from' and 'to' must be set together")),
        };

        let exact_date = self.exact_date.map(|d| date_to_int(&d)).transpose()?;

        // Mirrors the original's `SearchQuery::price`: a zero `price_to`
        // means unbounded, and a fully-zero pair has no filtering effect
        // and is left unset rather than rejected as an inverted range.
        let price = match (self.price_from, self.price_to) {
            (Some(from), Some(to)) if from == 0 && to == 0 => None,
            (Some(from), Some(to)) => Some(Range::new(from, if to == 0 { u32::MAX } else { to }, "price")?),
            (None, None) => None,
            _ => return Err(Error::bad_parameter("price", "both 'from' and 'to' must be set together")),
        };

        Ok(DealsQuery {
            origin,
            destinations,
            destination_countries,
            departure_dates,
            return_dates,
            exact_date,
            departure_weekdays,
            return_weekdays,
            stay_days,
            direct_flights: self.direct_flights,
            roundtrip_flights: self.roundtrip_flights,
            price,
            max_lifetime_sec: self.max_lifetime_sec,
            limit: self.limit.unwrap_or(DEFAULT_DEALS_LIMIT),
        })
    }
}

impl DealsQuery {
    /// Step 1 of the scan, evaluated by the caller before `matches` since
    /// it needs the table's global expiry cutoff rather than anything
    /// carried on the query itself: `deal.timestamp > cutoff`.
    pub fn passes_expiry(&self, deal: &DealInfo, cutoff: u32) -> bool {
        deal.timestamp > cutoff
    }

    /// Steps 2-13 of §4.5's per-record evaluation order, plus a trailing
    /// `price` range check (dropped from the distilled step list but
    /// present in the original as `SearchQuery::price`), short-circuiting
    /// on the first failing predicate. `now` drives `max_lifetime_sec`.
    pub fn matches(&self, deal: &DealInfo, now: u32) -> bool {
        if deal.origin != self.origin {
            return false;
        }
        if let Some(max_lifetime) = self.max_lifetime_sec {
            if deal.timestamp < now.saturating_sub(max_lifetime) {
                return false;
            }
        }
        if let Some(roundtrip) = self.roundtrip_flights {
            if deal.is_roundtrip() != roundtrip {
                return false;
            }
        }
        if let Some(destinations) = &self.destinations {
            if !destinations.contains(&deal.destination) {
                return false;
            }
        }
        if let Some(countries) = &self.destination_countries {
            if !countries.contains(&deal.destination_country) {
                return false;
            }
        }
        if let Some(range) = &self.departure_dates {
            if !range.contains(deal.departure_date) {
                return false;
            }
        }
        if let Some(range) = &self.return_dates {
            if !range.contains(deal.return_date) {
                return false;
            }
        }
        if let Some(exact) = self.exact_date {
            // Either side matching the exact date is enough (the original's
            // `filter_exact_date` check rejects only when neither does).
            if deal.departure_date != exact && deal.return_date != exact {
                return false;
            }
        }
        if let Some(range) = &self.stay_days {
            if !range.contains(deal.stay_days) {
                return false;
            }
        }
        if let Some(direct) = self.direct_flights {
            if deal.direct != direct {
                return false;
            }
        }
        if let Some(mask) = self.departure_weekdays {
            if deal.departure_day_of_week & mask == 0 {
                return false;
            }
        }
        if let Some(mask) = self.return_weekdays {
            if deal.return_day_of_week & mask == 0 {
                return false;
            }
        }
        if let Some(range) = &self.price {
            if !range.contains(deal.price) {
                return false;
            }
        }
        true
    }

    /// Whether the query's `departure_dates` range spans exactly one
    /// calendar day and a `return_dates` range is also set — the
    /// "calendar view" condition that switches the per-day aggregator's
    /// grouping key from `departure_date` to `return_date` (§4.6.B).
    pub fn is_calendar_view(&self) -> bool {
        matches!(self.departure_dates, Some(r) if r.from == r.to) && self.return_dates.is_some()
    }
}
