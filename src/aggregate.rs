//! Scan visitors that group surviving deals and emit a ranked list.
//!
//! Each aggregator implements the same four-step protocol the design
//! calls out in §4.6 and §9 (`pre_search` / `process_deal` / `post_search`
//! / `get_result`), dispatched statically rather than through a trait
//! object since every call site knows its aggregator type at compile
//! time.

use std::collections::HashMap;

use crate::deal::DealInfo;
use crate::query::DealsQuery;

/// A scan visitor fed every record that survives [`DealsQuery::matches`].
pub trait Aggregator {
    /// Called once before the scan starts, with the query that produced
    /// it — lets an aggregator size its internal result-limit bound and
    /// reset any rolling state.
    fn pre_search(&mut self, query: &DealsQuery);
    fn process_deal(&mut self, deal: DealInfo);
    /// Called once after the scan completes, before [`Aggregator::get_result`].
    fn post_search(&mut self);
    fn get_result(self) -> Vec<DealInfo>;
}

/// §4.6.A — cheapest deal per destination.
#[derive(Debug, Default)]
pub struct PerDestination {
    groups: HashMap<u32, DealInfo>,
    group_max_price: u32,
    result_limit: Option<usize>,
    limit: usize,
}

impl PerDestination {
    pub fn new(limit: usize) -> Self {
        PerDestination { limit, ..Default::default() }
    }
}

impl Aggregator for PerDestination {
    fn pre_search(&mut self, query: &DealsQuery) {
        self.groups.clear();
        self.group_max_price = 0;
        self.result_limit = query.destinations.as_ref().map(|d| d.len());
    }

    fn process_deal(&mut self, deal: DealInfo) {
        // Early prune (§4.6.A): once every requested destination already
        // has a candidate, a deal pricier than the priciest accepted
        // candidate cannot improve any group, new or existing — skip it
        // before the group lookup, matching the original's guard at the
        // top of its scan loop rather than inside a single group's arm.
        if let Some(limit) = self.result_limit {
            if self.groups.len() >= limit && deal.price > self.group_max_price {
                return;
            }
        }

        match self.groups.get(&deal.destination) {
            None => {
                self.group_max_price = self.group_max_price.max(deal.price);
                self.groups.insert(deal.destination, deal);
            }
            Some(existing) => {
                if deal.price < existing.price {
                    self.group_max_price = self.group_max_price.max(deal.price);
                    self.groups.insert(deal.destination, deal);
                } else if deal.price == existing.price
                    && deal.departure_date == existing.departure_date
                    && deal.return_date == existing.return_date
                    && deal.direct == existing.direct
                {
                    let mut replacement = deal;
                    replacement.overridden = true;
                    self.groups.insert(replacement.destination, replacement);
                }
            }
        }
    }

    fn post_search(&mut self) {}

    fn get_result(self) -> Vec<DealInfo> {
        let mut results: Vec<DealInfo> = self.groups.into_values().collect();
        results.sort_by(|a, b| a.price.cmp(&b.price).then(a.destination.cmp(&b.destination)));
        results.truncate(self.limit);
        results
    }
}

/// §4.6.B — cheapest deal per grouping date (departure date, or return
/// date in "calendar view" — see [`DealsQuery::is_calendar_view`]).
#[derive(Debug, Default)]
pub struct PerDay {
    groups: HashMap<u32, DealInfo>,
    calendar_view: bool,
    limit: usize,
}

impl PerDay {
    pub fn new(limit: usize) -> Self {
        PerDay { limit, ..Default::default() }
    }

    fn group_key(&self, deal: &DealInfo) -> u32 {
        if self.calendar_view {
            deal.return_date
        } else {
            deal.departure_date
        }
    }
}

impl Aggregator for PerDay {
    fn pre_search(&mut self, query: &DealsQuery) {
        self.groups.clear();
        self.calendar_view = query.is_calendar_view();
        // Span validation (required range, <= 366 days) happens at
        // query construction time upstream of the aggregator in the
        // store's `search` entry point, per §4.6.B.
    }

    fn process_deal(&mut self, deal: DealInfo) {
        let key = self.group_key(&deal);
        match self.groups.get(&key) {
            None => {
                self.groups.insert(key, deal);
            }
            Some(existing) => {
                let same_group = deal.destination == existing.destination
                    && deal.departure_date == existing.departure_date
                    && deal.return_date == existing.return_date
                    && deal.direct == existing.direct;
                if deal.price < existing.price
                    || (deal.price == existing.price && deal.timestamp > existing.timestamp && !same_group)
                {
                    self.groups.insert(key, deal);
                } else if deal.price == existing.price && deal.timestamp > existing.timestamp && same_group {
                    let mut replacement = deal;
                    replacement.overridden = true;
                    self.groups.insert(key, replacement);
                }
            }
        }
    }

    fn post_search(&mut self) {}

    fn get_result(self) -> Vec<DealInfo> {
        let mut results: Vec<(u32, DealInfo)> = self.groups.into_iter().collect();
        results.sort_by_key(|(key, _)| *key);
        results.truncate(self.limit);
        results.into_iter().map(|(_, deal)| deal).collect()
    }
}

/// Widest allowed span (inclusive) for a per-day query's departure-date
/// range, per §4.6.B.
pub const MAX_PER_DAY_SPAN_DAYS: u32 = 366;

/// §4.6.C — cheapest deal per destination country.
#[derive(Debug, Default)]
pub struct PerCountry {
    groups: HashMap<u8, DealInfo>,
    group_max_price: u32,
    result_limit: Option<usize>,
    limit: usize,
}

impl PerCountry {
    pub fn new(limit: usize) -> Self {
        PerCountry { limit, ..Default::default() }
    }
}

impl Aggregator for PerCountry {
    fn pre_search(&mut self, query: &DealsQuery) {
        self.groups.clear();
        self.group_max_price = 0;
        self.result_limit = query.destination_countries.as_ref().map(|c| c.len());
    }

    fn process_deal(&mut self, deal: DealInfo) {
        // Early prune (§4.6.C), same rationale as `PerDestination`: skip
        // before the group lookup rather than inside a matched arm, so a
        // deal for a brand-new country is pruned too, not just a
        // replacement candidate for one already present.
        if let Some(limit) = self.result_limit {
            if self.groups.len() >= limit && deal.price > self.group_max_price {
                return;
            }
        }

        match self.groups.get(&deal.destination_country) {
            None => {
                self.group_max_price = self.group_max_price.max(deal.price);
                self.groups.insert(deal.destination_country, deal);
            }
            Some(existing) => {
                if deal.price < existing.price {
                    self.group_max_price = self.group_max_price.max(deal.price);
                    self.groups.insert(deal.destination_country, deal);
                } else if deal.price == existing.price
                    && deal.destination == existing.destination
                    && deal.departure_date == existing.departure_date
                    && deal.return_date == existing.return_date
                    && deal.direct == existing.direct
                {
                    let mut replacement = deal;
                    replacement.overridden = true;
                    self.groups.insert(replacement.destination_country, replacement);
                }
            }
        }
    }

    fn post_search(&mut self) {}

    fn get_result(self) -> Vec<DealInfo> {
        let mut results: Vec<DealInfo> = self.groups.into_values().collect();
        results.sort_by(|a, b| a.price.cmp(&b.price).then(a.destination_country.cmp(&b.destination_country)));
        results.truncate(self.limit);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Locator;

    fn deal(destination: &str, country: u8, departure: &str, price: u32, timestamp: u32) -> DealInfo {
        let mut d = DealInfo::new("mow", destination, crate::codes::code_to_country(country).unwrap(), departure, None, true, price, Locator {
            page_name: "x".into(),
            index: 0,
            size: 0,
        }, timestamp)
        .unwrap();
        d.destination_country = country;
        d
    }

    fn query() -> DealsQuery {
        crate::query::DealsQueryBuilder::new("mow").build().unwrap()
    }

    #[test]
    fn per_destination_keeps_cheapest_of_each_group() {
        let mut agg = PerDestination::new(10);
        agg.pre_search(&query());
        agg.process_deal(deal("ber", 50, "2016-06-01", 6_000, 1));
        agg.process_deal(deal("ber", 50, "2016-06-01", 5_000, 2));
        agg.process_deal(deal("ber", 50, "2016-06-01", 9_000, 3));
        agg.post_search();
        let result = agg.get_result();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].price, 5_000);
        assert!(!result[0].overridden);
    }

    #[test]
    fn per_destination_equal_price_replacement_sets_overridden() {
        let mut agg = PerDestination::new(10);
        agg.pre_search(&query());
        agg.process_deal(deal("ber", 50, "2016-06-01", 5_000, 1));
        agg.process_deal(deal("ber", 50, "2016-06-01", 5_000, 2));
        let result = agg.get_result();
        assert!(result[0].overridden);
    }

    #[test]
    fn per_destination_prunes_a_new_group_once_every_requested_destination_is_filled() {
        let query = crate::query::DealsQueryBuilder::new("mow").destinations("ber,mad").build().unwrap();
        let mut agg = PerDestination::new(10);
        agg.pre_search(&query);
        agg.process_deal(deal("ber", 50, "2016-06-01", 100, 1));
        agg.process_deal(deal("mad", 60, "2016-06-01", 200, 1));
        // Both requested destinations are now filled and the priciest
        // accepted candidate is 200; a deal for a third, unrequested
        // destination pricier than that must be pruned before it ever
        // reaches the group map.
        agg.process_deal(deal("par", 77, "2016-06-01", 300, 1));
        let result = agg.get_result();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|d| d.destination_iata() != "PAR"));
    }

    #[test]
    fn per_destination_sorts_ascending_and_truncates() {
        let mut agg = PerDestination::new(1);
        agg.pre_search(&query());
        agg.process_deal(deal("ber", 50, "2016-06-01", 6_000, 1));
        agg.process_deal(deal("par", 77, "2016-06-01", 4_000, 1));
        let result = agg.get_result();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].price, 4_000);
    }

    #[test]
    fn per_destination_is_idempotent() {
        let mut agg = PerDestination::new(10);
        agg.pre_search(&query());
        agg.process_deal(deal("ber", 50, "2016-06-01", 6_000, 1));
        agg.process_deal(deal("mad", 60, "2016-06-05", 4_000, 1));
        let once = agg.get_result();

        let mut agg2 = PerDestination::new(10);
        agg2.pre_search(&query());
        for d in once.clone() {
            agg2.process_deal(d);
        }
        let twice = agg2.get_result();
        assert_eq!(once, twice);
    }

    #[test]
    fn per_day_groups_by_departure_date_by_default() {
        let mut agg = PerDay::new(10);
        agg.pre_search(&query());
        agg.process_deal(deal("ber", 50, "2016-06-01", 6_000, 1));
        agg.process_deal(deal("mad", 60, "2016-06-02", 4_000, 1));
        let result = agg.get_result();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].departure_date, 20_160_601);
        assert_eq!(result[1].departure_date, 20_160_602);
    }

    #[test]
    fn per_country_groups_across_destinations_in_same_country() {
        let mut agg = PerCountry::new(10);
        agg.pre_search(&query());
        agg.process_deal(deal("ber", 50, "2016-06-01", 6_000, 1));
        agg.process_deal(deal("muc", 50, "2016-06-01", 4_000, 1));
        let result = agg.get_result();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].price, 4_000);
    }

    #[test]
    fn per_country_prunes_a_new_group_once_every_requested_country_is_filled() {
        let query = crate::query::DealsQueryBuilder::new("mow").destination_countries("de,es").build().unwrap();
        let mut agg = PerCountry::new(10);
        agg.pre_search(&query);
        agg.process_deal(deal("ber", 50, "2016-06-01", 100, 1));
        agg.process_deal(deal("mad", 66, "2016-06-01", 200, 1));
        // Both requested countries are filled at a priciest accepted
        // candidate of 200; a deal for a third, unrequested country
        // pricier than that must never reach the group map.
        agg.process_deal(deal("rom", 96, "2016-06-01", 300, 1));
        let result = agg.get_result();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|d| d.destination_country != 96));
    }
}
