//! `DealsStore` — the `DealInfo` index table and `DealData` blob pool,
//! composed and tied together via `(page, index, size)` locators (§4.4).

use std::sync::Arc;

use crate::aggregate::{Aggregator, MAX_PER_DAY_SPAN_DAYS, PerCountry, PerDay, PerDestination};
use crate::clock::Clock;
use crate::config::{
    DEALDATA_ELEMENTS_PER_PAGE, DEALDATA_PAGES, DEALDATA_TABLE_NAME, DEALINFO_ELEMENTS_PER_PAGE,
    DEALINFO_PAGES, DEALINFO_TABLE_NAME, DEALS_EXPIRES_SEC, EngineConfig,
};
use crate::deal::{DealInfo, DealWithBlob};
use crate::error::{Error, Result};
use crate::lock::NamedLockRegistry;
use crate::query::DealsQuery;
use crate::table::Table;

#[derive(Debug, Clone, Copy, Default)]
pub struct DealsStoreStats {
    pub info_pages: usize,
    pub info_records: usize,
    pub data_pages: usize,
    pub data_records: usize,
    pub info_low_memory: bool,
    pub data_low_memory: bool,
}

pub struct DealsStore {
    info: Table<DealInfo>,
    data: Table<u8>,
    clock: Arc<dyn Clock>,
}

impl DealsStore {
    pub fn new(clock: Arc<dyn Clock>, locks: &NamedLockRegistry) -> Self {
        DealsStore::with_config(clock, locks, &EngineConfig::default())
    }

    /// Same as [`DealsStore::new`], but sizes both tables' page counts
    /// against `config.page_budget` (see [`EngineConfig::scale_pages`])
    /// instead of the documented defaults, so a `DEALSENGINE_PAGE_BUDGET`
    /// override actually changes capacity.
    pub fn with_config(clock: Arc<dyn Clock>, locks: &NamedLockRegistry, config: &EngineConfig) -> Self {
        DealsStore {
            info: Table::new(
                DEALINFO_TABLE_NAME,
                config.scale_pages(DEALINFO_PAGES),
                DEALINFO_ELEMENTS_PER_PAGE,
                DEALS_EXPIRES_SEC,
                clock.clone(),
                locks,
            ),
            data: Table::new(
                DEALDATA_TABLE_NAME,
                config.scale_pages(DEALDATA_PAGES),
                DEALDATA_ELEMENTS_PER_PAGE,
                DEALS_EXPIRES_SEC,
                clock.clone(),
                locks,
            ),
            clock,
        }
    }

    /// Appends `blob` to the data pool, then appends a `DealInfo` index
    /// record pointing at it. If the index append fails after the blob
    /// succeeded, the orphaned blob is left in place — it expires on its
    /// own like any other record (§4.4).
    #[allow(clippy::too_many_arguments)]
    pub fn add_deal(
        &self,
        origin: &str,
        destination: &str,
        destination_country: &str,
        departure_date: &str,
        return_date: Option<&str>,
        direct: bool,
        price: u32,
        blob: &[u8],
    ) -> Result<()> {
        let now = self.clock.now_secs();
        let locator = self.data.add_record(blob, None)?;
        let deal = DealInfo::new(
            origin,
            destination,
            destination_country,
            departure_date,
            return_date,
            direct,
            price,
            locator,
            now,
        )?;
        self.info.add_record(&[deal], None)?;
        Ok(())
    }

    /// §4.3's `global_expire_cutoff = max(now, page.expiration_check) -
    /// table.record_expire_seconds`, floored by the most recent time any
    /// live page was observed alive rather than a page's prospective
    /// (future) `expire_at` — using `expire_at` here would push the
    /// cutoff past every live record's own `timestamp` and make `scan`
    /// see nothing.
    fn expiry_cutoff(&self) -> u32 {
        let now = self.clock.now_secs();
        now.max(self.info.global_expiration_check()).saturating_sub(DEALS_EXPIRES_SEC)
    }

    /// Scans the index, applies `query`, and feeds survivors to a fresh
    /// `PerDestination` aggregator, then fetches each result's blob.
    pub fn search_per_destination(&self, query: &DealsQuery) -> Result<Vec<DealWithBlob>> {
        let agg = PerDestination::new(query.limit);
        self.scan(query, agg)
    }

    /// Same as above but with `PerCountry`.
    pub fn search_per_country(&self, query: &DealsQuery) -> Result<Vec<DealWithBlob>> {
        let agg = PerCountry::new(query.limit);
        self.scan(query, agg)
    }

    /// Same as above but with `PerDay`. Requires `departure_dates` to be
    /// set and its span to be at most 366 days (§4.6.B).
    pub fn search_per_day(&self, query: &DealsQuery) -> Result<Vec<DealWithBlob>> {
        let range = query
            .departure_dates
            .ok_or_else(|| Error::bad_parameter("departure_date", "required for day-by-day search"))?;
        let span_days = days_between(range.from, range.to)?;
        if span_days > MAX_PER_DAY_SPAN_DAYS {
            return Err(Error::bad_parameter("departure_date", "range spans more than 366 days"));
        }
        let agg = PerDay::new(query.limit);
        self.scan(query, agg)
    }

    /// Runs the scan/filter/aggregate pipeline common to all three search
    /// entry points, then resolves each surviving `DealInfo`'s locator
    /// against the blob pool.
    fn scan<A: Aggregator>(&self, query: &DealsQuery, mut agg: A) -> Result<Vec<DealWithBlob>> {
        let now = self.clock.now_secs();
        let cutoff = self.expiry_cutoff();
        agg.pre_search(query);
        self.info.for_each(|deal| {
            if !query.passes_expiry(deal, cutoff) {
                return;
            }
            if !query.matches(deal, now) {
                return;
            }
            agg.process_deal(deal.clone());
        });
        agg.post_search();

        agg.get_result().into_iter().map(|info| self.fetch_blob(info)).collect()
    }

    fn fetch_blob(&self, info: DealInfo) -> Result<DealWithBlob> {
        let locator = info.blob.clone();
        let page = self
            .data
            .get(&locator)
            .ok_or_else(|| Error::NotFound(format!("blob page '{}' gone", locator.page_name)))?;
        let data: Vec<u8> = (locator.index..locator.index + locator.size)
            .map(|i| page.get(i).copied().unwrap_or(0))
            .collect();
        Ok(DealWithBlob { info, data })
    }

    pub fn stats(&self) -> DealsStoreStats {
        let info = self.info.stats();
        let data = self.data.stats();
        DealsStoreStats {
            info_pages: info.page_count,
            info_records: info.live_elements,
            data_pages: data.page_count,
            data_records: data.live_elements,
            info_low_memory: info.low_memory,
            data_low_memory: data.low_memory,
        }
    }

    pub fn truncate(&self) {
        self.info.truncate();
        self.data.truncate();
    }
}

fn days_between(from: u32, to: u32) -> Result<u32> {
    // Both YYYYMMDD values are already range-validated at query
    // construction (`from <= to`); a full Gregorian day count isn't
    // needed here, just a safe upper bound on the span the per-day
    // aggregator will try to group over. Re-uses the same Julian-day
    // trick as `crate::deal::stay_days_between`.
    fn julian_day(date: u32) -> i64 {
        let year = (date / 10_000) as i64;
        let month = ((date / 100) % 100) as i64;
        let day = (date % 100) as i64;
        let a = (14 - month) / 12;
        let y = year + 4800 - a;
        let m = month + 12 * a - 3;
        day + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32045
    }
    let span = julian_day(to) - julian_day(from);
    if span < 0 {
        return Err(Error::bad_parameter("departure_date", "range 'from' must not exceed 'to'"));
    }
    Ok(span as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::query::DealsQueryBuilder;

    fn store() -> (DealsStore, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new(1_000));
        let locks = NamedLockRegistry::new();
        (DealsStore::new(clock.clone(), &locks), clock)
    }

    #[test]
    fn add_then_search_round_trips_the_blob() {
        let (store, _clock) = store();
        store
            .add_deal("mow", "mad", "ru", "2016-05-01", Some("2016-05-21"), true, 5_000, b"7,7,7")
            .unwrap();
        let query = DealsQueryBuilder::new("mow").destinations("mad").build().unwrap();
        let results = store.search_per_destination(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].info.price, 5_000);
        assert_eq!(results[0].data, b"7,7,7");
    }

    #[test]
    fn rejects_destination_equal_to_origin() {
        let (store, _clock) = store();
        let err = store
            .add_deal("mow", "mow", "ru", "2016-05-01", None, true, 5_000, b"x")
            .unwrap_err();
        assert!(matches!(err, Error::BadParameter(_)));
    }

    #[test]
    fn per_day_requires_departure_range() {
        let (store, _clock) = store();
        let query = DealsQueryBuilder::new("mow").build().unwrap();
        let err = store.search_per_day(&query).unwrap_err();
        assert!(matches!(err, Error::BadParameter(_)));
    }

    #[test]
    fn truncate_empties_both_tables() {
        let (store, _clock) = store();
        store.add_deal("mow", "mad", "ru", "2016-05-01", None, true, 1, b"x").unwrap();
        store.truncate();
        let stats = store.stats();
        assert_eq!(stats.info_records, 0);
        assert_eq!(stats.data_records, 0);
    }

    #[test]
    fn expired_deals_do_not_survive_a_scan() {
        let (store, clock) = store();
        store.add_deal("mow", "mad", "ru", "2016-05-01", None, true, 1, b"x").unwrap();
        clock.advance(DEALS_EXPIRES_SEC + 1);
        let query = DealsQueryBuilder::new("mow").build().unwrap();
        let results = store.search_per_destination(&query).unwrap();
        assert!(results.is_empty());
    }
}
