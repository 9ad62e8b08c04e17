//! The top-destinations counter: a small fixed-row table plus a group-
//! count query and a short-TTL result cache (§4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::codes::iata_to_code;
use crate::config::{EngineConfig, TOPDST_ELEMENTS_PER_PAGE, TOPDST_EXPIRES_SEC, TOPDST_PAGES, TOPDST_TABLE_NAME};
use crate::dates::date_to_int;
use crate::error::{Error, Result};
use crate::lock::NamedLockRegistry;
use crate::table::Table;

/// One `(locale, destination, departure_date)` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopDstInfo {
    pub locale: [u8; 2],
    pub destination: u32,
    pub departure_date: u32,
}

pub struct TopDstStore {
    table: Table<TopDstInfo>,
    cache: TtlCache<(String, Option<u32>, Option<u32>, usize), Vec<(u32, u32)>>,
}

impl TopDstStore {
    pub fn new(clock: Arc<dyn Clock>, locks: &NamedLockRegistry) -> Self {
        TopDstStore::with_config(clock, locks, &EngineConfig::default())
    }

    /// Same as [`TopDstStore::new`], but sizes the table's page count
    /// against `config.page_budget` (see [`EngineConfig::scale_pages`]).
    pub fn with_config(clock: Arc<dyn Clock>, locks: &NamedLockRegistry, config: &EngineConfig) -> Self {
        TopDstStore {
            table: Table::new(
                TOPDST_TABLE_NAME,
                config.scale_pages(TOPDST_PAGES),
                TOPDST_ELEMENTS_PER_PAGE,
                TOPDST_EXPIRES_SEC,
                clock.clone(),
                locks,
            ),
            cache: TtlCache::new(crate::config::TOPDST_CACHE_TTL),
        }
    }

    pub fn record(&self, locale: &str, destination: &str, departure_date: &str) -> Result<()> {
        let locale = locale_bytes(locale)?;
        let destination = iata_to_code(destination)?;
        let departure_date = date_to_int(departure_date)?;
        self.table.add_record(&[TopDstInfo { locale, destination, departure_date }], None)?;
        Ok(())
    }

    /// `top(locale, dep_from?, dep_to?, limit)`. Filters by locale
    /// equality and an optional inclusive departure-date range, group-
    /// counts by destination, sorts descending by count, truncates.
    /// Returns `(destination_iata_code, count)` pairs; the caller is
    /// responsible for rendering IATA codes.
    pub fn top(&self, locale: &str, dep_from: Option<u32>, dep_to: Option<u32>, limit: usize) -> Result<Vec<(u32, u32)>> {
        let key = (locale.to_ascii_lowercase(), dep_from, dep_to, limit);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let locale_bytes = locale_bytes(locale)?;
        let mut counts: HashMap<u32, u32> = HashMap::new();
        self.table.for_each(|row| {
            if row.locale != locale_bytes {
                return;
            }
            if let Some(from) = dep_from {
                if row.departure_date < from {
                    return;
                }
            }
            if let Some(to) = dep_to {
                if row.departure_date > to {
                    return;
                }
            }
            *counts.entry(row.destination).or_insert(0) += 1;
        });

        let mut result: Vec<(u32, u32)> = counts.into_iter().collect();
        result.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        result.truncate(limit);
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    pub fn truncate(&self) {
        self.table.truncate();
        self.cache.clear();
    }
}

fn locale_bytes(locale: &str) -> Result<[u8; 2]> {
    let bytes = locale.as_bytes();
    if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_alphabetic) {
        return Err(Error::bad_parameter("locale", format!("expected 2 letters, got '{locale}'")));
    }
    Ok([bytes[0].to_ascii_lowercase(), bytes[1].to_ascii_lowercase()])
}

/// A tiny TTL-keyed cache: every entry remembers the instant it expires
/// and `get` drops it lazily on the next lookup rather than running a
/// background sweep, matching the no-background-thread preference the
/// table layer already sets (§4.3's expiry sweep is likewise a side
/// effect of calls, not a timer thread).
struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    fn new(ttl: Duration) -> Self {
        TtlCache { ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((expires_at, value)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: K, value: V) {
        self.entries.lock().insert(key, (Instant::now() + self.ttl, value));
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::codes::code_to_iata;

    fn store() -> TopDstStore {
        let clock = Arc::new(MockClock::new(1_000));
        let locks = NamedLockRegistry::new();
        TopDstStore::new(clock, &locks)
    }

    #[test]
    fn top_sorts_by_count_descending() {
        let store = store();
        for _ in 0..7 {
            store.record("ru", "mad", "2016-05-01").unwrap();
        }
        for _ in 0..3 {
            store.record("ru", "par", "2016-05-01").unwrap();
        }
        for _ in 0..5 {
            store.record("ru", "ber", "2016-05-01").unwrap();
        }
        let top = store.top("ru", None, None, 3).unwrap();
        let rendered: Vec<(String, u32)> = top.into_iter().map(|(d, c)| (code_to_iata(d), c)).collect();
        assert_eq!(rendered, vec![("MAD".to_string(), 7), ("BER".to_string(), 5), ("PAR".to_string(), 3)]);
    }

    #[test]
    fn top_filters_by_locale() {
        let store = store();
        store.record("ru", "mad", "2016-05-01").unwrap();
        store.record("en", "par", "2016-05-01").unwrap();
        let top = store.top("en", None, None, 10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(code_to_iata(top[0].0), "PAR");
    }

    #[test]
    fn top_filters_by_date_range() {
        let store = store();
        store.record("ru", "mad", "2016-05-01").unwrap();
        store.record("ru", "ber", "2016-07-01").unwrap();
        let top = store.top("ru", Some(20_160_401), Some(20_160_601), 10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(code_to_iata(top[0].0), "MAD");
    }

    #[test]
    fn truncate_clears_cache_and_table() {
        let store = store();
        store.record("ru", "mad", "2016-05-01").unwrap();
        let _ = store.top("ru", None, None, 10).unwrap();
        store.truncate();
        let top = store.top("ru", None, None, 10).unwrap();
        assert!(top.is_empty());
    }
}
