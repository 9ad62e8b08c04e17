//! Ordered set of pages with a registry page: the append-only,
//! time-expiring record store every higher-level table composes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::config::{
    CHECK_EXPIRED_PAGES_INTERVAL_SEC, LOWMEM_ERROR_PERCENT, LOWMEM_WARNING_PERCENT,
    REMOVE_EXPIRED_PAGES_AT_ONCE, REMOVE_EXPIRED_PAGES_DELAY_SEC,
};
use crate::error::{Error, Result};
use crate::lock::{NamedLock, NamedLockRegistry};
use crate::page::{Page, PageDirectory};

/// `(page_name, index, size)` — the only way to reference a written
/// range; freely copyable, valid as long as the page is not unlinked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub page_name: String,
    pub index: usize,
    pub size: usize,
}

/// Public snapshot of one registry slot, matching the design's
/// `TablePageIndexElement { expire_at, page_elements_available, page_name }`.
#[derive(Debug, Clone)]
pub struct TablePageIndexElement {
    pub page_name: String,
    pub expire_at: u32,
    pub page_elements_available: usize,
}

struct RegistryEntry<T> {
    page: Arc<Page<T>>,
    expire_at: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TableStats {
    pub page_count: usize,
    pub live_elements: usize,
    pub low_memory: bool,
}

/// Free capacity as a percentage of `max_pages`, shared by `is_low_memory`
/// and the warning trace `add_record` emits ahead of the harder threshold.
fn free_percent(max_pages: usize, used: usize) -> usize {
    100 * (max_pages.saturating_sub(used)) / max_pages.max(1)
}

/// A fixed-capacity, append-only, time-expiring table of `T`.
///
/// `add_record` serializes page selection and the write under the
/// table's named lock; `for_each` is lock-free with respect to writers —
/// it snapshots the registry and then reads each page's already-published
/// elements (see [`crate::page::Page`] for the write/read ordering that
/// makes this safe).
pub struct Table<T> {
    name: String,
    max_pages: usize,
    elements_per_page: usize,
    record_expire_seconds: u32,
    clock: Arc<dyn Clock>,
    lock: Arc<NamedLock>,
    directory: PageDirectory<T>,
    registry: Mutex<Vec<RegistryEntry<T>>>,
    next_page_id: Mutex<u64>,
    last_sweep: AtomicU32,
}

impl<T> Table<T> {
    pub fn new(
        name: impl Into<String>,
        max_pages: usize,
        elements_per_page: usize,
        record_expire_seconds: u32,
        clock: Arc<dyn Clock>,
        locks: &NamedLockRegistry,
    ) -> Self {
        let name = name.into();
        let lock = locks.get_or_create(&name);
        Table {
            name,
            max_pages,
            elements_per_page,
            record_expire_seconds,
            clock,
            lock,
            directory: PageDirectory::new(),
            registry: Mutex::new(Vec::new()),
            next_page_id: Mutex::new(0),
            last_sweep: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_expire_seconds(&self) -> u32 {
        self.record_expire_seconds
    }

    pub fn elements_per_page(&self) -> usize {
        self.elements_per_page
    }

    /// The most recent time any live page was observed alive
    /// (`PageHeader::touch`'s floor), used by callers computing
    /// `max(now, global_expiration_check) - lifetime` cutoffs (§4.3) so
    /// memory repurposed under low-memory pressure cannot make stale
    /// records reappear as fresh. Unlike a page's `expire_at` (a
    /// prospective future time), `expiration_check` only ever tracks
    /// timestamps already observed, so this floor never pushes the
    /// cutoff past `now`.
    pub fn global_expiration_check(&self) -> u32 {
        self.registry.lock().iter().map(|e| e.page.header().expiration_check()).max().unwrap_or(0)
    }

    pub fn registry_snapshot(&self) -> Vec<TablePageIndexElement> {
        self.registry
            .lock()
            .iter()
            .map(|e| TablePageIndexElement {
                page_name: e.page.name().to_string(),
                expire_at: e.expire_at,
                page_elements_available: e.page.free(),
            })
            .collect()
    }

    pub fn stats(&self) -> TableStats {
        let (page_count, live_elements) = {
            let registry = self.registry.lock();
            (registry.len(), registry.iter().map(|e| e.page.written()).sum())
        };
        TableStats { page_count, live_elements, low_memory: self.is_low_memory() }
    }

    /// Appends `values` contiguously, returning a [`Locator`] for them.
    /// Acquires the table's named lock for page selection and the write;
    /// a record lifetime override may be supplied, otherwise the table's
    /// own `record_expire_seconds` is used.
    pub fn add_record(&self, values: &[T], lifetime: Option<u32>) -> Result<Locator>
    where
        T: Clone,
    {
        if values.len() > self.elements_per_page {
            return Err(Error::RecordTooLarge { count: values.len(), capacity: self.elements_per_page });
        }
        let _guard = self.lock.acquire()?;
        let now = self.clock.now_secs();
        let lifetime = lifetime.unwrap_or(self.record_expire_seconds);

        let mut registry = self.registry.lock();
        self.maybe_sweep(&mut registry, now);
        let page = self.select_or_allocate_page(&mut registry, values.len(), now, lifetime)?;
        let free = free_percent(self.max_pages, registry.len());
        if free <= LOWMEM_WARNING_PERCENT as usize && free > LOWMEM_ERROR_PERCENT as usize {
            tracing::warn!(table = %self.name, free_percent = free, "table approaching low-memory capacity");
        }
        drop(registry);

        let range = page.write_slice(values)?;
        page.header().touch(now);
        Ok(Locator { page_name: page.name().to_string(), index: range.start, size: values.len() })
    }

    /// Lock-free scan: snapshots the registry, then visits every
    /// already-published element of every non-expired page.
    pub fn for_each<F: FnMut(&T)>(&self, mut visit: F) {
        let snapshot: Vec<Arc<Page<T>>> = {
            let registry = self.registry.lock();
            registry.iter().filter(|e| !e.page.header().is_unlinked()).map(|e| e.page.clone()).collect()
        };
        for page in snapshot {
            for element in page.iter() {
                visit(element);
            }
        }
    }

    /// Looks up one element by locator, e.g. to attach a deal's blob
    /// payload once its index record has passed all filters.
    pub fn get(&self, locator: &Locator) -> Option<Arc<Page<T>>>
    where
        T: Clone,
    {
        let registry = self.registry.lock();
        registry.iter().find(|e| e.page.name() == locator.page_name).map(|e| e.page.clone())
    }

    /// Unlinks every page. Used by tests and the `/clear` admin route.
    pub fn truncate(&self) {
        let _guard = self.lock.acquire().expect("truncate should never contend long enough to time out");
        let mut registry = self.registry.lock();
        for entry in registry.drain(..) {
            self.directory.unlink(entry.page.name());
        }
    }

    fn select_or_allocate_page(
        &self,
        registry: &mut Vec<RegistryEntry<T>>,
        count: usize,
        now: u32,
        lifetime: u32,
    ) -> Result<Arc<Page<T>>> {
        if let Some(tail) = registry.last() {
            if !tail.page.header().is_unlinked() && tail.page.free() >= count {
                return Ok(tail.page.clone());
            }
        }

        if registry.len() >= self.max_pages {
            self.evict_oldest(registry, now);
        }

        let mut next_id = self.next_page_id.lock();
        let page_name = format!("{}#{}", self.name, *next_id);
        *next_id += 1;
        drop(next_id);
        debug_assert!(
            page_name.len() <= crate::config::PAGE_NAME_MAX_LEN,
            "generated page name '{page_name}' exceeds the registry's fixed page_name[{}] width",
            crate::config::PAGE_NAME_MAX_LEN
        );

        let page = self.directory.open_or_create(&page_name, self.elements_per_page, now)?;
        registry.push(RegistryEntry { page: page.clone(), expire_at: now + lifetime });
        Ok(page)
    }

    /// Evicts the registry entry with the smallest `expire_at`. A table
    /// that is completely full (which is the only time this is called)
    /// is, by definition, at 0% free capacity — always under the
    /// low-memory threshold — so eviction proceeds even if the victim
    /// page has not yet expired, tracing a warning in that case.
    fn evict_oldest(&self, registry: &mut Vec<RegistryEntry<T>>, now: u32) {
        let Some((idx, _)) = registry.iter().enumerate().min_by_key(|(_, e)| e.expire_at) else {
            return;
        };
        let victim = registry.remove(idx);
        if victim.expire_at > now {
            tracing::warn!(
                table = %self.name,
                page = %victim.page.name(),
                expire_at = victim.expire_at,
                now,
                "evicting unexpired page under low-memory pressure"
            );
        }
        self.directory.unlink(victim.page.name());
    }

    fn maybe_sweep(&self, registry: &mut Vec<RegistryEntry<T>>, now: u32) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) < CHECK_EXPIRED_PAGES_INTERVAL_SEC {
            return;
        }
        self.last_sweep.store(now, Ordering::Relaxed);

        let mut removed = 0;
        let mut i = 0;
        while i < registry.len() && removed < REMOVE_EXPIRED_PAGES_AT_ONCE {
            let expired = registry[i].expire_at.saturating_add(REMOVE_EXPIRED_PAGES_DELAY_SEC) <= now;
            if expired {
                let entry = registry.remove(i);
                self.directory.unlink(entry.page.name());
                removed += 1;
            } else {
                i += 1;
            }
        }
    }

    /// Whether this table is at or below `LOWMEM_ERROR_PERCENT` free
    /// capacity — the threshold `select_or_allocate_page`'s full-table
    /// eviction path is always past by construction (see DESIGN.md). Also
    /// surfaced through `stats()` for `/stats`.
    pub fn is_low_memory(&self) -> bool {
        let used = self.registry.lock().len();
        free_percent(self.max_pages, used) <= LOWMEM_ERROR_PERCENT as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn table(max_pages: usize, elements_per_page: usize, expire: u32) -> (Table<u32>, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new(1_000));
        let locks = NamedLockRegistry::new();
        let table = Table::new("T", max_pages, elements_per_page, expire, clock.clone(), &locks);
        (table, clock)
    }

    #[test]
    fn add_and_scan_round_trip() {
        let (table, _clock) = table(4, 4, 100);
        table.add_record(&[1, 2, 3], None).unwrap();
        let mut seen = Vec::new();
        table.for_each(|v| seen.push(*v));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn locator_identifies_the_written_range() {
        let (table, _clock) = table(4, 4, 100);
        let loc = table.add_record(&[9, 9], None).unwrap();
        assert_eq!(loc.index, 0);
        assert_eq!(loc.size, 2);
        let loc2 = table.add_record(&[7], None).unwrap();
        assert_eq!(loc2.page_name, loc.page_name);
        assert_eq!(loc2.index, 2);
    }

    #[test]
    fn record_larger_than_page_is_rejected() {
        let (table, _clock) = table(4, 2, 100);
        let err = table.add_record(&[1, 2, 3], None).unwrap_err();
        assert!(matches!(err, Error::RecordTooLarge { .. }));
    }

    #[test]
    fn new_page_allocated_once_tail_is_full() {
        let (table, _clock) = table(4, 2, 100);
        table.add_record(&[1, 2], None).unwrap();
        let loc = table.add_record(&[3], None).unwrap();
        assert_eq!(loc.index, 0);
        assert_ne!(table.stats().page_count, 0);
        assert_eq!(table.stats().page_count, 2);
    }

    #[test]
    fn full_table_evicts_oldest_page() {
        let (table, _clock) = table(1, 1, 100);
        let first = table.add_record(&[1], None).unwrap();
        let second = table.add_record(&[2], None).unwrap();
        assert_ne!(first.page_name, second.page_name);
        // Only the surviving page's element is observed.
        let mut seen = Vec::new();
        table.for_each(|v| seen.push(*v));
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn sweep_unlinks_pages_past_their_grace_period() {
        let (table, clock) = table(8, 1, 1);
        table.add_record(&[1], None).unwrap();
        clock.advance(CHECK_EXPIRED_PAGES_INTERVAL_SEC + 1);
        // A second add_record triggers the sweep; the expired (grace
        // included) page from before should be gone by then.
        clock.advance(REMOVE_EXPIRED_PAGES_DELAY_SEC);
        table.add_record(&[2], None).unwrap();
        let mut seen = Vec::new();
        table.for_each(|v| seen.push(*v));
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn truncate_removes_everything() {
        let (table, _clock) = table(4, 4, 100);
        table.add_record(&[1, 2], None).unwrap();
        table.truncate();
        assert_eq!(table.stats().page_count, 0);
        let mut seen = Vec::new();
        table.for_each(|v| seen.push(*v));
        assert!(seen.is_empty());
    }

    #[test]
    fn global_expiration_check_tracks_most_recent_touch() {
        let (table, clock) = table(4, 1, 50);
        table.add_record(&[1], None).unwrap();
        clock.advance(10);
        table.add_record(&[2], None).unwrap();
        assert_eq!(table.global_expiration_check(), 1_010);
    }

    #[test]
    fn is_low_memory_once_pages_are_scarce() {
        let (table, _clock) = table(2, 1, 100);
        assert!(!table.is_low_memory());
        table.add_record(&[1], None).unwrap();
        table.add_record(&[2], None).unwrap();
        assert!(table.is_low_memory());
        assert!(table.stats().low_memory);
    }
}
