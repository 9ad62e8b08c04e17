//! Named, fixed-capacity regions of homogeneous elements.
//!
//! The original design maps these over POSIX shared memory so multiple
//! processes can attach the same named region. This crate targets a
//! single process, so a [`Page<T>`] is a heap-allocated, fixed-capacity
//! buffer registered under its name in a [`PageDirectory`] — the
//! `open_or_create` / `unlink` contract is preserved exactly so a future
//! swap to a real `mmap`-backed region only touches this module.
//!
//! Element writes and the `written` counter follow the "writer bumps the
//! counter last" rule from the design: a reader that loads `written` with
//! `Acquire` ordering is guaranteed to see fully-initialized elements up
//! to that count, never a torn write, even though it never takes a lock.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};

pub struct PageHeader {
    unlinked: AtomicBool,
    /// Last time this page was observed alive by a scan; used as the
    /// floor in `max(now, page.expiration_check)` when computing the
    /// global expiry cutoff, so memory repurposed under low-memory
    /// pressure cannot make stale records reappear as "fresh".
    expiration_check: AtomicU32,
}

impl PageHeader {
    fn new(now: u32) -> Self {
        PageHeader { unlinked: AtomicBool::new(false), expiration_check: AtomicU32::new(now) }
    }

    pub fn is_unlinked(&self) -> bool {
        self.unlinked.load(Ordering::Acquire)
    }

    pub fn expiration_check(&self) -> u32 {
        self.expiration_check.load(Ordering::Relaxed)
    }

    pub fn touch(&self, now: u32) {
        self.expiration_check.fetch_max(now, Ordering::Relaxed);
    }
}

/// A fixed-capacity, append-only array of `T`, named for lookup through a
/// [`PageDirectory`].
pub struct Page<T> {
    name: String,
    capacity: usize,
    header: PageHeader,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    written: AtomicUsize,
}

// SAFETY: a slot is only ever written once (by the single producer that
// reserved it under the table lock) before its index is published via
// `written`; after that it is read-only. Concurrent readers and the next
// writer never touch the same slot at the same time.
unsafe impl<T: Send> Sync for Page<T> {}

impl<T> Page<T> {
    fn new(name: String, capacity: usize, now: u32) -> Self {
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Page { name, capacity, header: PageHeader::new(now), slots, written: AtomicUsize::new(0) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    /// Number of elements readers may observe right now.
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Acquire)
    }

    pub fn free(&self) -> usize {
        self.capacity - self.written.load(Ordering::Relaxed)
    }

    /// Appends `values` contiguously starting at the current write
    /// cursor. Callers must hold the owning table's lock so at most one
    /// writer touches a page at a time; the counter bump at the end is
    /// what makes the append visible to lock-free readers.
    pub fn write_slice(&self, values: &[T]) -> Result<Range<usize>>
    where
        T: Clone,
    {
        let start = self.written.load(Ordering::Relaxed);
        if start + values.len() > self.capacity {
            return Err(Error::RecordTooLarge { count: values.len(), capacity: self.capacity - start });
        }
        for (i, value) in values.iter().enumerate() {
            // SAFETY: slot `start + i` has not been written yet (it is
            // past the last published `written` count) and no other
            // writer can be touching it concurrently (caller holds the
            // table lock for the duration of page selection and bump).
            unsafe {
                (*self.slots[start + i].get()).write(value.clone());
            }
        }
        self.written.fetch_add(values.len(), Ordering::Release);
        Ok(start..start + values.len())
    }

    /// Reads element `idx` if it has been published. Safe to call from
    /// any thread without holding the table lock.
    pub fn get(&self, idx: usize) -> Option<&T> {
        if idx < self.written() {
            // SAFETY: idx < written(), and written() is loaded with
            // Acquire, which synchronizes-with the Release store in
            // write_slice after the element was fully initialized.
            Some(unsafe { (*self.slots[idx].get()).assume_init_ref() })
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.written()).map(move |i| self.get(i).expect("index within written() is always initialized"))
    }
}

impl<T> Drop for Page<T> {
    fn drop(&mut self) {
        let written = *self.written.get_mut();
        for slot in &mut self.slots[..written] {
            // SAFETY: the first `written` slots were initialized by
            // write_slice and never re-written.
            unsafe {
                slot.get_mut().assume_init_drop();
            }
        }
    }
}

/// Process-wide directory of named pages for one table's element type.
/// Stands in for the original design's `shm_open`/`shm_unlink` namespace.
pub struct PageDirectory<T> {
    pages: Mutex<HashMap<String, std::sync::Arc<Page<T>>>>,
}

impl<T> Default for PageDirectory<T> {
    fn default() -> Self {
        PageDirectory { pages: Mutex::new(HashMap::new()) }
    }
}

impl<T> PageDirectory<T> {
    pub fn new() -> Self {
        PageDirectory::default()
    }

    /// Creates a new page under `name`, or returns the existing one if it
    /// was already created with the same capacity. Fails with
    /// `NameCollision` if an existing page under that name has a
    /// different capacity (a configuration mismatch, never expected in
    /// practice since one table always requests the same capacity).
    pub fn open_or_create(&self, name: &str, capacity: usize, now: u32) -> Result<std::sync::Arc<Page<T>>> {
        let mut pages = self.pages.lock();
        if let Some(existing) = pages.get(name) {
            if existing.capacity() != capacity {
                return Err(Error::NameCollision(name.to_string()));
            }
            return Ok(existing.clone());
        }
        let page = std::sync::Arc::new(Page::new(name.to_string(), capacity, now));
        pages.insert(name.to_string(), page.clone());
        Ok(page)
    }

    /// Removes `name` from the directory. Handles already holding an
    /// `Arc<Page<T>>` keep it alive and readable until they drop it,
    /// matching the "existing mappings drain on unmap" invariant.
    pub fn unlink(&self, name: &str) {
        let mut pages = self.pages.lock();
        if let Some(page) = pages.remove(name) {
            page.header().unlinked.store(true, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let page: Page<u32> = Page::new("p0".into(), 4, 0);
        let range = page.write_slice(&[1, 2, 3]).unwrap();
        assert_eq!(range, 0..3);
        assert_eq!(page.written(), 3);
        assert_eq!(page.get(0), Some(&1));
        assert_eq!(page.get(2), Some(&3));
        assert_eq!(page.get(3), None);
    }

    #[test]
    fn write_past_capacity_fails() {
        let page: Page<u32> = Page::new("p0".into(), 2, 0);
        page.write_slice(&[1]).unwrap();
        let err = page.write_slice(&[2, 3]).unwrap_err();
        assert!(matches!(err, Error::RecordTooLarge { .. }));
    }

    #[test]
    fn iter_sees_only_written_elements() {
        let page: Page<u32> = Page::new("p0".into(), 4, 0);
        page.write_slice(&[10, 20]).unwrap();
        let seen: Vec<_> = page.iter().copied().collect();
        assert_eq!(seen, vec![10, 20]);
    }

    #[test]
    fn directory_open_or_create_reuses_same_name() {
        let dir: PageDirectory<u32> = PageDirectory::new();
        let a = dir.open_or_create("X", 8, 0).unwrap();
        a.write_slice(&[1]).unwrap();
        let b = dir.open_or_create("X", 8, 0).unwrap();
        assert_eq!(b.get(0), Some(&1));
    }

    #[test]
    fn directory_open_with_mismatched_capacity_collides() {
        let dir: PageDirectory<u32> = PageDirectory::new();
        dir.open_or_create("X", 8, 0).unwrap();
        let err = dir.open_or_create("X", 16, 0).unwrap_err();
        assert!(matches!(err, Error::NameCollision(_)));
    }

    #[test]
    fn unlink_keeps_existing_handle_readable() {
        let dir: PageDirectory<u32> = PageDirectory::new();
        let page = dir.open_or_create("X", 4, 0).unwrap();
        page.write_slice(&[7]).unwrap();
        dir.unlink("X");
        assert!(page.header().is_unlinked());
        assert_eq!(page.get(0), Some(&7));
        assert!(dir.is_empty());
    }

    #[test]
    fn drop_runs_destructors_for_written_elements() {
        use std::sync::Arc;
        let marker = Arc::new(());
        {
            let page: Page<Arc<()>> = Page::new("p".into(), 2, 0);
            page.write_slice(&[marker.clone()]).unwrap();
            assert_eq!(Arc::strong_count(&marker), 2);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
