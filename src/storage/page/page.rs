use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use parking_lot::{
    lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard},
    RawRwLock, RwLock,
};

use crate::storage::page::page_layout::{PageBuf, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::wal::Lsn;

pub type FrameId = usize;

/// Owned latch guards over a page's contents. A descent stores the guards of
/// retained ancestors in its operation context and releases them out of
/// scope order.
pub type PageReadGuard = ArcRwLockReadGuard<RawRwLock, PageBuf>;
pub type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, PageBuf>;

/// One buffer-pool frame: a page-sized byte buffer behind a reader-writer
/// latch, plus the metadata the pool needs to manage residency.
///
/// `page_id`, `pin_count` and `is_dirty` only change under the pool mutex;
/// they are atomics so latch-holders can read them without taking that mutex.
pub struct Page {
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    lsn: AtomicU64,
    data: Arc<RwLock<PageBuf>>,
}

impl Page {
    pub(crate) fn new() -> Self {
        Page {
            page_id: AtomicU32::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            lsn: AtomicU64::new(0),
            data: Arc::new(RwLock::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.load(Ordering::Acquire)
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn lsn(&self) -> Lsn {
        self.lsn.load(Ordering::Acquire)
    }

    /// Stamp the log record that last touched this page. Consulted by the
    /// buffer pool at unpin time to enforce the write-ahead rule.
    pub fn set_lsn(&self, lsn: Lsn) {
        self.lsn.store(lsn, Ordering::Release);
    }

    /// Acquire the page's read latch as an owned guard.
    pub fn read(&self) -> PageReadGuard {
        self.data.read_arc()
    }

    /// Acquire the page's write latch as an owned guard.
    pub fn write(&self) -> PageWriteGuard {
        self.data.write_arc()
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Release);
    }

    pub(crate) fn set_pin_count(&self, pins: u32) {
        self.pin_count.store(pins, Ordering::Release);
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Zero the buffer and clear all metadata. Callers must guarantee no
    /// latch is outstanding (pin count zero, frame off the page table).
    pub(crate) fn reset(&self) {
        self.data.write().fill(0);
        self.page_id.store(INVALID_PAGE_ID, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.lsn.store(0, Ordering::Release);
    }
}
