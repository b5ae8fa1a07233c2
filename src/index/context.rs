use std::{collections::HashSet, sync::Arc};

use crate::storage::page::{
    page::{Page, PageReadGuard, PageWriteGuard},
    page_layout::{PageBuf, PageId},
};

/// Latch held on a page, in the mode the descent acquired it.
pub enum PageLatch {
    Read(PageReadGuard),
    Write(PageWriteGuard),
}

/// A pinned page together with its held latch. Dropping the latch and
/// unpinning are separate steps; the tree's release path drops the guard
/// first, then returns the pin to the buffer pool.
pub struct HeldPage {
    page: Arc<Page>,
    latch: PageLatch,
}

impl HeldPage {
    pub fn read(page: Arc<Page>) -> Self {
        let latch = PageLatch::Read(page.read());
        HeldPage { page, latch }
    }

    pub fn write(page: Arc<Page>) -> Self {
        let latch = PageLatch::Write(page.write());
        HeldPage { page, latch }
    }

    pub fn page_id(&self) -> PageId {
        self.page.page_id()
    }

    pub fn data(&self) -> &PageBuf {
        match &self.latch {
            PageLatch::Read(guard) => guard,
            PageLatch::Write(guard) => guard,
        }
    }

    pub fn data_mut(&mut self) -> &mut PageBuf {
        match &mut self.latch {
            PageLatch::Read(_) => panic!("write through a read latch"),
            PageLatch::Write(guard) => guard,
        }
    }
}

/// Per-operation state for one descent: the root-to-leaf pages still
/// latched (plus any write-latched sibling picked up during a merge), the
/// pages scheduled for deletion once all latches are down, and whether this
/// operation holds the tree-wide root lock.
///
/// The original tracked the root lock in a thread-local flag; carrying it
/// here ties its lifetime to the operation instead of the thread.
pub struct Context {
    pub(crate) held: Vec<HeldPage>,
    pub(crate) deleted: HashSet<PageId>,
    pub(crate) root_locked: bool,
    /// High-water mark of simultaneously held latches, for tests asserting
    /// the crabbing bound.
    pub(crate) max_held: usize,
}

impl Context {
    pub fn new() -> Self {
        Context {
            held: Vec::new(),
            deleted: HashSet::new(),
            root_locked: false,
            max_held: 0,
        }
    }

    pub fn push(&mut self, held: HeldPage) {
        self.held.push(held);
        self.max_held = self.max_held.max(self.held.len());
    }

    pub fn last(&self) -> &HeldPage {
        self.held.last().expect("descent holds no page")
    }

    pub fn find(&self, page_id: PageId) -> Option<&HeldPage> {
        self.held.iter().find(|held| held.page_id() == page_id)
    }

    pub fn find_mut(&mut self, page_id: PageId) -> Option<&mut HeldPage> {
        self.held.iter_mut().find(|held| held.page_id() == page_id)
    }

    pub fn mark_deleted(&mut self, page_id: PageId) {
        self.deleted.insert(page_id);
    }

    pub fn max_held(&self) -> usize {
        self.max_held
    }

    /// Pop the most recently held page, dropping its latch but keeping its
    /// pin. Iterators use this to take over the leaf the descent ends on.
    pub(crate) fn pop_keeping_pin(&mut self) -> Arc<Page> {
        let held = self.held.pop().expect("descent holds no page");
        held.page
    }

    /// Drain every held page except the most recent, handing each to the
    /// caller for unlatching and unpinning in order.
    pub(crate) fn drain_ancestors(&mut self) -> Vec<HeldPage> {
        if self.held.len() <= 1 {
            return Vec::new();
        }
        let last = self.held.len() - 1;
        self.held.drain(..last).collect()
    }

    pub(crate) fn drain_all(&mut self) -> Vec<HeldPage> {
        self.held.drain(..).collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
