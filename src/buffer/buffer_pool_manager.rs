use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    buffer::lru_replacer::LruReplacer,
    storage::{
        disk::manager::DiskManager,
        page::{
            page::{FrameId, Page},
            page_layout::PageId,
        },
    },
    wal::LogManager,
};

/// Fixed-size pool of frames mediating all page access.
///
/// Every frame is in exactly one of three states: free (on the free list),
/// resident and pinned (in the page table, absent from the replacer), or
/// resident and unpinned (in the page table and the replacer). The pool
/// mutex guards every transition; page *contents* are additionally guarded
/// by each frame's own latch.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Box<[Arc<Page>]>,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let frames = (0..pool_size)
            .map(|_| Arc::new(Page::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        // Initially every frame is free.
        let free_list = (0..pool_size).collect::<VecDeque<_>>();

        BufferPoolManager {
            pool_size,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
            disk_manager,
            log_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Bring a page into the pool (if not already resident) and pin it.
    /// Fails only when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Option<Arc<Page>> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = &self.frames[frame_id];
            page.set_pin_count(page.pin_count() + 1);
            self.replacer.pin(frame_id);
            return Some(Arc::clone(page));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let page = &self.frames[frame_id];
        {
            let mut data = page.write();
            data.fill(0);
            self.disk_manager
                .read_page(page_id, &mut data[..])
                .expect("read of an unallocated page id");
        }
        page.set_page_id(page_id);
        page.set_pin_count(1);
        page.set_dirty(false);
        page.set_lsn(0);
        state.page_table.insert(page_id, frame_id);

        Some(Arc::clone(page))
    }

    /// Allocate a fresh disk page, bring it into the pool zeroed, and pin it.
    pub fn new_page(&self) -> Option<(PageId, Arc<Page>)> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = self.disk_manager.allocate_page();
        let page = &self.frames[frame_id];
        page.write().fill(0);
        page.set_page_id(page_id);
        page.set_pin_count(1);
        page.set_dirty(false);
        page.set_lsn(0);
        state.page_table.insert(page_id, frame_id);

        Some((page_id, Arc::clone(page)))
    }

    /// Drop one pin. When the count reaches zero the frame becomes a
    /// replacement candidate; if the page carries log records that are not
    /// yet durable, the log is forced first so eviction can never write a
    /// page ahead of its log.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let page = &self.frames[frame_id];

        let pins = page.pin_count();
        if pins > 0 {
            page.set_pin_count(pins - 1);
        }
        if page.pin_count() == 0 {
            if let Some(log_manager) = &self.log_manager {
                if page.lsn() > log_manager.persistent_lsn() {
                    log_manager.force_flush().expect("log flush during unpin");
                }
            }
            self.replacer.unpin(frame_id);
        }
        if is_dirty {
            page.set_dirty(true);
        }
        true
    }

    /// Write a resident page's contents to disk and clear its dirty bit.
    ///
    /// The frame is pinned while flushing and the pool mutex is dropped
    /// before taking the page's read latch: waiting on a latch while holding
    /// the pool mutex could deadlock against a latch-holder calling back in.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let page = {
            let state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return false;
            };
            let page = &self.frames[frame_id];
            page.set_pin_count(page.pin_count() + 1);
            self.replacer.pin(frame_id);
            Arc::clone(page)
        };

        {
            let data = page.read();
            self.disk_manager
                .write_page(page_id, &data[..])
                .expect("page write-back during flush");
        }
        page.set_dirty(false);
        self.unpin_page(page_id, false);
        true
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) {
        let resident: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };
        for page_id in resident {
            self.flush_page(page_id);
        }
    }

    /// Drop a page from the pool and deallocate it on disk. A resident page
    /// with outstanding pins cannot be deleted.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            self.disk_manager.deallocate_page(page_id);
            return true;
        };

        let page = &self.frames[frame_id];
        if page.pin_count() > 0 {
            return false;
        }

        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        page.reset();
        state.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        true
    }

    /// Pick a frame for reuse: the free list always wins over eviction, so
    /// empty frames are consumed before any resident page is displaced.
    /// Dirty victims are written back before the frame is handed out.
    fn acquire_frame(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Some(frame_id);
        }

        let frame_id = self.replacer.victim()?;
        let page = &self.frames[frame_id];
        let old_page_id = page.page_id();
        if page.is_dirty() {
            // pin_count is zero, so no latch can be outstanding here.
            let data = page.read();
            self.disk_manager
                .write_page(old_page_id, &data[..])
                .expect("write-back of evicted page");
            page.set_dirty(false);
        }
        state.page_table.remove(&old_page_id);
        Some(frame_id)
    }

    /// Replacer occupancy, exposed for tests asserting the free-list-first
    /// victim policy.
    pub fn replacer_size(&self) -> usize {
        self.replacer.size()
    }
}

#[cfg(test)]
impl BufferPoolManager {
    /// Sum of all pin counts. A completed operation must leave this at the
    /// value it found it at; tests use zero as the quiescent baseline.
    pub(crate) fn total_pins(&self) -> u32 {
        let _state = self.state.lock();
        self.frames.iter().map(|page| page.pin_count()).sum()
    }
}
