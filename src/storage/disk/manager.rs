use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::{Context, Result};
use hashlink::LinkedHashMap;
use parking_lot::Mutex;

use crate::storage::page::page_layout::{PageId, PAGE_SIZE};

/// Per-file page directory.
///
/// Deallocated pages are marked `false` and their ids queued for reuse, so
/// allocation stays monotonic until a free slot exists. This is an in-memory
/// structure; a production engine would persist it in a page directory.
struct Directory {
    pages: LinkedHashMap<PageId, bool>,
    free_slots: VecDeque<PageId>,
}

/// Synchronous single-file page store. Page `n` lives at byte offset
/// `n * PAGE_SIZE`. All I/O goes through `read_page`/`write_page` with
/// buffers of exactly one page.
pub struct DiskManager {
    db_io: Mutex<File>,
    directory: Mutex<Directory>,
    next_page_id: AtomicU32,

    num_writes: AtomicU32,
    num_flushes: AtomicU32,
    num_deletes: AtomicU32,
}

impl DiskManager {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_io = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path.as_ref())
            .context("failed to open database file")?;

        Ok(DiskManager {
            db_io: Mutex::new(db_io),
            directory: Mutex::new(Directory {
                pages: LinkedHashMap::new(),
                free_slots: VecDeque::new(),
            }),
            next_page_id: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            num_flushes: AtomicU32::new(0),
            num_deletes: AtomicU32::new(0),
        })
    }

    /// Hand out a fresh page id, preferring slots freed by deallocation.
    pub fn allocate_page(&self) -> PageId {
        let mut directory = self.directory.lock();
        if let Some(page_id) = directory.free_slots.pop_front() {
            directory.pages.replace(page_id, true);
            return page_id;
        }
        let page_id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        directory.pages.insert(page_id, true);
        page_id
    }

    /// Mark a page id reclaimable. The bytes on disk are left in place and
    /// overwritten when the slot is reused.
    pub fn deallocate_page(&self, page_id: PageId) {
        let mut directory = self.directory.lock();
        if directory.pages.get(&page_id).copied() == Some(true) {
            directory.pages.replace(page_id, false);
            directory.free_slots.push_back(page_id);
            self.num_deletes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn is_allocated(&self, page_id: PageId) -> bool {
        self.directory.lock().pages.get(&page_id).copied() == Some(true)
    }

    /// Number of page ids currently allocated.
    pub fn num_pages(&self) -> usize {
        let directory = self.directory.lock();
        directory.pages.iter().filter(|(_, live)| **live).count()
    }

    pub fn write_page(&self, page_id: PageId, page_data: &[u8]) -> Result<()> {
        assert_eq!(page_data.len(), PAGE_SIZE, "write buffer must be one page");
        let offset = page_id as u64 * PAGE_SIZE as u64;

        let mut db_io = self.db_io.lock();
        db_io
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek while writing page {}", page_id))?;
        db_io
            .write_all(page_data)
            .with_context(|| format!("write of page {}", page_id))?;
        db_io
            .flush()
            .with_context(|| format!("flush of page {}", page_id))?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        self.num_flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Fill `page_data` with the page's bytes. A page that was allocated but
    /// never written sits past the end of the file; short reads zero-fill.
    /// Reading a deallocated id returns whatever bytes are still in its slot
    /// (a racing reader may chase a just-retired root); an id that was never
    /// allocated is a caller bug.
    pub fn read_page(&self, page_id: PageId, page_data: &mut [u8]) -> Result<()> {
        assert_eq!(page_data.len(), PAGE_SIZE, "read buffer must be one page");
        if !self.directory.lock().pages.contains_key(&page_id) {
            anyhow::bail!("read of unallocated page {}", page_id);
        }
        let offset = page_id as u64 * PAGE_SIZE as u64;

        let mut db_io = self.db_io.lock();
        db_io
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek while reading page {}", page_id))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = db_io
                .read(&mut page_data[filled..])
                .with_context(|| format!("read of page {}", page_id))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        page_data[filled..].fill(0);
        Ok(())
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn num_flushes(&self) -> u32 {
        self.num_flushes.load(Ordering::Relaxed)
    }

    pub fn num_deletes(&self) -> u32 {
        self.num_deletes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_io_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DiskManager::new(dir.path().join("test.db")).unwrap();

        let p0 = manager.allocate_page();
        let p1 = manager.allocate_page();
        assert_eq!((p0, p1), (0, 1));

        let data = [0xabu8; PAGE_SIZE];
        manager.write_page(p1, &data).unwrap();

        let mut buffer = [0u8; PAGE_SIZE];
        manager.read_page(p1, &mut buffer).unwrap();
        assert_eq!(buffer, data, "page read mismatch");

        // Never-written pages read back as zeroes.
        manager.read_page(p0, &mut buffer).unwrap();
        assert_eq!(buffer, [0u8; PAGE_SIZE]);
    }

    #[test]
    fn deallocated_ids_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DiskManager::new(dir.path().join("test.db")).unwrap();

        let p0 = manager.allocate_page();
        let p1 = manager.allocate_page();
        manager.deallocate_page(p0);
        assert!(!manager.is_allocated(p0));

        assert_eq!(manager.allocate_page(), p0);
        assert_eq!(manager.allocate_page(), p1 + 1);
        assert_eq!(manager.num_deletes(), 1);
    }
}
