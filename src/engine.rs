//! Top-level wiring for the storage engine core.
//!
//! Owns the process-wide collaborators (disk manager, optional log manager,
//! buffer pool) and guarantees the header page exists before any index
//! touches it.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use crate::{
    buffer::buffer_pool_manager::BufferPoolManager,
    storage::{disk::manager::DiskManager, page::header_page},
    storage::page::page_layout::HEADER_PAGE_ID,
    wal::LogManager,
};

pub struct StorageEngine {
    pub disk_manager: Arc<DiskManager>,
    pub log_manager: Option<Arc<LogManager>>,
    pub bpm: Arc<BufferPoolManager>,
}

impl StorageEngine {
    pub fn open(db_path: impl AsRef<Path>, pool_size: usize) -> Result<Self> {
        Self::build(db_path, None, pool_size)
    }

    pub fn open_with_log(
        db_path: impl AsRef<Path>,
        log_path: impl AsRef<Path>,
        pool_size: usize,
    ) -> Result<Self> {
        let log_manager = Arc::new(LogManager::create(log_path)?);
        Self::build(db_path, Some(log_manager), pool_size)
    }

    fn build(
        db_path: impl AsRef<Path>,
        log_manager: Option<Arc<LogManager>>,
        pool_size: usize,
    ) -> Result<Self> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        let fresh = disk_manager.num_pages() == 0;
        let bpm = Arc::new(BufferPoolManager::new(
            pool_size,
            Arc::clone(&disk_manager),
            log_manager.clone(),
        ));

        if fresh {
            let (page_id, page) = bpm
                .new_page()
                .context("buffer pool exhausted while bootstrapping")?;
            assert_eq!(page_id, HEADER_PAGE_ID, "header page must be page 0");
            {
                let mut data = page.write();
                header_page::init(&mut data);
            }
            bpm.unpin_page(HEADER_PAGE_ID, true);
            bpm.flush_page(HEADER_PAGE_ID);
        }

        Ok(StorageEngine {
            disk_manager,
            log_manager,
            bpm,
        })
    }
}
