//! Append-only log manager.
//!
//! Only the durability surface the buffer pool needs: records are framed
//! into an in-memory tail, `force_flush` makes everything appended so far
//! durable and advances the persistent LSN. The buffer pool consults
//! `persistent_lsn` at unpin time so no page whose latest change is still
//! volatile can become evictable. Replay is out of scope.

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

use anyhow::{Context, Result};
use bytes::BufMut;
use parking_lot::Mutex;

pub type Lsn = u64;

/// LSNs start at 1; 0 means "never logged".
pub const INVALID_LSN: Lsn = 0;

pub struct LogManager {
    file: Mutex<BufWriter<File>>,
    tail: Mutex<LogTail>,

    next_lsn: AtomicU64,
    persistent_lsn: AtomicU64,
    num_flushes: AtomicU32,
}

struct LogTail {
    buffer: Vec<u8>,
    last_appended_lsn: Lsn,
}

impl LogManager {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .context("failed to open log file")?;

        Ok(LogManager {
            file: Mutex::new(BufWriter::new(file)),
            tail: Mutex::new(LogTail {
                buffer: Vec::new(),
                last_appended_lsn: INVALID_LSN,
            }),
            next_lsn: AtomicU64::new(INVALID_LSN + 1),
            persistent_lsn: AtomicU64::new(INVALID_LSN),
            num_flushes: AtomicU32::new(0),
        })
    }

    /// Frame a record into the log tail and return its LSN.
    ///
    /// Layout per record: u32 payload length, u64 LSN, payload bytes, u32
    /// crc32 over the LSN and payload.
    pub fn append(&self, payload: &[u8]) -> Lsn {
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(payload);
        let checksum = hasher.finalize();

        let mut tail = self.tail.lock();
        tail.buffer.put_u32_le(payload.len() as u32);
        tail.buffer.put_u64_le(lsn);
        tail.buffer.put_slice(payload);
        tail.buffer.put_u32_le(checksum);
        tail.last_appended_lsn = tail.last_appended_lsn.max(lsn);

        lsn
    }

    /// Highest LSN guaranteed durable.
    pub fn persistent_lsn(&self) -> Lsn {
        self.persistent_lsn.load(Ordering::Acquire)
    }

    /// Block until every record appended so far is on disk.
    pub fn force_flush(&self) -> Result<()> {
        let mut tail = self.tail.lock();
        let durable_up_to = tail.last_appended_lsn;

        let mut file = self.file.lock();
        if !tail.buffer.is_empty() {
            file.write_all(&tail.buffer).context("log write")?;
            tail.buffer.clear();
        }
        file.flush().context("log flush")?;
        file.get_mut().sync_all().context("log sync")?;
        drop(file);
        drop(tail);

        self.persistent_lsn.fetch_max(durable_up_to, Ordering::SeqCst);
        self.num_flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush counter, used by tests to observe the write-ahead rule firing.
    pub fn num_flushes(&self) -> u32 {
        self.num_flushes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_advances_persistent_lsn() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogManager::create(dir.path().join("wal.log")).unwrap();

        assert_eq!(log.persistent_lsn(), INVALID_LSN);
        let l1 = log.append(b"first");
        let l2 = log.append(b"second");
        assert!(l2 > l1);
        assert_eq!(log.persistent_lsn(), INVALID_LSN);

        log.force_flush().unwrap();
        assert_eq!(log.persistent_lsn(), l2);
        assert_eq!(log.num_flushes(), 1);
    }
}
