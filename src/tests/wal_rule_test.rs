#[cfg(test)]
pub mod test {
    use crate::engine::StorageEngine;

    /// A page whose latest change is not yet durable must force the log down
    /// before its frame becomes a replacement candidate.
    #[test]
    fn unpin_forces_log_ahead_of_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::open_with_log(
            dir.path().join("test.db"),
            dir.path().join("test.log"),
            5,
        )
        .unwrap();
        let bpm = &engine.bpm;
        let log_manager = engine.log_manager.as_ref().unwrap();

        let lsn = log_manager.append(b"page image update");
        assert!(lsn > log_manager.persistent_lsn());

        let (page_id, page) = bpm.new_page().unwrap();
        page.write().fill(0x7f);
        page.set_lsn(lsn);

        let flushes_before = log_manager.num_flushes();
        let candidates_before = bpm.replacer_size();

        bpm.unpin_page(page_id, true);

        assert_eq!(
            log_manager.num_flushes(),
            flushes_before + 1,
            "log was not forced when the frame became evictable"
        );
        assert!(log_manager.persistent_lsn() >= lsn);
        assert_eq!(bpm.replacer_size(), candidates_before + 1);

        // A second pin/unpin cycle finds the log already durable: no flush.
        bpm.fetch_page(page_id).unwrap();
        bpm.unpin_page(page_id, false);
        assert_eq!(log_manager.num_flushes(), flushes_before + 1);
    }
}
