#[cfg(test)]
pub mod test {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::{
        engine::StorageEngine,
        index::{
            btree::BPlusTree,
            node_type::{Key, RecordId, U64Comparator},
        },
        storage::page::page_layout::INVALID_PAGE_ID,
    };

    fn setup(pool_size: usize) -> (TempDir, StorageEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::open(dir.path().join("test.db"), pool_size).unwrap();
        (dir, engine)
    }

    fn tree(
        engine: &StorageEngine,
        leaf_max: u32,
        internal_max: u32,
    ) -> BPlusTree<U64Comparator> {
        BPlusTree::new(
            "test_index",
            Arc::clone(&engine.bpm),
            U64Comparator,
            leaf_max,
            internal_max,
        )
    }

    fn insert_key(index: &BPlusTree<U64Comparator>, key: u64) {
        let inserted = index
            .insert(&Key::from_u64(key), RecordId::new(0, key as u32))
            .unwrap();
        assert!(inserted, "key {} rejected as duplicate", key);
    }

    fn assert_found(index: &BPlusTree<U64Comparator>, key: u64) {
        assert_eq!(
            index.get_value(&Key::from_u64(key)).unwrap(),
            Some(RecordId::new(0, key as u32)),
            "key {} not found",
            key
        );
    }

    fn scan_keys(index: &BPlusTree<U64Comparator>) -> Vec<u64> {
        index.iter().unwrap().map(|(k, _)| k.as_u64()).collect()
    }

    #[test]
    fn insert_then_get_round_trip() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 4, 4);

        insert_key(&index, 42);
        insert_key(&index, 3);
        insert_key(&index, 8);

        assert_found(&index, 42);
        assert_found(&index, 3);
        assert_found(&index, 8);
        assert_eq!(index.get_value(&Key::from_u64(5)).unwrap(), None);
    }

    #[test]
    fn duplicate_insert_is_rejected_and_harmless() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 4, 4);

        insert_key(&index, 7);
        let again = index
            .insert(&Key::from_u64(7), RecordId::new(9, 9))
            .unwrap();
        assert!(!again);

        // the stored value is untouched
        assert_found(&index, 7);
    }

    #[test]
    fn remove_then_get_is_empty() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 4, 4);

        for key in [5, 1, 9] {
            insert_key(&index, key);
        }
        index.remove(&Key::from_u64(5)).unwrap();
        assert_eq!(index.get_value(&Key::from_u64(5)).unwrap(), None);
        assert_found(&index, 1);
        assert_found(&index, 9);

        // removing a missing key changes nothing
        index.remove(&Key::from_u64(100)).unwrap();
        assert_eq!(scan_keys(&index), vec![1, 9]);
    }

    #[test]
    fn leaf_split_at_fanout_three() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 3, 3);

        for key in 1..=4 {
            insert_key(&index, key);
        }

        assert_eq!(index.leaf_occupancy(), vec![2, 2], "expected leaves [1,2] and [3,4]");
        assert_eq!(scan_keys(&index), vec![1, 2, 3, 4]);
        index.verify_integrity();
    }

    #[test]
    fn internal_split_at_fanout_three() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 3, 3);

        // the eighth insert splits a full internal root; the middle
        // separator moves up into a fresh root
        for key in 1..=8 {
            insert_key(&index, key);
            index.verify_integrity();
        }

        assert_eq!(scan_keys(&index), (1..=8).collect::<Vec<_>>());
        for key in 1..=8 {
            assert_found(&index, key);
        }
    }

    #[test]
    fn grows_then_shrinks_to_empty() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 4, 4);

        for key in 1..=10 {
            insert_key(&index, key);
            index.verify_integrity();
        }
        assert_eq!(index.leaf_occupancy(), vec![2, 2, 2, 4]);
        assert_eq!(scan_keys(&index), (1..=10).collect::<Vec<_>>());

        for key in 1..=10 {
            index.remove(&Key::from_u64(key)).unwrap();
            index.verify_integrity();
            assert_eq!(index.get_value(&Key::from_u64(key)).unwrap(), None);
        }
        assert!(index.is_empty());
        assert_eq!(index.root_page_id(), INVALID_PAGE_ID);
        assert_eq!(scan_keys(&index), Vec::<u64>::new());
        assert_eq!(engine.bpm.total_pins(), 0, "an operation leaked a pin");

        // an emptied tree accepts a fresh seed
        insert_key(&index, 77);
        assert_found(&index, 77);
    }

    #[test]
    fn deletion_borrows_from_a_rich_left_sibling() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 4, 4);

        for key in 1..=8 {
            insert_key(&index, key);
        }
        // leaves: [1,2] [3,4] [5,6,7,8]
        index.remove(&Key::from_u64(4)).unwrap(); // merges [3] leftward
        insert_key(&index, 4);
        // leaves now: [1,2,3,4] [5,6,7,8]
        index.remove(&Key::from_u64(6)).unwrap();
        index.remove(&Key::from_u64(5)).unwrap();
        index.remove(&Key::from_u64(8)).unwrap();
        // right leaf is down to [7]; the left sibling has four entries, so
        // one is borrowed instead of merging
        index.verify_integrity();
        assert_eq!(index.leaf_occupancy(), vec![3, 2]);
        assert_eq!(scan_keys(&index), vec![1, 2, 3, 4, 7]);
    }

    #[test]
    fn deletion_borrows_from_a_rich_right_sibling() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 4, 4);

        for key in 1..=10 {
            insert_key(&index, key);
        }
        // leaves: [1,2] [3,4] [5,6] [7,8,9,10]
        for key in [1, 2, 3, 4, 5] {
            index.remove(&Key::from_u64(key)).unwrap();
        }
        index.verify_integrity();
        // removing 5 leaves a lone [6], whose only neighbor [7,8,9,10] is
        // too full to merge with: key 7 is borrowed across instead
        assert_eq!(index.leaf_occupancy(), vec![2, 3]);
        assert_eq!(scan_keys(&index), vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn iterator_seeks_to_a_key() {
        let (_dir, engine) = setup(50);
        let index = tree(&engine, 3, 3);

        for key in (1..=20).map(|k| k * 2) {
            insert_key(&index, key);
        }

        let from_14: Vec<u64> = index
            .iter_from(&Key::from_u64(14))
            .unwrap()
            .map(|(k, _)| k.as_u64())
            .collect();
        assert_eq!(from_14, (7..=20).map(|k| k * 2).collect::<Vec<_>>());

        // seeking between keys lands on the next larger one
        let from_15: Vec<u64> = index
            .iter_from(&Key::from_u64(15))
            .unwrap()
            .map(|(k, _)| k.as_u64())
            .collect();
        assert_eq!(from_15, (8..=20).map(|k| k * 2).collect::<Vec<_>>());

        // seeking past the end yields nothing
        assert_eq!(index.iter_from(&Key::from_u64(999)).unwrap().count(), 0);
    }

    #[test]
    fn deep_tree_mixed_workload_stays_consistent() {
        let (_dir, engine) = setup(80);
        let index = tree(&engine, 3, 3);

        // deterministic shuffle of 0..300
        let mut keys: Vec<u64> = (0..300).collect();
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        for i in (1..keys.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            keys.swap(i, (state % (i as u64 + 1)) as usize);
        }

        for (i, key) in keys.iter().enumerate() {
            insert_key(&index, *key);
            if i % 25 == 0 {
                index.verify_integrity();
            }
        }
        assert_eq!(scan_keys(&index), (0..300).collect::<Vec<_>>());

        // delete every other key in shuffled order
        for (i, key) in keys.iter().enumerate() {
            if key % 2 == 0 {
                index.remove(&Key::from_u64(*key)).unwrap();
            }
            if i % 25 == 0 {
                index.verify_integrity();
            }
        }
        index.verify_integrity();
        let expected: Vec<u64> = (0..300).filter(|k| k % 2 == 1).collect();
        assert_eq!(scan_keys(&index), expected);

        for key in &expected {
            assert_found(&index, *key);
        }

        // and drain the rest
        for key in expected {
            index.remove(&Key::from_u64(key)).unwrap();
        }
        index.verify_integrity();
        assert!(index.is_empty());
        assert_eq!(engine.bpm.total_pins(), 0, "an operation leaked a pin");
    }

    #[test]
    fn root_page_id_is_recovered_from_the_header() {
        let (_dir, engine) = setup(50);
        {
            let index = tree(&engine, 4, 4);
            for key in 1..=20 {
                insert_key(&index, key);
            }
        }

        // a second handle on the same name adopts the persisted root
        let reopened = tree(&engine, 4, 4);
        assert!(!reopened.is_empty());
        for key in 1..=20 {
            assert_found(&reopened, key);
        }
        assert_eq!(scan_keys(&reopened), (1..=20).collect::<Vec<_>>());
    }
}
