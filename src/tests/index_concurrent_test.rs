#[cfg(test)]
pub mod test {
    use std::{sync::Arc, thread};

    use tempfile::TempDir;

    use crate::{
        engine::StorageEngine,
        index::{
            btree::{BPlusTree, Operation},
            context::Context,
            node_type::{Key, RecordId, U64Comparator},
        },
    };

    fn setup(pool_size: usize) -> (TempDir, StorageEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::open(dir.path().join("test.db"), pool_size).unwrap();
        (dir, engine)
    }

    fn shared_tree(
        engine: &StorageEngine,
        leaf_max: u32,
        internal_max: u32,
    ) -> Arc<BPlusTree<U64Comparator>> {
        Arc::new(BPlusTree::new(
            "test_index",
            Arc::clone(&engine.bpm),
            U64Comparator,
            leaf_max,
            internal_max,
        ))
    }

    #[test]
    fn readers_race_one_writer() {
        let (_dir, engine) = setup(128);
        let index = shared_tree(&engine, 8, 8);

        for key in 1..=1000u64 {
            index
                .insert(&Key::from_u64(key), RecordId::new(0, key as u32))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let index = Arc::clone(&index);
            handles.push(thread::spawn(move || {
                for round in 0..3 {
                    for key in 1..=1000u64 {
                        let value = index.get_value(&Key::from_u64(key)).unwrap();
                        assert_eq!(
                            value,
                            Some(RecordId::new(0, key as u32)),
                            "round {}: pre-loaded key {} disappeared",
                            round,
                            key
                        );
                    }
                }
            }));
        }

        {
            let index = Arc::clone(&index);
            handles.push(thread::spawn(move || {
                for key in 1001..=2000u64 {
                    let inserted = index
                        .insert(&Key::from_u64(key), RecordId::new(0, key as u32))
                        .unwrap();
                    assert!(inserted);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        index.verify_integrity();
        let keys: Vec<u64> = index.iter().unwrap().map(|(k, _)| k.as_u64()).collect();
        assert_eq!(keys, (1..=2000).collect::<Vec<_>>());
        assert_eq!(engine.bpm.total_pins(), 0, "an operation leaked a pin");
    }

    #[test]
    fn concurrent_writers_over_disjoint_ranges() {
        let (_dir, engine) = setup(128);
        let index = shared_tree(&engine, 4, 4);

        let mut handles = Vec::new();
        for worker in 0..4u64 {
            let index = Arc::clone(&index);
            handles.push(thread::spawn(move || {
                for i in 0..250u64 {
                    let key = worker * 250 + i + 1;
                    let inserted = index
                        .insert(&Key::from_u64(key), RecordId::new(0, key as u32))
                        .unwrap();
                    assert!(inserted, "worker {} lost key {}", worker, key);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        index.verify_integrity();
        let keys: Vec<u64> = index.iter().unwrap().map(|(k, _)| k.as_u64()).collect();
        assert_eq!(keys, (1..=1000).collect::<Vec<_>>());
    }

    /// A read descent latches at most a parent/child pair at any instant.
    #[test]
    fn read_descent_holds_at_most_two_latches() {
        let (_dir, engine) = setup(64);
        let index = shared_tree(&engine, 3, 3);

        for key in 1..=50u64 {
            index
                .insert(&Key::from_u64(key), RecordId::new(0, key as u32))
                .unwrap();
        }

        for key in [1u64, 17, 33, 50] {
            let mut ctx = Context::new();
            let leaf = index
                .find_leaf(Some(&Key::from_u64(key)), false, Operation::Read, &mut ctx)
                .unwrap();
            assert!(leaf.is_some());
            assert!(
                ctx.max_held() <= 2,
                "read descent held {} latches at once",
                ctx.max_held()
            );
            index.unlock_unpin(Operation::Read, &mut ctx);
        }
    }
}
