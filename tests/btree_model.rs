//! Randomized insert/delete sequences checked against an in-memory model

use std::collections::BTreeMap;

use pagetree::{BTreeError, Database, DatabaseError, DeleteOutcome, EngineConfig};
use proptest::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16),
    Delete(u16),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u16..150).prop_map(Op::Insert),
        2 => (0u16..150).prop_map(Op::Delete),
    ]
}

fn key(n: u16) -> String {
    format!("K{:04}", n)
}

fn payload(n: u16, round: usize) -> Vec<u8> {
    format!("{}-{}", n, round).into_bytes()
}

fn config(order: usize, cache_capacity: usize) -> EngineConfig {
    EngineConfig {
        order,
        key_width: 7,
        payload_size: 16,
        cache_capacity,
    }
}

/// Apply `ops` to both the database and the model, checking every outcome
fn apply(
    db: &mut Database,
    model: &mut BTreeMap<String, Vec<u8>>,
    ops: &[Op],
) -> Result<(), TestCaseError> {
    for (round, op) in ops.iter().enumerate() {
        match *op {
            Op::Insert(n) => {
                let result = db.insert(&key(n), &payload(n, round));
                if model.contains_key(&key(n)) {
                    prop_assert!(matches!(
                        result,
                        Err(DatabaseError::BTreeError(BTreeError::DuplicateKey(_)))
                    ));
                } else {
                    prop_assert!(result.is_ok(), "insert {} failed: {:?}", n, result);
                    model.insert(key(n), payload(n, round));
                }
            }
            Op::Delete(n) => {
                let outcome = db.delete(&key(n)).unwrap();
                match outcome {
                    DeleteOutcome::NotFound => prop_assert!(!model.contains_key(&key(n))),
                    DeleteOutcome::SeparatorRetained => prop_assert!(model.contains_key(&key(n))),
                    DeleteOutcome::Removed(_) => {
                        prop_assert!(model.remove(&key(n)).is_some());
                    }
                }
            }
        }

        let stats = db.validate().unwrap();
        prop_assert_eq!(stats.keys, model.len());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every operation agrees with the model and leaves a valid tree
    #[test]
    fn prop_matches_model(
        order in 3usize..=8,
        cache_capacity in 1usize..=4,
        ops in proptest::collection::vec(arb_op(), 1..250),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let mut db = Database::create(temp_dir.path(), config(order, cache_capacity)).unwrap();
        let mut model = BTreeMap::new();

        apply(&mut db, &mut model, &ops)?;

        for (k, v) in &model {
            let record = db.search(k).unwrap();
            prop_assert_eq!(record.map(|r| r.payload), Some(v.clone()));
        }

        let all = db.range_search("K0000", "K9999").unwrap();
        let found: Vec<String> = all.iter().map(|r| r.key.to_string()).collect();
        let expected: Vec<String> = model.keys().cloned().collect();
        prop_assert_eq!(found, expected);
    }

    /// The tree reopened from disk is the tree that was closed
    #[test]
    fn prop_survives_reopen(
        order in 3usize..=6,
        ops in proptest::collection::vec(arb_op(), 1..150),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let mut model = BTreeMap::new();
        {
            let mut db = Database::create(temp_dir.path(), config(order, 2)).unwrap();
            apply(&mut db, &mut model, &ops)?;
            db.close().unwrap();
        }

        let mut db = Database::open(temp_dir.path(), config(order, 2)).unwrap();
        prop_assert_eq!(db.validate().unwrap().keys, model.len());
        for (k, v) in &model {
            let record = db.search(k).unwrap();
            prop_assert_eq!(record.map(|r| r.payload), Some(v.clone()));
        }
    }

    /// Range results are exactly the model's keys inside the bounds
    #[test]
    fn prop_range_matches_model(
        keys in proptest::collection::btree_set(0u16..300, 0..120),
        low in 0u16..300,
        span in 0u16..120,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let mut db = Database::create(temp_dir.path(), config(5, 4)).unwrap();
        for &n in &keys {
            db.insert(&key(n), &payload(n, 0)).unwrap();
        }

        let high = low.saturating_add(span);
        let found: Vec<String> = db
            .range_search(&key(low), &key(high))
            .unwrap()
            .iter()
            .map(|r| r.key.to_string())
            .collect();
        let expected: Vec<String> = keys.range(low..=high).map(|&n| key(n)).collect();
        prop_assert_eq!(found, expected);
    }
}
