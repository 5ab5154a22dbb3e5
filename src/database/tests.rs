use super::*;
use tempfile::TempDir;

fn setup_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::create(temp_dir.path(), EngineConfig::default()).unwrap();
    (temp_dir, db)
}

fn key(n: usize) -> String {
    format!("AAA{:04}", n)
}

fn payload(n: usize) -> Vec<u8> {
    format!("student {}", n).into_bytes()
}

fn keys(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.key.to_string()).collect()
}

#[test]
fn test_create_and_open() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut db = Database::create(temp_dir.path(), EngineConfig::default()).unwrap();
        db.insert("AAA0001", b"first").unwrap();
        db.close().unwrap();
    }

    for name in ["btree-5.idx", "btree-5.hlp", "records.dat", "records.hlp"] {
        assert!(temp_dir.path().join(name).exists(), "{} missing", name);
    }

    // Creating again over the same directory fails
    let result = Database::create(temp_dir.path(), EngineConfig::default());
    assert!(matches!(result, Err(DatabaseError::DatabaseExists(_))));

    let mut db = Database::open(temp_dir.path(), EngineConfig::default()).unwrap();
    let record = db.search("AAA0001").unwrap().unwrap();
    assert_eq!(record.payload, b"first");
}

#[test]
fn test_open_missing_database() {
    let temp_dir = TempDir::new().unwrap();
    let result = Database::open(temp_dir.path(), EngineConfig::default());
    assert!(matches!(result, Err(DatabaseError::DatabaseNotFound(_))));
}

#[test]
fn test_insert_and_search() {
    let (_temp, mut db) = setup_test_db();

    for n in 1..=25 {
        assert_eq!(db.insert(&key(n), &payload(n)).unwrap(), (n - 1) as Rrn);
    }

    for n in 1..=25 {
        let record = db.search(&key(n)).unwrap().unwrap();
        assert_eq!(record.payload, payload(n));
    }
    assert!(db.search("ZZZ9999").unwrap().is_none());
    assert_eq!(db.validate().unwrap().keys, 25);
}

#[test]
fn test_insert_duplicate_key() {
    let (_temp, mut db) = setup_test_db();
    db.insert("AAA0001", b"one").unwrap();

    let result = db.insert("AAA0001", b"again");
    assert!(matches!(
        result,
        Err(DatabaseError::BTreeError(BTreeError::DuplicateKey(_)))
    ));
    assert_eq!(db.search("AAA0001").unwrap().unwrap().payload, b"one");
}

#[test]
fn test_invalid_input_rejected() {
    let (_temp, mut db) = setup_test_db();

    assert!(matches!(
        db.insert("TOO-LONG-KEY", b"x"),
        Err(DatabaseError::BTreeError(BTreeError::InvalidKey(_)))
    ));
    assert!(matches!(
        db.insert("AAA0001", &[b'x'; 65]),
        Err(DatabaseError::RecordError(RecordError::PayloadTooLarge { .. }))
    ));
    assert!(db.tree().is_empty());
    assert_eq!(db.record_slots().unwrap(), 0);
}

#[test]
fn test_range_search() {
    let (_temp, mut db) = setup_test_db();
    for n in 1..=5 {
        db.insert(&key(n), &payload(n)).unwrap();
    }

    let records = db.range_search("AAA0002", "AAA0004").unwrap();
    assert_eq!(keys(&records), vec!["AAA0002", "AAA0003", "AAA0004"]);
    assert_eq!(records[1].payload, payload(3));

    assert!(db.range_search("BBB0000", "BBB9999").unwrap().is_empty());
}

#[test]
fn test_delete_tombstones_and_reuses_slot() {
    let (_temp, mut db) = setup_test_db();
    for n in 1..=3 {
        db.insert(&key(n), &payload(n)).unwrap();
    }

    assert_eq!(db.delete("AAA0002").unwrap(), DeleteOutcome::Removed(1));
    assert!(db.search("AAA0002").unwrap().is_none());
    assert_eq!(db.free_record_slots(), &[1]);
    assert!(db.records.is_tombstoned(1).unwrap());

    // The freed slot is written before the file grows
    let slot = db.insert("AAA0009", b"reused").unwrap();
    assert_eq!(slot, 1);
    assert_eq!(db.record_slots().unwrap(), 3);
    assert!(db.free_record_slots().is_empty());
    assert_eq!(db.search("AAA0009").unwrap().unwrap().payload, b"reused");
}

#[test]
fn test_failed_insert_returns_slot() {
    let (_temp, mut db) = setup_test_db();
    db.insert("AAA0001", b"one").unwrap();
    db.insert("AAA0002", b"two").unwrap();
    db.delete("AAA0002").unwrap();

    assert!(db.insert("AAA0001", b"dup").is_err());
    assert_eq!(db.free_record_slots(), &[1]);
    assert!(db.records.is_tombstoned(1).unwrap());
}

#[test]
fn test_failed_record_write_leaves_index_untouched() {
    let (_temp, mut db) = setup_test_db();
    db.insert("AAA0001", b"one").unwrap();
    db.insert("AAA0002", b"two").unwrap();
    db.delete("AAA0002").unwrap();

    // The record write fails before anything is indexed
    let result = db.insert("AAA0003", &[b'x'; 65]);
    assert!(matches!(
        result,
        Err(DatabaseError::RecordError(RecordError::PayloadTooLarge { .. }))
    ));
    assert_eq!(db.free_record_slots(), &[1]);
    assert!(db.search("AAA0003").unwrap().is_none());
    assert_eq!(db.validate().unwrap().keys, 1);

    // Retrying with a valid record takes the same slot
    assert_eq!(db.insert("AAA0003", b"three").unwrap(), 1);
    assert_eq!(db.search("AAA0003").unwrap().unwrap().payload, b"three");
}

#[test]
fn test_failed_index_insert_frees_appended_slot() {
    let (_temp, mut db) = setup_test_db();
    db.insert("AAA0001", b"one").unwrap();

    assert!(matches!(
        db.insert("AAA0001", b"again"),
        Err(DatabaseError::BTreeError(BTreeError::DuplicateKey(_)))
    ));
    assert_eq!(db.record_slots().unwrap(), 2);
    assert!(db.records.is_tombstoned(1).unwrap());
    assert_eq!(db.free_record_slots(), &[1]);

    assert_eq!(db.insert("AAA0002", b"two").unwrap(), 1);
    assert_eq!(db.search("AAA0001").unwrap().unwrap().payload, b"one");
}

#[test]
fn test_failed_tombstone_keeps_slot_free() {
    let (_temp, mut db) = setup_test_db();
    db.insert("AAA0001", b"one").unwrap();

    // Index entry pointing past the end of the record file
    let id = db.key_id("AAA0009").unwrap();
    db.tree.insert(Key::new(id, 7)).unwrap();

    let result = db.delete("AAA0009");
    assert!(matches!(
        result,
        Err(DatabaseError::RecordError(RecordError::File(
            crate::file::FileError::SlotOutOfRange(7)
        )))
    ));
    assert_eq!(db.free_record_slots(), &[7]);
    let id = db.key_id("AAA0009").unwrap();
    assert!(db.tree.lookup(&id).unwrap().is_none());
}

#[test]
fn test_delete_missing_leaves_index_file_unchanged() {
    let (temp_dir, mut db) = setup_test_db();
    for n in 1..=12 {
        db.insert(&key(n), &payload(n)).unwrap();
    }

    let index_path = temp_dir.path().join("btree-5.idx");
    let before = fs::read(&index_path).unwrap();

    assert_eq!(db.delete("ZZZ9999").unwrap(), DeleteOutcome::NotFound);

    let after = fs::read(&index_path).unwrap();
    assert_eq!(before, after);
    assert!(db.free_record_slots().is_empty());
}

#[test]
fn test_delete_separator_keeps_record() {
    let (_temp, mut db) = setup_test_db();
    for n in 1..=5 {
        db.insert(&key(n), &payload(n)).unwrap();
    }

    assert_eq!(
        db.delete("AAA0004").unwrap(),
        DeleteOutcome::SeparatorRetained
    );
    assert_eq!(db.search("AAA0004").unwrap().unwrap().payload, payload(4));
    assert!(db.free_record_slots().is_empty());
}

#[test]
fn test_import_and_build() {
    let (temp_dir, mut db) = setup_test_db();
    let csv_path = temp_dir.path().join("students.csv");
    fs::write(
        &csv_path,
        "AAA0003,Carol\nAAA0001,Alice\n\nAAA0002,Bob\nAAA0005,Eve\nAAA0004,Dan\n",
    )
    .unwrap();

    assert_eq!(db.import_csv(&csv_path).unwrap(), 5);
    assert!(db.tree().is_empty());

    // Slot 1 is deleted before the index is built
    db.records.tombstone(1).unwrap();

    let report = db.build(4).unwrap();
    assert_eq!(
        report,
        BuildReport {
            inserted: 3,
            tombstoned: 1,
            duplicates: 0,
        }
    );
    assert_eq!(db.search("AAA0003").unwrap().unwrap().payload, b"Carol");
    assert!(db.search("AAA0001").unwrap().is_none());
    assert!(db.search("AAA0004").unwrap().is_none());

    // Building again indexes the rest and reports what was already there
    let report = db.build(100).unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 3);
    assert_eq!(db.search("AAA0004").unwrap().unwrap().payload, b"Dan");
}

#[test]
fn test_free_lists_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut db = Database::create(temp_dir.path(), EngineConfig::default()).unwrap();
        for n in 1..=5 {
            db.insert(&key(n), &payload(n)).unwrap();
        }
        db.delete("AAA0001").unwrap();
        db.delete("AAA0005").unwrap();
        // Dropped without an explicit close
    }

    let mut db = Database::open(temp_dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(db.free_record_slots(), &[0, 4]);
    // Merge freed the right leaf and collapsed the root
    assert_eq!(db.tree().free_pages(), &[1, 2]);
    assert_eq!(db.insert("AAA0010", b"x").unwrap(), 4);
    assert_eq!(db.validate().unwrap().keys, 4);
}

#[test]
fn test_open_with_other_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    Database::create(temp_dir.path(), EngineConfig::default()).unwrap();

    let config = EngineConfig {
        payload_size: 32,
        ..Default::default()
    };
    let result = Database::open(temp_dir.path(), config);
    assert!(matches!(
        result,
        Err(DatabaseError::RecordError(RecordError::RecordSizeMismatch { .. }))
    ));
}

#[test]
fn test_dump() {
    let (_temp, mut db) = setup_test_db();
    for n in 1..=6 {
        db.insert(&key(n), &payload(n)).unwrap();
    }

    let dump = db.dump().unwrap();
    assert!(dump.contains("AAA0004"));
    assert!(dump.contains("AAA0006"));
}
