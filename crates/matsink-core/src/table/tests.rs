//! Tests for the tiered reference engine.

use tempfile::TempDir;

use super::disk::DiskTier;
use super::{
    KeyMode, StorageEngine, StorageError, StorageTier, StoredRow, TempTable, TieredEngine,
};
use crate::config::{DiskConfig, SinkConfig};
use crate::storage_config::{ExpressionInfo, StorageConfig, StorageConfigBuilder};
use crate::value::{row_hash, ColumnDef, ColumnType, Row, Value};

fn columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", ColumnType::Int),
        ColumnDef::new("name", ColumnType::Text { max_len: Some(16) }),
    ]
}

fn row(id: i64, name: &str) -> Row {
    vec![Value::Int(id), Value::from(name)]
}

fn engine(max_rows: usize, spill: &TempDir) -> TieredEngine {
    let mut config = SinkConfig::default();
    config.memory.max_rows = max_rows;
    config.disk.spill_dir = Some(spill.path().to_path_buf());
    TieredEngine::new(&config)
}

fn storage(distinct: bool, expr: ExpressionInfo) -> StorageConfig {
    let cols = columns();
    StorageConfigBuilder::new("t", &cols)
        .distinct(distinct)
        .expression(&expr)
        .build()
        .unwrap()
}

fn scan_ids(table: &impl TempTable) -> Vec<i64> {
    table
        .scan()
        .unwrap()
        .map(|r| match r.unwrap()[0] {
            Value::Int(id) => id,
            ref other => panic!("unexpected value {other:?}"),
        })
        .collect()
}

#[test]
fn test_unique_key_rejects_duplicate_in_memory() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(10, &spill)
        .create(&storage(true, ExpressionInfo::default()))
        .unwrap();

    table.write_row(&StoredRow::new(row(1, "a"))).unwrap();
    let err = table.write_row(&StoredRow::new(row(1, "a"))).unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(table.len(), 1);
    assert!(table.contains_key(&row(1, "a")).unwrap());
    assert!(!table.contains_key(&row(1, "b")).unwrap());
}

#[test]
fn test_no_key_accepts_duplicates() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(10, &spill)
        .create(&storage(false, ExpressionInfo::default()))
        .unwrap();

    table.write_row(&StoredRow::new(row(1, "a"))).unwrap();
    table.write_row(&StoredRow::new(row(1, "a"))).unwrap();
    assert_eq!(table.len(), 2);
    assert!(!table.contains_key(&row(1, "a")).unwrap());
}

#[test]
fn test_memory_row_limit_reports_capacity_exhausted() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(2, &spill)
        .create(&storage(false, ExpressionInfo::default()))
        .unwrap();

    table.write_row(&StoredRow::new(row(1, "a"))).unwrap();
    table.write_row(&StoredRow::new(row(2, "b"))).unwrap();
    let err = table.write_row(&StoredRow::new(row(3, "c"))).unwrap_err();
    assert!(err.is_capacity_exhausted());
    assert_eq!(table.tier(), StorageTier::InMemory);
}

#[test]
fn test_memory_byte_limit_reports_capacity_exhausted() {
    let spill = TempDir::new().unwrap();
    let mut config = SinkConfig::default();
    config.memory.max_bytes = 64;
    config.disk.spill_dir = Some(spill.path().to_path_buf());
    let mut table = TieredEngine::new(&config)
        .create(&storage(false, ExpressionInfo::default()))
        .unwrap();

    let big = vec![Value::Int(1), Value::from("x".repeat(100))];
    let err = table.write_row(&StoredRow::new(big)).unwrap_err();
    assert!(matches!(
        err,
        StorageError::CapacityExhausted {
            tier: StorageTier::InMemory,
            ..
        }
    ));
}

#[test]
fn test_promote_keeps_rows_and_key() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(3, &spill)
        .create(&storage(true, ExpressionInfo::default()))
        .unwrap();
    for id in [3, 1, 2] {
        table.write_row(&StoredRow::new(row(id, "v"))).unwrap();
    }

    table.promote().unwrap();
    assert_eq!(table.tier(), StorageTier::OnDisk);
    assert_eq!(table.len(), 3);
    assert!(table.contains_key(&row(2, "v")).unwrap());

    let err = table.write_row(&StoredRow::new(row(1, "v"))).unwrap_err();
    assert!(err.is_duplicate());
    table.write_row(&StoredRow::new(row(4, "v"))).unwrap();
    assert_eq!(table.len(), 4);
}

#[test]
fn test_promote_twice_fails() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(3, &spill)
        .create(&storage(true, ExpressionInfo::default()))
        .unwrap();
    table.promote().unwrap();
    assert!(matches!(
        table.promote().unwrap_err(),
        StorageError::AlreadyOnDisk
    ));
}

#[test]
fn test_clustered_key_scans_in_key_order_on_disk() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(10, &spill)
        .create(&storage(true, ExpressionInfo::default()))
        .unwrap();
    for id in [5, 3, 9, 1] {
        table.write_row(&StoredRow::new(row(id, "v"))).unwrap();
    }
    // Heap tier keeps insertion order
    assert_eq!(scan_ids(&table), vec![5, 3, 9, 1]);

    table.promote().unwrap();
    assert_eq!(scan_ids(&table), vec![1, 3, 5, 9]);
}

#[test]
fn test_recursive_key_scans_in_insertion_order_on_disk() {
    let spill = TempDir::new().unwrap();
    let recursive = ExpressionInfo {
        recursive: true,
        mixed_set_operators: false,
    };
    let mut table = engine(10, &spill)
        .create(&storage(true, recursive))
        .unwrap();
    for id in [5, 3, 9, 1] {
        table.write_row(&StoredRow::new(row(id, "v"))).unwrap();
    }
    table.promote().unwrap();
    table.write_row(&StoredRow::new(row(0, "v"))).unwrap();

    assert_eq!(scan_ids(&table), vec![5, 3, 9, 1, 0]);
    assert!(table
        .write_row(&StoredRow::new(row(9, "v")))
        .unwrap_err()
        .is_duplicate());
}

#[test]
fn test_hash_lookup_requires_initialization() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(10, &spill)
        .create(&storage(false, ExpressionInfo::default()))
        .unwrap();
    let values = row(1, "a");
    assert!(matches!(
        table.lookup_hash(row_hash(&values), &values).unwrap_err(),
        StorageError::HashLookupNotInitialized
    ));

    table.enable_hash_lookup().unwrap();
    table
        .write_row(&StoredRow::with_hash(values.clone(), row_hash(&values)))
        .unwrap();
    assert!(table.lookup_hash(row_hash(&values), &values).unwrap());
    assert!(!table.lookup_hash(row_hash(&values), &row(1, "b")).unwrap());
}

#[test]
fn test_hash_lookup_survives_promotion_after_reinit() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(10, &spill)
        .create(&storage(false, ExpressionInfo::default()))
        .unwrap();
    table.enable_hash_lookup().unwrap();
    for id in 0..4 {
        let values = row(id, "h");
        table
            .write_row(&StoredRow::with_hash(values.clone(), row_hash(&values)))
            .unwrap();
    }

    table.promote().unwrap();
    let wanted = row(2, "h");
    assert!(table.lookup_hash(row_hash(&wanted), &wanted).is_err());

    table.enable_hash_lookup().unwrap();
    assert!(table.lookup_hash(row_hash(&wanted), &wanted).unwrap());
}

#[test]
fn test_truncate_returns_to_memory_and_keeps_lookup() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(10, &spill)
        .create(&storage(false, ExpressionInfo::default()))
        .unwrap();
    table.enable_hash_lookup().unwrap();
    let values = row(1, "a");
    table
        .write_row(&StoredRow::with_hash(values.clone(), row_hash(&values)))
        .unwrap();
    table.promote().unwrap();
    table.enable_hash_lookup().unwrap();

    table.truncate().unwrap();
    assert_eq!(table.tier(), StorageTier::InMemory);
    assert!(table.is_empty());
    assert!(!table.lookup_hash(row_hash(&values), &values).unwrap());
    assert_eq!(std::fs::read_dir(spill.path()).unwrap().count(), 0);
}

#[test]
fn test_disk_quota_reports_capacity_exhausted() {
    let spill = TempDir::new().unwrap();
    let mut config = SinkConfig::default();
    config.memory.max_rows = 1;
    config.disk.spill_dir = Some(spill.path().to_path_buf());
    config.disk.max_bytes = Some(48);
    let mut table = TieredEngine::new(&config)
        .create(&storage(false, ExpressionInfo::default()))
        .unwrap();

    table.write_row(&StoredRow::new(row(1, "a"))).unwrap();
    table.promote().unwrap();
    let mut result = Ok(());
    for id in 2..10 {
        result = table.write_row(&StoredRow::new(row(id, "a")));
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(
        result.unwrap_err(),
        StorageError::CapacityExhausted {
            tier: StorageTier::OnDisk,
            ..
        }
    ));
}

#[test]
fn test_spill_dir_that_is_a_file_fails_create() {
    let spill = TempDir::new().unwrap();
    let blocker = spill.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();

    let mut config = SinkConfig::default();
    config.disk.spill_dir = Some(blocker);
    let result = TieredEngine::new(&config).create(&storage(true, ExpressionInfo::default()));
    assert!(matches!(result, Err(StorageError::Io(_))));
}

#[test]
fn test_wrong_arity_is_invalid_shape() {
    let spill = TempDir::new().unwrap();
    let mut table = engine(10, &spill)
        .create(&storage(false, ExpressionInfo::default()))
        .unwrap();
    let err = table
        .write_row(&StoredRow::new(vec![Value::Int(1)]))
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidShape(_)));
}

#[test]
fn test_clustered_disk_index_does_not_hold_row_values() {
    let spill = TempDir::new().unwrap();
    let settings = DiskConfig {
        spill_dir: Some(spill.path().to_path_buf()),
        max_bytes: None,
    };
    let mut disk = DiskTier::create("wide", KeyMode::Clustered, &settings).unwrap();

    let payload = "x".repeat(10_000);
    for id in (0..1000).rev() {
        let values = vec![Value::Int(id), Value::from(payload.as_str())];
        disk.write(&StoredRow::new(values)).unwrap();
    }

    // Roughly 10 MB spilled; the index keeps hashes and offsets only
    assert_eq!(disk.len(), 1000);
    assert!(disk.index_bytes() < 100_000, "{}", disk.index_bytes());

    let dup = vec![Value::Int(500), Value::from(payload.as_str())];
    assert!(disk.write(&StoredRow::new(dup)).unwrap_err().is_duplicate());

    let order = disk.scan_order().unwrap();
    let first = disk.read_at(order[0]).unwrap();
    let last = disk.read_at(order[999]).unwrap();
    assert_eq!(first.values[0], Value::Int(0));
    assert_eq!(last.values[0], Value::Int(999));
}
