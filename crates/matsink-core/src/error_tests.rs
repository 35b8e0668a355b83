//! Tests for the error taxonomy.

use crate::config::ConfigError;
use crate::error::Error;
use crate::table::{StorageError, StorageTier};

#[test]
fn test_storage_errors_display_as_materialization_failed() {
    let errors = [
        Error::StorageInit(StorageError::InvalidShape("no columns".to_string())),
        Error::StorageWrite(StorageError::Corrupt("bad length".to_string())),
        Error::StorageExhausted(StorageError::AlreadyOnDisk),
    ];

    for err in &errors {
        assert!(
            err.to_string().starts_with("materialization failed"),
            "unexpected message: {err}"
        );
        assert!(err.is_storage_failure());
    }
}

#[test]
fn test_projection_error_is_not_storage_failure() {
    let err = Error::Projection("row has 3 values, table has 2 columns".to_string());
    assert_eq!(
        err.to_string(),
        "Projection error: row has 3 values, table has 2 columns"
    );
    assert!(!err.is_storage_failure());
}

#[test]
fn test_storage_error_source_is_preserved() {
    let err = Error::StorageExhausted(StorageError::CapacityExhausted {
        tier: StorageTier::OnDisk,
        reason: "quota of 64 bytes reached".to_string(),
    });
    let source = std::error::Error::source(&err).expect("source");
    assert!(source.to_string().contains("on-disk"));
}

#[test]
fn test_error_from_config_error() {
    let err: Error = ConfigError::Invalid("memory.max_rows must be > 0".to_string()).into();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("memory.max_rows"));
}

#[test]
fn test_storage_error_classification() {
    assert!(StorageError::DuplicateKey.is_duplicate());
    assert!(!StorageError::DuplicateKey.is_capacity_exhausted());

    let full = StorageError::CapacityExhausted {
        tier: StorageTier::InMemory,
        reason: "row limit".to_string(),
    };
    assert!(full.is_capacity_exhausted());
    assert!(!full.is_duplicate());

    let io = StorageError::from(std::io::Error::other("disk gone"));
    assert!(matches!(io, StorageError::Io(_)));
}
