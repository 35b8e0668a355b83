//! Temporary table contract and the reference tiered engine.
//!
//! The sink only talks to a table through [`TempTable`]; [`StorageEngine`]
//! builds tables from a [`StorageConfig`]. [`TieredEngine`] is the engine
//! shipped with this crate: rows start in an in-memory tier and move to an
//! anonymous spill file when [`TempTable::promote`] is called.

mod disk;
mod memory;
mod tiered;

#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage_config::StorageConfig;
use crate::value::{ColumnDef, Row, Value};

pub use tiered::{TieredEngine, TieredTable};

/// Where a table's rows currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageTier {
    /// Heap-style in-memory rows
    InMemory,
    /// Spill file on disk
    OnDisk,
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => f.write_str("in-memory"),
            Self::OnDisk => f.write_str("on-disk"),
        }
    }
}

/// A projected row as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    /// Visible column values
    pub values: Row,
    /// Synthetic hash column, present when the layout carries one
    pub hash: Option<u64>,
}

impl StoredRow {
    /// Creates a row without a hash column.
    #[must_use]
    pub fn new(values: Row) -> Self {
        Self { values, hash: None }
    }

    /// Creates a row carrying a hash column value.
    #[must_use]
    pub fn with_hash(values: Row, hash: u64) -> Self {
        Self {
            values,
            hash: Some(hash),
        }
    }
}

/// Storage engine failures.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The row violates the table's unique key.
    #[error("Duplicate key")]
    DuplicateKey,

    /// The current tier cannot hold another row.
    #[error("The {tier} tier is full: {reason}")]
    CapacityExhausted {
        /// Tier that ran out of room
        tier: StorageTier,
        /// Which limit was hit
        reason: String,
    },

    /// `lookup_hash` was called before `enable_hash_lookup`.
    #[error("Hash lookup is not initialized")]
    HashLookupNotInitialized,

    /// `promote` was called on a table that already lives on disk.
    #[error("Table is already stored on disk")]
    AlreadyOnDisk,

    /// The column layout cannot be stored.
    #[error("Invalid table shape: {0}")]
    InvalidShape(String),

    /// Spill file contents do not decode.
    #[error("Corrupt spill file: {0}")]
    Corrupt(String),

    /// Row encoding failure.
    #[error("Row encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true for a unique key violation.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey)
    }

    /// Returns true when the tier ran out of room.
    #[must_use]
    pub fn is_capacity_exhausted(&self) -> bool {
        matches!(self, Self::CapacityExhausted { .. })
    }
}

/// Scoped iteration over a table's rows.
pub type RowScan<'a> = Box<dyn Iterator<Item = Result<Row, StorageError>> + 'a>;

/// Capability set of a temporary table.
///
/// Implementations are single-owner and are never shared between sinks.
pub trait TempTable {
    /// Physical column layout, fixed at creation.
    fn columns(&self) -> &[ColumnDef];

    /// Current storage tier.
    fn tier(&self) -> StorageTier;

    /// Number of stored rows.
    fn len(&self) -> usize;

    /// Returns true when no rows are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a row.
    ///
    /// Fails with [`StorageError::DuplicateKey`] when the table has a unique
    /// key and already holds `row`, and with
    /// [`StorageError::CapacityExhausted`] when the tier is full.
    fn write_row(&mut self, row: &StoredRow) -> Result<(), StorageError>;

    /// Looks up the unique key. Always false for tables without one.
    fn contains_key(&self, values: &[Value]) -> Result<bool, StorageError>;

    /// Initializes the index over the hash column.
    fn enable_hash_lookup(&mut self) -> Result<(), StorageError>;

    /// Returns true when a row with this hash and these values is stored.
    fn lookup_hash(&self, hash: u64, values: &[Value]) -> Result<bool, StorageError>;

    /// Removes all rows and index entries.
    fn truncate(&mut self) -> Result<(), StorageError>;

    /// Moves the table to the on-disk tier, keeping every row.
    ///
    /// The hash lookup is not initialized afterwards.
    fn promote(&mut self) -> Result<(), StorageError>;

    /// Iterates the stored rows.
    fn scan(&self) -> Result<RowScan<'_>, StorageError>;
}

/// Factory for temporary tables.
pub trait StorageEngine {
    /// Table type produced by this engine.
    type Table: TempTable;

    /// Creates an empty table with the configured shape and key.
    fn create(&self, config: &StorageConfig) -> Result<Self::Table, StorageError>;
}

/// How a table enforces and orders its unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyMode {
    /// No unique key
    None,
    /// Unique key, rows kept in insertion order
    Unique,
    /// Unique key that also orders the on-disk rows
    Clustered,
}

impl KeyMode {
    pub(crate) fn from_config(config: &StorageConfig) -> Self {
        match config.strategy {
            crate::UniqueStrategy::PrimaryKeyUnique if config.key_clusters_rows() => {
                Self::Clustered
            }
            crate::UniqueStrategy::PrimaryKeyUnique => Self::Unique,
            crate::UniqueStrategy::HashColumnUnique | crate::UniqueStrategy::NoDedup => {
                Self::None
            }
        }
    }

    pub(crate) fn has_key(self) -> bool {
        self != Self::None
    }
}
