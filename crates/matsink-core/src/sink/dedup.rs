//! Per-strategy duplicate detection.

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::storage_config::UniqueStrategy;
use crate::table::{StorageError, StoredRow, TempTable};
use crate::value::{row_hash, Row};

/// Duplicate detection chosen when the sink is opened.
#[derive(Debug)]
pub(crate) enum Dedup {
    /// Duplicates are kept.
    Disabled,
    /// The engine's unique index decides.
    UniqueIndex,
    /// The sink checks a synthetic hash column before writing.
    HashColumn {
        /// Cleared while an ALL phase feeds the table
        enabled: bool,
        /// Hashes of every row written this pass; a miss skips the table lookup
        seen: FxHashSet<u64>,
    },
}

impl Dedup {
    pub(crate) fn for_strategy(strategy: UniqueStrategy) -> Self {
        match strategy {
            UniqueStrategy::PrimaryKeyUnique => Self::UniqueIndex,
            UniqueStrategy::HashColumnUnique => Self::HashColumn {
                enabled: true,
                seen: FxHashSet::default(),
            },
            UniqueStrategy::NoDedup => Self::Disabled,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::UniqueIndex => true,
            Self::HashColumn { enabled, .. } => *enabled,
        }
    }

    /// Builds the stored form of a projected row. The hash column is filled
    /// even while dedup is switched off so later DISTINCT phases see it.
    pub(crate) fn stamp(&self, values: Row) -> StoredRow {
        match self {
            Self::HashColumn { .. } => {
                let hash = row_hash(&values);
                StoredRow::with_hash(values, hash)
            }
            Self::Disabled | Self::UniqueIndex => StoredRow::new(values),
        }
    }

    pub(crate) fn exists<T: TempTable>(
        &self,
        table: &T,
        row: &StoredRow,
    ) -> std::result::Result<bool, StorageError> {
        match self {
            Self::Disabled | Self::HashColumn { enabled: false, .. } => Ok(false),
            Self::UniqueIndex => table.contains_key(&row.values),
            Self::HashColumn {
                enabled: true,
                seen,
            } => match row.hash {
                Some(hash) if seen.contains(&hash) => table.lookup_hash(hash, &row.values),
                _ => Ok(false),
            },
        }
    }

    pub(crate) fn record_seen(&mut self, row: &StoredRow) {
        if let (Self::HashColumn { seen, .. }, Some(hash)) = (self, row.hash) {
            seen.insert(hash);
        }
    }

    /// Forgets every recorded row and switches dedup back on.
    pub(crate) fn clear(&mut self) {
        if let Self::HashColumn { enabled, seen } = self {
            *enabled = true;
            seen.clear();
        }
    }

    pub(crate) fn set_enabled(&mut self, on: bool) -> Result<()> {
        match self {
            Self::HashColumn { enabled, .. } => {
                *enabled = on;
                Ok(())
            }
            Self::UniqueIndex if on => Ok(()),
            Self::UniqueIndex => Err(Error::UnsupportedToggle(
                "a unique index cannot be disabled; build the table with the hash column strategy"
                    .to_string(),
            )),
            Self::Disabled if on => Err(Error::UnsupportedToggle(
                "the table was built without a uniqueness strategy".to_string(),
            )),
            Self::Disabled => Ok(()),
        }
    }
}
