//! Two-tier temporary table: memory first, spill file after promotion.

use std::time::Instant;

use super::disk::DiskTier;
use super::memory::MemoryTier;
use super::{KeyMode, RowScan, StorageEngine, StorageError, StorageTier, StoredRow, TempTable};
use crate::config::{DiskConfig, MemoryConfig, SinkConfig};
use crate::storage_config::StorageConfig;
use crate::value::{ColumnDef, Value};

/// Engine producing [`TieredTable`]s.
#[derive(Debug, Clone, Default)]
pub struct TieredEngine {
    memory: MemoryConfig,
    disk: DiskConfig,
}

impl TieredEngine {
    /// Creates an engine using the tier settings of `config`.
    #[must_use]
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            memory: config.memory.clone(),
            disk: config.disk.clone(),
        }
    }
}

impl StorageEngine for TieredEngine {
    type Table = TieredTable;

    fn create(&self, config: &StorageConfig) -> Result<TieredTable, StorageError> {
        if config.columns.is_empty() {
            return Err(StorageError::InvalidShape(format!(
                "table '{}' has no columns",
                config.alias
            )));
        }
        // Fail now rather than at the first promotion
        if let Some(dir) = &self.disk.spill_dir {
            std::fs::create_dir_all(dir)?;
        }

        let key_mode = KeyMode::from_config(config);
        Ok(TieredTable {
            alias: config.alias.clone(),
            columns: config.columns.clone(),
            key_mode,
            memory: self.memory.clone(),
            disk: self.disk.clone(),
            tier: Tier::Memory(MemoryTier::new(key_mode, self.memory.clone())),
        })
    }
}

enum Tier {
    Memory(MemoryTier),
    Disk(DiskTier),
}

/// Temporary table that starts in memory and can be promoted to disk.
///
/// The in-memory tier always scans in insertion order. On disk, a clustered
/// unique key (see [`StorageConfig::key_clusters_rows`]) scans in key order.
pub struct TieredTable {
    alias: String,
    columns: Vec<ColumnDef>,
    key_mode: KeyMode,
    memory: MemoryConfig,
    disk: DiskConfig,
    tier: Tier,
}

impl TieredTable {
    /// Table alias.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn check_shape(&self, row: &StoredRow) -> Result<(), StorageError> {
        if row.values.len() != self.columns.len() {
            return Err(StorageError::InvalidShape(format!(
                "row has {} values, table '{}' has {} columns",
                row.values.len(),
                self.alias,
                self.columns.len()
            )));
        }
        Ok(())
    }

    fn hash_lookup_enabled(&self) -> bool {
        match &self.tier {
            Tier::Memory(memory) => memory.hash_lookup_enabled(),
            Tier::Disk(disk) => disk.hash_lookup_enabled(),
        }
    }
}

impl TempTable for TieredTable {
    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn tier(&self) -> StorageTier {
        match self.tier {
            Tier::Memory(_) => StorageTier::InMemory,
            Tier::Disk(_) => StorageTier::OnDisk,
        }
    }

    fn len(&self) -> usize {
        match &self.tier {
            Tier::Memory(memory) => memory.len(),
            Tier::Disk(disk) => disk.len(),
        }
    }

    fn write_row(&mut self, row: &StoredRow) -> Result<(), StorageError> {
        self.check_shape(row)?;
        match &mut self.tier {
            Tier::Memory(memory) => memory.write(row),
            Tier::Disk(disk) => disk.write(row),
        }
    }

    fn contains_key(&self, values: &[Value]) -> Result<bool, StorageError> {
        match &self.tier {
            Tier::Memory(memory) => Ok(memory.contains_key(values)),
            Tier::Disk(disk) => disk.contains_key(values),
        }
    }

    fn enable_hash_lookup(&mut self) -> Result<(), StorageError> {
        match &mut self.tier {
            Tier::Memory(memory) => {
                memory.enable_hash_lookup();
                Ok(())
            }
            Tier::Disk(disk) => disk.enable_hash_lookup(),
        }
    }

    fn lookup_hash(&self, hash: u64, values: &[Value]) -> Result<bool, StorageError> {
        match &self.tier {
            Tier::Memory(memory) => memory.lookup_hash(hash, values),
            Tier::Disk(disk) => disk.lookup_hash(hash, values),
        }
    }

    /// Empties the table and returns it to the in-memory tier, dropping any
    /// spill file. An initialized hash lookup stays initialized.
    fn truncate(&mut self) -> Result<(), StorageError> {
        let keep_lookup = self.hash_lookup_enabled();
        let mut memory = MemoryTier::new(self.key_mode, self.memory.clone());
        if keep_lookup {
            memory.enable_hash_lookup();
        }
        self.tier = Tier::Memory(memory);
        Ok(())
    }

    fn promote(&mut self) -> Result<(), StorageError> {
        let Tier::Memory(memory) = &self.tier else {
            return Err(StorageError::AlreadyOnDisk);
        };

        let start = Instant::now();
        let mut disk = DiskTier::create(&self.alias, self.key_mode, &self.disk)?;
        let mut skipped = 0usize;
        for row in memory.rows() {
            match disk.write(row) {
                Ok(()) => {}
                // The unique key is re-applied while copying
                Err(StorageError::DuplicateKey) => skipped += 1,
                Err(err) => return Err(err),
            }
        }

        tracing::debug!(
            alias = %self.alias,
            rows = disk.len(),
            skipped,
            path = %disk.path().display(),
            index_bytes = disk.index_bytes(),
            elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "Temporary table converted to on-disk tier"
        );
        self.tier = Tier::Disk(disk);
        Ok(())
    }

    fn scan(&self) -> Result<RowScan<'_>, StorageError> {
        match &self.tier {
            Tier::Memory(memory) => Ok(Box::new(
                memory.rows().iter().map(|row| Ok(row.values.clone())),
            )),
            Tier::Disk(disk) => {
                let order = disk.scan_order()?;
                Ok(Box::new(
                    order
                        .into_iter()
                        .map(move |offset| disk.read_at(offset).map(|row| row.values)),
                ))
            }
        }
    }
}
