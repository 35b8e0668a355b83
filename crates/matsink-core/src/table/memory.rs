//! In-memory tier: heap-ordered rows with optional key and hash indexes.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::{KeyMode, StorageError, StorageTier, StoredRow};
use crate::config::MemoryConfig;
use crate::value::{row_size, Row, Value};

pub(crate) struct MemoryTier {
    rows: Vec<StoredRow>,
    /// Unique key over the visible columns
    keys: Option<FxHashSet<Row>>,
    /// Hash column value -> row positions
    hash_index: Option<FxHashMap<u64, SmallVec<[usize; 1]>>>,
    bytes: usize,
    limits: MemoryConfig,
}

impl MemoryTier {
    pub(crate) fn new(key_mode: KeyMode, limits: MemoryConfig) -> Self {
        Self {
            rows: Vec::new(),
            keys: key_mode.has_key().then(FxHashSet::default),
            hash_index: None,
            bytes: 0,
            limits,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn rows(&self) -> &[StoredRow] {
        &self.rows
    }

    /// Capacity is checked before the key, like a heap engine that fails
    /// the insert as soon as the table is full.
    pub(crate) fn write(&mut self, row: &StoredRow) -> Result<(), StorageError> {
        let size = row_size(&row.values);
        if self.rows.len() >= self.limits.max_rows {
            return Err(StorageError::CapacityExhausted {
                tier: StorageTier::InMemory,
                reason: format!("row limit of {} reached", self.limits.max_rows),
            });
        }
        if self.bytes.saturating_add(size) > self.limits.max_bytes {
            return Err(StorageError::CapacityExhausted {
                tier: StorageTier::InMemory,
                reason: format!("byte limit of {} reached", self.limits.max_bytes),
            });
        }

        if let Some(keys) = self.keys.as_mut() {
            if !keys.insert(row.values.clone()) {
                return Err(StorageError::DuplicateKey);
            }
        }
        if let (Some(index), Some(hash)) = (self.hash_index.as_mut(), row.hash) {
            index.entry(hash).or_default().push(self.rows.len());
        }

        self.rows.push(row.clone());
        self.bytes += size;
        Ok(())
    }

    pub(crate) fn contains_key(&self, values: &[Value]) -> bool {
        self.keys.as_ref().is_some_and(|keys| keys.contains(values))
    }

    pub(crate) fn enable_hash_lookup(&mut self) {
        let mut index: FxHashMap<u64, SmallVec<[usize; 1]>> = FxHashMap::default();
        for (pos, row) in self.rows.iter().enumerate() {
            if let Some(hash) = row.hash {
                index.entry(hash).or_default().push(pos);
            }
        }
        self.hash_index = Some(index);
    }

    pub(crate) fn hash_lookup_enabled(&self) -> bool {
        self.hash_index.is_some()
    }

    pub(crate) fn lookup_hash(&self, hash: u64, values: &[Value]) -> Result<bool, StorageError> {
        let index = self
            .hash_index
            .as_ref()
            .ok_or(StorageError::HashLookupNotInitialized)?;
        Ok(index.get(&hash).is_some_and(|positions| {
            positions
                .iter()
                .any(|&pos| self.rows[pos].values.as_slice() == values)
        }))
    }
}
