//! On-disk tier: length-prefixed `bincode` records in a spill file.
//!
//! # Record Format
//!
//! ```text
//! [len: 4B LE] [bincode(StoredRow): len bytes]
//! ```
//!
//! Indexes stay in memory and hold only row hashes and record offsets, so a
//! promoted table's resident size does not grow with row width. Candidates
//! are confirmed against the file. A clustered key sorts the decoded rows at
//! scan time to return them in key order; every other layout scans in
//! insertion order.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tempfile::NamedTempFile;

use super::{KeyMode, StorageError, StorageTier, StoredRow};
use crate::config::DiskConfig;
use crate::value::{row_hash, Row, Value};

/// Size of the record length prefix.
const LEN_PREFIX: u64 = 4;

type OffsetList = SmallVec<[u64; 1]>;

enum KeyIndex {
    None,
    /// Hash of the key columns -> candidate offsets
    Hashed {
        offsets: FxHashMap<u64, OffsetList>,
        /// Scans return rows in key order
        clustered: bool,
    },
}

pub(crate) struct DiskTier {
    file: NamedTempFile,
    end: u64,
    /// Record offsets in insertion order
    offsets: Vec<u64>,
    keys: KeyIndex,
    hash_index: Option<FxHashMap<u64, OffsetList>>,
    max_bytes: Option<u64>,
}

impl DiskTier {
    pub(crate) fn create(
        alias: &str,
        key_mode: KeyMode,
        settings: &DiskConfig,
    ) -> Result<Self, StorageError> {
        let prefix = format!("matsink-{alias}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".spill");
        let file = match settings.spill_dir.as_deref() {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let keys = match key_mode {
            KeyMode::None => KeyIndex::None,
            KeyMode::Unique | KeyMode::Clustered => KeyIndex::Hashed {
                offsets: FxHashMap::default(),
                clustered: key_mode == KeyMode::Clustered,
            },
        };

        Ok(Self {
            file,
            end: 0,
            offsets: Vec::new(),
            keys,
            hash_index: None,
            max_bytes: settings.max_bytes,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn len(&self) -> usize {
        self.offsets.len()
    }

    pub(crate) fn write(&mut self, row: &StoredRow) -> Result<(), StorageError> {
        if self.contains_key(&row.values)? {
            return Err(StorageError::DuplicateKey);
        }

        let payload = bincode::serialize(row)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::Corrupt(format!("row of {} bytes", payload.len())))?;
        let record_len = LEN_PREFIX + u64::from(len);
        if let Some(max) = self.max_bytes {
            if self.end.saturating_add(record_len) > max {
                return Err(StorageError::CapacityExhausted {
                    tier: StorageTier::OnDisk,
                    reason: format!("quota of {max} bytes reached"),
                });
            }
        }

        let offset = self.end;
        let mut file = self.file.as_file();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&len.to_le_bytes())?;
        file.write_all(&payload)?;
        self.end += record_len;
        self.offsets.push(offset);

        if let KeyIndex::Hashed { offsets, .. } = &mut self.keys {
            offsets.entry(row_hash(&row.values)).or_default().push(offset);
        }
        if let (Some(index), Some(hash)) = (self.hash_index.as_mut(), row.hash) {
            index.entry(hash).or_default().push(offset);
        }
        Ok(())
    }

    pub(crate) fn read_at(&self, offset: u64) -> Result<StoredRow, StorageError> {
        let mut file = self.file.as_file();
        file.seek(SeekFrom::Start(offset))?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf);
        if offset + LEN_PREFIX + u64::from(len) > self.end {
            return Err(StorageError::Corrupt(format!(
                "record at {offset} overruns end of file ({len} bytes)"
            )));
        }
        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        Ok(bincode::deserialize(&payload)?)
    }

    pub(crate) fn contains_key(&self, values: &[Value]) -> Result<bool, StorageError> {
        match &self.keys {
            KeyIndex::None => Ok(false),
            KeyIndex::Hashed { offsets, .. } => match offsets.get(&row_hash(values)) {
                Some(candidates) => self.any_matches(candidates, values),
                None => Ok(false),
            },
        }
    }

    pub(crate) fn enable_hash_lookup(&mut self) -> Result<(), StorageError> {
        let mut index: FxHashMap<u64, OffsetList> = FxHashMap::default();
        for &offset in &self.offsets {
            if let Some(hash) = self.read_at(offset)?.hash {
                index.entry(hash).or_default().push(offset);
            }
        }
        self.hash_index = Some(index);
        Ok(())
    }

    pub(crate) fn hash_lookup_enabled(&self) -> bool {
        self.hash_index.is_some()
    }

    pub(crate) fn lookup_hash(&self, hash: u64, values: &[Value]) -> Result<bool, StorageError> {
        let index = self
            .hash_index
            .as_ref()
            .ok_or(StorageError::HashLookupNotInitialized)?;
        match index.get(&hash) {
            Some(offsets) => self.any_matches(offsets, values),
            None => Ok(false),
        }
    }

    /// Offsets in scan order.
    ///
    /// A clustered key decodes every row once to sort by key; the decoded
    /// rows are dropped before the scan starts.
    pub(crate) fn scan_order(&self) -> Result<Vec<u64>, StorageError> {
        match &self.keys {
            KeyIndex::Hashed {
                clustered: true, ..
            } => {
                let mut keyed: Vec<(Row, u64)> = self
                    .offsets
                    .iter()
                    .map(|&offset| self.read_at(offset).map(|row| (row.values, offset)))
                    .collect::<Result<_, _>>()?;
                keyed.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                Ok(keyed.into_iter().map(|(_, offset)| offset).collect())
            }
            KeyIndex::None | KeyIndex::Hashed { .. } => Ok(self.offsets.clone()),
        }
    }

    /// Estimated bytes held by the in-memory indexes.
    pub(crate) fn index_bytes(&self) -> usize {
        let entry = std::mem::size_of::<u64>() + std::mem::size_of::<OffsetList>();
        let keyed = match &self.keys {
            KeyIndex::None => 0,
            KeyIndex::Hashed { offsets, .. } => offsets.len() * entry,
        };
        let hashed = self.hash_index.as_ref().map_or(0, |index| index.len() * entry);
        self.offsets.len() * std::mem::size_of::<u64>() + keyed + hashed
    }

    fn any_matches(&self, offsets: &[u64], values: &[Value]) -> Result<bool, StorageError> {
        for &offset in offsets {
            if self.read_at(offset)?.values.as_slice() == values {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
