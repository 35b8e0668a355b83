//! Row sink feeding the temporary table of a set operation.
//!
//! [`RowSink`] receives one row per [`ResultSink::accept`] call, drops rows
//! already present under the active [`UniqueStrategy`], writes the rest and
//! counts them. When the table's current tier is full it is promoted to disk
//! and the write is retried once.
//!
//! # Example
//!
//! ```rust
//! use matsink_core::{
//!     ColumnDef, ColumnType, ResultSink, RowSink, SinkConfig, StorageConfigBuilder, Value,
//! };
//!
//! let columns = vec![
//!     ColumnDef::new("id", ColumnType::Int),
//!     ColumnDef::new("name", ColumnType::Text { max_len: Some(32) }),
//! ];
//! let config = StorageConfigBuilder::new("union1", &columns)
//!     .distinct(true)
//!     .build()?;
//!
//! let mut sink = RowSink::from_config(&SinkConfig::default());
//! sink.open(config)?;
//! assert!(sink.accept(&[Value::Int(1), Value::from("a")])?);
//! assert!(!sink.accept(&[Value::Int(1), Value::from("a")])?);
//! assert_eq!(sink.row_count(), 1);
//! # Ok::<(), matsink_core::Error>(())
//! ```

mod dedup;
mod lifecycle;
mod projection;
mod promotion;


use std::time::Instant;

use crate::config::{LoggingConfig, SinkConfig};
use crate::error::{Error, Result};
use crate::storage_config::{StorageConfig, UniqueStrategy};
use crate::table::{StorageEngine, StorageTier, StoredRow, TempTable, TieredEngine};
use crate::value::{ColumnDef, Value};

use dedup::Dedup;
use promotion::PromotionLogger;

/// Number of rows retained after deduplication.
pub type RowCount = u64;

/// Receiver of the rows produced by a query block.
///
/// Wrapping sinks implement this trait so callers can substitute them for
/// the plain [`RowSink`].
pub trait ResultSink {
    /// Preparation deferred until the output column types are known.
    fn postponed_prepare(&mut self, _columns: &[ColumnDef]) -> Result<()> {
        Ok(())
    }

    /// Offers one row. Returns `Ok(false)` when the row was a duplicate and
    /// has been discarded.
    fn accept(&mut self, row: &[Value]) -> Result<bool>;

    /// Called once the producer is exhausted.
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Pushes buffered rows downstream.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Empties the sink for another pass.
    fn reset(&mut self) -> Result<()>;

    /// Like [`ResultSink::reset`], but never fails; errors are logged.
    fn cleanup(&mut self) {
        if let Err(err) = self.reset() {
            tracing::warn!(error = %err, "Failed to reset result sink during cleanup");
        }
    }

    /// Rows retained in the current pass.
    fn row_count(&self) -> RowCount;
}

/// Deduplicating sink over a temporary table built by `E`.
pub struct RowSink<E: StorageEngine = TieredEngine> {
    engine: E,
    config: Option<StorageConfig>,
    table: Option<E::Table>,
    dedup: Dedup,
    row_count: RowCount,
    promotions: u32,
    promotion_log: PromotionLogger,
    trace_discards: bool,
}

impl RowSink<TieredEngine> {
    /// Creates a sink over the reference tiered engine.
    #[must_use]
    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(TieredEngine::new(config)).with_logging(&config.logging)
    }
}

impl<E: StorageEngine> RowSink<E> {
    /// Creates a closed sink that builds its tables with `engine`.
    #[must_use]
    pub fn new(engine: E) -> Self {
        let logging = LoggingConfig::default();
        Self {
            engine,
            config: None,
            table: None,
            dedup: Dedup::Disabled,
            row_count: 0,
            promotions: 0,
            promotion_log: PromotionLogger::new(&logging),
            trace_discards: logging.trace_discards,
        }
    }

    /// Replaces the diagnostics settings.
    #[must_use]
    pub fn with_logging(mut self, logging: &LoggingConfig) -> Self {
        self.promotion_log = PromotionLogger::new(logging);
        self.trace_discards = logging.trace_discards;
        self
    }

    /// Builds the temporary table described by `config`.
    ///
    /// Shape-only configurations (`materialize == false`) are recorded but
    /// get no table; such a sink rejects rows with [`Error::NotOpen`].
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyOpen`] while a table is held, [`Error::StorageInit`]
    /// when the engine cannot build the table or its hash lookup.
    pub fn open(&mut self, config: StorageConfig) -> Result<()> {
        if self.table.is_some() {
            let alias = self
                .config
                .as_ref()
                .map_or_else(String::new, |c| c.alias.clone());
            return Err(Error::AlreadyOpen(alias));
        }

        let table = if config.materialize {
            let mut table = self.engine.create(&config).map_err(Error::StorageInit)?;
            if config.has_hash_column() {
                table.enable_hash_lookup().map_err(Error::StorageInit)?;
            }
            Some(table)
        } else {
            None
        };

        tracing::debug!(
            alias = %config.alias,
            strategy = ?config.strategy,
            columns = config.columns.len(),
            recursive = config.is_recursive,
            materialize = config.materialize,
            "Opened result sink"
        );

        self.dedup = Dedup::for_strategy(config.strategy);
        self.table = table;
        self.config = Some(config);
        self.row_count = 0;
        self.promotions = 0;
        Ok(())
    }

    /// Returns true while the sink holds a temporary table.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.table.is_some()
    }

    /// Read-only handle for downstream scans.
    #[must_use]
    pub fn table(&self) -> Option<&E::Table> {
        self.table.as_ref()
    }

    /// Configuration the sink was opened with.
    #[must_use]
    pub fn storage_config(&self) -> Option<&StorageConfig> {
        self.config.as_ref()
    }

    /// Current tier of the backing table.
    #[must_use]
    pub fn storage_tier(&self) -> Option<StorageTier> {
        self.table.as_ref().map(TempTable::tier)
    }

    /// Number of promotions since the sink was opened.
    #[must_use]
    pub fn promotion_count(&self) -> u32 {
        self.promotions
    }

    /// Switches per-row deduplication on or off.
    ///
    /// Used when DISTINCT and ALL operators feed the same table. Only the
    /// hash column strategy can be switched off.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] before [`RowSink::open`], [`Error::UnsupportedToggle`]
    /// when the active strategy cannot honour the request.
    pub fn set_deduplication(&mut self, enabled: bool) -> Result<()> {
        let Some(config) = self.config.as_ref() else {
            return Err(Error::NotOpen);
        };
        self.dedup.set_enabled(enabled)?;
        tracing::debug!(alias = %config.alias, enabled, "Deduplication toggled");
        Ok(())
    }

    fn discard(&self, row: &StoredRow) -> bool {
        if self.trace_discards {
            let alias = self.config.as_ref().map_or("", |c| c.alias.as_str());
            tracing::trace!(alias, values = ?row.values, "Discarded duplicate row");
        }
        false
    }

    /// Promotes the full table and writes `row` again.
    ///
    /// Returns `Ok(false)` when the retry hits the unique key.
    fn promote_and_retry(&mut self, row: &StoredRow) -> Result<bool> {
        let (Some(config), Some(table)) = (self.config.as_ref(), self.table.as_mut()) else {
            return Err(Error::NotOpen);
        };

        let start = Instant::now();
        table.promote().map_err(Error::StorageExhausted)?;
        if config.has_hash_column() {
            table.enable_hash_lookup().map_err(Error::StorageExhausted)?;
        }
        self.promotions += 1;
        self.promotion_log
            .log(&config.alias, table.len(), start.elapsed());

        match table.write_row(row) {
            Ok(()) => Ok(true),
            Err(err) if err.is_duplicate() => Ok(self.discard(row)),
            Err(err) => Err(Error::StorageExhausted(err)),
        }
    }
}

impl<E: StorageEngine> ResultSink for RowSink<E> {
    fn accept(&mut self, row: &[Value]) -> Result<bool> {
        let (Some(config), Some(table)) = (self.config.as_ref(), self.table.as_mut()) else {
            return Err(Error::NotOpen);
        };

        let stored = self.dedup.stamp(projection::project(config, row)?);
        if self
            .dedup
            .exists(table, &stored)
            .map_err(Error::StorageWrite)?
        {
            return Ok(self.discard(&stored));
        }

        match table.write_row(&stored) {
            Ok(()) => {}
            Err(err) if err.is_duplicate() && config.ignore_dup_key => {
                return Ok(self.discard(&stored));
            }
            Err(err) if err.is_capacity_exhausted() => {
                if !self.promote_and_retry(&stored)? {
                    return Ok(false);
                }
            }
            Err(err) => return Err(Error::StorageWrite(err)),
        }

        self.dedup.record_seen(&stored);
        self.row_count += 1;
        Ok(true)
    }

    fn reset(&mut self) -> Result<()> {
        self.truncate()
    }

    fn row_count(&self) -> RowCount {
        self.row_count
    }
}

impl<E> std::fmt::Debug for RowSink<E>
where
    E: StorageEngine,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSink")
            .field("alias", &self.config.as_ref().map(|c| c.alias.as_str()))
            .field(
                "strategy",
                &self.config.as_ref().map_or(UniqueStrategy::NoDedup, |c| c.strategy),
            )
            .field("tier", &self.storage_tier())
            .field("row_count", &self.row_count)
            .field("dedup_active", &self.dedup.is_active())
            .finish_non_exhaustive()
    }
}
