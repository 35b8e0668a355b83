//! Reset and teardown of a sink between passes and at end of statement.

use super::{Dedup, RowSink};
use crate::error::{Error, Result};
use crate::table::{StorageEngine, TempTable};

impl<E: StorageEngine> RowSink<E> {
    /// Empties the table, its unique index and hash state, and zeroes the
    /// row count. A no-op on a sink without a table.
    pub(super) fn truncate(&mut self) -> Result<()> {
        let Some(table) = self.table.as_mut() else {
            self.row_count = 0;
            return Ok(());
        };
        table.truncate().map_err(Error::StorageWrite)?;
        self.dedup.clear();

        if let Some(config) = self.config.as_ref() {
            tracing::debug!(
                alias = %config.alias,
                rows = self.row_count,
                tier = %table.tier(),
                "Reset result sink"
            );
        }
        self.row_count = 0;
        Ok(())
    }

    /// Releases the temporary table. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(table) = self.table.take() {
            let alias = self.config.as_ref().map_or("", |c| c.alias.as_str());
            tracing::debug!(alias, rows = table.len(), "Closed result sink");
        }
        self.config = None;
        self.dedup = Dedup::Disabled;
        self.row_count = 0;
    }
}

impl<E: StorageEngine> Drop for RowSink<E> {
    fn drop(&mut self) {
        self.close();
    }
}
