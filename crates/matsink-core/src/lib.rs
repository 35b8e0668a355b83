//! # matsink core
//!
//! Result materialization sink for multi-way set operations.
//!
//! Rows produced by the blocks of a UNION/INTERSECT-style query expression are
//! deposited one at a time into a temporary table that enforces uniqueness,
//! so later stages read a materialized, duplicate-free result.
//!
//! ## Features
//!
//! - **Strategy selection**: unique index, synthetic hash column or no dedup,
//!   derived from the expression by [`StorageConfigBuilder`]
//! - **Transparent spill**: a full in-memory table is promoted to an on-disk
//!   tier and the failed write is retried once
//! - **Mixed DISTINCT/ALL**: per-row dedup toggling under the hash column
//!   strategy
//! - **Reusable**: [`ResultSink::reset`] empties the table between passes of a
//!   recursive or correlated evaluation
//!
//! ## Quick Start
//!
//! ```rust
//! use matsink_core::{
//!     ColumnDef, ColumnType, ResultSink, RowSink, SinkConfig, StorageConfigBuilder, TempTable,
//!     Value,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SinkConfig::default();
//!     let columns = vec![
//!         ColumnDef::new("id", ColumnType::Int),
//!         ColumnDef::new("name", ColumnType::Text { max_len: Some(32) }),
//!     ];
//!
//!     let storage = StorageConfigBuilder::new("union1", &columns)
//!         .distinct(true)
//!         .key_limits(config.keys.clone())
//!         .build()?;
//!
//!     let mut sink = RowSink::from_config(&config);
//!     sink.open(storage)?;
//!     for (id, name) in [(1, "a"), (2, "b"), (1, "a")] {
//!         sink.accept(&[Value::Int(id), Value::from(name)])?;
//!     }
//!     sink.finalize()?;
//!
//!     assert_eq!(sink.row_count(), 2);
//!     let table = sink.table().ok_or("no table")?;
//!     assert_eq!(table.scan()?.count(), 2);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
// Clippy lints configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(
    test,
    allow(
        clippy::doc_markdown,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )
)]

pub mod config;
pub mod error;
#[cfg(test)]
mod error_tests;
pub mod sink;
pub mod storage_config;
pub mod table;
pub mod value;
#[cfg(test)]
mod value_tests;

pub use config::{ConfigError, SinkConfig};
pub use error::{Error, Result};
pub use sink::{ResultSink, RowCount, RowSink};
pub use storage_config::{
    ExpressionInfo, QueryExpression, StorageConfig, StorageConfigBuilder, UniqueStrategy,
};
pub use table::{
    RowScan, StorageEngine, StorageError, StorageTier, StoredRow, TempTable, TieredEngine,
    TieredTable,
};
pub use value::{ColumnDef, ColumnType, Row, Value};
