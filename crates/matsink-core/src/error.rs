//! Error types for matsink-core.
//!
//! Duplicate rows are deliberately absent from this taxonomy: a duplicate is a
//! normal outcome of [`crate::RowSink::accept`] (`Ok(false)`), never an error.

use thiserror::Error;

use crate::config::ConfigError;
use crate::table::StorageError;

/// Materialization sink error types.
#[derive(Error, Debug)]
pub enum Error {
    /// The produced row does not fit the table's column layout.
    ///
    /// This is a plan error, not something the user can recover from.
    #[error("Projection error: {0}")]
    Projection(String),

    /// The temporary table could not be constructed.
    #[error("materialization failed: cannot create temporary table: {0}")]
    StorageInit(#[source] StorageError),

    /// A row write failed for a reason other than a duplicate key or full tier.
    #[error("materialization failed: write error: {0}")]
    StorageWrite(#[source] StorageError),

    /// The table ran out of room and promotion to disk did not help.
    #[error("materialization failed: storage exhausted: {0}")]
    StorageExhausted(#[source] StorageError),

    /// A row was offered to a sink without physical storage.
    #[error("Sink has no temporary table")]
    NotOpen,

    /// `open` was called while a table is still held by the sink.
    #[error("Sink is already open on table '{0}'")]
    AlreadyOpen(String),

    /// The requested deduplication toggle is not supported by the active strategy.
    #[error("Unsupported deduplication toggle: {0}")]
    UnsupportedToggle(String),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Returns true for failures raised by the storage engine.
    ///
    /// These terminate the current execution pass unless the caller has its
    /// own retry policy.
    #[must_use]
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::StorageInit(_) | Self::StorageWrite(_) | Self::StorageExhausted(_)
        )
    }
}

/// Result type alias for sink operations.
pub type Result<T> = std::result::Result<T, Error>;
