//! Storage configuration builder.
//!
//! Derives, once per query-expression preparation, how the temporary table
//! backing a set operation is laid out and how it enforces uniqueness.
//!
//! # Strategy selection
//!
//! | distinct | mixed operators | key fits limits | strategy            |
//! |----------|-----------------|-----------------|---------------------|
//! | no       | -               | -               | `NoDedup`           |
//! | yes      | yes             | -               | `HashColumnUnique`  |
//! | yes      | no              | no              | `HashColumnUnique`  |
//! | yes      | no              | yes             | `PrimaryKeyUnique`  |
//!
//! A recursive expression keeps its strategy but forbids the primary key from
//! clustering the table, so scans return rows in insertion order.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, KeyConfig};
use crate::error::{Error, Result};
use crate::value::{ColumnDef, ColumnType};

/// How the temporary table rejects duplicate rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniqueStrategy {
    /// A unique index over all visible columns, enforced by the engine.
    PrimaryKeyUnique,
    /// A synthetic hash column checked by the sink before each write.
    HashColumnUnique,
    /// Duplicates are kept.
    NoDedup,
}

impl UniqueStrategy {
    /// Returns true unless duplicates are kept.
    #[must_use]
    pub fn deduplicates(self) -> bool {
        self != Self::NoDedup
    }
}

/// Metadata of the query expression feeding the sink.
pub trait QueryExpression {
    /// The expression's result feeds back into its own evaluation.
    fn is_recursive(&self) -> bool;

    /// The expression mixes DISTINCT and ALL set operators over one table.
    fn has_mixed_set_operators(&self) -> bool;
}

/// Plain [`QueryExpression`] for callers that already know the flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpressionInfo {
    /// See [`QueryExpression::is_recursive`].
    pub recursive: bool,
    /// See [`QueryExpression::has_mixed_set_operators`].
    pub mixed_set_operators: bool,
}

impl QueryExpression for ExpressionInfo {
    fn is_recursive(&self) -> bool {
        self.recursive
    }

    fn has_mixed_set_operators(&self) -> bool {
        self.mixed_set_operators
    }
}

/// Parameters governing temporary table construction.
///
/// Immutable once a table has been created from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Table alias used in logs and spill file names.
    pub alias: String,
    /// Physical column layout (visible columns only).
    pub columns: Vec<ColumnDef>,
    /// Number of columns in the declared output row, hidden ones included.
    pub declared_width: usize,
    /// Position in the declared output row of each physical column.
    pub source_positions: Vec<usize>,
    /// Uniqueness strategy.
    pub strategy: UniqueStrategy,
    /// The feeding expression is recursive.
    pub is_recursive: bool,
    /// The feeding expression mixes DISTINCT and ALL operators.
    pub mixed_set_operators: bool,
    /// Whether a physical table must be created at all.
    pub materialize: bool,
    /// Whether the unique key may also order (cluster) the stored rows.
    pub can_use_pk_for_unique: bool,
    /// Duplicate-key write failures are soft and ignorable.
    pub ignore_dup_key: bool,
}

impl StorageConfig {
    /// Returns true when scans return rows in unique-key order.
    #[must_use]
    pub fn key_clusters_rows(&self) -> bool {
        self.strategy == UniqueStrategy::PrimaryKeyUnique && self.can_use_pk_for_unique
    }

    /// Returns true when the layout carries the synthetic hash column.
    #[must_use]
    pub fn has_hash_column(&self) -> bool {
        self.strategy == UniqueStrategy::HashColumnUnique
    }
}

/// Builder for [`StorageConfig`].
///
/// # Example
///
/// ```rust
/// use matsink_core::{ColumnDef, ColumnType, ExpressionInfo, StorageConfigBuilder, UniqueStrategy};
///
/// let columns = vec![
///     ColumnDef::new("id", ColumnType::Int),
///     ColumnDef::new("name", ColumnType::Text { max_len: Some(64) }),
/// ];
/// let recursive = ExpressionInfo { recursive: true, mixed_set_operators: false };
/// let config = StorageConfigBuilder::new("cte", &columns)
///     .distinct(true)
///     .expression(&recursive)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.strategy, UniqueStrategy::PrimaryKeyUnique);
/// assert!(!config.key_clusters_rows());
/// ```
pub struct StorageConfigBuilder<'a> {
    alias: String,
    columns: &'a [ColumnDef],
    distinct: bool,
    expression: Option<&'a dyn QueryExpression>,
    create_table: bool,
    bit_fields_as_long: bool,
    key_limits: KeyConfig,
}

impl<'a> StorageConfigBuilder<'a> {
    /// Starts a builder over the declared output columns.
    #[must_use]
    pub fn new(alias: impl Into<String>, columns: &'a [ColumnDef]) -> Self {
        Self {
            alias: alias.into(),
            columns,
            distinct: false,
            expression: None,
            create_table: true,
            bit_fields_as_long: false,
            key_limits: KeyConfig::default(),
        }
    }

    /// Requests duplicate elimination.
    #[must_use]
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Attaches the feeding query expression.
    #[must_use]
    pub fn expression(mut self, expression: &'a dyn QueryExpression) -> Self {
        self.expression = Some(expression);
        self
    }

    /// When false, only the logical shape is derived and no table is built.
    #[must_use]
    pub fn create_table(mut self, create_table: bool) -> Self {
        self.create_table = create_table;
        self
    }

    /// Lays out `Bit(n)` columns as 64-bit integers.
    #[must_use]
    pub fn bit_fields_as_long(mut self, enabled: bool) -> Self {
        self.bit_fields_as_long = enabled;
        self
    }

    /// Overrides the engine's unique key limits.
    #[must_use]
    pub fn key_limits(mut self, limits: KeyConfig) -> Self {
        self.key_limits = limits;
        self
    }

    /// Derives the storage configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when every column is hidden or a `Bit` column has a
    /// width outside `1..=64`.
    pub fn build(self) -> Result<StorageConfig> {
        let bad_bit = self.columns.iter().find_map(|c| match c.column_type {
            ColumnType::Bit(width) if !(1..=64).contains(&width) => Some((c, width)),
            _ => None,
        });
        if let Some((column, width)) = bad_bit {
            return Err(invalid(format!(
                "column '{}' has bit width {width}, expected 1..=64",
                column.name
            )));
        }

        let (source_positions, columns): (Vec<usize>, Vec<ColumnDef>) = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.hidden)
            .map(|(pos, c)| (pos, self.physical_column(c)))
            .unzip();

        if columns.is_empty() {
            return Err(invalid(format!(
                "table '{}' has no visible columns",
                self.alias
            )));
        }

        let is_recursive = self.expression.is_some_and(|e| e.is_recursive());
        let mixed_set_operators = self
            .expression
            .is_some_and(|e| e.has_mixed_set_operators());

        let strategy = if !self.distinct {
            UniqueStrategy::NoDedup
        } else if mixed_set_operators {
            // A single unique index cannot be switched off for the ALL part
            // without affecting the other indexes, so dedup is done by hand.
            UniqueStrategy::HashColumnUnique
        } else if !self.key_fits(&columns) {
            tracing::debug!(
                alias = %self.alias,
                columns = columns.len(),
                "Unique key exceeds engine limits, using hash column"
            );
            UniqueStrategy::HashColumnUnique
        } else {
            UniqueStrategy::PrimaryKeyUnique
        };

        Ok(StorageConfig {
            alias: self.alias,
            columns,
            declared_width: self.columns.len(),
            source_positions,
            strategy,
            is_recursive,
            mixed_set_operators,
            materialize: self.create_table,
            // A clustered key would return rows in key order instead of
            // insertion order, which breaks recursive iteration.
            can_use_pk_for_unique: !is_recursive,
            ignore_dup_key: strategy.deduplicates(),
        })
    }

    fn physical_column(&self, column: &ColumnDef) -> ColumnDef {
        match column.column_type {
            ColumnType::Bit(_) if self.bit_fields_as_long => ColumnDef {
                column_type: ColumnType::Int,
                ..column.clone()
            },
            _ => column.clone(),
        }
    }

    fn key_fits(&self, columns: &[ColumnDef]) -> bool {
        if columns.len() > self.key_limits.max_key_columns {
            return false;
        }
        columns
            .iter()
            .try_fold(0usize, |total, c| {
                c.column_type.key_width().map(|w| total.saturating_add(w))
            })
            .is_some_and(|width| width <= self.key_limits.max_key_bytes)
    }
}

fn invalid(message: String) -> Error {
    Error::Config(ConfigError::Invalid(message))
}
