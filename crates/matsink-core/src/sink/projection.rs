//! Projection of produced rows onto the physical column layout.

use crate::error::{Error, Result};
use crate::storage_config::StorageConfig;
use crate::value::{ColumnDef, ColumnType, Row, Value};

/// Projects a produced row onto the table's columns.
///
/// Hidden columns are skipped, lossless coercions applied (`BOOL` into
/// integer columns, `INT` into float columns) and column constraints checked.
pub(crate) fn project(config: &StorageConfig, row: &[Value]) -> Result<Row> {
    if row.len() != config.declared_width {
        return Err(Error::Projection(format!(
            "row has {} values, '{}' expects {}",
            row.len(),
            config.alias,
            config.declared_width
        )));
    }

    config
        .source_positions
        .iter()
        .zip(&config.columns)
        .map(|(&pos, column)| coerce(&row[pos], column))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn coerce(value: &Value, column: &ColumnDef) -> Result<Value> {
    match (value, column.column_type) {
        (Value::Null, _) if column.nullable => Ok(Value::Null),
        (Value::Null, _) => Err(Error::Projection(format!(
            "column '{}' is NOT NULL",
            column.name
        ))),

        (Value::Bool(_), ColumnType::Bool)
        | (Value::Int(_), ColumnType::Int)
        | (Value::Float(_), ColumnType::Float)
        | (Value::Bytes(_), ColumnType::Bytes) => Ok(value.clone()),

        (Value::Bool(b), ColumnType::Int) => Ok(Value::Int(i64::from(*b))),
        (Value::Int(i), ColumnType::Float) => Ok(Value::Float(*i as f64)),

        (Value::Text(s), ColumnType::Text { max_len }) => match max_len {
            Some(max) if s.chars().count() > max => Err(Error::Projection(format!(
                "value for column '{}' exceeds {max} characters",
                column.name
            ))),
            _ => Ok(value.clone()),
        },

        (Value::Bool(b), ColumnType::Bit(_)) => Ok(Value::Int(i64::from(*b))),
        (Value::Int(i), ColumnType::Bit(width)) => {
            if fits_bits(*i, width) {
                Ok(value.clone())
            } else {
                Err(Error::Projection(format!(
                    "value {i} does not fit BIT({width}) column '{}'",
                    column.name
                )))
            }
        }

        _ => Err(Error::Projection(format!(
            "cannot store {} in column '{}' of type {:?}",
            value.type_name(),
            column.name,
            column.column_type
        ))),
    }
}

fn fits_bits(value: i64, width: u8) -> bool {
    if value < 0 {
        // Negative values only fit a full-width field, as raw bit patterns
        return width >= 64;
    }
    width >= 63 || value < (1i64 << width)
}
