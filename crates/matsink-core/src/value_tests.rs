//! Tests for row value semantics.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::value::{row_hash, ColumnType, Value};

#[test]
fn test_nan_rows_are_equal_and_hash_alike() {
    let a = vec![Value::Float(f64::NAN), Value::Int(1)];
    let b = vec![Value::Float(-f64::NAN), Value::Int(1)];
    assert_eq!(a, b);
    assert_eq!(row_hash(&a), row_hash(&b));
}

#[test]
fn test_negative_zero_equals_zero() {
    assert_eq!(Value::Float(-0.0), Value::Float(0.0));
    assert_eq!(
        row_hash(&[Value::Float(-0.0)]),
        row_hash(&[Value::Float(0.0)])
    );
}

#[test]
fn test_int_and_float_are_distinct_values() {
    assert_ne!(Value::Int(1), Value::Float(1.0));
    let mut set = FxHashSet::default();
    set.insert(vec![Value::Int(1)]);
    assert!(set.insert(vec![Value::Float(1.0)]));
}

#[test]
fn test_row_hash_depends_on_column_order() {
    let ab = vec![Value::from(1_i64), Value::from("a")];
    let ba = vec![Value::from("a"), Value::from(1_i64)];
    assert_ne!(row_hash(&ab), row_hash(&ba));
}

#[test]
fn test_ordering_is_total_across_types() {
    let mut set = BTreeSet::new();
    set.insert(Value::from("b"));
    set.insert(Value::Null);
    set.insert(Value::from(3_i64));
    set.insert(Value::from(-1_i64));
    set.insert(Value::Bool(true));
    set.insert(Value::from("a"));

    let ordered: Vec<Value> = set.into_iter().collect();
    assert_eq!(
        ordered,
        vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(-1),
            Value::Int(3),
            Value::from("a"),
            Value::from("b"),
        ]
    );
}

#[test]
fn test_option_conversion() {
    assert_eq!(Value::from(None::<i64>), Value::Null);
    assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
}

#[test]
fn test_key_width() {
    assert_eq!(ColumnType::Int.key_width(), Some(8));
    assert_eq!(ColumnType::Bit(12).key_width(), Some(2));
    assert_eq!(ColumnType::Text { max_len: Some(10) }.key_width(), Some(40));
    assert_eq!(ColumnType::Text { max_len: None }.key_width(), None);
    assert_eq!(ColumnType::Bytes.key_width(), None);
}
