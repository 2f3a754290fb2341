//! Shared setup for pipeline tests

#![allow(dead_code)]

use highwater_catalog::{MockAdapter, TableIdentifier};
use highwater_core::{Column, LogicalType, RecordSet, Schema, Value};
use highwater_engine::LoadSpec;

pub fn source_table() -> TableIdentifier {
    TableIdentifier::catalog("sales", "orders")
}

pub fn target_table() -> TableIdentifier {
    TableIdentifier::new("analytics", "public", "orders")
}

pub fn spec() -> LoadSpec {
    LoadSpec {
        source_table: source_table(),
        target_table: target_table(),
        incremental_column: "order_id".to_string(),
    }
}

pub fn schema() -> Schema {
    Schema::from_columns(vec![
        Column::new("order_id", LogicalType::Int),
        Column::new("status", LogicalType::String),
    ])
}

pub fn orders(ids: &[i64]) -> RecordSet {
    let rows = ids
        .iter()
        .map(|id| vec![Value::Int(*id), Value::Text(format!("status-{}", id))])
        .collect();
    RecordSet::new(schema(), rows).expect("fixture rows match schema")
}

pub fn order_ids(records: &RecordSet) -> Vec<i64> {
    records
        .rows
        .iter()
        .filter_map(|row| match row[0] {
            Value::Int(i) => Some(i),
            _ => None,
        })
        .collect()
}

/// One adapter playing both sides: the source table and, optionally, a
/// target already holding `target_ids`
pub async fn adapter(source_ids: &[i64], target_ids: Option<&[i64]>) -> MockAdapter {
    let adapter = MockAdapter::new();
    adapter.add_table(source_table(), orders(source_ids)).await;
    if let Some(ids) = target_ids {
        adapter.add_table(target_table(), orders(ids)).await;
    }
    adapter
}
