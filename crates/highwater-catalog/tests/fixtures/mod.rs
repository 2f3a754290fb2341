//! Test fixtures for catalog and warehouse integration tests
//!
//! Schemas and record sets shaped like the tables an incremental load
//! typically moves: an orders fact table keyed by a numeric id and an events
//! table keyed by a timestamp.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use highwater_core::{Column, LogicalType, Nullability, RecordSet, Schema, Value};

/// Orders table: numeric incremental key plus a nullable timestamp
pub fn orders_schema() -> Schema {
    Schema::from_columns(vec![
        Column::new("order_id", LogicalType::Int).with_nullability(Nullability::No),
        Column::new("customer", LogicalType::String).with_nullability(Nullability::No),
        Column::new(
            "amount",
            LogicalType::Decimal {
                precision: Some(10),
                scale: Some(2),
            },
        )
        .with_nullability(Nullability::No),
        Column::new("updated_at", LogicalType::Timestamp).with_nullability(Nullability::Yes),
    ])
}

/// Events table: timestamp incremental key
pub fn events_schema() -> Schema {
    Schema::from_columns(vec![
        Column::new("event_id", LogicalType::String).with_nullability(Nullability::No),
        Column::new("event_date", LogicalType::Date).with_nullability(Nullability::No),
        Column::new("occurred_at", LogicalType::Timestamp).with_nullability(Nullability::No),
    ])
}

pub fn ts(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .expect("valid fixture timestamp")
}

/// Orders with the given ids; `updated_at` follows the id
pub fn orders(ids: &[i64]) -> RecordSet {
    let rows = ids
        .iter()
        .map(|id| {
            vec![
                Value::Int(*id),
                Value::Text(format!("customer-{}", id % 7)),
                Value::Float(*id as f64 * 1.5),
                Value::Timestamp(ts(1 + (*id as u32 % 28), 12)),
            ]
        })
        .collect();
    RecordSet::new(orders_schema(), rows).expect("fixture rows match schema")
}

/// Events on consecutive hours of 2024-03-01
pub fn events(hours: &[u32]) -> RecordSet {
    let rows = hours
        .iter()
        .map(|hour| {
            let at = ts(1, *hour);
            vec![
                Value::Text(format!("evt-{:02}", hour)),
                Value::Date(at.date()),
                Value::Timestamp(at),
            ]
        })
        .collect();
    RecordSet::new(events_schema(), rows).expect("fixture rows match schema")
}

/// `catalog.toml` registering both fixture tables under the `sales` database
pub const CATALOG_TOML: &str = r#"
[[tables]]
database = "sales"
name = "orders"
location = "data/orders.jsonl"
columns = [
    { name = "order_id", type = "int", nullable = "no" },
    { name = "customer", type = "string" },
    { name = "amount", type = "decimal", precision = 10, scale = 2 },
    { name = "updated_at", type = "timestamp", nullable = "yes" },
]

[[tables]]
database = "sales"
name = "events"
location = "data/events.jsonl"
columns = [
    { name = "event_id", type = "string" },
    { name = "event_date", type = "date" },
    { name = "occurred_at", type = "timestamp" },
]
"#;
