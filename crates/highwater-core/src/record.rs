//! Tabular record sets exchanged between connectors

use serde::{Deserialize, Serialize};

use crate::schema::Schema;
use crate::value::{Value, ValueError};

/// One row, aligned positionally with its record set's schema
pub type Record = Vec<Value>;

/// Errors raised while building record sets
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("row {row} has {found} values, schema has {expected} columns")]
    Arity { row: usize, expected: usize, found: usize },

    #[error("row {row} is not a JSON object")]
    NotAnObject { row: usize },

    #[error("row {row}, column '{column}': {source}")]
    Value {
        row: usize,
        column: String,
        #[source]
        source: ValueError,
    },
}

/// A schema plus its rows, in source order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    pub schema: Schema,
    pub rows: Vec<Record>,
}

impl RecordSet {
    /// Create a record set, checking every row against the schema width
    pub fn new(schema: Schema, rows: Vec<Record>) -> Result<Self, RecordError> {
        let expected = schema.len();
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(RecordError::Arity { row, expected, found: r.len() });
        }
        Ok(Self { schema, rows })
    }

    /// An empty record set with the given schema
    pub fn empty(schema: Schema) -> Self {
        Self { schema, rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// `MAX(column)` with SQL semantics: nulls are ignored, and an empty or
    /// all-null column yields `None`. Values that do not compare with the
    /// running maximum are skipped.
    pub fn max_value(&self, name: &str) -> Option<Value> {
        let mut best: Option<&Value> = None;
        for value in self.column_values(name)? {
            if value.is_null() {
                continue;
            }
            best = match best {
                None => Some(value),
                Some(current) => match value.compare(current) {
                    Some(std::cmp::Ordering::Greater) => Some(value),
                    _ => Some(current),
                },
            };
        }
        best.cloned()
    }

    /// Columns of `other` that [`RecordSet::extend_from`] has no place for
    pub fn unmatched_columns<'a>(&self, other: &'a RecordSet) -> Vec<&'a str> {
        other
            .schema
            .columns
            .iter()
            .filter(|c| self.schema.index_of(&c.name).is_none())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Append rows from another record set with the same column names.
    ///
    /// Columns are matched by name so the other set may list them in a
    /// different order; columns missing from `other` are filled with nulls.
    pub fn extend_from(&mut self, other: &RecordSet) {
        let mapping: Vec<Option<usize>> = self
            .schema
            .columns
            .iter()
            .map(|c| other.schema.index_of(&c.name))
            .collect();

        for row in &other.rows {
            let aligned = mapping
                .iter()
                .map(|idx| idx.map(|i| row[i].clone()).unwrap_or(Value::Null))
                .collect();
            self.rows.push(aligned);
        }
    }

    /// Decode JSON objects (one per row) against the schema. Keys missing
    /// from an object decode as null; unknown keys are ignored.
    pub fn from_json_rows(schema: Schema, objects: &[serde_json::Value]) -> Result<Self, RecordError> {
        let mut rows = Vec::with_capacity(objects.len());

        for (row_idx, object) in objects.iter().enumerate() {
            let map = object
                .as_object()
                .ok_or(RecordError::NotAnObject { row: row_idx })?;

            let mut row = Vec::with_capacity(schema.len());
            for column in &schema.columns {
                let cell = map.get(&column.name).unwrap_or(&serde_json::Value::Null);
                let value = Value::from_json(cell, &column.logical_type).map_err(|source| {
                    RecordError::Value {
                        row: row_idx,
                        column: column.name.clone(),
                        source,
                    }
                })?;
                row.push(value);
            }
            rows.push(row);
        }

        Ok(Self { schema, rows })
    }

    /// Render each row as a JSON object keyed by column name
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let map = self
                    .schema
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.name.clone(), v.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(map)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, LogicalType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn orders_schema() -> Schema {
        Schema::from_columns(vec![
            Column::new("id", LogicalType::Int),
            Column::new("status", LogicalType::String),
        ])
    }

    #[test]
    fn new_rejects_ragged_rows() {
        let err = RecordSet::new(orders_schema(), vec![vec![Value::Int(1)]]).unwrap_err();
        assert_eq!(err, RecordError::Arity { row: 0, expected: 2, found: 1 });
    }

    #[test]
    fn max_ignores_nulls() {
        let set = RecordSet::new(
            orders_schema(),
            vec![
                vec![Value::Int(3), "a".into()],
                vec![Value::Null, "b".into()],
                vec![Value::Int(9), "c".into()],
                vec![Value::Int(4), "d".into()],
            ],
        )
        .unwrap();

        assert_eq!(set.max_value("id"), Some(Value::Int(9)));
        assert_eq!(set.max_value("missing"), None);
    }

    #[test]
    fn max_of_empty_or_all_null_is_none() {
        let empty = RecordSet::empty(orders_schema());
        assert_eq!(empty.max_value("id"), None);

        let nulls = RecordSet::new(orders_schema(), vec![vec![Value::Null, Value::Null]]).unwrap();
        assert_eq!(nulls.max_value("id"), None);
    }

    #[test]
    fn json_rows_roundtrip_through_schema() {
        let objects = vec![
            json!({"id": 1, "status": "new", "ignored": true}),
            json!({"id": 2}),
        ];
        let set = RecordSet::from_json_rows(orders_schema(), &objects).unwrap();

        assert_eq!(set.rows[1], vec![Value::Int(2), Value::Null]);
        assert_eq!(
            set.to_json_rows(),
            vec![json!({"id": 1, "status": "new"}), json!({"id": 2, "status": null})]
        );
    }

    #[test]
    fn json_rows_report_bad_cells() {
        let err = RecordSet::from_json_rows(orders_schema(), &[json!({"id": "x"})]).unwrap_err();
        assert!(matches!(err, RecordError::Value { row: 0, ref column, .. } if column == "id"));

        let err = RecordSet::from_json_rows(orders_schema(), &[json!([1, 2])]).unwrap_err();
        assert_eq!(err, RecordError::NotAnObject { row: 0 });
    }

    #[test]
    fn extend_aligns_by_name() {
        let mut target = RecordSet::empty(orders_schema());
        let other = RecordSet::new(
            Schema::from_columns(vec![Column::new("ID", LogicalType::Int)]),
            vec![vec![Value::Int(5)]],
        )
        .unwrap();

        target.extend_from(&other);
        assert_eq!(target.rows, vec![vec![Value::Int(5), Value::Null]]);
    }

    #[test]
    fn unmatched_columns_are_listed() {
        let target = RecordSet::empty(orders_schema());
        let other = RecordSet::new(
            Schema::from_columns(vec![
                Column::new("Status", LogicalType::String),
                Column::new("channel", LogicalType::String),
                Column::new("region", LogicalType::String),
            ]),
            vec![],
        )
        .unwrap();

        assert_eq!(target.unmatched_columns(&other), vec!["channel", "region"]);
        assert!(target.unmatched_columns(&target).is_empty());
    }
}
