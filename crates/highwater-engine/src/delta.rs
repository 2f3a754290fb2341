//! Delta computation: source rows strictly above the high-water mark

use highwater_core::{RecordSet, Value};
use std::cmp::Ordering;

/// Errors raised while filtering the source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeltaError {
    #[error("incremental column '{column}' not found in source (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("row {row}: {column} value {value} ({kind}) cannot be compared with watermark {watermark}")]
    Incomparable {
        row: usize,
        column: String,
        value: Value,
        kind: &'static str,
        watermark: Value,
    },
}

/// Keep the rows whose `column` value is strictly greater than `watermark`.
///
/// Without a watermark every row is kept, including rows with a null
/// incremental value. With one, nulls never compare greater and are dropped.
pub fn filter_delta(
    records: RecordSet,
    column: &str,
    watermark: Option<&Value>,
) -> Result<RecordSet, DeltaError> {
    let idx = records
        .schema
        .index_of(column)
        .ok_or_else(|| DeltaError::MissingColumn {
            column: column.to_string(),
            available: records.schema.column_names().join(", "),
        })?;

    let watermark = match watermark {
        Some(mark) if !mark.is_null() => mark,
        _ => return Ok(records),
    };

    let RecordSet { schema, rows } = records;
    let mut delta = Vec::new();

    for (row_idx, row) in rows.into_iter().enumerate() {
        let cell = &row[idx];
        if cell.is_null() {
            continue;
        }

        match cell.compare(watermark) {
            Some(Ordering::Greater) => delta.push(row),
            Some(_) => {}
            None => {
                return Err(DeltaError::Incomparable {
                    row: row_idx,
                    column: schema.columns[idx].name.clone(),
                    kind: cell.kind(),
                    value: cell.clone(),
                    watermark: watermark.clone(),
                })
            }
        }
    }

    Ok(RecordSet { schema, rows: delta })
}
