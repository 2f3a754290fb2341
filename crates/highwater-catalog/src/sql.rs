//! SQL text generation shared by the warehouse adapters
//!
//! Identifiers are validated rather than quoted: warehouses fold unquoted
//! names (Snowflake to upper case, PostgreSQL to lower case) and the names
//! supplied on the command line are expected to follow that folding.

use crate::adapter::{FetchError, TableIdentifier};
use highwater_core::{Column, LogicalType, Record, Schema, Value};
use regex::Regex;
use std::sync::OnceLock;

/// SQL flavour of a warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Snowflake,
    Postgres,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
    })
}

/// Reject anything that is not a plain SQL identifier
pub fn validate_identifier(name: &str) -> Result<&str, FetchError> {
    if identifier_pattern().is_match(name) {
        Ok(name)
    } else {
        Err(FetchError::ConfigError(format!("'{}' is not a valid SQL identifier", name)))
    }
}

/// Render `database.schema.table` after validating each part
pub fn qualified_name(table: &TableIdentifier) -> Result<String, FetchError> {
    let mut parts = Vec::with_capacity(3);
    if let Some(database) = &table.database {
        parts.push(validate_identifier(database)?);
    }
    if let Some(schema) = &table.schema {
        parts.push(validate_identifier(schema)?);
    }
    parts.push(validate_identifier(&table.table)?);
    Ok(parts.join("."))
}

/// Escape text for a single-quoted string literal
pub fn escape_string(text: &str, dialect: Dialect) -> String {
    let escaped = text.replace('\'', "''");
    match dialect {
        // Backslash starts an escape sequence inside Snowflake literals
        Dialect::Snowflake => escaped.replace('\\', "\\\\"),
        Dialect::Postgres => escaped,
    }
}

/// Render a value as a SQL literal
pub fn render_literal(value: &Value, dialect: Dialect) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_nan() => "CAST('NaN' AS DOUBLE PRECISION)".to_string(),
        Value::Float(f) if f.is_infinite() => {
            let text = if *f > 0.0 { "inf" } else { "-inf" };
            format!("CAST('{}' AS DOUBLE PRECISION)", text)
        }
        Value::Float(f) => format!("{:?}", f),
        Value::Text(s) => format!("'{}'", escape_string(s, dialect)),
        Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
        Value::Timestamp(ts) => format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
    }
}

/// Render a value for a column of the given type.
///
/// Zone-aware columns receive timestamps as UTC with an explicit offset, so
/// the session time zone never shifts them.
fn render_cell(value: &Value, column_type: &LogicalType, dialect: Dialect) -> String {
    match (value, column_type) {
        (Value::Timestamp(ts), LogicalType::TimestampTz) => {
            format!("'{}'", ts.format("%Y-%m-%dT%H:%M:%S%.6f+00:00"))
        }
        _ => render_literal(value, dialect),
    }
}

/// Source schema with each column's type replaced by the target column's
/// type where the target has a column of that name
pub fn with_target_types(source: &Schema, target: &Schema) -> Schema {
    let columns = source
        .columns
        .iter()
        .map(|column| match target.find_column(&column.name) {
            Some(found) => Column {
                logical_type: found.logical_type.clone(),
                ..column.clone()
            },
            None => column.clone(),
        })
        .collect();
    Schema::from_columns(columns)
}

/// Query returning `MAX(column)` as a single text cell
///
/// The value is rendered as text on the warehouse side so that the client
/// only ever decodes strings, then parsed with the column's logical type.
/// Zone-aware marks are rendered in UTC.
pub fn max_query(
    table: &TableIdentifier,
    column: &str,
    logical_type: &LogicalType,
    dialect: Dialect,
) -> Result<String, FetchError> {
    let table = qualified_name(table)?;
    let column = validate_identifier(column)?;

    let projection = match (dialect, logical_type) {
        (Dialect::Snowflake, LogicalType::Timestamp) => {
            format!("TO_VARCHAR(MAX({}), 'YYYY-MM-DD HH24:MI:SS.FF9')", column)
        }
        (Dialect::Snowflake, LogicalType::TimestampTz) => {
            format!(
                "TO_VARCHAR(CONVERT_TIMEZONE('UTC', MAX({})), 'YYYY-MM-DD HH24:MI:SS.FF9')",
                column
            )
        }
        (Dialect::Snowflake, LogicalType::Date) => {
            format!("TO_VARCHAR(MAX({}), 'YYYY-MM-DD')", column)
        }
        (Dialect::Snowflake, _) => format!("TO_VARCHAR(MAX({}))", column),
        (Dialect::Postgres, LogicalType::Timestamp) => {
            format!("to_char(MAX({}), 'YYYY-MM-DD HH24:MI:SS.US')", column)
        }
        (Dialect::Postgres, LogicalType::TimestampTz) => {
            format!("to_char(MAX({}) AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS.US')", column)
        }
        (Dialect::Postgres, LogicalType::Date) => {
            format!("to_char(MAX({}), 'YYYY-MM-DD')", column)
        }
        (Dialect::Postgres, _) => format!("MAX({})::text", column),
    };

    Ok(format!("SELECT {} AS HIGH_WATER_MARK FROM {}", projection, table))
}

/// Multi-row INSERT statements, at most `batch_size` rows each
pub fn insert_statements(
    table: &TableIdentifier,
    schema: &Schema,
    rows: &[Record],
    batch_size: usize,
    dialect: Dialect,
) -> Result<Vec<String>, FetchError> {
    let table = qualified_name(table)?;
    let columns = schema
        .columns
        .iter()
        .map(|c| validate_identifier(&c.name))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    let types: Vec<&LogicalType> = schema.columns.iter().map(|c| &c.logical_type).collect();

    let statements = rows
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let values = chunk
                .iter()
                .map(|row| {
                    let cells = row
                        .iter()
                        .zip(&types)
                        .map(|(v, t)| render_cell(v, t, dialect))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({})", cells)
                })
                .collect::<Vec<_>>()
                .join(",\n");
            format!("INSERT INTO {} ({}) VALUES\n{}", table, columns, values)
        })
        .collect();

    Ok(statements)
}
