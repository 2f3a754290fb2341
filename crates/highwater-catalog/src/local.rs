//! Filesystem-backed catalog and warehouse
//!
//! `LocalCatalog` plays the role of a catalog service: a `catalog.toml`
//! registers tables by `(database, name)` with a column list and the
//! location of a JSON-lines data file.
//!
//! ```toml
//! [[tables]]
//! database = "sales"
//! name = "orders"
//! location = "sales/orders.jsonl"
//! columns = [
//!     { name = "order_id", type = "int" },
//!     { name = "updated_at", type = "timestamp" },
//! ]
//! ```
//!
//! `LocalWarehouse` stores each target table as `<fqn>.jsonl` next to a
//! `<fqn>.schema.json` sidecar written by the first append.

use crate::adapter::{FetchError, SourceCatalog, TableIdentifier, WarehouseAdapter};
use highwater_core::{Column, RecordSet, Schema, Value};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Name of the registry file inside a catalog root
pub const CATALOG_FILE: &str = "catalog.toml";

/// A table registered in `catalog.toml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub database: String,
    pub name: String,

    /// Data file, relative to the catalog root
    pub location: PathBuf,

    pub columns: Vec<Column>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tables: Vec<CatalogEntry>,
}

/// Catalog of JSON-lines tables described by `catalog.toml`
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    root: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl LocalCatalog {
    /// Open the catalog rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let root = root.into();
        let path = root.join(CATALOG_FILE);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            FetchError::ConfigError(format!("Cannot read catalog {}: {}", path.display(), e))
        })?;
        let file: CatalogFile = toml::from_str(&contents).map_err(|e| {
            FetchError::ConfigError(format!("Invalid catalog {}: {}", path.display(), e))
        })?;

        Ok(Self { root, entries: file.tables })
    }

    /// Registered tables
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Find the entry for a table.
    ///
    /// Without a database the name must be unambiguous across databases.
    pub fn entry(&self, table: &TableIdentifier) -> Result<&CatalogEntry, FetchError> {
        let mut matches = self.entries.iter().filter(|e| {
            e.name == table.table
                && table.database.as_deref().map_or(true, |db| db == e.database)
        });

        match (matches.next(), matches.next()) {
            (Some(entry), None) => Ok(entry),
            (None, _) => Err(FetchError::TableNotFound(table.fqn())),
            (Some(_), Some(_)) => Err(FetchError::ConfigError(format!(
                "Table '{}' is registered in several databases; qualify it",
                table.table
            ))),
        }
    }
}

#[async_trait::async_trait]
impl SourceCatalog for LocalCatalog {
    fn name(&self) -> &'static str {
        "Local"
    }

    async fn read_table(&self, table: &TableIdentifier) -> Result<RecordSet, FetchError> {
        let entry = self.entry(table)?;
        let path = self.root.join(&entry.location);
        let schema = Schema::from_columns(entry.columns.clone());

        let objects = read_json_lines(&path).await?.ok_or_else(|| {
            FetchError::ConfigError(format!(
                "Data file {} for {} is missing",
                path.display(),
                table.fqn()
            ))
        })?;

        tracing::debug!(table = %table, rows = objects.len(), "read catalog table");
        RecordSet::from_json_rows(schema, &objects)
            .map_err(|e| FetchError::InvalidResponse(format!("{}: {}", path.display(), e)))
    }
}

/// Warehouse of JSON-lines tables under a root directory
#[derive(Debug, Clone)]
pub struct LocalWarehouse {
    root: PathBuf,
}

impl LocalWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, table: &TableIdentifier) -> PathBuf {
        self.root.join(format!("{}.jsonl", table.fqn()))
    }

    fn schema_path(&self, table: &TableIdentifier) -> PathBuf {
        self.root.join(format!("{}.schema.json", table.fqn()))
    }

    async fn read_records(&self, table: &TableIdentifier) -> Result<RecordSet, FetchError> {
        let schema = self.fetch_schema(table).await?;
        let objects = read_json_lines(&self.data_path(table)).await?.unwrap_or_default();
        RecordSet::from_json_rows(schema, &objects)
            .map_err(|e| FetchError::InvalidResponse(format!("{}: {}", table.fqn(), e)))
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for LocalWarehouse {
    fn name(&self) -> &'static str {
        "Local"
    }

    async fn fetch_schema(&self, table: &TableIdentifier) -> Result<Schema, FetchError> {
        let path = self.schema_path(table);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::TableNotFound(table.fqn()));
            }
            Err(e) => return Err(io_error(&path, e)),
        };

        serde_json::from_str(&contents)
            .map_err(|e| FetchError::InvalidResponse(format!("{}: {}", path.display(), e)))
    }

    async fn max_value(&self, table: &TableIdentifier, column: &str) -> Result<Option<Value>, FetchError> {
        let records = self.read_records(table).await?;
        if records.schema.index_of(column).is_none() {
            return Err(FetchError::QueryError(format!(
                "Column '{}' does not exist in {}",
                column,
                table.fqn()
            )));
        }
        Ok(records.max_value(column))
    }

    async fn append(&self, table: &TableIdentifier, records: &RecordSet) -> Result<usize, FetchError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;

        // The first append defines the table
        let schema = match self.fetch_schema(table).await {
            Ok(schema) => schema,
            Err(FetchError::TableNotFound(_)) => {
                let path = self.schema_path(table);
                let json = serde_json::to_string_pretty(&records.schema)
                    .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
                tokio::fs::write(&path, json).await.map_err(|e| io_error(&path, e))?;
                records.schema.clone()
            }
            Err(e) => return Err(e),
        };

        let mut aligned = RecordSet::empty(schema);
        let dropped = aligned.unmatched_columns(records);
        if !dropped.is_empty() {
            tracing::warn!(
                table = %table,
                columns = ?dropped,
                "source columns missing from target schema are not written"
            );
        }
        aligned.extend_from(records);

        let mut buffer = String::new();
        for row in aligned.to_json_rows() {
            buffer.push_str(&row.to_string());
            buffer.push('\n');
        }

        let path = self.data_path(table);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        file.write_all(buffer.as_bytes()).await.map_err(|e| io_error(&path, e))?;
        file.flush().await.map_err(|e| io_error(&path, e))?;

        Ok(aligned.len())
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(FetchError::ConfigError(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            // Created on first append
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.root, e)),
        }
    }
}

/// Read a JSON-lines file; `Ok(None)` when the file does not exist
async fn read_json_lines(path: &Path) -> Result<Option<Vec<serde_json::Value>>, FetchError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, e)),
    };

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                FetchError::InvalidResponse(format!("{}:{}: {}", path.display(), idx + 1, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn io_error(path: &Path, error: std::io::Error) -> FetchError {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => {
            FetchError::PermissionDenied(format!("{}: {}", path.display(), error))
        }
        _ => FetchError::NetworkError(format!("{}: {}", path.display(), error)),
    }
}
