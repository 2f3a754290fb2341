//! Connector traits for the source catalog and the target warehouse

use highwater_core::{RecordSet, Schema, Value};
use std::fmt;

/// Identifies a table in a catalog or warehouse.
///
/// Database and schema are optional: a bare table name is resolved by the
/// connection's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    /// Database name
    pub database: Option<String>,

    /// Schema name
    pub schema: Option<String>,

    /// Table name
    pub table: String,
}

impl TableIdentifier {
    /// Create a fully qualified table identifier
    pub fn new(database: impl Into<String>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            schema: Some(schema.into()),
            table: table.into(),
        }
    }

    /// A catalog table addressed as `database.table`
    pub fn catalog(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            schema: None,
            table: table.into(),
        }
    }

    /// An unqualified table name
    pub fn bare(table: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: None,
            table: table.into(),
        }
    }

    /// Parse `table`, `schema.table` or `database.schema.table`
    pub fn parse(name: &str) -> Result<Self, FetchError> {
        let parts: Vec<&str> = name.split('.').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(FetchError::ConfigError(format!("Invalid table name '{}'", name)));
        }

        match parts.as_slice() {
            [table] => Ok(Self::bare(*table)),
            [schema, table] => Ok(Self {
                database: None,
                schema: Some(schema.to_string()),
                table: table.to_string(),
            }),
            [database, schema, table] => Ok(Self::new(*database, *schema, *table)),
            _ => Err(FetchError::ConfigError(format!(
                "Invalid table name '{}': expected at most database.schema.table",
                name
            ))),
        }
    }

    /// Fill in a missing database or schema from connection defaults
    pub fn with_defaults(mut self, database: Option<&str>, schema: Option<&str>) -> Self {
        if self.database.is_none() {
            self.database = database.map(str::to_string);
        }
        if self.schema.is_none() {
            self.schema = schema.map(str::to_string);
        }
        self
    }

    /// Get fully qualified name (present parts joined by '.')
    pub fn fqn(&self) -> String {
        [self.database.as_deref(), self.schema.as_deref(), Some(self.table.as_str())]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// Errors that can occur when talking to a catalog or warehouse
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FetchError {
    /// Whether the error means the table does not exist (as opposed to the
    /// table being unreachable)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound(_))
    }

    /// Reclassify an error raised after the table was already found.
    ///
    /// A "not found" at that point is a read failure, not a missing table.
    pub fn on_existing_table(self) -> Self {
        match self {
            Self::TableNotFound(table) => {
                Self::QueryError(format!("{} was found but could not be read", table))
            }
            other => other,
        }
    }
}

/// Read side of the pipeline: a catalog-registered source table
#[async_trait::async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Get the catalog name (e.g., "Local", "Mock")
    fn name(&self) -> &'static str;

    /// Read every row of a registered table
    async fn read_table(&self, table: &TableIdentifier) -> Result<RecordSet, FetchError>;
}

/// Target side of the pipeline: a warehouse table that is read for its
/// high-water mark and appended to
#[async_trait::async_trait]
pub trait WarehouseAdapter: Send + Sync {
    /// Get the adapter name (e.g., "Snowflake", "PostgreSQL")
    fn name(&self) -> &'static str;

    /// Fetch the schema for a specific table
    ///
    /// Returns `FetchError::TableNotFound` when the table does not exist.
    async fn fetch_schema(&self, table: &TableIdentifier) -> Result<Schema, FetchError>;

    /// `MAX(column)` over the table
    ///
    /// `Ok(None)` means the table exists but has no non-null value in the
    /// column. A missing table is `FetchError::TableNotFound`, never `Ok(None)`.
    async fn max_value(&self, table: &TableIdentifier, column: &str) -> Result<Option<Value>, FetchError>;

    /// Append rows to the table (no upsert, no dedup), returning rows written
    async fn append(&self, table: &TableIdentifier, records: &RecordSet) -> Result<usize, FetchError>;

    /// Test the connection to the warehouse
    ///
    /// This is useful for validating credentials before a load.
    async fn test_connection(&self) -> Result<(), FetchError>;
}
