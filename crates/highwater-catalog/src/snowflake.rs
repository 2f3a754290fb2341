//! Snowflake warehouse adapter
//!
//! Reads the target schema from `INFORMATION_SCHEMA.COLUMNS`, the high-water
//! mark with a `MAX` query rendered to text on the server, and appends with
//! batched multi-row `INSERT` statements. It requires:
//! - USAGE on the database and schema
//! - SELECT and INSERT on the target table
//!
//! ## Authentication Methods
//!
//! 1. Password authentication (username/password)
//! 2. Key-pair authentication (private key PEM)
//!
//! ## Usage
//!
//! ```rust,ignore
//! let adapter = SnowflakeAdapter::new("xy12345.us-east-1", "loader", "password")
//!     .with_warehouse("LOAD_WH")
//!     .with_database("ANALYTICS")
//!     .with_schema("PUBLIC")
//!     .with_role("LOADER")
//!     .build()?;
//! ```
//!
//! Reference: https://docs.snowflake.com/en/sql-reference/info-schema

use crate::adapter::{FetchError, TableIdentifier, WarehouseAdapter};
use crate::sql::{self, Dialect};
use highwater_core::{Column, LogicalType, Nullability, RecordSet, Schema, Value};

#[cfg(feature = "snowflake")]
use snowflake_api::{QueryResult, SnowflakeApi};

#[cfg(feature = "snowflake")]
use arrow_array::cast::AsArray;

#[cfg(feature = "snowflake")]
use arrow_array::Array;

/// Snowflake authentication credentials
#[derive(Clone)]
pub enum SnowflakeCredentials {
    /// Password-based authentication
    Password(String),
    /// Key-pair authentication (PEM format private key)
    PrivateKey(String),
}

/// Builder for SnowflakeAdapter
pub struct SnowflakeAdapterBuilder {
    account: String,
    username: String,
    credentials: SnowflakeCredentials,
    warehouse: Option<String>,
    role: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    batch_size: usize,
}

impl SnowflakeAdapterBuilder {
    /// Create new builder with password authentication
    pub fn with_password(
        account: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::with_credentials(account, username, SnowflakeCredentials::Password(password.into()))
    }

    /// Create new builder with key-pair authentication
    pub fn with_key_pair(
        account: impl Into<String>,
        username: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        Self::with_credentials(account, username, SnowflakeCredentials::PrivateKey(private_key_pem.into()))
    }

    fn with_credentials(
        account: impl Into<String>,
        username: impl Into<String>,
        credentials: SnowflakeCredentials,
    ) -> Self {
        Self {
            account: account.into(),
            username: username.into(),
            credentials,
            warehouse: None,
            role: None,
            database: None,
            schema: None,
            batch_size: 1000,
        }
    }

    /// Set the warehouse to use
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    /// Set the role to use
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the default database for unqualified table names
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the default schema for unqualified table names
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the maximum rows per INSERT statement
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Build the adapter
    #[cfg(feature = "snowflake")]
    pub fn build(self) -> Result<SnowflakeAdapter, FetchError> {
        let api = match &self.credentials {
            SnowflakeCredentials::Password(password) => {
                SnowflakeApi::with_password_auth(
                    &self.account,
                    self.warehouse.as_deref(),
                    self.database.as_deref(),
                    self.schema.as_deref(),
                    &self.username,
                    self.role.as_deref(),
                    password,
                )
                .map_err(|e| FetchError::AuthenticationError(format!(
                    "Failed to authenticate with Snowflake: {}",
                    e
                )))?
            }
            SnowflakeCredentials::PrivateKey(private_key_pem) => {
                SnowflakeApi::with_certificate_auth(
                    &self.account,
                    self.warehouse.as_deref(),
                    self.database.as_deref(),
                    self.schema.as_deref(),
                    &self.username,
                    self.role.as_deref(),
                    private_key_pem,
                )
                .map_err(|e| FetchError::AuthenticationError(format!(
                    "Failed to authenticate with key-pair: {}",
                    e
                )))?
            }
        };

        Ok(SnowflakeAdapter {
            api,
            account: self.account,
            database: self.database,
            schema: self.schema,
            batch_size: self.batch_size,
        })
    }

    /// Build without snowflake feature
    #[cfg(not(feature = "snowflake"))]
    pub fn build(self) -> Result<SnowflakeAdapter, FetchError> {
        Err(FetchError::ConfigError(
            "Snowflake support not compiled. Rebuild with: cargo build --features snowflake".to_string()
        ))
    }
}

/// Snowflake warehouse adapter
pub struct SnowflakeAdapter {
    #[cfg(feature = "snowflake")]
    api: SnowflakeApi,

    account: String,
    database: Option<String>,
    schema: Option<String>,
    batch_size: usize,
}

impl SnowflakeAdapter {
    /// Create a new Snowflake adapter with password authentication (returns builder)
    pub fn new(
        account: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> SnowflakeAdapterBuilder {
        SnowflakeAdapterBuilder::with_password(account, username, password)
    }

    /// Account identifier this adapter connects to
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Qualify a table with the connection's default database and schema.
    ///
    /// Snowflake stores unquoted identifiers upper-cased, so the parts are
    /// folded to match INFORMATION_SCHEMA contents.
    fn resolve(&self, table: &TableIdentifier) -> Result<TableIdentifier, FetchError> {
        let table = table
            .clone()
            .with_defaults(self.database.as_deref(), self.schema.as_deref());

        match (&table.database, &table.schema) {
            (Some(database), Some(schema)) => Ok(TableIdentifier::new(
                database.to_uppercase(),
                schema.to_uppercase(),
                table.table.to_uppercase(),
            )),
            _ => Err(FetchError::ConfigError(format!(
                "Table '{}' needs a database and schema (set them on the connection or qualify the name)",
                table.fqn()
            ))),
        }
    }

    /// Convert Snowflake type to LogicalType
    pub fn map_snowflake_type(sf_type: &str) -> LogicalType {
        // Snowflake types can include precision/scale like "NUMBER(38,0)"
        let base_type = sf_type.split('(').next()
            .unwrap_or(sf_type)
            .trim()
            .to_uppercase();

        match base_type.as_str() {
            "BOOLEAN" => LogicalType::Bool,

            "NUMBER" | "DECIMAL" | "NUMERIC" => {
                // Check if it's effectively an integer (scale = 0)
                if Self::is_integer_number(sf_type) {
                    LogicalType::Int
                } else {
                    Self::parse_decimal_type(sf_type)
                }
            }

            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "BYTEINT" => {
                LogicalType::Int
            }

            "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "REAL" => {
                LogicalType::Float
            }

            "VARCHAR" | "STRING" | "TEXT" | "CHAR" | "CHARACTER" | "NVARCHAR" | "NCHAR" => {
                LogicalType::String
            }

            "BINARY" | "VARBINARY" => LogicalType::String,

            "DATE" => LogicalType::Date,

            "DATETIME" | "TIMESTAMP" | "TIMESTAMP_NTZ" => LogicalType::Timestamp,

            "TIMESTAMP_LTZ" | "TIMESTAMP_TZ" => LogicalType::TimestampTz,

            "VARIANT" | "OBJECT" | "ARRAY" => LogicalType::Json,

            "GEOGRAPHY" | "GEOMETRY" | "TIME" => LogicalType::String,

            _ => LogicalType::Unknown,
        }
    }

    /// Check if NUMBER type is effectively an integer
    fn is_integer_number(type_str: &str) -> bool {
        // NUMBER without parameters or with scale 0 is integer
        if !type_str.contains('(') {
            return false; // Bare NUMBER is treated as decimal
        }

        if let Some(params) = type_str.split('(').nth(1) {
            if let Some(params) = params.strip_suffix(')') {
                let parts: Vec<&str> = params.split(',').collect();
                if parts.len() == 2 {
                    if let Ok(scale) = parts[1].trim().parse::<i32>() {
                        return scale == 0;
                    }
                } else if parts.len() == 1 {
                    // NUMBER(precision) with no scale defaults to 0
                    return true;
                }
            }
        }

        false
    }

    /// Parse decimal type with precision and scale
    fn parse_decimal_type(type_str: &str) -> LogicalType {
        if let Some(params) = type_str.split('(').nth(1) {
            if let Some(params) = params.strip_suffix(')') {
                let parts: Vec<&str> = params.split(',').collect();
                if parts.len() == 2 {
                    let precision = parts[0].trim().parse().ok();
                    let scale = parts[1].trim().parse().ok();
                    return LogicalType::Decimal { precision, scale };
                } else if parts.len() == 1 {
                    let precision = parts[0].trim().parse().ok();
                    return LogicalType::Decimal { precision, scale: Some(0) };
                }
            }
        }

        // Default Snowflake NUMBER precision
        LogicalType::Decimal {
            precision: Some(38),
            scale: Some(0),
        }
    }

    /// Map a Snowflake error message onto the fetch error taxonomy.
    ///
    /// Never yields `TableNotFound`: Snowflake reports missing warehouses,
    /// databases and unauthorized objects with the same "does not exist or
    /// not authorized" text. A missing table is only inferred from an empty
    /// INFORMATION_SCHEMA result.
    pub fn classify_error(message: &str, table: &TableIdentifier) -> FetchError {
        if message.contains("Insufficient privileges")
            || message.contains("Permission")
            || message.contains("not authorized")
        {
            FetchError::PermissionDenied(format!("Cannot access {}: {}", table.fqn(), message))
        } else if message.contains("Incorrect username or password") || message.contains("JWT") {
            FetchError::AuthenticationError(message.to_string())
        } else if message.contains("timed out") || message.contains("connection") {
            FetchError::NetworkError(message.to_string())
        } else {
            FetchError::QueryError(message.to_string())
        }
    }

    #[cfg(feature = "snowflake")]
    async fn exec(&self, query: &str, table: &TableIdentifier) -> Result<QueryResult, FetchError> {
        tracing::debug!(adapter = "Snowflake", %query, "executing");
        self.api
            .exec(query)
            .await
            .map_err(|e| Self::classify_error(&e.to_string(), table))
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for SnowflakeAdapter {
    fn name(&self) -> &'static str {
        "Snowflake"
    }

    #[cfg(feature = "snowflake")]
    async fn fetch_schema(&self, table: &TableIdentifier) -> Result<Schema, FetchError> {
        let table = self.resolve(table)?;
        let database = sql::validate_identifier(table.database.as_deref().unwrap_or_default())?;

        let query = format!(
            r#"
            SELECT
                COLUMN_NAME,
                DATA_TYPE,
                IS_NULLABLE,
                NUMERIC_PRECISION,
                NUMERIC_SCALE
            FROM {}.INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = '{}'
              AND TABLE_NAME = '{}'
            ORDER BY ORDINAL_POSITION
            "#,
            database,
            sql::escape_string(table.schema.as_deref().unwrap_or_default(), Dialect::Snowflake),
            sql::escape_string(&table.table, Dialect::Snowflake),
        );

        let mut columns = Vec::new();

        match self.exec(&query, &table).await? {
            QueryResult::Arrow(batches) => {
                for batch in batches {
                    let num_rows = batch.num_rows();
                    let schema = batch.schema();

                    let text_column = |name: &str| {
                        schema
                            .index_of(name)
                            .ok()
                            .and_then(|idx| batch.column(idx).as_string_opt::<i32>())
                            .ok_or_else(|| FetchError::InvalidResponse(format!("Missing {} column", name)))
                    };
                    let number_column = |name: &str| {
                        schema.index_of(name).ok().map(|idx| batch.column(idx).clone())
                    };

                    let col_name_array = text_column("COLUMN_NAME")?;
                    let data_type_array = text_column("DATA_TYPE")?;
                    let is_nullable_array = text_column("IS_NULLABLE")?;
                    let precision_array = number_column("NUMERIC_PRECISION");
                    let scale_array = number_column("NUMERIC_SCALE");

                    for row_idx in 0..num_rows {
                        let col_name = col_name_array.value(row_idx).to_string();
                        let data_type = data_type_array.value(row_idx);

                        // Build full type with precision/scale for numeric types
                        let full_type = if data_type == "NUMBER" {
                            let precision = precision_array.as_ref().and_then(|a| integer_at(a, row_idx));
                            let scale = scale_array.as_ref().and_then(|a| integer_at(a, row_idx));

                            match (precision, scale) {
                                (Some(p), Some(s)) => format!("NUMBER({},{})", p, s),
                                (Some(p), None) => format!("NUMBER({})", p),
                                _ => data_type.to_string(),
                            }
                        } else {
                            data_type.to_string()
                        };

                        let nullable = match is_nullable_array.value(row_idx).to_uppercase().as_str() {
                            "YES" => Nullability::Yes,
                            "NO" => Nullability::No,
                            _ => Nullability::Unknown,
                        };

                        columns.push(
                            Column::new(col_name, Self::map_snowflake_type(&full_type))
                                .with_nullability(nullable)
                        );
                    }
                }
            }
            QueryResult::Json(_) => {
                return Err(FetchError::InvalidResponse(
                    "Unexpected JSON result format".to_string()
                ));
            }
            QueryResult::Empty => {}
        }

        if columns.is_empty() {
            return Err(FetchError::TableNotFound(table.fqn()));
        }

        Ok(Schema::from_columns(columns))
    }

    #[cfg(not(feature = "snowflake"))]
    async fn fetch_schema(&self, _table: &TableIdentifier) -> Result<Schema, FetchError> {
        Err(not_compiled())
    }

    #[cfg(feature = "snowflake")]
    async fn max_value(&self, table: &TableIdentifier, column: &str) -> Result<Option<Value>, FetchError> {
        let table = self.resolve(table)?;
        let schema = self.fetch_schema(&table).await?;
        let target_column = schema.find_column(column).ok_or_else(|| {
            FetchError::QueryError(format!("Column '{}' does not exist in {}", column, table.fqn()))
        })?;

        let query = sql::max_query(&table, &target_column.name, &target_column.logical_type, Dialect::Snowflake)?;

        let result = self
            .exec(&query, &table)
            .await
            .map_err(FetchError::on_existing_table)?;

        let text = match result {
            QueryResult::Arrow(batches) => {
                let batch = batches
                    .first()
                    .ok_or_else(|| FetchError::InvalidResponse("MAX query returned no batch".to_string()))?;
                if batch.num_rows() == 0 {
                    return Err(FetchError::InvalidResponse("MAX query returned no rows".to_string()));
                }
                let values = batch
                    .column(0)
                    .as_string_opt::<i32>()
                    .ok_or_else(|| FetchError::InvalidResponse("MAX query did not return text".to_string()))?;
                if values.is_null(0) {
                    None
                } else {
                    Some(values.value(0).to_string())
                }
            }
            QueryResult::Json(_) => {
                return Err(FetchError::InvalidResponse(
                    "Unexpected JSON result format".to_string()
                ));
            }
            QueryResult::Empty => None,
        };

        text.map(|t| Value::parse(&t, &target_column.logical_type))
            .transpose()
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))
    }

    #[cfg(not(feature = "snowflake"))]
    async fn max_value(&self, _table: &TableIdentifier, _column: &str) -> Result<Option<Value>, FetchError> {
        Err(not_compiled())
    }

    #[cfg(feature = "snowflake")]
    async fn append(&self, table: &TableIdentifier, records: &RecordSet) -> Result<usize, FetchError> {
        let table = self.resolve(table)?;
        let target = self.fetch_schema(&table).await?;
        let schema = sql::with_target_types(&records.schema, &target);
        let statements = sql::insert_statements(
            &table,
            &schema,
            &records.rows,
            self.batch_size,
            Dialect::Snowflake,
        )?;

        let mut written = 0;
        for (statement, chunk) in statements.iter().zip(records.rows.chunks(self.batch_size.max(1))) {
            self.exec(statement, &table).await?;
            written += chunk.len();
            tracing::debug!(table = %table, written, "inserted batch");
        }

        Ok(written)
    }

    #[cfg(not(feature = "snowflake"))]
    async fn append(&self, _table: &TableIdentifier, _records: &RecordSet) -> Result<usize, FetchError> {
        Err(not_compiled())
    }

    #[cfg(feature = "snowflake")]
    async fn test_connection(&self) -> Result<(), FetchError> {
        self.api.exec("SELECT 1")
            .await
            .map_err(|e| FetchError::NetworkError(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    #[cfg(not(feature = "snowflake"))]
    async fn test_connection(&self) -> Result<(), FetchError> {
        Err(not_compiled())
    }
}

/// Read an integer cell from a numeric INFORMATION_SCHEMA column, whatever
/// integer width the driver chose
#[cfg(feature = "snowflake")]
fn integer_at(array: &arrow_array::ArrayRef, row: usize) -> Option<i64> {
    use arrow_array::types::{Decimal128Type, Int16Type, Int32Type, Int64Type, Int8Type};

    if array.is_null(row) {
        return None;
    }
    if let Some(a) = array.as_primitive_opt::<Int64Type>() {
        return Some(a.value(row));
    }
    if let Some(a) = array.as_primitive_opt::<Int32Type>() {
        return Some(a.value(row) as i64);
    }
    if let Some(a) = array.as_primitive_opt::<Int16Type>() {
        return Some(a.value(row) as i64);
    }
    if let Some(a) = array.as_primitive_opt::<Int8Type>() {
        return Some(a.value(row) as i64);
    }
    array
        .as_primitive_opt::<Decimal128Type>()
        .and_then(|a| i64::try_from(a.value(row)).ok())
}

#[cfg(not(feature = "snowflake"))]
fn not_compiled() -> FetchError {
    FetchError::ConfigError(
        "Snowflake support not compiled. Rebuild with: cargo build --features snowflake".to_string()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("NUMBER(38,0)"), LogicalType::Int));
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("NUMBER(10,2)"), LogicalType::Decimal { .. }));
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("VARCHAR"), LogicalType::String));
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("BOOLEAN"), LogicalType::Bool));
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("TIMESTAMP_NTZ"), LogicalType::Timestamp));
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("TIMESTAMP_LTZ"), LogicalType::TimestampTz));
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("TIMESTAMP_TZ"), LogicalType::TimestampTz));
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("DATE"), LogicalType::Date));
        assert!(matches!(SnowflakeAdapter::map_snowflake_type("VARIANT"), LogicalType::Json));
    }

    #[test]
    fn test_integer_number_detection() {
        assert!(SnowflakeAdapter::is_integer_number("NUMBER(38,0)"));
        assert!(SnowflakeAdapter::is_integer_number("NUMBER(10)"));
        assert!(!SnowflakeAdapter::is_integer_number("NUMBER(10,2)"));
        assert!(!SnowflakeAdapter::is_integer_number("NUMBER")); // Bare NUMBER
    }

    #[test]
    fn test_parse_decimal_type() {
        assert_eq!(
            SnowflakeAdapter::parse_decimal_type("NUMBER(10,2)"),
            LogicalType::Decimal { precision: Some(10), scale: Some(2) }
        );
        assert_eq!(
            SnowflakeAdapter::parse_decimal_type("NUMBER"),
            LogicalType::Decimal { precision: Some(38), scale: Some(0) }
        );
    }

    #[test]
    fn test_error_classification() {
        let table = TableIdentifier::new("ANALYTICS", "PUBLIC", "ORDERS");

        let err = SnowflakeAdapter::classify_error(
            "SQL compilation error: Object 'ANALYTICS.PUBLIC.ORDERS' does not exist or not authorized.",
            &table,
        );
        assert!(matches!(err, FetchError::PermissionDenied(_)));

        let err = SnowflakeAdapter::classify_error("Insufficient privileges to operate on table", &table);
        assert!(matches!(err, FetchError::PermissionDenied(_)));

        let err = SnowflakeAdapter::classify_error("Incorrect username or password was specified.", &table);
        assert!(matches!(err, FetchError::AuthenticationError(_)));

        let err = SnowflakeAdapter::classify_error("request timed out", &table);
        assert!(matches!(err, FetchError::NetworkError(_)));

        let err = SnowflakeAdapter::classify_error("Numeric value 'abc' is not recognized", &table);
        assert!(matches!(err, FetchError::QueryError(_)));
    }

    #[test]
    fn test_missing_objects_are_not_missing_tables() {
        let table = TableIdentifier::new("ANALYTICS", "PUBLIC", "ORDERS");

        let err = SnowflakeAdapter::classify_error(
            "SQL compilation error: Warehouse 'LOAD_WH' does not exist or not authorized.",
            &table,
        );
        assert!(!err.is_not_found());

        let err = SnowflakeAdapter::classify_error("Database 'ANALYTICS' does not exist.", &table);
        assert!(matches!(err, FetchError::QueryError(_)));

        let err = SnowflakeAdapter::classify_error("Stage not found", &table);
        assert!(!err.is_not_found());
    }

    #[cfg(not(feature = "snowflake"))]
    #[test]
    fn test_build_without_feature() {
        let result = SnowflakeAdapter::new("account", "user", "pass")
            .with_database("ANALYTICS")
            .build();
        assert!(matches!(result, Err(FetchError::ConfigError(_))));
    }
}
