//! PostgreSQL warehouse adapter
//!
//! Reads the target schema from `information_schema.columns`, the high-water
//! mark with `MAX(column)` rendered to text, and appends inside a single
//! transaction so a failed load leaves the target untouched. Works with:
//! - PostgreSQL 9.4+
//! - Amazon Redshift
//! - Other PostgreSQL-compatible databases
//!
//! ## Authentication
//!
//! 1. Direct password authentication
//! 2. Connection string (PostgreSQL URL format)
//! 3. TLS/SSL connections via native-tls
//!
//! ## Usage
//!
//! ```rust,ignore
//! let adapter = PostgresAdapter::connect("localhost", 5432, "analytics", "loader", "password")
//!     .await?
//!     .with_schema("staging");
//!
//! let adapter = PostgresAdapter::from_connection_string_with_tls(
//!     "host=db.example.com port=5432 dbname=analytics user=loader password=secret"
//! ).await?;
//! ```
//!
//! Reference: https://www.postgresql.org/docs/current/information-schema-columns.html

use crate::adapter::{FetchError, TableIdentifier, WarehouseAdapter};
use crate::sql::{self, Dialect};
use highwater_core::{Column, LogicalType, Nullability, RecordSet, Schema, Value};

#[cfg(feature = "postgres")]
use tokio_postgres::{config::Host, Client, Config as PgConfig, NoTls};

#[cfg(feature = "postgres")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "postgres")]
use native_tls::TlsConnector;

/// SQLSTATE codes the adapter distinguishes
const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_SCHEMA: &str = "3F000";
const INSUFFICIENT_PRIVILEGE: &str = "42501";
const INVALID_PASSWORD: &str = "28P01";

/// Columns of one table. `information_schema` only covers the current
/// database, so the catalog is not filtered on.
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
const COLUMNS_QUERY: &str = r#"
    SELECT
        column_name,
        data_type,
        is_nullable,
        ordinal_position,
        numeric_precision,
        numeric_scale,
        udt_name
    FROM information_schema.columns
    WHERE table_schema = $1
      AND table_name = $2
    ORDER BY ordinal_position
"#;

/// PostgreSQL warehouse adapter
pub struct PostgresAdapter {
    #[cfg(feature = "postgres")]
    client: Client,

    host: String,
    port: u16,
    database: String,

    /// Schema used for unqualified table names
    schema: String,

    /// Maximum rows per INSERT statement
    batch_size: usize,
}

impl PostgresAdapter {
    /// Connect with direct credentials over a plain connection.
    /// For TLS connections, use `connect_with_tls` instead.
    #[cfg(feature = "postgres")]
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let host = host.into();
        let database = database.into();
        let config = credentials_config(&host, port, &database, &user.into(), &password.into());

        let (client, connection) = tokio_postgres::connect(&config, NoTls)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to connect to PostgreSQL at {}:{}: {}",
                host, port, e
            )))?;

        spawn_connection(connection, &host, port);

        Ok(Self::with_client(client, host, port, database))
    }

    #[cfg(not(feature = "postgres"))]
    pub async fn connect(
        _host: impl Into<String>,
        _port: u16,
        _database: impl Into<String>,
        _user: impl Into<String>,
        _password: impl Into<String>,
    ) -> Result<Self, FetchError> {
        Err(not_compiled())
    }

    /// Connect with direct credentials over TLS
    #[cfg(feature = "postgres")]
    pub async fn connect_with_tls(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let host = host.into();
        let database = database.into();
        let config = credentials_config(&host, port, &database, &user.into(), &password.into());

        let (client, connection) = tokio_postgres::connect(&config, tls_connector()?)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to connect to PostgreSQL at {}:{} with TLS: {}",
                host, port, e
            )))?;

        spawn_connection(connection, &host, port);

        Ok(Self::with_client(client, host, port, database))
    }

    #[cfg(not(feature = "postgres"))]
    pub async fn connect_with_tls(
        _host: impl Into<String>,
        _port: u16,
        _database: impl Into<String>,
        _user: impl Into<String>,
        _password: impl Into<String>,
    ) -> Result<Self, FetchError> {
        Err(not_compiled())
    }

    /// Connect from a connection string such as
    /// `host=localhost port=5432 dbname=mydb user=postgres password=secret`
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string(conn_str: &str) -> Result<Self, FetchError> {
        let (host, port, database) = describe_connection_string(conn_str)?;

        let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to connect: {}", e
            )))?;

        spawn_connection(connection, &host, port);

        Ok(Self::with_client(client, host, port, database))
    }

    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string(_conn_str: &str) -> Result<Self, FetchError> {
        Err(not_compiled())
    }

    /// Connect from a connection string, always using TLS
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string_with_tls(conn_str: &str) -> Result<Self, FetchError> {
        let (host, port, database) = describe_connection_string(conn_str)?;

        let (client, connection) = tokio_postgres::connect(conn_str, tls_connector()?)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to connect with TLS: {}", e
            )))?;

        spawn_connection(connection, &host, port);

        Ok(Self::with_client(client, host, port, database))
    }

    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string_with_tls(_conn_str: &str) -> Result<Self, FetchError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    fn with_client(client: Client, host: String, port: u16, database: String) -> Self {
        Self {
            client,
            host,
            port,
            database,
            schema: "public".to_string(),
            batch_size: 1000,
        }
    }

    /// Set the schema used for unqualified table names (default `public`)
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Set the maximum rows per INSERT statement
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Get the connection host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the connection port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the database name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Qualify a table with the connection's schema. PostgreSQL folds
    /// unquoted identifiers to lower case.
    fn resolve(&self, table: &TableIdentifier) -> TableIdentifier {
        let schema = table.schema.as_deref().unwrap_or(&self.schema);
        TableIdentifier {
            database: None,
            schema: Some(schema.to_lowercase()),
            table: table.table.to_lowercase(),
        }
    }

    /// Convert PostgreSQL type to LogicalType
    ///
    /// - **Integer**: `smallint`, `integer`, `bigint`, `serial`, `bigserial`
    /// - **Numeric**: `numeric(p,s)`, `decimal(p,s)`, `money`
    /// - **Date/Time**: `date`, `timestamp`, `timestamptz`
    /// - **JSON**: `json`, `jsonb` and array types
    ///
    /// Time-of-day, interval, network and geometric types are carried as text.
    pub fn map_postgres_type(pg_type: &str) -> LogicalType {
        let base_type = pg_type.split('(').next()
            .unwrap_or(pg_type)
            .trim()
            .to_lowercase();

        match base_type.as_str() {
            "boolean" | "bool" => LogicalType::Bool,

            "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" => LogicalType::Int,
            "serial" | "serial4" | "bigserial" | "serial8" | "smallserial" | "serial2" => LogicalType::Int,
            "oid" => LogicalType::Int,

            "real" | "float4" | "double precision" | "float8" | "float" => LogicalType::Float,

            "numeric" | "decimal" => Self::parse_numeric_type(pg_type),

            "money" => LogicalType::Decimal {
                precision: Some(19),
                scale: Some(2),
            },

            "character varying" | "varchar" | "character" | "char" | "bpchar" | "text" | "name"
            | "citext" | "uuid" | "bytea" | "xml" => LogicalType::String,

            "date" => LogicalType::Date,
            "timestamp without time zone" | "timestamp" => LogicalType::Timestamp,
            "timestamp with time zone" | "timestamptz" => LogicalType::TimestampTz,
            "time without time zone" | "time" | "time with time zone" | "timetz" | "interval" => {
                LogicalType::String
            }

            "json" | "jsonb" | "array" => LogicalType::Json,

            "inet" | "cidr" | "macaddr" | "macaddr8" => LogicalType::String,
            "point" | "line" | "lseg" | "box" | "path" | "polygon" | "circle" => LogicalType::String,

            _ => {
                // "integer[]" or the internal "_int4" spelling
                if pg_type.ends_with("[]") || pg_type.starts_with('_') {
                    LogicalType::Json
                } else {
                    LogicalType::Unknown
                }
            }
        }
    }

    /// Parse numeric type with precision and scale
    fn parse_numeric_type(type_str: &str) -> LogicalType {
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

        // NUMERIC without precision has arbitrary precision
        LogicalType::Decimal {
            precision: None,
            scale: None,
        }
    }

    /// Map a server error (SQLSTATE plus message) onto the fetch error taxonomy
    pub fn classify_error(code: Option<&str>, message: &str, table: &TableIdentifier) -> FetchError {
        match code {
            Some(UNDEFINED_TABLE) | Some(UNDEFINED_SCHEMA) => FetchError::TableNotFound(table.fqn()),
            Some(INSUFFICIENT_PRIVILEGE) => {
                FetchError::PermissionDenied(format!("Cannot access {}: {}", table.fqn(), message))
            }
            Some(INVALID_PASSWORD) => FetchError::AuthenticationError(message.to_string()),
            Some(_) => FetchError::QueryError(message.to_string()),
            // No SQLSTATE means the error came from the client or the socket
            None => FetchError::NetworkError(message.to_string()),
        }
    }

    #[cfg(feature = "postgres")]
    fn map_error(error: tokio_postgres::Error, table: &TableIdentifier) -> FetchError {
        let code = error.code().map(|state| state.code().to_string());
        Self::classify_error(code.as_deref(), &error.to_string(), table)
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    #[cfg(feature = "postgres")]
    async fn fetch_schema(&self, table: &TableIdentifier) -> Result<Schema, FetchError> {
        let table = self.resolve(table);
        let schema_name = table.schema.clone().unwrap_or_default();

        let rows = self.client
            .query(COLUMNS_QUERY, &[&schema_name, &table.table])
            .await
            .map_err(|e| Self::map_error(e, &table))?;

        let mut columns = Vec::new();

        for row in rows {
            let col_name: String = row.get(0);
            let data_type: String = row.get(1);
            let is_nullable: String = row.get(2);
            let numeric_precision: Option<i32> = row.get(4);
            let numeric_scale: Option<i32> = row.get(5);
            let udt_name: String = row.get(6);

            let full_type = if data_type == "numeric" || data_type == "decimal" {
                match (numeric_precision, numeric_scale) {
                    (Some(p), Some(s)) => format!("numeric({},{})", p, s),
                    (Some(p), None) => format!("numeric({})", p),
                    _ => data_type.clone(),
                }
            } else if udt_name.starts_with('_') {
                format!("{}[]", &udt_name[1..])
            } else {
                data_type.clone()
            };

            let nullable = match is_nullable.to_uppercase().as_str() {
                "YES" => Nullability::Yes,
                "NO" => Nullability::No,
                _ => Nullability::Unknown,
            };

            columns.push(
                Column::new(col_name, Self::map_postgres_type(&full_type))
                    .with_nullability(nullable)
            );
        }

        if columns.is_empty() {
            return Err(FetchError::TableNotFound(table.fqn()));
        }

        Ok(Schema::from_columns(columns))
    }

    #[cfg(not(feature = "postgres"))]
    async fn fetch_schema(&self, _table: &TableIdentifier) -> Result<Schema, FetchError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn max_value(&self, table: &TableIdentifier, column: &str) -> Result<Option<Value>, FetchError> {
        let table = self.resolve(table);
        let schema = self.fetch_schema(&table).await?;
        let target_column = schema.find_column(column).ok_or_else(|| {
            FetchError::QueryError(format!("Column '{}' does not exist in {}", column, table.fqn()))
        })?;

        let query = sql::max_query(&table, &target_column.name, &target_column.logical_type, Dialect::Postgres)?;
        tracing::debug!(adapter = "PostgreSQL", %query, "executing");

        let row = self.client
            .query_one(query.as_str(), &[])
            .await
            .map_err(|e| Self::map_error(e, &table).on_existing_table())?;
        let text: Option<String> = row
            .try_get(0)
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

        text.map(|t| Value::parse(&t, &target_column.logical_type))
            .transpose()
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))
    }

    #[cfg(not(feature = "postgres"))]
    async fn max_value(&self, _table: &TableIdentifier, _column: &str) -> Result<Option<Value>, FetchError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn append(&self, table: &TableIdentifier, records: &RecordSet) -> Result<usize, FetchError> {
        let table = self.resolve(table);
        let target = self.fetch_schema(&table).await?;
        let schema = sql::with_target_types(&records.schema, &target);
        let statements = sql::insert_statements(
            &table,
            &schema,
            &records.rows,
            self.batch_size,
            Dialect::Postgres,
        )?;

        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| Self::map_error(e, &table))?;

        for statement in &statements {
            if let Err(e) = self.client.batch_execute(statement).await {
                let error = Self::map_error(e, &table);
                if let Err(rollback) = self.client.batch_execute("ROLLBACK").await {
                    tracing::warn!(table = %table, error = %rollback, "rollback failed");
                }
                return Err(error);
            }
        }

        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| Self::map_error(e, &table))?;

        tracing::debug!(table = %table, rows = records.len(), batches = statements.len(), "append committed");
        Ok(records.len())
    }

    #[cfg(not(feature = "postgres"))]
    async fn append(&self, _table: &TableIdentifier, _records: &RecordSet) -> Result<usize, FetchError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn test_connection(&self) -> Result<(), FetchError> {
        self.client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| FetchError::NetworkError(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    #[cfg(not(feature = "postgres"))]
    async fn test_connection(&self) -> Result<(), FetchError> {
        Err(not_compiled())
    }
}

#[cfg(feature = "postgres")]
fn credentials_config(host: &str, port: u16, database: &str, user: &str, password: &str) -> String {
    format!(
        "host={} port={} dbname={} user={} password={}",
        host, port, database, user, password
    )
}

#[cfg(feature = "postgres")]
fn describe_connection_string(conn_str: &str) -> Result<(String, u16, String), FetchError> {
    let config: PgConfig = conn_str.parse()
        .map_err(|e| FetchError::ConfigError(format!(
            "Invalid connection string: {}", e
        )))?;

    let host = config.get_hosts()
        .first()
        .map(|h| match h {
            Host::Tcp(name) => name.clone(),
            #[cfg(unix)]
            Host::Unix(path) => path.display().to_string(),
        })
        .unwrap_or_else(|| "localhost".to_string());
    let port = config.get_ports()
        .first()
        .copied()
        .unwrap_or(5432);
    // The server defaults the database to the user name
    let database = config.get_dbname()
        .or_else(|| config.get_user())
        .unwrap_or("postgres")
        .to_string();

    Ok((host, port, database))
}

#[cfg(feature = "postgres")]
fn tls_connector() -> Result<MakeTlsConnector, FetchError> {
    let connector = TlsConnector::builder()
        .build()
        .map_err(|e| FetchError::ConfigError(format!(
            "Failed to create TLS connector: {}", e
        )))?;
    Ok(MakeTlsConnector::new(connector))
}

/// Drive the connection in the background; the client is useless without it
#[cfg(feature = "postgres")]
fn spawn_connection<C>(connection: C, host: &str, port: u16)
where
    C: std::future::Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    let host = host.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(%host, port, error = %e, "PostgreSQL connection error");
        }
    });
}

#[cfg(not(feature = "postgres"))]
fn not_compiled() -> FetchError {
    FetchError::ConfigError(
        "PostgreSQL support not compiled. Rebuild with: cargo build --features postgres".to_string()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_type_mapping() {
        assert!(matches!(PostgresAdapter::map_postgres_type("boolean"), LogicalType::Bool));
        assert!(matches!(PostgresAdapter::map_postgres_type("integer"), LogicalType::Int));
        assert!(matches!(PostgresAdapter::map_postgres_type("bigint"), LogicalType::Int));
        assert!(matches!(PostgresAdapter::map_postgres_type("bigserial"), LogicalType::Int));
        assert!(matches!(PostgresAdapter::map_postgres_type("double precision"), LogicalType::Float));
        assert!(matches!(PostgresAdapter::map_postgres_type("character varying"), LogicalType::String));
        assert!(matches!(PostgresAdapter::map_postgres_type("uuid"), LogicalType::String));
    }

    #[test]
    fn test_temporal_type_mapping() {
        assert!(matches!(PostgresAdapter::map_postgres_type("date"), LogicalType::Date));
        assert!(matches!(
            PostgresAdapter::map_postgres_type("timestamp without time zone"),
            LogicalType::Timestamp
        ));
        assert!(matches!(
            PostgresAdapter::map_postgres_type("timestamp with time zone"),
            LogicalType::TimestampTz
        ));
        // A time of day carries no date, so it cannot act as a timestamp watermark
        assert!(matches!(PostgresAdapter::map_postgres_type("time"), LogicalType::String));
    }

    #[test]
    fn test_numeric_and_json_mapping() {
        assert_eq!(
            PostgresAdapter::map_postgres_type("numeric(10,2)"),
            LogicalType::Decimal { precision: Some(10), scale: Some(2) }
        );
        assert_eq!(
            PostgresAdapter::map_postgres_type("numeric"),
            LogicalType::Decimal { precision: None, scale: None }
        );
        assert!(matches!(PostgresAdapter::map_postgres_type("jsonb"), LogicalType::Json));
        assert!(matches!(PostgresAdapter::map_postgres_type("int4[]"), LogicalType::Json));
        assert!(matches!(PostgresAdapter::map_postgres_type("tsvector"), LogicalType::Unknown));
    }

    #[test]
    fn test_error_classification() {
        let table = TableIdentifier {
            database: None,
            schema: Some("public".to_string()),
            table: "orders".to_string(),
        };

        let err = PostgresAdapter::classify_error(Some("42P01"), "relation \"public.orders\" does not exist", &table);
        assert!(err.is_not_found());

        let err = PostgresAdapter::classify_error(Some("42501"), "permission denied for table orders", &table);
        assert!(matches!(err, FetchError::PermissionDenied(_)));

        let err = PostgresAdapter::classify_error(Some("42703"), "column \"nope\" does not exist", &table);
        assert!(matches!(err, FetchError::QueryError(_)));

        let err = PostgresAdapter::classify_error(None, "connection closed", &table);
        assert!(matches!(err, FetchError::NetworkError(_)));
    }

    #[test]
    fn test_columns_query_is_scoped_to_current_database() {
        assert!(!COLUMNS_QUERY.contains("table_catalog"));
        assert!(COLUMNS_QUERY.contains("table_schema = $1"));
        assert!(COLUMNS_QUERY.contains("table_name = $2"));
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_describe_connection_string() {
        let (host, port, database) =
            describe_connection_string("host=db.example.com user=loader password=x").unwrap();
        assert_eq!(host, "db.example.com");
        assert_eq!(port, 5432);
        assert_eq!(database, "loader");

        let (_, port, database) =
            describe_connection_string("host=localhost port=6432 dbname=analytics user=loader").unwrap();
        assert_eq!(port, 6432);
        assert_eq!(database, "analytics");
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_connect_without_feature() {
        let result = PostgresAdapter::connect("localhost", 5432, "db", "user", "pass").await;
        assert!(matches!(result, Err(FetchError::ConfigError(_))));
    }
}
