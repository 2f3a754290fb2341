//! Mock catalog and warehouse adapter for testing
//!
//! Holds tables in memory and serves them both as a source catalog and as a
//! target warehouse. It's useful for:
//! - Unit testing watermark and delta logic
//! - Demonstrating full-load and incremental runs without credentials
//! - Simulating connector failures on the read or the write path
//!
//! ## Usage
//!
//! ```rust,ignore
//! use highwater_catalog::{MockAdapter, WarehouseAdapter, TableIdentifier};
//!
//! let adapter = MockAdapter::new();
//! let table = TableIdentifier::new("analytics", "public", "orders");
//! adapter.add_table(table.clone(), orders).await;
//!
//! let mark = adapter.max_value(&table, "order_id").await?;
//! ```
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! // Every read of the target fails as if the network dropped
//! adapter.add_error_for_table(table.clone(), FetchError::NetworkError("reset".into())).await;
//!
//! // Appends fail, reads still succeed
//! adapter.add_write_error_for_table(table, FetchError::PermissionDenied("read-only".into())).await;
//! ```

use crate::adapter::{FetchError, SourceCatalog, TableIdentifier, WarehouseAdapter};
use highwater_core::{RecordSet, Schema, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One recorded call to `append`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendCall {
    /// Target table FQN
    pub table: String,

    /// Rows in the appended batch
    pub rows: usize,
}

/// Mock adapter for testing
///
/// Clones share the same tables, errors and call log.
pub struct MockAdapter {
    /// Tables by FQN
    tables: Arc<RwLock<HashMap<String, RecordSet>>>,

    /// Errors returned by reads of specific tables
    errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Errors returned by appends to specific tables
    write_errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Every append, in call order
    appends: Arc<RwLock<Vec<AppendCall>>>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,

    /// Name to return from name() method
    adapter_name: &'static str,
}

impl MockAdapter {
    /// Create a new mock adapter with no tables
    pub fn new() -> Self {
        MockAdapterBuilder::new().build()
    }

    /// Add (or replace) a table
    pub async fn add_table(&self, table: TableIdentifier, records: RecordSet) {
        self.tables.write().await.insert(table.fqn(), records);
    }

    /// Configure an error to be returned by every read of a table
    pub async fn add_error_for_table(&self, table: TableIdentifier, error: FetchError) {
        self.errors.write().await.insert(table.fqn(), error);
    }

    /// Configure an error to be returned by appends to a table
    pub async fn add_write_error_for_table(&self, table: TableIdentifier, error: FetchError) {
        self.write_errors.write().await.insert(table.fqn(), error);
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set a custom adapter name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.adapter_name = name;
        self
    }

    /// Snapshot of a table's current contents
    pub async fn table(&self, table: &TableIdentifier) -> Option<RecordSet> {
        self.tables.read().await.get(&table.fqn()).cloned()
    }

    /// Number of rows currently in a table (0 if absent)
    pub async fn row_count(&self, table: &TableIdentifier) -> usize {
        self.tables
            .read()
            .await
            .get(&table.fqn())
            .map(RecordSet::len)
            .unwrap_or(0)
    }

    /// Check if a table exists
    pub async fn has_table(&self, table: &TableIdentifier) -> bool {
        self.tables.read().await.contains_key(&table.fqn())
    }

    /// Every append call made so far
    pub async fn append_calls(&self) -> Vec<AppendCall> {
        self.appends.read().await.clone()
    }

    /// Clear all stored errors
    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
        self.write_errors.write().await.clear();
    }

    /// Simulate latency if configured
    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }

    async fn check_read_error(&self, table: &TableIdentifier) -> Result<(), FetchError> {
        match self.errors.read().await.get(&table.fqn()) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn read(&self, table: &TableIdentifier) -> Result<RecordSet, FetchError> {
        self.simulate_latency().await;
        self.check_read_error(table).await?;

        self.tables
            .read()
            .await
            .get(&table.fqn())
            .cloned()
            .ok_or_else(|| FetchError::TableNotFound(table.fqn()))
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockAdapter {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            errors: Arc::clone(&self.errors),
            write_errors: Arc::clone(&self.write_errors),
            appends: Arc::clone(&self.appends),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            adapter_name: self.adapter_name,
        }
    }
}

#[async_trait::async_trait]
impl SourceCatalog for MockAdapter {
    fn name(&self) -> &'static str {
        self.adapter_name
    }

    async fn read_table(&self, table: &TableIdentifier) -> Result<RecordSet, FetchError> {
        self.read(table).await
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        self.adapter_name
    }

    async fn fetch_schema(&self, table: &TableIdentifier) -> Result<Schema, FetchError> {
        self.read(table).await.map(|records| records.schema)
    }

    async fn max_value(&self, table: &TableIdentifier, column: &str) -> Result<Option<Value>, FetchError> {
        let records = self.read(table).await?;
        if records.schema.index_of(column).is_none() {
            return Err(FetchError::QueryError(format!(
                "invalid identifier '{}' in {}",
                column,
                table.fqn()
            )));
        }
        Ok(records.max_value(column))
    }

    async fn append(&self, table: &TableIdentifier, records: &RecordSet) -> Result<usize, FetchError> {
        self.simulate_latency().await;

        if let Some(error) = self.write_errors.read().await.get(&table.fqn()) {
            return Err(error.clone());
        }

        self.appends.write().await.push(AppendCall {
            table: table.fqn(),
            rows: records.len(),
        });

        let mut tables = self.tables.write().await;
        match tables.get_mut(&table.fqn()) {
            Some(existing) => existing.extend_from(records),
            None => {
                tables.insert(table.fqn(), records.clone());
            }
        }

        Ok(records.len())
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.simulate_latency().await;

        if self.fail_connection {
            Err(FetchError::NetworkError(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Builder for creating MockAdapter with predefined tables
///
/// # Example
///
/// ```rust,ignore
/// let adapter = MockAdapterBuilder::new()
///     .with_table(TableIdentifier::catalog("sales", "orders"), orders)
///     .with_error(
///         TableIdentifier::new("analytics", "public", "orders"),
///         FetchError::NetworkError("timeout".into()),
///     )
///     .build();
/// ```
pub struct MockAdapterBuilder {
    tables: HashMap<String, RecordSet>,
    errors: HashMap<String, FetchError>,
    write_errors: HashMap<String, FetchError>,
    fail_connection: bool,
    latency_ms: u64,
    adapter_name: &'static str,
}

impl MockAdapterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            errors: HashMap::new(),
            write_errors: HashMap::new(),
            fail_connection: false,
            latency_ms: 0,
            adapter_name: "Mock",
        }
    }

    /// Add a table
    pub fn with_table(mut self, table: TableIdentifier, records: RecordSet) -> Self {
        self.tables.insert(table.fqn(), records);
        self
    }

    /// Add a read error for a specific table
    pub fn with_error(mut self, table: TableIdentifier, error: FetchError) -> Self {
        self.errors.insert(table.fqn(), error);
        self
    }

    /// Add a write error for a specific table
    pub fn with_write_error(mut self, table: TableIdentifier, error: FetchError) -> Self {
        self.write_errors.insert(table.fqn(), error);
        self
    }

    /// Configure connection failure
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set adapter name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.adapter_name = name;
        self
    }

    /// Build the MockAdapter
    pub fn build(self) -> MockAdapter {
        MockAdapter {
            tables: Arc::new(RwLock::new(self.tables)),
            errors: Arc::new(RwLock::new(self.errors)),
            write_errors: Arc::new(RwLock::new(self.write_errors)),
            appends: Arc::new(RwLock::new(Vec::new())),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            adapter_name: self.adapter_name,
        }
    }
}

impl Default for MockAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
