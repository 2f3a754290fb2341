//! Source catalogs and warehouse adapters for incremental loads
//!
//! A [`SourceCatalog`] resolves a `database.table` name to its rows. A
//! [`WarehouseAdapter`] answers the two questions an incremental load asks of
//! its target (what is the current maximum of a column, and append these
//! rows) plus schema lookup and connectivity checks.
//!
//! ## Features
//!
//! Enable warehouse support via Cargo features:
//! - `snowflake` - Snowflake support
//! - `postgres` - PostgreSQL/Redshift support
//! - `all-warehouses` - All warehouse adapters
//!
//! The JSON-lines [`LocalCatalog`] and [`LocalWarehouse`] and the in-memory
//! [`MockAdapter`] are always available.
//!
//! ## Example
//!
//! ```rust,ignore
//! use highwater_catalog::{LocalWarehouse, TableIdentifier, WarehouseAdapter};
//!
//! let warehouse = LocalWarehouse::new("warehouse");
//! let table = TableIdentifier::parse("analytics.public.orders")?;
//! let high_water = warehouse.max_value(&table, "updated_at").await?;
//! ```

pub mod adapter;
pub mod local;
pub mod mock;
pub mod postgres;
pub mod snowflake;
pub mod sql;

pub use adapter::{FetchError, SourceCatalog, TableIdentifier, WarehouseAdapter};
pub use local::{CatalogEntry, LocalCatalog, LocalWarehouse};
pub use mock::{AppendCall, MockAdapter, MockAdapterBuilder};
pub use postgres::PostgresAdapter;
pub use snowflake::{SnowflakeAdapter, SnowflakeAdapterBuilder, SnowflakeCredentials};
pub use sql::Dialect;
