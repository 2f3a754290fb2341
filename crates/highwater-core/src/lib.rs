//! Highwater Core
//!
//! Domain model shared by the connectors, the load engine and the CLI:
//! scalar values, schemas, record sets, configuration and the run report.

pub mod value;
pub mod schema;
pub mod record;
pub mod config;
pub mod report;

pub use value::{Value, ValueError};
pub use schema::{LogicalType, Column, Schema, Nullability};
pub use record::{Record, RecordSet, RecordError};
pub use config::{Config, ConfigError, ConnectionConfig, LoadConfig, JobArgs, WatermarkPolicy};
pub use report::{RunReport, ReportVersion, RunStatus, RunCounts, WatermarkOrigin};
