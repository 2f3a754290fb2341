//! Incremental load pipeline and job lifecycle
//!
//! One run reads the source table, resolves the target's high-water mark,
//! filters the source down to the delta and appends it. Nothing is written
//! when the delta is empty. A [`JobRun`] brackets the pipeline and turns its
//! outcome into a [`RunReport`] on commit.

use crate::delta::{filter_delta, DeltaError};
use crate::watermark::{resolve_watermark, WatermarkResolution};
use chrono::{DateTime, SecondsFormat, Utc};
use highwater_catalog::{FetchError, SourceCatalog, TableIdentifier, WarehouseAdapter};
use highwater_core::{JobArgs, ReportVersion, RunCounts, RunReport, RunStatus, WatermarkPolicy};

/// Where to read, where to write, and which column orders the rows
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSpec {
    pub source_table: TableIdentifier,
    pub target_table: TableIdentifier,
    pub incremental_column: String,
}

impl LoadSpec {
    /// Build from job arguments. The target name may be qualified
    /// (`database.schema.table`); missing parts come from the connection.
    pub fn from_args(args: &JobArgs) -> Result<Self, FetchError> {
        if args.incremental_column.trim().is_empty() {
            return Err(FetchError::ConfigError("incremental column must not be empty".to_string()));
        }

        Ok(Self {
            source_table: TableIdentifier::catalog(&args.catalog_database, &args.catalog_table),
            target_table: TableIdentifier::parse(&args.target_table)?,
            incremental_column: args.incremental_column.clone(),
        })
    }
}

/// Run-time switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub on_watermark_error: WatermarkPolicy,

    /// Compute the delta but never write it
    pub dry_run: bool,
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub watermark: WatermarkResolution,
    pub counts: RunCounts,
    pub status: RunStatus,
}

/// Failures that abort a run
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read source table {table}")]
    Source {
        table: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to read high-water mark of {table}")]
    Watermark {
        table: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to compute delta")]
    Delta(#[from] DeltaError),

    #[error("failed to append to {table}")]
    Write {
        table: String,
        #[source]
        source: FetchError,
    },
}

/// A single incremental load between a source catalog and a warehouse
pub struct IncrementalLoad<'a> {
    source: &'a dyn SourceCatalog,
    target: &'a dyn WarehouseAdapter,
    spec: LoadSpec,
    options: LoadOptions,
}

impl<'a> IncrementalLoad<'a> {
    pub fn new(
        source: &'a dyn SourceCatalog,
        target: &'a dyn WarehouseAdapter,
        spec: LoadSpec,
        options: LoadOptions,
    ) -> Self {
        Self {
            source,
            target,
            spec,
            options,
        }
    }

    pub async fn run(&self) -> Result<LoadOutcome, LoadError> {
        let spec = &self.spec;

        let records = self
            .source
            .read_table(&spec.source_table)
            .await
            .map_err(|source| LoadError::Source {
                table: spec.source_table.fqn(),
                source,
            })?;
        let source_rows = records.len();
        tracing::info!(
            source_table = %spec.source_table,
            catalog = self.source.name(),
            rows = source_rows,
            "read source table"
        );

        let watermark = resolve_watermark(
            self.target,
            &spec.target_table,
            &spec.incremental_column,
            self.options.on_watermark_error,
        )
        .await
        .map_err(|source| LoadError::Watermark {
            table: spec.target_table.fqn(),
            source,
        })?;

        let delta = filter_delta(records, &spec.incremental_column, watermark.watermark.as_ref())?;
        let delta_rows = delta.len();
        tracing::debug!(delta_rows, full_load = watermark.is_full_load(), "computed delta");

        let (written_rows, status) = if delta.is_empty() {
            tracing::info!("No new data to load.");
            (0, RunStatus::NoNewData)
        } else if self.options.dry_run {
            tracing::info!(rows = delta_rows, target_table = %spec.target_table, "dry run, skipping append");
            (0, RunStatus::DryRun)
        } else {
            let written = self
                .target
                .append(&spec.target_table, &delta)
                .await
                .map_err(|source| LoadError::Write {
                    table: spec.target_table.fqn(),
                    source,
                })?;
            tracing::info!(
                rows = written,
                target_table = %spec.target_table,
                warehouse = self.target.name(),
                "appended new rows"
            );
            (written, RunStatus::Appended)
        };

        Ok(LoadOutcome {
            watermark,
            counts: RunCounts {
                source_rows,
                delta_rows,
                written_rows,
            },
            status,
        })
    }
}

/// Job bookkeeping around a run
#[derive(Debug, Clone)]
pub struct JobRun {
    job_name: String,
    started_at: DateTime<Utc>,
}

impl JobRun {
    pub fn init(job_name: impl Into<String>) -> Self {
        let job_name = job_name.into();
        tracing::info!(job = %job_name, "job started");
        Self {
            job_name,
            started_at: Utc::now(),
        }
    }

    /// Seal the run and produce its report
    pub fn commit(self, spec: &LoadSpec, outcome: LoadOutcome) -> RunReport {
        let finished_at = Utc::now();
        tracing::info!(
            job = %self.job_name,
            status = %outcome.status,
            written = outcome.counts.written_rows,
            elapsed_ms = (finished_at - self.started_at).num_milliseconds(),
            "job committed"
        );

        RunReport {
            version: ReportVersion::CURRENT,
            job_name: self.job_name,
            started_at: self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            finished_at: finished_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            source_table: spec.source_table.fqn(),
            target_table: spec.target_table.fqn(),
            incremental_column: spec.incremental_column.clone(),
            watermark: outcome.watermark.watermark,
            watermark_origin: outcome.watermark.origin,
            counts: outcome.counts,
            status: outcome.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(target: &str, column: &str) -> JobArgs {
        JobArgs {
            job_name: "orders_incremental".to_string(),
            catalog_database: "sales".to_string(),
            catalog_table: "orders".to_string(),
            target_table: target.to_string(),
            connection_name: "local_dev".to_string(),
            incremental_column: column.to_string(),
        }
    }

    #[test]
    fn spec_from_args() {
        let spec = LoadSpec::from_args(&args("ANALYTICS.PUBLIC.ORDERS", "ORDER_ID")).unwrap();
        assert_eq!(spec.source_table, TableIdentifier::catalog("sales", "orders"));
        assert_eq!(spec.target_table, TableIdentifier::new("ANALYTICS", "PUBLIC", "ORDERS"));
        assert_eq!(spec.incremental_column, "ORDER_ID");
    }

    #[test]
    fn spec_rejects_bad_arguments() {
        assert!(LoadSpec::from_args(&args("a.b.c.d", "id")).is_err());
        assert!(LoadSpec::from_args(&args("orders", " ")).is_err());
    }

    #[test]
    fn load_error_keeps_the_cause() {
        use std::error::Error;

        let err = LoadError::Watermark {
            table: "orders".to_string(),
            source: FetchError::NetworkError("reset".to_string()),
        };
        assert_eq!(err.to_string(), "failed to read high-water mark of orders");
        assert!(err.source().is_some());
    }
}
