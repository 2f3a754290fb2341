//! Run report schema (stable v1)
//!
//! Written once per committed run. Breaking changes require a new version.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The delta was appended to the target
    Appended,

    /// The delta was empty; nothing was written
    NoNewData,

    /// The delta was computed but the write was skipped on request
    DryRun,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Appended => write!(f, "appended"),
            Self::NoNewData => write!(f, "no new data"),
            Self::DryRun => write!(f, "dry run"),
        }
    }
}

/// Why the run used (or did not use) a watermark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum WatermarkOrigin {
    /// `MAX(column)` returned a value
    Found,

    /// The target exists but holds no non-null value
    EmptyTarget,

    /// The target table does not exist yet
    TargetMissing,

    /// Reading the target failed and the failure was downgraded to a full load
    ReadFailed { reason: String },
}

impl WatermarkOrigin {
    /// Whether this origin implies loading the whole source
    pub fn is_full_load(&self) -> bool {
        !matches!(self, Self::Found)
    }
}

/// Row counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Rows read from the source table
    pub source_rows: usize,

    /// Rows newer than the watermark
    pub delta_rows: usize,

    /// Rows the target reported as written
    pub written_rows: usize,
}

/// Committed run report (run-report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version
    pub version: ReportVersion,

    /// Job name supplied at invocation
    pub job_name: String,

    /// Run start (ISO 8601)
    pub started_at: String,

    /// Commit time (ISO 8601)
    pub finished_at: String,

    /// Source table, `database.table`
    pub source_table: String,

    /// Target table as addressed
    pub target_table: String,

    /// Incremental column name
    pub incremental_column: String,

    /// Watermark used as the exclusive lower bound, if any
    pub watermark: Option<Value>,

    /// Why the watermark is (or is not) present
    pub watermark_origin: WatermarkOrigin,

    /// Row counts
    pub counts: RunCounts,

    /// Outcome
    pub status: RunStatus,
}

impl RunReport {
    /// Save report to JSON file
    pub fn save_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Load report from JSON file
    pub fn load_from_file(path: &std::path::Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
