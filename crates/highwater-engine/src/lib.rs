//! Highwater engine - incremental load logic
//!
//! This crate implements the load pipeline:
//! - High-water mark resolution with an explicit read-failure policy
//! - Delta filtering (strictly greater than the mark)
//! - Conditional append and job commit

pub mod delta;
pub mod job;
pub mod watermark;

pub use delta::{filter_delta, DeltaError};
pub use job::{IncrementalLoad, JobRun, LoadError, LoadOptions, LoadOutcome, LoadSpec};
pub use watermark::{resolve_watermark, WatermarkResolution};
