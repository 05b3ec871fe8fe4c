//! Transformation module.
//!
//! This module turns wide extracts into combined long-format outputs:
//! - Melt: one wide file to a lazy sequence of long rows
//! - Pipeline: per-partition combination and publishing

pub mod melt;
pub mod pipeline;

pub use melt::{detect_id_column, AggregationFilter, LongRow, ValueColumn, WideFile};
pub use pipeline::{combine_partition, run, RunOptions, RunStats};
