//! # Aggcombine - combine wide climate extracts into long-format files
//!
//! Aggcombine takes the small wide-format extracts an upstream
//! raster-aggregation tool writes (one gzipped CSV per
//! geography x measure x year) and combines them into larger long-format
//! files (one per geography x aggregation x measure), streaming so that
//! the full dataset is never resident in memory at once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  aggregated/ │────▶│   Catalog    │────▶│     Melt     │────▶│  Publisher   │
//! │  (wide, gz)  │     │  (manifest)  │     │ (wide→long)  │     │ (temp+rename)│
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aggcombine::{run, RunOptions};
//! use std::path::Path;
//!
//! fn main() -> Result<(), aggcombine::PipelineError> {
//!     let stats = run(Path::new("output"), &RunOptions::default())?;
//!     println!("published {} partitions", stats.published);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - per-component error types
//! - [`models`] - domain models (keys, manifest, aggregation kinds)
//! - [`catalog`] - input discovery and completeness classification
//! - [`transform`] - wide-to-long melt and the combine pipeline
//! - [`publish`] - atomic, restart-safe output publishing

// Core modules
pub mod error;
pub mod models;

// Discovery
pub mod catalog;

// Transformation
pub mod transform;

// Publishing
pub mod publish;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CatalogError, CatalogResult, PipelineError, PipelineResult, PublishError, PublishResult,
    SchemaError, SchemaResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Aggregation, InputPartitionKey, Manifest, ManifestEntry, OutputPartitionKey, PackedDate,
};

// =============================================================================
// Re-exports - Catalog
// =============================================================================

pub use catalog::scan;

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::melt::{detect_id_column, AggregationFilter, LongRow, ValueColumn, WideFile};

pub use transform::pipeline::{combine_partition, partition_states, run, RunOptions, RunStats};

// =============================================================================
// Re-exports - Publisher
// =============================================================================

pub use publish::{assess, assess_key, PartitionState, Publication};
