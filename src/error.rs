//! Error types for the combine pipeline.
//!
//! This module defines one error enum per component:
//!
//! - [`CatalogError`] - input discovery and path parsing errors
//! - [`SchemaError`] - wide-file header violations
//! - [`PublishError`] - temp-file append and atomic-rename errors
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Catalog Errors
// =============================================================================

/// Errors while building the input manifest.
///
/// Any of these aborts the whole run: a partially-built manifest would
/// silently produce incomplete combined outputs.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The aggregated input tree does not exist.
    #[error("Input tree not found: {0}")]
    RootNotFound(PathBuf),

    /// A discovered path does not match the expected
    /// `<geography>/<measure>_<year>` template.
    #[error("Path does not match the input template: {0}")]
    MalformedPath(PathBuf),

    /// Failed to read the directory tree.
    #[error("Failed to scan input tree: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors raised when a wide input file violates the header contract.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Every column name begins with a digit, so no identifier column exists.
    #[error("No identifier column: every column name begins with a digit")]
    NoIdColumn,

    /// More than one column name does not begin with a digit.
    #[error("Ambiguous identifier column, candidates: {}", .candidates.join(", "))]
    AmbiguousIdColumn { candidates: Vec<String> },

    /// A value-column name does not split into exactly `<date>_<aggregation>`.
    #[error("Value column '{0}' does not split into <date>_<aggregation>")]
    MalformedValueColumn(String),

    /// The date token of a value column is not an 8-digit numeral.
    #[error("Value column '{0}' does not start with an 8-digit date")]
    InvalidDate(String),

    /// The aggregation token of a value column is not min, max or mean.
    #[error("Value column '{column}' has unknown aggregation kind '{token}'")]
    UnknownAggregation { column: String, token: String },

    /// Constituent files of one partition disagree on the identifier column.
    #[error("Identifier column mismatch: expected '{expected}', found '{found}'")]
    IdColumnMismatch { expected: String, found: String },

    /// Failed to read or decode CSV records.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to open or read the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Publish Errors
// =============================================================================

/// Errors while appending to a temp file or renaming it into place.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Failed to write CSV rows.
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to create, flush, sync or rename the output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::transform::pipeline::run`].
/// It wraps all lower-level errors and attaches the offending input path to
/// schema violations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Manifest construction failed; the run is aborted.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A constituent input file violated the header contract.
    #[error("Schema error in {}: {source}", .path.display())]
    Schema { path: PathBuf, source: SchemaError },

    /// The partition's temp file could not be written or published.
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

impl PipelineError {
    /// Attach an input path to a [`SchemaError`].
    pub fn schema(path: impl Into<PathBuf>, source: SchemaError) -> Self {
        PipelineError::Schema {
            path: path.into(),
            source,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result type for wide-file operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for publish operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
