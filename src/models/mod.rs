//! Domain models for the combine pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`Aggregation`] - the closed set of statistical aggregation kinds
//! - [`PackedDate`] - the 8-digit `yyyymmdd` numeral used in column names
//! - [`InputPartitionKey`] - identifies one wide input file
//! - [`OutputPartitionKey`] - identifies one combined output file
//! - [`Manifest`] - the ordered collection of discovered input files

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// =============================================================================
// File Layout
// =============================================================================

/// Directory of wide per-year extracts under the data root.
pub const AGGREGATED_DIR: &str = "aggregated";

/// Directory of combined long-format outputs under the data root.
pub const COMBINED_DIR: &str = "aggregated-combined";

/// Extension marking a finished upstream extract, safe to read.
pub const FINISHED_EXT: &str = "csv.gz";

/// Extension marking an extract still being written upstream.
pub const IN_PROGRESS_EXT: &str = "csv";

/// Cell content the upstream writer emits for missing values.
pub const MISSING_VALUE: &str = "NA";

// =============================================================================
// Aggregation
// =============================================================================

/// Statistical aggregation kind of a value column.
///
/// This is a closed set: the upstream raster-aggregation tool produces
/// exactly these three kinds, and the output partition space is derived
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Min,
    Max,
    Mean,
}

impl Aggregation {
    /// All aggregation kinds, in output order.
    pub const ALL: [Aggregation; 3] = [Aggregation::Min, Aggregation::Max, Aggregation::Mean];

    /// The lowercase token used in column names and output file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Mean => "mean",
        }
    }

    /// Parse a column-name token. Returns `None` for anything outside the set.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "min" => Some(Aggregation::Min),
            "max" => Some(Aggregation::Max),
            "mean" => Some(Aggregation::Mean),
            _ => None,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Aggregation::from_token(s).ok_or_else(|| format!("unknown aggregation kind: {s}"))
    }
}

// =============================================================================
// Packed Date
// =============================================================================

/// A calendar date packed into an unseparated 8-digit numeral,
/// `year * 10000 + month * 100 + day`.
///
/// Consumers derive calendar components arithmetically; no calendar
/// library is involved, which matters at tens of millions of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackedDate(u32);

impl PackedDate {
    /// Wrap an already-packed numeral.
    pub fn new(packed: u32) -> Self {
        PackedDate(packed)
    }

    /// Parse an 8-digit token such as `20010101`.
    pub fn parse(token: &str) -> Option<Self> {
        if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        token.parse().ok().map(PackedDate)
    }

    pub fn year(self) -> u32 {
        self.0 / 10_000
    }

    pub fn month(self) -> u32 {
        self.0 / 100 % 100
    }

    pub fn day(self) -> u32 {
        self.0 % 100
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PackedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

// =============================================================================
// Partition Keys
// =============================================================================

/// Identifies one wide input file: `(geography, measure, year)`.
///
/// Derived from a file's location in the input tree; immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputPartitionKey {
    pub geography: String,
    pub measure: String,
    pub year: u16,
}

/// Identifies one combined output file: `(geography, aggregation, measure)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputPartitionKey {
    pub geography: String,
    pub aggregation: Aggregation,
    pub measure: String,
}

impl OutputPartitionKey {
    /// Final output file name, e.g. `mean_tmax.csv.gz`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.{}", self.aggregation, self.measure, FINISHED_EXT)
    }

    /// Temporary file name used while the partition is being produced,
    /// e.g. `mean_tmax-temp.csv.gz`.
    pub fn temp_file_name(&self) -> String {
        format!("{}_{}-temp.{}", self.aggregation, self.measure, FINISHED_EXT)
    }

    /// Final output path under the data root.
    pub fn final_path(&self, root: &std::path::Path) -> PathBuf {
        root.join(COMBINED_DIR)
            .join(&self.geography)
            .join(self.file_name())
    }

    /// Temporary output path under the data root.
    pub fn temp_path(&self, root: &std::path::Path) -> PathBuf {
        root.join(COMBINED_DIR)
            .join(&self.geography)
            .join(self.temp_file_name())
    }
}

impl fmt::Display for OutputPartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}_{}",
            self.geography, self.aggregation, self.measure
        )
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// One discovered, finished input file and its parsed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub key: InputPartitionKey,
    pub path: PathBuf,
}

/// Ordered collection of all finished input files for one run.
///
/// Built once by the catalog, read-only thereafter. Entries are sorted by
/// `(geography, measure, year)`, so the per-partition file slices returned
/// by [`Manifest::files_for`] are in ascending year order. Only
/// `(geography, measure)` pairs without any in-progress sibling file are
/// present; the catalog enforces that invariant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest, sorting the entries into canonical order.
    pub fn new(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Manifest { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    /// The distinct output partition keys this manifest can produce:
    /// every discovered `(geography, measure)` pair crossed with the
    /// closed aggregation set, in sorted order.
    pub fn output_keys(&self) -> Vec<OutputPartitionKey> {
        let pairs: BTreeSet<(&str, &str)> = self
            .entries
            .iter()
            .map(|e| (e.key.geography.as_str(), e.key.measure.as_str()))
            .collect();

        pairs
            .into_iter()
            .flat_map(|(geography, measure)| {
                Aggregation::ALL.into_iter().map(move |aggregation| OutputPartitionKey {
                    geography: geography.to_string(),
                    aggregation,
                    measure: measure.to_string(),
                })
            })
            .collect()
    }

    /// The input files constituting one `(geography, measure)` partition,
    /// in ascending year order.
    pub fn files_for<'a>(
        &'a self,
        geography: &'a str,
        measure: &'a str,
    ) -> impl Iterator<Item = &'a ManifestEntry> {
        self.entries
            .iter()
            .filter(move |e| e.key.geography == geography && e.key.measure == measure)
    }
}
