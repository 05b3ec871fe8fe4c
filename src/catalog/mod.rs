//! Partition catalog: discovery of finished wide input files.
//!
//! Scans the `aggregated/` tree under a data root, parses
//! `(geography, measure, year)` keys out of each path, and builds the
//! run's [`Manifest`]. Two rules keep combined outputs correct:
//!
//! - A path that does not match the template is a hard error, never
//!   skipped. Silent skipping would silently produce incomplete outputs.
//! - A `(geography, measure)` pair with *any* in-progress sibling file is
//!   excluded entirely, even if other years are finished: a combined
//!   output must include every year to be correct.
//!
//! The scan is read-only.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{InputPartitionKey, Manifest, ManifestEntry, AGGREGATED_DIR};

/// File-name template of one upstream extract: `<measure>_<year>.csv[.gz]`.
/// The `.gz` suffix marks a finished extract; its absence marks one still
/// being written upstream.
static INPUT_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9]*)_(\d{4})\.csv(\.gz)?$").expect("valid input template")
});

/// Parsed form of one discovered file name.
struct ParsedName {
    measure: String,
    year: u16,
    finished: bool,
}

/// Match a file name against the input template.
fn parse_file_name(name: &str) -> Option<ParsedName> {
    let caps = INPUT_FILE_RE.captures(name)?;
    let year = caps[2].parse().ok()?;
    Some(ParsedName {
        measure: caps[1].to_string(),
        year,
        finished: caps.get(3).is_some(),
    })
}

/// Scan the data root and build the manifest of finished input files,
/// sorted by `(geography, measure, year)`.
pub fn scan(root: &Path) -> CatalogResult<Manifest> {
    let aggregated = root.join(AGGREGATED_DIR);
    if !aggregated.is_dir() {
        return Err(CatalogError::RootNotFound(aggregated));
    }

    let mut entries = Vec::new();
    let mut in_progress: BTreeSet<(String, String)> = BTreeSet::new();

    for geography_entry in fs::read_dir(&aggregated)? {
        let geography_entry = geography_entry?;
        let geography_path = geography_entry.path();
        if !geography_entry.file_type()?.is_dir() {
            // Only geography directories may live directly under aggregated/.
            return Err(CatalogError::MalformedPath(geography_path));
        }
        let geography = match geography_path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => return Err(CatalogError::MalformedPath(geography_path)),
        };

        for file_entry in fs::read_dir(&geography_path)? {
            let file_entry = file_entry?;
            let file_path = file_entry.path();
            if !file_entry.file_type()?.is_file() {
                return Err(CatalogError::MalformedPath(file_path));
            }

            let parsed = file_path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_file_name)
                .ok_or_else(|| CatalogError::MalformedPath(file_path.clone()))?;

            if parsed.finished {
                entries.push(ManifestEntry {
                    key: InputPartitionKey {
                        geography: geography.clone(),
                        measure: parsed.measure,
                        year: parsed.year,
                    },
                    path: file_path,
                });
            } else {
                in_progress.insert((geography.clone(), parsed.measure));
            }
        }
    }

    // Any pair with an in-progress sibling loses all its years, even the
    // individually finished ones.
    for (geography, measure) in &in_progress {
        warn!(
            geography = geography.as_str(),
            measure = measure.as_str(),
            "excluding partition with in-progress upstream files"
        );
    }
    entries.retain(|e| {
        !in_progress
            .iter()
            .any(|(g, m)| *g == e.key.geography && *m == e.key.measure)
    });

    debug!(
        files = entries.len(),
        excluded_pairs = in_progress.len(),
        "catalog scan complete"
    );

    Ok(Manifest::new(entries))
}
