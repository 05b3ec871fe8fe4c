//! Partition combiner and pipeline driver.
//!
//! One run is an explicit iteration over the distinct output partition
//! keys derived from the manifest. Per partition, the constituent input
//! files are processed strictly one at a time, in ascending year order:
//! read, melt, append to the publisher's temp file, release. Peak memory
//! is the size of one input file, never the size of the partition.
//!
//! Partitions whose final output already exists are skipped; partitions
//! that fail are left unpublished (pending or stale-temp) for a future
//! run. Only a manifest-construction error aborts the whole run.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, error, info};

use crate::catalog;
use crate::error::{PipelineError, PipelineResult, SchemaError};
use crate::models::{Manifest, OutputPartitionKey};
use crate::publish::{self, PartitionState, Publication};
use crate::transform::melt::{AggregationFilter, WideFile};

// =============================================================================
// Options & Stats
// =============================================================================

/// Options for a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict the run to one geography.
    pub geography: Option<String>,

    /// Restrict the run to one measure.
    pub measure: Option<String>,

    /// Suppress per-partition progress bars.
    pub quiet: bool,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Output partitions considered.
    pub partitions: usize,

    /// Partitions produced and atomically published by this run.
    pub published: usize,

    /// Partitions whose final output already existed.
    pub skipped: usize,

    /// Partitions that failed and were left for a future run.
    pub failed: usize,

    /// Long rows written across all published partitions.
    pub rows_written: u64,
}

// =============================================================================
// Pipeline Driver
// =============================================================================

/// Run the full combine pipeline under a data root.
///
/// Builds the manifest, derives the output partition keys, and processes
/// each sequentially. Per-partition failures are logged and counted, not
/// propagated: the failed partition stays unpublished and a restart
/// retries it.
pub fn run(root: &Path, options: &RunOptions) -> PipelineResult<RunStats> {
    let manifest = catalog::scan(root)?;

    let mut keys = manifest.output_keys();
    if let Some(geography) = &options.geography {
        keys.retain(|k| &k.geography == geography);
    }
    if let Some(measure) = &options.measure {
        keys.retain(|k| &k.measure == measure);
    }

    let mut stats = RunStats {
        partitions: keys.len(),
        ..Default::default()
    };

    for key in &keys {
        if publish::assess_key(root, key) == PartitionState::Done {
            info!(partition = %key, "skipping already-published partition");
            stats.skipped += 1;
            continue;
        }

        info!(partition = %key, "generating partition");
        match combine_partition(root, &manifest, key, options.quiet) {
            Ok(rows) => {
                stats.published += 1;
                stats.rows_written += rows;
            }
            Err(err) => {
                // Left in pending or stale-temp state; a restart retries it.
                error!(partition = %key, error = %err, "partition production failed");
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

/// Current publisher state of every output partition the manifest can
/// produce.
pub fn partition_states(
    root: &Path,
) -> PipelineResult<Vec<(OutputPartitionKey, PartitionState)>> {
    let manifest = catalog::scan(root)?;
    Ok(manifest
        .output_keys()
        .into_iter()
        .map(|key| {
            let state = publish::assess_key(root, &key);
            (key, state)
        })
        .collect())
}

// =============================================================================
// Partition Combiner
// =============================================================================

/// Produce one output partition and atomically publish it.
///
/// Returns the number of long rows written. On error the temp file is
/// left behind and the final path untouched.
pub fn combine_partition(
    root: &Path,
    manifest: &Manifest,
    key: &OutputPartitionKey,
    quiet: bool,
) -> PipelineResult<u64> {
    let entries: Vec<_> = manifest.files_for(&key.geography, &key.measure).collect();
    debug!(partition = %key, files = entries.len(), "combining partition");

    let mut publication = Publication::begin(root, key)?;

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(entries.len() as u64)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.set_message(key.to_string());

    let mut id_column: Option<String> = None;
    for entry in entries {
        let wide =
            WideFile::read(&entry.path).map_err(|e| PipelineError::schema(&entry.path, e))?;

        // The combined header is written once; every constituent file must
        // agree on the identifier column or rows would change meaning
        // mid-output.
        match id_column.as_deref() {
            None => {
                publication.write_header(wide.id_column())?;
                id_column = Some(wide.id_column().to_string());
            }
            Some(expected) if expected != wide.id_column() => {
                return Err(PipelineError::schema(
                    &entry.path,
                    SchemaError::IdColumnMismatch {
                        expected: expected.to_string(),
                        found: wide.id_column().to_string(),
                    },
                ));
            }
            Some(_) => {}
        }

        for row in wide.melt(AggregationFilter::Only(key.aggregation)) {
            publication.append(&row)?;
        }

        // One file is fully flushed before the next is touched; release
        // its records now, input files can be large.
        drop(wide);
        progress.inc(1);
    }

    let rows = publication.rows_written();
    publication.commit()?;
    progress.finish_and_clear();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Aggregation, AGGREGATED_DIR};
    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::{self, File};
    use std::io::{Read, Write};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_gz(path: &PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    fn read_gz(path: &Path) -> String {
        let mut content = String::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    fn input_path(root: &Path, geography: &str, name: &str) -> PathBuf {
        root.join(AGGREGATED_DIR).join(geography).join(name)
    }

    fn quiet() -> RunOptions {
        RunOptions {
            quiet: true,
            ..RunOptions::default()
        }
    }

    /// Two years of one (geography, measure) pair. 11 non-missing cells.
    fn seed_two_years(root: &Path) {
        write_gz(
            &input_path(root, "counties", "tmax_2001.csv.gz"),
            "GEOID,20010101_min,20010101_max,20010101_mean\n\
             A,1,2,1.5\n\
             B,3,4,NA\n",
        );
        write_gz(
            &input_path(root, "counties", "tmax_2002.csv.gz"),
            "GEOID,20020101_min,20020101_max,20020101_mean\n\
             A,5,6,5.5\n\
             B,7,8,7.5\n",
        );
    }

    #[test]
    fn test_run_combines_in_year_order() {
        let dir = TempDir::new().unwrap();
        seed_two_years(dir.path());

        let stats = run(dir.path(), &quiet()).unwrap();
        assert_eq!(stats.partitions, 3);
        assert_eq!(stats.published, 3);
        assert_eq!(stats.failed, 0);

        let key = OutputPartitionKey {
            geography: "counties".to_string(),
            aggregation: Aggregation::Min,
            measure: "tmax".to_string(),
        };
        assert_eq!(
            read_gz(&key.final_path(dir.path())),
            "GEOID,date,value\n\
             A,20010101,1\n\
             B,20010101,3\n\
             A,20020101,5\n\
             B,20020101,7\n"
        );
    }

    #[test]
    fn test_row_conservation() {
        let dir = TempDir::new().unwrap();
        seed_two_years(dir.path());

        let stats = run(dir.path(), &quiet()).unwrap();
        // 12 wide cells, one NA: every non-missing cell becomes exactly
        // one long row across the three outputs.
        assert_eq!(stats.rows_written, 11);
    }

    #[test]
    fn test_run_is_idempotent() {
        let dir = TempDir::new().unwrap();
        seed_two_years(dir.path());

        let first = run(dir.path(), &quiet()).unwrap();
        assert_eq!(first.published, 3);

        let key = OutputPartitionKey {
            geography: "counties".to_string(),
            aggregation: Aggregation::Mean,
            measure: "tmax".to_string(),
        };
        let before = fs::read(key.final_path(dir.path())).unwrap();

        let second = run(dir.path(), &quiet()).unwrap();
        assert_eq!(second.published, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(second.rows_written, 0);

        let after = fs::read(key.final_path(dir.path())).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_restart_after_interruption() {
        let clean_dir = TempDir::new().unwrap();
        seed_two_years(clean_dir.path());
        run(clean_dir.path(), &quiet()).unwrap();

        // Simulate a run that died mid-partition: a partial temp file
        // exists, no final file.
        let dirty_dir = TempDir::new().unwrap();
        seed_two_years(dirty_dir.path());
        let key = OutputPartitionKey {
            geography: "counties".to_string(),
            aggregation: Aggregation::Max,
            measure: "tmax".to_string(),
        };
        let temp = key.temp_path(dirty_dir.path());
        fs::create_dir_all(temp.parent().unwrap()).unwrap();
        fs::write(&temp, b"GEOID,date,value\nA,20010101,2\n").unwrap();

        let stats = run(dirty_dir.path(), &quiet()).unwrap();
        assert_eq!(stats.published, 3);
        assert!(!temp.exists());

        assert_eq!(
            read_gz(&key.final_path(dirty_dir.path())),
            read_gz(&key.final_path(clean_dir.path()))
        );
    }

    #[test]
    fn test_in_progress_pair_produces_no_output() {
        let dir = TempDir::new().unwrap();
        seed_two_years(dir.path());
        // A third year still being written upstream excludes the whole
        // pair, finished years included.
        fs::write(
            input_path(dir.path(), "counties", "tmax_2003.csv"),
            "GEOID,20030101_min\nA,1\n",
        )
        .unwrap();

        let stats = run(dir.path(), &quiet()).unwrap();
        assert_eq!(stats.partitions, 0);
        assert!(!dir.path().join("aggregated-combined").exists());
    }

    #[test]
    fn test_schema_error_publishes_nothing() {
        let dir = TempDir::new().unwrap();
        write_gz(
            &input_path(dir.path(), "counties", "tmax_2001.csv.gz"),
            "GEOID,name,20010101_min\nA,Alpha,1\n",
        );

        let stats = run(dir.path(), &quiet()).unwrap();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.published, 0);

        for aggregation in Aggregation::ALL {
            let key = OutputPartitionKey {
                geography: "counties".to_string(),
                aggregation,
                measure: "tmax".to_string(),
            };
            assert!(!key.final_path(dir.path()).exists());
        }
    }

    #[test]
    fn test_id_column_mismatch_across_years() {
        let dir = TempDir::new().unwrap();
        write_gz(
            &input_path(dir.path(), "counties", "tmax_2001.csv.gz"),
            "GEOID,20010101_min,20010101_max,20010101_mean\nA,1,2,1.5\n",
        );
        write_gz(
            &input_path(dir.path(), "counties", "tmax_2002.csv.gz"),
            "ZCTA,20020101_min,20020101_max,20020101_mean\nA,5,6,5.5\n",
        );

        let stats = run(dir.path(), &quiet()).unwrap();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.published, 0);
    }

    #[test]
    fn test_run_filters() {
        let dir = TempDir::new().unwrap();
        seed_two_years(dir.path());
        write_gz(
            &input_path(dir.path(), "zips", "tmin_2001.csv.gz"),
            "GEOID,20010101_min,20010101_max,20010101_mean\nA,1,2,1.5\n",
        );

        let options = RunOptions {
            geography: Some("zips".to_string()),
            quiet: true,
            ..RunOptions::default()
        };
        let stats = run(dir.path(), &options).unwrap();
        assert_eq!(stats.partitions, 3);
        assert!(!dir
            .path()
            .join("aggregated-combined")
            .join("counties")
            .exists());
    }

    #[test]
    fn test_partition_states() {
        let dir = TempDir::new().unwrap();
        seed_two_years(dir.path());

        let states = partition_states(dir.path()).unwrap();
        assert_eq!(states.len(), 3);
        assert!(states
            .iter()
            .all(|(_, state)| *state == PartitionState::Pending));

        run(dir.path(), &quiet()).unwrap();
        let states = partition_states(dir.path()).unwrap();
        assert!(states
            .iter()
            .all(|(_, state)| *state == PartitionState::Done));
    }
}
