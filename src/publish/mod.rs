//! Resumable publisher: atomic, restart-safe partition production.
//!
//! Output is accumulated in a temporary file next to the final path and
//! renamed into place in one step only after the whole partition has been
//! processed. The final path is therefore only ever observed in a
//! fully-written state; abnormal termination leaves, at worst, a temp
//! file.
//!
//! Per output partition the state machine is:
//!
//! - [`PartitionState::Done`] - the final path exists; skip entirely.
//! - [`PartitionState::StaleTemp`] - a leftover temp from an interrupted
//!   run exists; it is deleted before production starts, so rows appended
//!   by the dead run are never duplicated.
//! - [`PartitionState::Pending`] - neither exists; produce.

use csv::Writer;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PublishResult;
use crate::models::OutputPartitionKey;
use crate::transform::melt::LongRow;

// =============================================================================
// Partition State
// =============================================================================

/// Where one output partition stands at the start of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    /// The final output exists; re-running is a no-op.
    Done,
    /// Only a temp file from an interrupted run exists.
    StaleTemp,
    /// Neither final nor temp output exists.
    Pending,
}

impl PartitionState {
    pub fn as_str(self) -> &'static str {
        match self {
            PartitionState::Done => "done",
            PartitionState::StaleTemp => "stale-temp",
            PartitionState::Pending => "pending",
        }
    }
}

/// Derive a partition's state from what is on disk.
pub fn assess(final_path: &Path, temp_path: &Path) -> PartitionState {
    if final_path.exists() {
        PartitionState::Done
    } else if temp_path.exists() {
        PartitionState::StaleTemp
    } else {
        PartitionState::Pending
    }
}

/// Convenience: assess an output key under a data root.
pub fn assess_key(root: &Path, key: &OutputPartitionKey) -> PartitionState {
    assess(&key.final_path(root), &key.temp_path(root))
}

// =============================================================================
// Publication
// =============================================================================

/// An in-progress output partition: a gzipped CSV writer aimed at the
/// temp path.
///
/// Rows are appended file by file; [`Publication::commit`] finishes the
/// gzip stream and atomically renames the temp onto the final path.
/// Dropping an uncommitted publication leaves the temp file on disk for
/// the next run's stale-temp recovery.
pub struct Publication {
    final_path: PathBuf,
    temp_path: PathBuf,
    writer: Writer<GzEncoder<BufWriter<File>>>,
    rows: u64,
}

impl Publication {
    /// Start producing one output partition.
    ///
    /// Creates the output directory, removes any stale temp file, and
    /// opens the temp path for appending rows.
    pub fn begin(root: &Path, key: &OutputPartitionKey) -> PublishResult<Self> {
        let final_path = key.final_path(root);
        let temp_path = key.temp_path(root);

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if temp_path.exists() {
            debug!(temp = %temp_path.display(), "removing stale temp file");
            fs::remove_file(&temp_path)?;
        }

        let file = File::create(&temp_path)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

        Ok(Publication {
            final_path,
            temp_path,
            writer: Writer::from_writer(encoder),
            rows: 0,
        })
    }

    /// Write the combined header. Called once, before the first row.
    pub fn write_header(&mut self, id_column: &str) -> PublishResult<()> {
        self.writer.write_record([id_column, "date", "value"])?;
        Ok(())
    }

    /// Append one long row.
    pub fn append(&mut self, row: &LongRow) -> PublishResult<()> {
        let date = row.date.to_string();
        self.writer.write_record([row.id, date.as_str(), row.value])?;
        self.rows += 1;
        Ok(())
    }

    /// Rows appended so far.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Finish the gzip stream, sync, and atomically publish.
    pub fn commit(mut self) -> PublishResult<PathBuf> {
        self.writer.flush()?;
        let encoder = self
            .writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        let mut buffered = encoder.finish()?;
        buffered.flush()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        fs::rename(&self.temp_path, &self.final_path)?;
        debug!(path = %self.final_path.display(), rows = self.rows, "published partition");
        Ok(self.final_path)
    }
}
