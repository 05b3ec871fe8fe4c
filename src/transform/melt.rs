//! Wide-to-long transformation of one input file.
//!
//! A wide extract has one row per geography unit and one value column per
//! `(date, aggregation)` combination, named `<yyyymmdd>_<kind>`. Melting
//! pivots this into one row per `(unit, date, aggregation)` with a single
//! value field.
//!
//! The loaded file is the unit of memory: [`WideFile::read`] materializes
//! one file's records, and [`WideFile::melt`] walks them lazily in
//! column-major order (all rows of the first value column, then the next),
//! matching the column order of the source header. The transform never
//! spans files.

use csv::StringRecord;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::models::{Aggregation, PackedDate, MISSING_VALUE};

// =============================================================================
// Identifier Column Detection
// =============================================================================

/// Find the identifier column of a wide header.
///
/// The structural rule: value columns are named `<yyyymmdd>_<kind>` and so
/// begin with a digit; the identifier column is the unique column that does
/// not. Zero or multiple candidates are hard errors, never an arbitrary
/// pick.
pub fn detect_id_column(headers: &StringRecord) -> SchemaResult<usize> {
    let candidates: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.as_bytes().first().is_some_and(|b| b.is_ascii_digit()))
        .collect();

    match candidates.as_slice() {
        [] => Err(SchemaError::NoIdColumn),
        [(index, _)] => Ok(*index),
        _ => Err(SchemaError::AmbiguousIdColumn {
            candidates: candidates.iter().map(|(_, name)| name.to_string()).collect(),
        }),
    }
}

// =============================================================================
// Melt Plan
// =============================================================================

/// One value column of the wide header, with its parsed composite key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueColumn {
    /// Position in the source record.
    pub index: usize,
    pub date: PackedDate,
    pub aggregation: Aggregation,
}

/// Parse one `<yyyymmdd>_<kind>` column name.
fn parse_value_column(index: usize, name: &str) -> SchemaResult<ValueColumn> {
    let mut tokens = name.split('_');
    let (date_token, kind_token) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(date), Some(kind), None) => (date, kind),
        _ => return Err(SchemaError::MalformedValueColumn(name.to_string())),
    };

    let date = PackedDate::parse(date_token)
        .ok_or_else(|| SchemaError::InvalidDate(name.to_string()))?;
    let aggregation = Aggregation::from_token(kind_token).ok_or_else(|| {
        SchemaError::UnknownAggregation {
            column: name.to_string(),
            token: kind_token.to_string(),
        }
    })?;

    Ok(ValueColumn {
        index,
        date,
        aggregation,
    })
}

/// Restriction on which aggregation kinds a melt emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationFilter {
    /// Emit every value column, keeping the aggregation in each row.
    All,
    /// Emit only columns of one kind; the kind becomes implicit.
    Only(Aggregation),
}

impl AggregationFilter {
    pub fn accepts(self, kind: Aggregation) -> bool {
        match self {
            AggregationFilter::All => true,
            AggregationFilter::Only(only) => only == kind,
        }
    }
}

// =============================================================================
// Long Rows
// =============================================================================

/// One long-format output row, borrowing from the loaded wide file.
///
/// `value` is the unmodified source text; rows with a missing value are
/// never constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongRow<'a> {
    pub id: &'a str,
    pub aggregation: Aggregation,
    pub date: PackedDate,
    pub value: &'a str,
}

// =============================================================================
// Wide File
// =============================================================================

/// One loaded wide extract: validated header plan plus all records.
#[derive(Debug)]
pub struct WideFile {
    path: PathBuf,
    id_column: String,
    id_index: usize,
    columns: Vec<ValueColumn>,
    records: Vec<StringRecord>,
}

impl WideFile {
    /// Read and validate one wide extract.
    ///
    /// The whole header is validated up front, regardless of any filter a
    /// later melt applies, so schema errors do not depend on which
    /// aggregation kind a run asks for. Gzipped files are detected by
    /// their `.gz` suffix.
    pub fn read(path: &Path) -> SchemaResult<Self> {
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let id_index = detect_id_column(&headers)?;

        let mut columns = Vec::with_capacity(headers.len().saturating_sub(1));
        for (index, name) in headers.iter().enumerate() {
            if index == id_index {
                continue;
            }
            columns.push(parse_value_column(index, name)?);
        }

        let records = csv_reader.into_records().collect::<Result<Vec<_>, _>>()?;
        debug!(
            path = %path.display(),
            rows = records.len(),
            value_columns = columns.len(),
            "loaded wide file"
        );

        Ok(WideFile {
            path: path.to_path_buf(),
            id_column: headers
                .get(id_index)
                .unwrap_or_default()
                .to_string(),
            id_index,
            columns,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the identifier column, e.g. `GEOID`.
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// The validated melt plan, in source header order.
    pub fn value_columns(&self) -> &[ValueColumn] {
        &self.columns
    }

    /// Lazily melt the file into long rows.
    ///
    /// Emission is column-major: for each accepted value column in header
    /// order, every record in file order. Rows whose value cell is empty
    /// or `NA` are dropped; these are geography units with no underlying
    /// data, e.g. areas outside the covered raster extent.
    pub fn melt(&self, filter: AggregationFilter) -> impl Iterator<Item = LongRow<'_>> + '_ {
        self.columns
            .iter()
            .filter(move |column| filter.accepts(column.aggregation))
            .flat_map(move |column| {
                self.records.iter().filter_map(move |record| {
                    let value = record.get(column.index).unwrap_or("");
                    if value.is_empty() || value == MISSING_VALUE {
                        return None;
                    }
                    Some(LongRow {
                        id: record.get(self.id_index).unwrap_or(""),
                        aggregation: column.aggregation,
                        date: column.date,
                        value,
                    })
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    /// Write `content` as a gzipped file named `name` in a fresh temp dir.
    fn gz_fixture(name: &str, content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
        (dir, path)
    }

    #[test]
    fn test_detect_id_column() {
        let headers = record(&["GEOID", "20010101_min", "20010101_max"]);
        assert_eq!(detect_id_column(&headers).unwrap(), 0);

        // Position does not matter, only the structural rule.
        let headers = record(&["20010101_min", "GEOID", "20010101_max"]);
        assert_eq!(detect_id_column(&headers).unwrap(), 1);
    }

    #[test]
    fn test_detect_id_column_ambiguous() {
        let headers = record(&["GEOID", "name", "20010101_min"]);
        match detect_id_column(&headers) {
            Err(SchemaError::AmbiguousIdColumn { candidates }) => {
                assert_eq!(candidates, vec!["GEOID".to_string(), "name".to_string()]);
            }
            other => panic!("expected AmbiguousIdColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_detect_id_column_missing() {
        let headers = record(&["20010101_min", "20010101_max"]);
        assert!(matches!(
            detect_id_column(&headers),
            Err(SchemaError::NoIdColumn)
        ));
    }

    #[test]
    fn test_parse_value_column() {
        let column = parse_value_column(3, "20010215_mean").unwrap();
        assert_eq!(column.index, 3);
        assert_eq!(column.date, PackedDate::new(20010215));
        assert_eq!(column.aggregation, Aggregation::Mean);
    }

    #[test]
    fn test_parse_value_column_rejections() {
        assert!(matches!(
            parse_value_column(0, "20010101_min_extra"),
            Err(SchemaError::MalformedValueColumn(_))
        ));
        assert!(matches!(
            parse_value_column(0, "20010101"),
            Err(SchemaError::MalformedValueColumn(_))
        ));
        assert!(matches!(
            parse_value_column(0, "2001_min"),
            Err(SchemaError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_value_column(0, "20010101_median"),
            Err(SchemaError::UnknownAggregation { .. })
        ));
    }

    #[test]
    fn test_melt_single_aggregation() {
        // The worked example: requested kind `min`, A's second value is
        // missing and must be dropped.
        let (_dir, path) = gz_fixture(
            "tmax_2001.csv.gz",
            "id,20010101_min,20010101_max,20010102_min,20010102_max\n\
             A,5,9,NA,8\n\
             B,1,2,3,4\n",
        );

        let wide = WideFile::read(&path).unwrap();
        assert_eq!(wide.id_column(), "id");
        assert_eq!(wide.row_count(), 2);

        let rows: Vec<(String, u32, String)> = wide
            .melt(AggregationFilter::Only(Aggregation::Min))
            .map(|r| (r.id.to_string(), r.date.as_u32(), r.value.to_string()))
            .collect();

        assert_eq!(
            rows,
            vec![
                ("A".to_string(), 20010101, "5".to_string()),
                ("B".to_string(), 20010101, "1".to_string()),
                ("B".to_string(), 20010102, "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_melt_all_is_column_major() {
        let (_dir, path) = gz_fixture(
            "tmax_2001.csv.gz",
            "id,20010101_min,20010101_max\nA,1,2\nB,3,4\n",
        );

        let wide = WideFile::read(&path).unwrap();
        let rows: Vec<(String, Aggregation, String)> = wide
            .melt(AggregationFilter::All)
            .map(|r| (r.id.to_string(), r.aggregation, r.value.to_string()))
            .collect();

        // All rows of the first header column, then all of the second.
        assert_eq!(
            rows,
            vec![
                ("A".to_string(), Aggregation::Min, "1".to_string()),
                ("B".to_string(), Aggregation::Min, "3".to_string()),
                ("A".to_string(), Aggregation::Max, "2".to_string()),
                ("B".to_string(), Aggregation::Max, "4".to_string()),
            ]
        );
    }

    #[test]
    fn test_melt_drops_empty_and_na_values() {
        let (_dir, path) = gz_fixture(
            "prcp_2001.csv.gz",
            "id,20010101_mean\nA,NA\nB,\nC,0.5\n",
        );

        let wide = WideFile::read(&path).unwrap();
        let rows: Vec<LongRow> = wide.melt(AggregationFilter::All).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "C");
        assert_eq!(rows[0].value, "0.5");
    }

    #[test]
    fn test_melt_passes_values_through_unmodified() {
        let (_dir, path) = gz_fixture(
            "tmax_2001.csv.gz",
            "id,20010101_mean\nA,21.50\nB,-3.250\n",
        );

        let wide = WideFile::read(&path).unwrap();
        let values: Vec<&str> = wide.melt(AggregationFilter::All).map(|r| r.value).collect();
        // No rounding, no re-formatting.
        assert_eq!(values, vec!["21.50", "-3.250"]);
    }

    #[test]
    fn test_read_rejects_bad_headers() {
        let (_dir, path) = gz_fixture(
            "tmax_2001.csv.gz",
            "id,name,20010101_min\nA,Alpha,1\n",
        );
        assert!(matches!(
            WideFile::read(&path),
            Err(SchemaError::AmbiguousIdColumn { .. })
        ));

        let (_dir, path) = gz_fixture(
            "tmax_2001.csv.gz",
            "id,20010101_min_extra\nA,1\n",
        );
        assert!(matches!(
            WideFile::read(&path),
            Err(SchemaError::MalformedValueColumn(_))
        ));
    }

    #[test]
    fn test_read_plain_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tmax_2001.csv");
        std::fs::write(&path, "id,20010101_min\nA,1\n").unwrap();

        let wide = WideFile::read(&path).unwrap();
        assert_eq!(wide.melt(AggregationFilter::All).count(), 1);
    }
}
