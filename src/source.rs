//! Row Source / Artifact Sink: the boundary between this pipeline and
//! wherever rows actually live. A concrete CSV pair is provided; remote
//! sinks (S3, warehouses) plug in behind the same traits without touching
//! the core.

use crate::error::{DqError, Result};
use crate::model::{Dataset, Row, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Yields rows and column names. Extensions beyond CSV (Parquet, JSON,
/// tabular warehouses) implement this same trait.
pub trait RowSource: Send + Sync {
    /// Loads at most `limit` rows (`None` for all of them).
    fn load(&self, limit: Option<usize>) -> Result<Dataset>;
}

/// Accepts a serialized repaired dataset and returns a locator for it.
/// Used by the Applier's export and commit modes.
pub trait ArtifactSink: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String>;
}

/// Reads rows from a local CSV file via the `csv` crate. Header order
/// becomes column order; every cell round-trips through
/// `Value::from_str_cell`, so blank cells become `Value::Null`.
pub struct CsvRowSource {
    path: PathBuf,
}

impl CsvRowSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowSource for CsvRowSource {
    fn load(&self, limit: Option<usize>) -> Result<Dataset> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_path(&self.path)?;

        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for (id, record) in reader.records().enumerate() {
            if let Some(limit) = limit {
                if id >= limit {
                    break;
                }
            }
            let record = record?;
            let mut row = Row::new(id);
            for (column, cell) in columns.iter().zip(record.iter()) {
                row.push(column.clone(), Value::from_str_cell(cell.trim()));
            }
            rows.push(row);
        }

        Ok(Dataset::new(columns, rows))
    }
}

/// Writes artifacts to a local directory. `put` derives the destination
/// path from `key` and returns the absolute path as the locator.
pub struct CsvArtifactSink {
    base_dir: PathBuf,
}

impl CsvArtifactSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// `{source_key_without_extension}_cleaned.csv`, matching the Applier's
    /// export naming rule.
    pub fn cleaned_key(source_key: &str) -> String {
        let stem = Path::new(source_key).file_stem().and_then(|s| s.to_str()).unwrap_or(source_key);
        format!("{stem}_cleaned.csv")
    }
}

impl ArtifactSink for CsvArtifactSink {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String> {
        fs::create_dir_all(&self.base_dir)?;
        let destination = self.base_dir.join(key);
        fs::write(&destination, bytes)?;
        destination.to_str().map(|s| s.to_string()).ok_or_else(|| DqError::Sink(format!("non-utf8 path: {destination:?}")))
    }
}

/// Serializes a dataset back into CSV bytes, in the original column order.
pub fn dataset_to_csv_bytes(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    writer.write_record(&dataset.columns)?;
    for row in &dataset.rows {
        let record: Vec<String> = dataset.columns.iter().map(|c| row.get(c).map(|v| v.to_display_string()).unwrap_or_default()).collect();
        writer.write_record(&record)?;
    }
    writer.into_inner().map_err(|e| DqError::Sink(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dq-pipeline-test-{}-{name}", std::process::id()))
    }

    fn write_fixture(name: &str, contents: &str) -> PathBuf {
        let path = scratch_path(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_csv_into_rows() {
        let path = write_fixture("rows.csv", "email,city\na@b.com,Pune\n,Mumbai\n");
        let source = CsvRowSource::new(&path);
        let dataset = source.load(None).unwrap();
        assert_eq!(dataset.columns, vec!["email".to_string(), "city".to_string()]);
        assert_eq!(dataset.rows.len(), 2);
        assert!(dataset.rows[1].get("email").unwrap().is_missing());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn respects_row_limit() {
        let path = write_fixture("limit.csv", "a\n1\n2\n3\n");
        let source = CsvRowSource::new(&path);
        let dataset = source.load(Some(2)).unwrap();
        assert_eq!(dataset.rows.len(), 2);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn cleaned_key_strips_extension_and_appends_suffix() {
        assert_eq!(CsvArtifactSink::cleaned_key("customers.csv"), "customers_cleaned.csv");
    }

    #[test]
    fn sink_writes_bytes_under_base_dir() {
        let dir = std::env::temp_dir().join(format!("dq-pipeline-test-{}", std::process::id()));
        let sink = CsvArtifactSink::new(&dir);
        let locator = sink.put("out.csv", b"a,b\n1,2\n", "text/csv").unwrap();
        assert!(Path::new(&locator).exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn round_trips_dataset_through_csv_bytes() {
        let mut row = Row::new(0);
        row.push("city", Value::String("Pune".to_string()));
        let dataset = Dataset::new(vec!["city".to_string()], vec![row]);
        let bytes = dataset_to_csv_bytes(&dataset).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Pune"));
    }
}
