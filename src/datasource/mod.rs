//! Data source adapter: reads tabular test-input records and yields typed
//! parameter rows for data-driven execution.
//!
//! The on-disk format is CSV with a required header row. Reading is lazy and
//! restartable: every call to [`DataSource::rows`] re-opens the file, so an
//! edited file is picked up on the next run without any cache invalidation.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DataSourceError;

/// A single typed cell.
///
/// Typing is inferred per cell: integral numerics stay integers, decimals
/// become floats, `true`/`false` become booleans and empty cells map to
/// [`CellValue::Null`] rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Infer a typed value from a raw field.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => return CellValue::Bool(true),
            "false" => return CellValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return CellValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return CellValue::Float(f);
        }
        CellValue::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One immutable row of test input.
///
/// Identity is (source identifier, row index); `index` is 1-based over the
/// data rows, excluding the header.
#[derive(Debug, Clone)]
pub struct TestDataRow {
    source: Arc<str>,
    index: usize,
    header: Arc<Vec<String>>,
    values: Vec<CellValue>,
}

impl TestDataRow {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Look up a cell by column name.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.header
            .iter()
            .position(|h| h == column)
            .map(|i| &self.values[i])
    }

    /// Columns in header order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.header
            .iter()
            .map(|h| h.as_str())
            .zip(self.values.iter())
    }

    #[cfg(test)]
    pub(crate) fn for_tests(index: usize, pairs: &[(&str, CellValue)]) -> Self {
        TestDataRow {
            source: Arc::from("test"),
            index,
            header: Arc::new(pairs.iter().map(|(k, _)| k.to_string()).collect()),
            values: pairs.iter().map(|(_, v)| v.clone()).collect(),
        }
    }
}

/// Handle to a tabular data source file.
///
/// `open` validates the header eagerly so a missing or empty header surfaces
/// before any execution is scheduled.
#[derive(Debug, Clone)]
pub struct DataSource {
    path: PathBuf,
    header: Arc<Vec<String>>,
}

impl DataSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        let path = path.as_ref().to_path_buf();
        let mut reader = Self::reader(&path)?;
        let header_record = reader.headers().map_err(|e| DataSourceError::Malformed {
            path: path.clone(),
            source: e,
        })?;

        let header: Vec<String> = header_record.iter().map(|h| h.trim().to_string()).collect();
        if header.is_empty() || header.iter().all(|h| h.is_empty()) {
            return Err(DataSourceError::MissingHeader { path });
        }

        Ok(DataSource {
            path,
            header: Arc::new(header),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// A fresh lazy iterator over the data rows, re-reading the file.
    pub fn rows(&self) -> Result<RowIter, DataSourceError> {
        let reader = Self::reader(&self.path)?;
        Ok(RowIter {
            path: self.path.clone(),
            source: Arc::from(self.path.display().to_string()),
            header: self.header.clone(),
            records: reader.into_records(),
            next_index: 1,
        })
    }

    /// Materialize every row, failing the whole load on the first malformed
    /// record.
    pub fn load(&self) -> Result<Vec<TestDataRow>, DataSourceError> {
        self.rows()?.collect()
    }

    fn reader(path: &Path) -> Result<csv::Reader<File>, DataSourceError> {
        let file = File::open(path).map_err(|e| DataSourceError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        // Width validation happens per-row in RowIter so the error can name
        // the offending row.
        Ok(csv::ReaderBuilder::new().flexible(true).from_reader(file))
    }
}

/// Lazy, finite, fallible iterator over data rows.
pub struct RowIter {
    path: PathBuf,
    source: Arc<str>,
    header: Arc<Vec<String>>,
    records: csv::StringRecordsIntoIter<File>,
    next_index: usize,
}

impl Iterator for RowIter {
    type Item = Result<TestDataRow, DataSourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(r) => r,
            Err(e) => {
                return Some(Err(DataSourceError::Malformed {
                    path: self.path.clone(),
                    source: e,
                }))
            }
        };

        let index = self.next_index;
        self.next_index += 1;

        if record.len() != self.header.len() {
            return Some(Err(DataSourceError::RowWidth {
                path: self.path.clone(),
                row: index,
                expected: self.header.len(),
                found: record.len(),
            }));
        }

        let values = record.iter().map(CellValue::infer).collect();
        Some(Ok(TestDataRow {
            source: self.source.clone(),
            index,
            header: self.header.clone(),
            values,
        }))
    }
}
