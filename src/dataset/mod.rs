//! Tabular dataset contracts
//!
//! Raw datasets are collector outputs; clean datasets are what the wrangling
//! stage derives from them. Both are CSV files with a fixed, ordered column
//! schema that is checked every time a table crosses a stage boundary.

pub mod catalog;
pub mod wrangle;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::storage::write_atomic;

pub use catalog::DatasetDefinition;
pub use wrangle::{wrangle, WrangleReport};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset file not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("dataset '{name}' violates its schema: expected columns {expected:?}, found {found:?}")]
    SchemaViolation {
        name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("malformed csv in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Named, ordered column list of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub name: String,
    pub columns: Vec<String>,
}

impl DatasetSchema {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// In-memory CSV table. Cells are kept as trimmed strings; typed access goes
/// through [`Record`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |row| Record { table: self, row })
    }

    /// Rough heap footprint, used when reclaiming cached tables.
    pub fn approx_bytes(&self) -> usize {
        let header: usize = self.columns.iter().map(String::len).sum();
        let cells: usize = self
            .rows
            .iter()
            .flat_map(|r| r.iter())
            .map(|c| c.capacity() + std::mem::size_of::<String>())
            .sum();
        header + cells
    }

    pub fn validate(&self, schema: &DatasetSchema) -> Result<(), DatasetError> {
        if self.columns != schema.columns {
            return Err(DatasetError::SchemaViolation {
                name: schema.name.clone(),
                expected: schema.columns.clone(),
                found: self.columns.clone(),
            });
        }
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self, DatasetError> {
        Self::parse_csv(&read_bytes(path)?, path)
    }

    /// Parses CSV bytes; `origin` only labels errors.
    pub fn parse_csv(bytes: &[u8], origin: &Path) -> Result<Self, DatasetError> {
        let csv_err = |source| DatasetError::Csv {
            path: origin.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let columns = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect::<Vec<_>>();

        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            table.rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    pub fn read_with_schema(path: &Path, schema: &DatasetSchema) -> Result<Self, DatasetError> {
        let table = Self::read_csv(path)?;
        table.validate(schema)?;
        Ok(table)
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }

    /// Publishes the table at `path` atomically.
    pub fn write_csv(&self, path: &Path) -> Result<(), DatasetError> {
        let bytes = self.to_csv_bytes().map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &bytes).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    table: &'a Table,
    row: &'a [String],
}

impl<'a> Record<'a> {
    /// Cell value, or `None` when the column is unknown or the cell is blank.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.column_index(column)?;
        self.row
            .get(idx)
            .map(String::as_str)
            .filter(|v| !v.is_empty() && !is_na(v))
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

/// Common missing-value spellings found in collector outputs.
/// Whole file contents; a missing file is [`DatasetError::MissingArtifact`].
pub fn read_bytes(path: &Path) -> Result<Vec<u8>, DatasetError> {
    std::fs::read(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => DatasetError::MissingArtifact(path.to_path_buf()),
        _ => DatasetError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

pub fn is_na(value: &str) -> bool {
    matches!(value, "NA" | "N/A" | "NaN" | "nan" | "null" | "NULL" | "-")
}
