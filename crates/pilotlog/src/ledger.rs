//! Flat-table ledger files.
//!
//! A ledger is a CSV file whose first column is an unnamed 1-based row key,
//! followed by a fixed set of named columns:
//!
//! ```text
//! ,Posición,Velocidad Media,Velocidad Max
//! 1,3,187,201
//! 2,1,212,230
//! ```
//!
//! Every write rewrites the whole file. The new content is written to a
//! sibling temporary file and renamed over the target.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// An in-memory ledger table: named columns and rows of raw cell values.
///
/// The row key column is implicit: row `i` of `rows` has key `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given columns.
    #[must_use]
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Column names in file order, excluding the row key.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data rows in key order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. Its width must match the column count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the row width differs from the header.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::corrupt(
                "<memory>",
                format!(
                    "row has {} cells, table has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Check that the header names exactly `expected`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] naming `path` if the header differs.
    pub fn expect_columns<S: AsRef<str>>(&self, path: &Path, expected: &[S]) -> Result<()> {
        let matches = self.columns.len() == expected.len()
            && self
                .columns
                .iter()
                .zip(expected)
                .all(|(have, want)| have == want.as_ref());
        if matches {
            Ok(())
        } else {
            let want: Vec<&str> = expected.iter().map(AsRef::as_ref).collect();
            Err(Error::corrupt(
                path,
                format!("expected columns {want:?}, found {:?}", self.columns),
            ))
        }
    }
}

/// Load a ledger table from `path`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the file is absent, and [`Error::Corrupt`]
/// if the header is missing, a row's width differs from the header, or the
/// row keys are not `1..=n` in order.
pub fn load(path: &Path) -> Result<Table> {
    let mut reader = match csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(err) => return Err(map_open_error(path, err)),
    };

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| Error::corrupt(path, e.to_string()))?,
        None => return Err(Error::corrupt(path, "missing header row")),
    };

    let mut fields = header.iter();
    let columns: Vec<String> = match fields.next() {
        Some("") => fields.map(str::to_string).collect(),
        // A bare header with no key column, as written on a fresh install
        // before any row exists.
        Some(_) => header.iter().map(str::to_string).collect(),
        None => return Err(Error::corrupt(path, "empty header row")),
    };
    let keyed = header.get(0) == Some("");

    let mut table = Table::new(&columns);
    for (i, record) in records.enumerate() {
        let record = record.map_err(|e| Error::corrupt(path, e.to_string()))?;
        if !keyed {
            return Err(Error::corrupt(path, "data rows present without a key column"));
        }
        let expected_key = (i + 1).to_string();
        let key = record.get(0).unwrap_or_default();
        if key != expected_key {
            return Err(Error::corrupt(
                path,
                format!("row {} has key '{key}', expected {expected_key}", i + 1),
            ));
        }
        let cells: Vec<String> = record.iter().skip(1).map(str::to_string).collect();
        if cells.len() != table.columns.len() {
            return Err(Error::corrupt(
                path,
                format!(
                    "row {} has {} cells, header has {} columns",
                    i + 1,
                    cells.len(),
                    table.columns.len()
                ),
            ));
        }
        table.rows.push(cells);
    }

    debug!("Loaded {} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Write `table` to `path`, replacing any previous content.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or renamed.
pub fn save(path: &Path, table: &Table) -> Result<()> {
    let tmp = temp_path(path);
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        write_table(&mut writer, table)?;
        writer.flush()?;
    }
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err.into());
    }
    debug!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Create a new ledger at `path` holding only the header.
///
/// # Errors
///
/// Returns [`Error::AlreadyExists`] if anything already exists at `path`.
pub fn create_empty<S: AsRef<str>>(path: &Path, columns: &[S]) -> Result<Table> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => Error::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => Error::Io(err),
        })?;

    let table = Table::new(columns);
    let mut writer = csv::Writer::from_writer(file);
    write_table(&mut writer, &table)?;
    writer.flush()?;
    debug!("Created ledger {}", path.display());
    Ok(table)
}

fn write_table<W: std::io::Write>(writer: &mut csv::Writer<W>, table: &Table) -> Result<()> {
    let header = std::iter::once("").chain(table.columns.iter().map(String::as_str));
    writer.write_record(header)?;
    for (i, row) in table.rows.iter().enumerate() {
        let key = (i + 1).to_string();
        writer.write_record(std::iter::once(key.as_str()).chain(row.iter().map(String::as_str)))?;
    }
    Ok(())
}

fn map_open_error(path: &Path, err: csv::Error) -> Error {
    if let csv::ErrorKind::Io(io) = err.kind() {
        if io.kind() == ErrorKind::NotFound {
            return Error::NotFound {
                path: path.to_path_buf(),
            };
        }
    }
    Error::Csv(err)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
