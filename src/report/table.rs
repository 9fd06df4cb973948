//! Loading of the cleaned ANNOVAR table.

use std::path::{Path, PathBuf};

use crate::{common::open_read_maybe_gz, err::SchemaError};

/// Token used by ANNOVAR for missing values (`-nastring .`).
pub const NA_STRING: &str = ".";

/// A field value that may be missing from the source table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<T> {
    /// The value is there and could be interpreted.
    Present(T),
    /// Empty cell or the missing-value token.
    Absent,
    /// Something is there but it could not be interpreted.
    Unparseable,
}

impl<'a> Value<&'a str> {
    /// Interpret a raw text cell.
    pub fn text(raw: &'a str) -> Self {
        if raw.is_empty() || raw == NA_STRING {
            Value::Absent
        } else {
            Value::Present(raw)
        }
    }

    /// Whether the value is present and contains `needle`; a missing value
    /// never matches.
    pub fn contains(&self, needle: &str) -> bool {
        matches!(self, Value::Present(value) if value.contains(needle))
    }
}

impl Value<f64> {
    /// Interpret a raw cell as a number; `NaN` counts as absent.
    pub fn number(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == NA_STRING {
            return Value::Absent;
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_nan() => Value::Absent,
            Ok(value) => Value::Present(value),
            Err(_) => Value::Unparseable,
        }
    }
}

impl<T: Copy> Value<T> {
    pub fn present(&self) -> Option<T> {
        match self {
            Value::Present(value) => Some(*value),
            Value::Absent | Value::Unparseable => None,
        }
    }
}

/// The cleaned annotation table, all cells kept as text.
#[derive(Debug, Clone)]
pub struct AnnotationTable {
    /// Path the table was loaded from, for error messages.
    pub path: PathBuf,
    /// The column header.
    pub headers: csv::StringRecord,
    /// The data rows, in file order.
    pub rows: Vec<csv::StringRecord>,
}

impl AnnotationTable {
    /// Load the comma-separated table at `path`.
    ///
    /// Fails with a [`SchemaError`] if the file has no header line or a row
    /// has a different number of fields than the header.
    pub fn from_path<P>(path: P) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().to_path_buf();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(open_read_maybe_gz(&path).map_err(|e| {
                anyhow::anyhow!("could not open annotation table {:?}: {}", &path, e)
            })?);

        let headers = reader
            .headers()
            .map_err(|e| anyhow::anyhow!("could not read header of {:?}: {}", &path, e))?
            .clone();
        if headers.is_empty() {
            return Err(SchemaError::EmptyTable { path }.into());
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| match e.kind() {
                csv::ErrorKind::UnequalLengths {
                    pos,
                    expected_len,
                    len,
                } => anyhow::Error::from(SchemaError::RaggedRow {
                    path: path.clone(),
                    line: pos.as_ref().map(|pos| pos.line()).unwrap_or_default(),
                    expected: *expected_len,
                    found: *len,
                }),
                _ => anyhow::anyhow!("could not parse annotation table {:?}: {}", &path, e),
            })?;
            rows.push(record);
        }

        Ok(Self {
            path,
            headers,
            rows,
        })
    }

    /// Index of the column `name`.
    pub fn column(&self, name: &str) -> Result<usize, SchemaError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| SchemaError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }
}
