//! CSV dataset source.

use crate::error::MlError;
use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};

/// Rows of a CSV file, cells kept as text until a column is requested.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, MlError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| MlError::dataset(format!("column '{name}' not found in dataset")))
    }

    /// Parse one column as `f64`.
    pub fn column(&self, name: &str) -> Result<Array1<f64>, MlError> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| parse_cell(name, row, &cells[idx]))
            .collect::<Result<Vec<_>, _>>()
            .map(Array1::from)
    }

    /// Parse `names` into a row-major matrix, columns in the given order.
    pub fn matrix(&self, names: &[String]) -> Result<Array2<f64>, MlError> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>, _>>()?;
        let mut values = Vec::with_capacity(self.rows.len() * indices.len());
        for (row, cells) in self.rows.iter().enumerate() {
            for (&idx, name) in indices.iter().zip(names) {
                values.push(parse_cell(name, row, &cells[idx])?);
            }
        }
        Array2::from_shape_vec((self.rows.len(), indices.len()), values)
            .map_err(|e| MlError::dataset(format!("feature matrix: {e}")))
    }
}

fn parse_cell(column: &str, row: usize, cell: &str) -> Result<f64, MlError> {
    cell.parse::<f64>().map_err(|_| {
        MlError::dataset(format!(
            "column '{column}' row {}: '{cell}' is not a number",
            row + 1
        ))
    })
}

/// CSV file data source.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: char,
}

impl CsvSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            delimiter: ',',
        }
    }

    /// Read the whole file. Fails when it is unreadable, has no header, or a
    /// row does not have one cell per header column.
    pub fn load(&self) -> Result<DataTable, MlError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            MlError::dataset(format!("cannot read {}: {e}", self.path.display()))
        })?;
        self.parse(&content)
    }

    fn parse(&self, content: &str) -> Result<DataTable, MlError> {
        let mut lines = content.lines();

        // Parse header
        let columns: Vec<String> = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| MlError::dataset(format!("{} is empty", self.path.display())))?
            .split(self.delimiter)
            .map(clean_cell)
            .collect();

        let mut rows = Vec::new();
        for (n, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: Vec<String> = line.split(self.delimiter).map(clean_cell).collect();
            if row.len() != columns.len() {
                return Err(MlError::dataset(format!(
                    "{} line {}: expected {} cells, found {}",
                    self.path.display(),
                    n + 2,
                    columns.len(),
                    row.len()
                )));
            }
            rows.push(row);
        }

        Ok(DataTable { columns, rows })
    }
}

fn clean_cell(s: &str) -> String {
    s.trim().trim_matches('"').to_string()
}
