//! Column data model: flat, jagged, and doubly-jagged columns plus the
//! ordered table of named columns consumed by the aggregation engine.

use crate::error::{Error, Result};

/// A jagged (variable-length) column: flat values + per-row offsets.
///
/// `offsets` has length `n_rows + 1`. Row `i` has values
/// `flat[offsets[i]..offsets[i+1]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct JaggedCol {
    /// Flat array of all values across all rows.
    pub flat: Vec<f64>,
    /// Row boundaries: `offsets.len() == n_rows + 1`.
    pub offsets: Vec<usize>,
}

impl JaggedCol {
    /// Build from per-row value vectors.
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let mut flat = Vec::new();
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        for row in rows {
            flat.extend_from_slice(row);
            offsets.push(flat.len());
        }
        JaggedCol { flat, offsets }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Number of values in row `i`.
    pub fn row_len(&self, i: usize) -> usize {
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Values of row `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.flat[self.offsets[i]..self.offsets[i + 1]]
    }
}

/// A two-level jagged column: each row holds a variable-length list of
/// variable-length arrays.
///
/// `inner` is the one-level jagged view over all inner arrays;
/// `outer_offsets` (length `n_rows + 1`) groups consecutive inner arrays
/// into rows. Exploding the outermost level turns each inner array into a
/// single element of the output, so the exploded column is `Jagged`.
#[derive(Debug, Clone, PartialEq)]
pub struct DoublyJaggedCol {
    /// All inner arrays, flattened one level.
    pub inner: JaggedCol,
    /// Row boundaries over inner arrays: `outer_offsets.len() == n_rows + 1`.
    pub outer_offsets: Vec<usize>,
}

impl DoublyJaggedCol {
    /// Build from per-row lists of arrays.
    pub fn from_rows(rows: &[Vec<Vec<f64>>]) -> Self {
        let mut inner_rows = Vec::new();
        let mut outer_offsets = Vec::with_capacity(rows.len() + 1);
        outer_offsets.push(0);
        for row in rows {
            inner_rows.extend(row.iter().cloned());
            outer_offsets.push(inner_rows.len());
        }
        DoublyJaggedCol { inner: JaggedCol::from_rows(&inner_rows), outer_offsets }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.outer_offsets.len().saturating_sub(1)
    }

    /// Number of inner arrays in row `i`.
    pub fn row_len(&self, i: usize) -> usize {
        self.outer_offsets[i + 1] - self.outer_offsets[i]
    }
}

/// A named column of event data.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// One value per row.
    Scalar(Vec<f64>),
    /// A variable-length list of values per row.
    Jagged(JaggedCol),
    /// A variable-length list of arrays per row.
    DoublyJagged(DoublyJaggedCol),
}

impl Column {
    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        match self {
            Column::Scalar(v) => v.len(),
            Column::Jagged(j) => j.n_rows(),
            Column::DoublyJagged(d) => d.n_rows(),
        }
    }

    /// Per-row element count for jagged variants; `None` for scalars.
    pub fn row_len(&self, i: usize) -> Option<usize> {
        match self {
            Column::Scalar(_) => None,
            Column::Jagged(j) => Some(j.row_len(i)),
            Column::DoublyJagged(d) => Some(d.row_len(i)),
        }
    }

    /// Whether this column has variable per-row length.
    pub fn is_jagged(&self) -> bool {
        !matches!(self, Column::Scalar(_))
    }

    /// Flat values, or an error naming the column if it is still nested.
    pub fn as_scalar(&self, name: &str) -> Result<&[f64]> {
        match self {
            Column::Scalar(v) => Ok(v),
            _ => Err(Error::Jaggedness(format!(
                "column '{name}' holds nested values where scalars are required"
            ))),
        }
    }
}

/// An ordered set of equal-length named columns.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    columns: Vec<(String, Column)>,
}

impl DataTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. All columns in a table must agree on row count.
    pub fn push(&mut self, name: impl Into<String>, col: Column) -> Result<()> {
        let name = name.into();
        if let Some((_, first)) = self.columns.first()
            && first.n_rows() != col.n_rows()
        {
            return Err(Error::Config(format!(
                "column '{}' has {} rows, table has {}",
                name,
                col.n_rows(),
                first.n_rows()
            )));
        }
        if self.columns.iter().any(|(n, _)| *n == name) {
            return Err(Error::Config(format!("duplicate column '{name}'")));
        }
        self.columns.push((name, col));
        Ok(())
    }

    /// Number of rows (0 for an empty table).
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.n_rows()).unwrap_or(0)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Iterate over `(name, column)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Whether any column is jagged.
    pub fn has_jagged(&self) -> bool {
        self.columns.iter().any(|(_, c)| c.is_jagged())
    }
}
