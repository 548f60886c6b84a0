use std::collections::BTreeSet;

use super::aggregate::{GroupKey, GroupedTable};
use super::error::PipelineError;
use super::model::Dimension;

/// Values of the row dimensions of a pivoted matrix.
pub type RowKey = Vec<String>;

// ---------------------------------------------------------------------------
// LabeledMatrix – dense 2D array with row and column labels
// ---------------------------------------------------------------------------

/// A dense row-major matrix with a label per row and per column.
///
/// Every cell holds a number; pivoting fills absent combinations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabeledMatrix {
    pub row_labels: Vec<RowKey>,
    pub col_labels: Vec<String>,
    values: Vec<f64>,
}

impl LabeledMatrix {
    /// A matrix of `fill` with the given labels.
    pub fn filled(row_labels: Vec<RowKey>, col_labels: Vec<String>, fill: f64) -> Self {
        let values = vec![fill; row_labels.len() * col_labels.len()];
        LabeledMatrix {
            row_labels,
            col_labels,
            values,
        }
    }

    /// Build from explicit rows; `None` if a row length differs from the column count.
    pub fn from_rows(
        row_labels: Vec<RowKey>,
        col_labels: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Option<Self> {
        if rows.len() != row_labels.len() || rows.iter().any(|r| r.len() != col_labels.len()) {
            return None;
        }
        Some(LabeledMatrix {
            row_labels,
            col_labels,
            values: rows.into_iter().flatten().collect(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.row_labels.len()
    }

    pub fn n_cols(&self) -> usize {
        self.col_labels.len()
    }

    /// True when the matrix has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.n_cols() + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let n_cols = self.n_cols();
        self.values[row * n_cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let n_cols = self.n_cols();
        &self.values[row * n_cols..(row + 1) * n_cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_rows()).map(move |r| self.row(r))
    }

    /// Finite minimum and maximum over all cells.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Swap rows and columns. Column labels become single-part row keys;
    /// row keys are joined with ", " to become column labels.
    pub fn transpose(&self) -> LabeledMatrix {
        let row_labels = self.col_labels.iter().map(|c| vec![c.clone()]).collect();
        let col_labels = self.row_labels.iter().map(|k| k.join(", ")).collect();
        let mut out = LabeledMatrix::filled(row_labels, col_labels, 0.0);
        for r in 0..self.n_rows() {
            for c in 0..self.n_cols() {
                out.set(c, r, self.get(r, c));
            }
        }
        out
    }

    /// A new matrix whose row `i` is row `row_order[i]` of `self`, and
    /// likewise for columns.
    pub fn permute(&self, row_order: &[usize], col_order: &[usize]) -> LabeledMatrix {
        let row_labels = row_order.iter().map(|&r| self.row_labels[r].clone()).collect();
        let col_labels = col_order.iter().map(|&c| self.col_labels[c].clone()).collect();
        let values = row_order
            .iter()
            .flat_map(|&r| col_order.iter().map(move |&c| (r, c)))
            .map(|(r, c)| self.get(r, c))
            .collect();
        LabeledMatrix {
            row_labels,
            col_labels,
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// Pivot
// ---------------------------------------------------------------------------

/// Where the row parts and the column part live inside a grouped key.
#[derive(Debug, Clone)]
pub(crate) struct KeyLayout {
    row_positions: Vec<usize>,
    col_position: usize,
}

impl KeyLayout {
    /// `row_dims` plus `col_dim` must be exactly the grouped dimensions.
    pub(crate) fn new(
        grouped: &GroupedTable,
        row_dims: &[Dimension],
        col_dim: Dimension,
    ) -> Result<Self, PipelineError> {
        let mismatch = || PipelineError::PivotLayout {
            row_dims: row_dims.to_vec(),
            col_dim,
            grouped: grouped.group_by.clone(),
        };

        if row_dims.is_empty()
            || row_dims.len() + 1 != grouped.group_by.len()
            || row_dims.contains(&col_dim)
        {
            return Err(mismatch());
        }
        let position = |dim: Dimension| grouped.group_by.iter().position(|d| *d == dim);
        let row_positions = row_dims
            .iter()
            .map(|d| position(*d))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(mismatch)?;
        let col_position = position(col_dim).ok_or_else(mismatch)?;

        Ok(KeyLayout {
            row_positions,
            col_position,
        })
    }

    pub(crate) fn split<'k>(&self, key: &'k GroupKey) -> (RowKey, &'k str) {
        let row = self.row_positions.iter().map(|&p| key[p].clone()).collect();
        (row, key[self.col_position].as_str())
    }
}

/// Reshape a grouped table into a matrix with one row per distinct
/// `row_dims` combination and one column per distinct `col_dim` value.
///
/// Rows and columns are sorted; combinations absent from `grouped` are set
/// to `fill_value`.
pub fn pivot(
    grouped: &GroupedTable,
    row_dims: &[Dimension],
    col_dim: Dimension,
    fill_value: f64,
) -> Result<LabeledMatrix, PipelineError> {
    let layout = KeyLayout::new(grouped, row_dims, col_dim)?;

    let mut rows: BTreeSet<RowKey> = BTreeSet::new();
    let mut cols: BTreeSet<String> = BTreeSet::new();
    for key in grouped.groups.keys() {
        let (row, col) = layout.split(key);
        rows.insert(row);
        cols.insert(col.to_string());
    }

    let row_labels: Vec<RowKey> = rows.into_iter().collect();
    let col_labels: Vec<String> = cols.into_iter().collect();
    let mut matrix = LabeledMatrix::filled(row_labels, col_labels, fill_value);

    for (key, value) in &grouped.groups {
        let (row, col) = layout.split(key);
        let r = matrix.row_labels.binary_search(&row);
        let c = matrix.col_labels.binary_search_by(|l| l.as_str().cmp(col));
        if let (Ok(r), Ok(c)) = (r, c) {
            matrix.set(r, c, *value);
        }
    }

    log::debug!(
        "pivoted {} groups into a {}x{} matrix",
        grouped.len(),
        matrix.n_rows(),
        matrix.n_cols()
    );
    Ok(matrix)
}
