use thiserror::Error;

use super::model::Dimension;

/// A pipeline stage that could not produce a well-formed result.
///
/// These are reported to the caller instead of rendering a partial matrix.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("group-by needs between 1 and 3 dimensions, got {0}")]
    GroupByArity(usize),

    #[error("dimension {0} appears more than once in the group-by")]
    DuplicateDimension(Dimension),

    #[error("pivot layout {row_dims:?} x {col_dim} does not match grouped dimensions {grouped:?}")]
    PivotLayout {
        row_dims: Vec<Dimension>,
        col_dim: Dimension,
        grouped: Vec<Dimension>,
    },

    #[error("insufficient observations for clustering: need at least 2, got {0}")]
    InsufficientObservations(usize),

    #[error("matrix contains a non-finite value at row {row}, column {col}")]
    NonFiniteValue { row: usize, col: usize },

    #[error("{count} key(s) fall outside the canonical order, e.g. {example}")]
    OutsideCanonicalOrder { count: usize, example: String },

    #[error("no canonical order is configured for {0}")]
    MissingCanonicalOrder(Dimension),
}
