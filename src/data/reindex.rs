use std::collections::{BTreeSet, HashMap};

use super::aggregate::GroupedTable;
use super::domain::DomainRegistry;
use super::error::PipelineError;
use super::model::Dimension;
use super::pivot::{KeyLayout, LabeledMatrix, RowKey};

/// What to do with grouped keys that are not part of the canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfOrderPolicy {
    /// The canonical order is the complete set of valid values; other keys
    /// are left out of the matrix.
    #[default]
    Drop,
    /// Keep every key: unknown rows and columns follow the canonical ones,
    /// sorted.
    Append,
    /// Fail with [`PipelineError::OutsideCanonicalOrder`].
    Reject,
}

impl OutOfOrderPolicy {
    pub const ALL: [OutOfOrderPolicy; 3] = [
        OutOfOrderPolicy::Drop,
        OutOfOrderPolicy::Append,
        OutOfOrderPolicy::Reject,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OutOfOrderPolicy::Drop => "Drop unknown",
            OutOfOrderPolicy::Append => "Append unknown",
            OutOfOrderPolicy::Reject => "Reject unknown",
        }
    }
}

/// The canonical row keys for `row_dims`: the cartesian product of each
/// dimension's canonical order, first dimension varying slowest.
pub fn canonical_row_order(
    registry: &DomainRegistry,
    row_dims: &[Dimension],
) -> Result<Vec<RowKey>, PipelineError> {
    let mut keys: Vec<RowKey> = vec![Vec::new()];
    for dim in row_dims {
        let order = registry.require_order(*dim)?;
        keys = keys
            .into_iter()
            .flat_map(|prefix| {
                order.iter().map(move |v| {
                    let mut key = prefix.clone();
                    key.push(v.clone());
                    key
                })
            })
            .collect();
    }
    Ok(keys)
}

/// Place the grouped values into a matrix whose rows and columns follow the
/// given canonical orders exactly, filling absent combinations with
/// `fill_value`.
///
/// Keys outside the orders are handled according to `policy`. Duplicate
/// entries in an order keep their first position.
pub fn reindex(
    grouped: &GroupedTable,
    row_dims: &[Dimension],
    col_dim: Dimension,
    row_order: &[RowKey],
    col_order: &[String],
    fill_value: f64,
    policy: OutOfOrderPolicy,
) -> Result<LabeledMatrix, PipelineError> {
    let layout = KeyLayout::new(grouped, row_dims, col_dim)?;

    let mut row_labels = dedup_preserving(row_order);
    let mut col_labels = dedup_preserving(col_order);

    let mut extra_rows: BTreeSet<RowKey> = BTreeSet::new();
    let mut extra_cols: BTreeSet<String> = BTreeSet::new();
    let mut outside = 0usize;
    {
        let known_rows: BTreeSet<&RowKey> = row_labels.iter().collect();
        let known_cols: BTreeSet<&str> = col_labels.iter().map(String::as_str).collect();
        for key in grouped.groups.keys() {
            let (row, col) = layout.split(key);
            let row_known = known_rows.contains(&row);
            let col_known = known_cols.contains(col);
            if row_known && col_known {
                continue;
            }
            outside += 1;
            if policy == OutOfOrderPolicy::Reject {
                return Err(PipelineError::OutsideCanonicalOrder {
                    count: count_outside(grouped, &layout, &known_rows, &known_cols),
                    example: key.join(", "),
                });
            }
            if !row_known {
                extra_rows.insert(row);
            }
            if !col_known {
                extra_cols.insert(col.to_string());
            }
        }
    }

    match policy {
        OutOfOrderPolicy::Append => {
            row_labels.extend(extra_rows);
            col_labels.extend(extra_cols);
        }
        _ if outside > 0 => {
            log::debug!("reindex dropped {outside} grouped key(s) outside the canonical order");
        }
        _ => {}
    }

    let row_index: HashMap<RowKey, usize> = row_labels
        .iter()
        .enumerate()
        .map(|(i, k)| (k.clone(), i))
        .collect();
    let col_index: HashMap<String, usize> = col_labels
        .iter()
        .enumerate()
        .map(|(i, k)| (k.clone(), i))
        .collect();

    let mut matrix = LabeledMatrix::filled(row_labels, col_labels, fill_value);
    for (key, value) in &grouped.groups {
        let (row, col) = layout.split(key);
        if let (Some(&r), Some(&c)) = (row_index.get(&row), col_index.get(col)) {
            matrix.set(r, c, *value);
        }
    }
    Ok(matrix)
}

fn dedup_preserving<T: Clone + Ord>(order: &[T]) -> Vec<T> {
    let mut seen = BTreeSet::new();
    order
        .iter()
        .filter(|v| seen.insert((*v).clone()))
        .cloned()
        .collect()
}

fn count_outside(
    grouped: &GroupedTable,
    layout: &KeyLayout,
    known_rows: &BTreeSet<&RowKey>,
    known_cols: &BTreeSet<&str>,
) -> usize {
    grouped
        .groups
        .keys()
        .filter(|key| {
            let (row, col) = layout.split(key);
            !known_rows.contains(&row) || !known_cols.contains(col)
        })
        .count()
}
