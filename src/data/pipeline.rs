//! The filter → aggregate → pivot → order pipeline behind every heatmap,
//! plus the grouping used by the bar chart.

use super::aggregate::{aggregate, AggregationMethod, GroupedTable};
use super::cluster::reorder;
use super::domain::DomainRegistry;
use super::error::PipelineError;
use super::filter::{apply_filter, Selection};
use super::model::{Dimension, RecordTable, SHAP_VALUE};
use super::pivot::{pivot, LabeledMatrix};
use super::reindex::{canonical_row_order, reindex, OutOfOrderPolicy};

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

/// How heatmap rows and columns are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingStrategy {
    /// Dendrogram leaf order of a Ward clustering, recomputed from the data.
    #[default]
    Hierarchical,
    /// The registry's canonical orders, with gaps filled.
    Canonical(OutOfOrderPolicy),
}

/// Parameters of one heatmap computation.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapRequest {
    pub row_dims: Vec<Dimension>,
    pub col_dim: Dimension,
    pub value_field: String,
    pub method: AggregationMethod,
    pub fill_value: f64,
    pub strategy: OrderingStrategy,
}

impl Default for HeatmapRequest {
    fn default() -> Self {
        HeatmapRequest {
            row_dims: vec![Dimension::TimePeriod, Dimension::Frequency],
            col_dim: Dimension::Cluster,
            value_field: SHAP_VALUE.to_string(),
            method: AggregationMethod::Mean,
            fill_value: 0.0,
            strategy: OrderingStrategy::Hierarchical,
        }
    }
}

/// A finished heatmap: the ordered matrix and how it was derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub matrix: LabeledMatrix,
    pub row_dims: Vec<Dimension>,
    pub col_dim: Dimension,
    /// Original (sorted) row index of each display row; identity for
    /// canonical ordering.
    pub row_order: Vec<usize>,
    pub col_order: Vec<usize>,
}

impl Heatmap {
    /// Row labels joined as "time, frequency", optionally with registry labels.
    pub fn row_labels(&self, registry: &DomainRegistry, display: bool) -> Vec<String> {
        self.matrix
            .row_labels
            .iter()
            .map(|key| {
                key.iter()
                    .zip(&self.row_dims)
                    .map(|(v, dim)| if display { registry.label(*dim, v) } else { v.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect()
    }

    pub fn col_labels(&self, registry: &DomainRegistry, display: bool) -> Vec<String> {
        self.matrix
            .col_labels
            .iter()
            .map(|v| {
                if display {
                    registry.label(self.col_dim, v).to_string()
                } else {
                    v.clone()
                }
            })
            .collect()
    }

    /// Value of the first row dimension for each display row.
    pub fn row_groups(&self) -> Vec<&str> {
        self.matrix
            .row_labels
            .iter()
            .map(|k| k.first().map(String::as_str).unwrap_or_default())
            .collect()
    }
}

/// Run the full pipeline on `table`.
pub fn build_heatmap(
    table: &RecordTable,
    selection: &Selection,
    request: &HeatmapRequest,
    registry: &DomainRegistry,
) -> Result<Heatmap, PipelineError> {
    let filtered = apply_filter(table, selection);

    let mut group_by = request.row_dims.clone();
    group_by.push(request.col_dim);
    let grouped = aggregate(
        &filtered.records,
        &group_by,
        &request.value_field,
        request.method,
    )?;

    let (matrix, row_order, col_order) = match request.strategy {
        OrderingStrategy::Hierarchical => {
            let pivoted = pivot(
                &grouped,
                &request.row_dims,
                request.col_dim,
                request.fill_value,
            )?;
            let reordered = reorder(&pivoted)?;
            (reordered.matrix, reordered.row_order, reordered.col_order)
        }
        OrderingStrategy::Canonical(policy) => {
            let rows = canonical_row_order(registry, &request.row_dims)?;
            let cols = registry.require_order(request.col_dim)?;
            let matrix = reindex(
                &grouped,
                &request.row_dims,
                request.col_dim,
                &rows,
                cols,
                request.fill_value,
                policy,
            )?;
            let row_order = (0..matrix.n_rows()).collect();
            let col_order = (0..matrix.n_cols()).collect();
            (matrix, row_order, col_order)
        }
    };

    log::debug!(
        "heatmap {:?} x {}: {} records -> {}x{} matrix",
        request.row_dims,
        request.col_dim,
        filtered.len(),
        matrix.n_rows(),
        matrix.n_cols()
    );

    Ok(Heatmap {
        matrix,
        row_dims: request.row_dims.clone(),
        col_dim: request.col_dim,
        row_order,
        col_order,
    })
}

// ---------------------------------------------------------------------------
// Bar chart grouping
// ---------------------------------------------------------------------------

/// Parameters of the bar chart.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRequest {
    pub x: Dimension,
    /// One facet row per value.
    pub row_partition: Option<Dimension>,
    /// One colour per value.
    pub col_partition: Option<Dimension>,
    pub value_field: String,
    pub method: AggregationMethod,
}

impl Default for BarRequest {
    fn default() -> Self {
        BarRequest {
            x: Dimension::Cluster,
            row_partition: None,
            col_partition: None,
            value_field: SHAP_VALUE.to_string(),
            method: AggregationMethod::Sum,
        }
    }
}

impl BarRequest {
    /// `[x, row_partition, col_partition]` without absent or repeated entries.
    pub fn group_by(&self) -> Vec<Dimension> {
        let mut dims = vec![self.x];
        for dim in [self.row_partition, self.col_partition].into_iter().flatten() {
            if !dims.contains(&dim) {
                dims.push(dim);
            }
        }
        dims
    }

    /// Position of the row partition inside a group key.
    pub fn row_position(&self) -> Option<usize> {
        let dim = self.row_partition?;
        self.group_by().iter().position(|d| *d == dim)
    }

    pub fn col_position(&self) -> Option<usize> {
        let dim = self.col_partition?;
        self.group_by().iter().position(|d| *d == dim)
    }
}

/// Filter `table` and reduce the value per bar.
pub fn build_bar_groups(
    table: &RecordTable,
    selection: &Selection,
    request: &BarRequest,
) -> Result<GroupedTable, PipelineError> {
    let filtered = apply_filter(table, selection);
    aggregate(
        &filtered.records,
        &request.group_by(),
        &request.value_field,
        request.method,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::data::domain::CategoryDomain;
    use crate::data::filter::init_selection;
    use crate::data::model::fixtures::{grid_table, record};

    fn sum_request(strategy: OrderingStrategy) -> HeatmapRequest {
        HeatmapRequest {
            method: AggregationMethod::Sum,
            strategy,
            ..Default::default()
        }
    }

    fn grid_registry() -> DomainRegistry {
        let mut reg = DomainRegistry::empty();
        let domain = |order: &[&str]| CategoryDomain {
            order: order.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        };
        reg.insert(Dimension::TimePeriod, domain(&["(-4, 0]", "(0, 5]", "(5, 10]"]));
        reg.insert(Dimension::Frequency, domain(&["theta", "delta"]));
        reg.insert(Dimension::Cluster, domain(&["CL2", "CL1"]));
        reg
    }

    #[test]
    fn end_to_end_sum_heatmap() {
        let table = grid_table();
        let selection = init_selection(&table);
        let heatmap = build_heatmap(
            &table,
            &selection,
            &sum_request(OrderingStrategy::Hierarchical),
            &DomainRegistry::empty(),
        )
        .unwrap();
        assert_eq!((heatmap.matrix.n_rows(), heatmap.matrix.n_cols()), (4, 2));
        assert!(heatmap.matrix.rows().flatten().all(|v| *v == 2.0));

        let mut rows = heatmap.row_order.clone();
        rows.sort_unstable();
        assert_eq!(rows, vec![0, 1, 2, 3]);
    }

    #[test]
    fn canonical_heatmap_follows_registry() {
        let table = grid_table();
        let heatmap = build_heatmap(
            &table,
            &init_selection(&table),
            &sum_request(OrderingStrategy::Canonical(OutOfOrderPolicy::Drop)),
            &grid_registry(),
        )
        .unwrap();
        assert_eq!((heatmap.matrix.n_rows(), heatmap.matrix.n_cols()), (6, 2));
        assert_eq!(heatmap.matrix.col_labels, vec!["CL2", "CL1"]);
        assert_eq!(
            heatmap.row_labels(&grid_registry(), false)[0],
            "(-4, 0], theta"
        );
        // The (5, 10] rows have no data and carry the fill value.
        assert_eq!(heatmap.matrix.row(4), &[0.0, 0.0]);
        assert_eq!(heatmap.matrix.row(0), &[2.0, 2.0]);
        assert_eq!(heatmap.row_groups()[5], "(5, 10]");
    }

    #[test]
    fn canonical_heatmap_needs_configured_orders() {
        let table = grid_table();
        let err = build_heatmap(
            &table,
            &init_selection(&table),
            &sum_request(OrderingStrategy::Canonical(OutOfOrderPolicy::Drop)),
            &DomainRegistry::empty(),
        );
        assert_eq!(
            err,
            Err(PipelineError::MissingCanonicalOrder(Dimension::TimePeriod))
        );
    }

    #[test]
    fn filtering_everything_out_yields_empty_heatmap() {
        let table = grid_table();
        let mut selection = init_selection(&table);
        selection.insert(Dimension::Cluster, BTreeSet::new());
        let heatmap = build_heatmap(
            &table,
            &selection,
            &sum_request(OrderingStrategy::Hierarchical),
            &DomainRegistry::empty(),
        )
        .unwrap();
        assert!(heatmap.matrix.is_empty());
    }

    #[test]
    fn single_cluster_heatmap_does_not_cluster_columns() {
        let table = grid_table();
        let mut selection = init_selection(&table);
        selection.insert(Dimension::Cluster, BTreeSet::from(["CL1".to_string()]));
        let heatmap = build_heatmap(
            &table,
            &selection,
            &sum_request(OrderingStrategy::Hierarchical),
            &DomainRegistry::empty(),
        )
        .unwrap();
        assert_eq!(heatmap.col_order, vec![0]);
        assert_eq!(heatmap.matrix.n_rows(), 4);
    }

    #[test]
    fn display_labels_come_from_the_registry() {
        let table = RecordTable::from_records(vec![
            record("CL1", "(0, 5]", "delta", 1.0),
            record("CL2", "(0, 5]", "delta", 2.0),
        ]);
        let heatmap = build_heatmap(
            &table,
            &Selection::new(),
            &HeatmapRequest::default(),
            &DomainRegistry::eeg_defaults(),
        )
        .unwrap();
        let reg = DomainRegistry::eeg_defaults();
        assert_eq!(
            heatmap.row_labels(&reg, true),
            vec!["Early (0 to 5 s), Delta (1-4 Hz)"]
        );
        let mut cols = heatmap.col_labels(&reg, true);
        cols.sort();
        assert_eq!(cols, vec!["Left frontal", "Right frontal"]);
    }

    #[test]
    fn bar_partitions_collapse_repeats() {
        let request = BarRequest {
            x: Dimension::Frequency,
            row_partition: Some(Dimension::Frequency),
            col_partition: Some(Dimension::Cluster),
            ..Default::default()
        };
        assert_eq!(
            request.group_by(),
            vec![Dimension::Frequency, Dimension::Cluster]
        );
        assert_eq!(request.row_position(), Some(0));
        assert_eq!(request.col_position(), Some(1));

        let table = grid_table();
        let grouped = build_bar_groups(&table, &init_selection(&table), &request).unwrap();
        assert_eq!(grouped.len(), 4);
        assert_eq!(
            grouped.get(&["delta".to_string(), "CL1".to_string()]),
            Some(4.0)
        );
    }
}
