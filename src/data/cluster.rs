//! Ward hierarchical clustering and dendrogram leaf ordering.
//!
//! Observations are merged greedily by the smallest Ward distance, using the
//! Lance-Williams update on Euclidean distances. Cluster ids follow the usual
//! convention: leaves are `0..n`, the cluster formed by merge `i` is `n + i`,
//! and each merge lists the smaller id first.

use super::error::PipelineError;
use super::pivot::LabeledMatrix;

/// One agglomeration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    /// Number of observations in the merged cluster.
    pub size: usize,
}

/// The full merge history over `n_leaves` observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    pub n_leaves: usize,
    pub merges: Vec<Merge>,
}

impl Dendrogram {
    /// Leaf ids in left-to-right order.
    pub fn leaves(&self) -> Vec<usize> {
        let n = self.n_leaves;
        if n == 0 {
            return Vec::new();
        }
        let mut order = Vec::with_capacity(n);
        let mut stack = vec![2 * n - 2];
        while let Some(node) = stack.pop() {
            if node < n {
                order.push(node);
            } else {
                let merge = &self.merges[node - n];
                stack.push(merge.right);
                stack.push(merge.left);
            }
        }
        order
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Build the Ward dendrogram of `observations` (all the same length).
///
/// Ties in merge distance go to the pair found first in row-major order of
/// the current cluster slots, so identical input always yields the same tree.
pub fn ward_linkage(observations: &[&[f64]]) -> Result<Dendrogram, PipelineError> {
    let n = observations.len();
    if n < 2 {
        return Err(PipelineError::InsufficientObservations(n));
    }
    for (row, obs) in observations.iter().enumerate() {
        if let Some(col) = obs.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::NonFiniteValue { row, col });
        }
    }

    // Slot i starts as leaf i; a merge reuses the lower slot.
    let mut dist = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean(observations[i], observations[j]);
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }
    let mut ids: Vec<usize> = (0..n).collect();
    let mut sizes: Vec<usize> = vec![1; n];
    let mut active: Vec<bool> = vec![true; n];
    let mut merges = Vec::with_capacity(n - 1);

    for step in 0..(n - 1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                let d = dist[i * n + j];
                if best.map_or(true, |(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((i, j, d_ij)) = best else {
            break;
        };

        let (si, sj) = (sizes[i] as f64, sizes[j] as f64);
        for k in 0..n {
            if !active[k] || k == i || k == j {
                continue;
            }
            let sk = sizes[k] as f64;
            let d_ki = dist[k * n + i];
            let d_kj = dist[k * n + j];
            let squared = ((si + sk) * d_ki * d_ki + (sj + sk) * d_kj * d_kj - sk * d_ij * d_ij)
                / (si + sj + sk);
            let d = squared.max(0.0).sqrt();
            dist[k * n + i] = d;
            dist[i * n + k] = d;
        }

        let (a, b) = (ids[i], ids[j]);
        merges.push(Merge {
            left: a.min(b),
            right: a.max(b),
            distance: d_ij,
            size: sizes[i] + sizes[j],
        });
        ids[i] = n + step;
        sizes[i] += sizes[j];
        active[j] = false;
    }

    Ok(Dendrogram { n_leaves: n, merges })
}

/// Dendrogram leaf order of the rows of `matrix`.
pub fn leaf_order(matrix: &LabeledMatrix) -> Result<Vec<usize>, PipelineError> {
    let rows: Vec<&[f64]> = matrix.rows().collect();
    Ok(ward_linkage(&rows)?.leaves())
}

/// A matrix with rows and columns rearranged by dendrogram leaf order.
#[derive(Debug, Clone, PartialEq)]
pub struct Reordered {
    pub matrix: LabeledMatrix,
    /// `row_order[i]` is the original index of display row `i`.
    pub row_order: Vec<usize>,
    pub col_order: Vec<usize>,
}

/// Cluster rows and (via the transpose) columns independently and reorder
/// both axes by leaf order.
///
/// An axis with fewer than two entries, or an empty matrix, keeps its
/// identity order; clustering is not attempted there.
pub fn reorder(matrix: &LabeledMatrix) -> Result<Reordered, PipelineError> {
    let identity = |n: usize| (0..n).collect::<Vec<_>>();

    let (row_order, col_order) = if matrix.is_empty() {
        log::debug!("skipping clustering of empty matrix");
        (identity(matrix.n_rows()), identity(matrix.n_cols()))
    } else {
        let row_order = if matrix.n_rows() < 2 {
            log::debug!("single row, keeping identity row order");
            identity(matrix.n_rows())
        } else {
            leaf_order(matrix)?
        };
        let col_order = if matrix.n_cols() < 2 {
            log::debug!("single column, keeping identity column order");
            identity(matrix.n_cols())
        } else {
            leaf_order(&matrix.transpose()).map_err(|e| match e {
                PipelineError::NonFiniteValue { row, col } => {
                    PipelineError::NonFiniteValue { row: col, col: row }
                }
                other => other,
            })?
        };
        (row_order, col_order)
    };

    Ok(Reordered {
        matrix: matrix.permute(&row_order, &col_order),
        row_order,
        col_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[f64]]) -> LabeledMatrix {
        let n_cols = rows.first().map_or(0, |r| r.len());
        LabeledMatrix::from_rows(
            (0..rows.len()).map(|i| vec![format!("r{i}")]).collect(),
            (0..n_cols).map(|j| format!("c{j}")).collect(),
            rows.iter().map(|r| r.to_vec()).collect(),
        )
        .unwrap()
    }

    fn is_permutation(order: &[usize], n: usize) -> bool {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        sorted == (0..n).collect::<Vec<_>>()
    }

    #[test]
    fn ward_distances_follow_lance_williams() {
        // Points on a line: 0, 1, 5.
        let points: [&[f64]; 3] = [&[0.0], &[1.0], &[5.0]];
        let tree = ward_linkage(&points).unwrap();
        assert_eq!(tree.merges.len(), 2);
        assert_eq!((tree.merges[0].left, tree.merges[0].right), (0, 1));
        assert!((tree.merges[0].distance - 1.0).abs() < 1e-12);
        assert_eq!((tree.merges[1].left, tree.merges[1].right), (2, 3));
        assert_eq!(tree.merges[1].size, 3);
        // sqrt(2 * |{0,1}| * |{5}| / 3) * distance between centroids 0.5 and 5
        let expected = (2.0 * 2.0 * 1.0 / 3.0f64).sqrt() * 4.5;
        assert!((tree.merges[1].distance - expected).abs() < 1e-9);
    }

    #[test]
    fn leaves_group_similar_rows() {
        let m = matrix(&[
            &[0.0, 0.0, 10.0],
            &[10.0, 10.0, 0.0],
            &[0.5, 0.0, 10.0],
            &[10.0, 9.9, 0.0],
        ]);
        let out = reorder(&m).unwrap();
        assert!(is_permutation(&out.row_order, 4));
        assert!(is_permutation(&out.col_order, 3));
        assert_eq!(out.row_order, vec![1, 3, 0, 2]);
        // Display rows come from the original rows in row_order.
        assert_eq!(out.matrix.row_labels[0], m.row_labels[1]);
        for (display, &orig) in out.row_order.iter().enumerate() {
            for (dc, &oc) in out.col_order.iter().enumerate() {
                assert_eq!(out.matrix.get(display, dc), m.get(orig, oc));
            }
        }
    }

    #[test]
    fn single_row_keeps_identity_rows() {
        let m = matrix(&[&[3.0, 1.0, 2.0]]);
        let out = reorder(&m).unwrap();
        assert_eq!(out.row_order, vec![0]);
        assert!(is_permutation(&out.col_order, 3));
    }

    #[test]
    fn single_column_keeps_identity_columns() {
        let m = matrix(&[&[3.0], &[1.0], &[2.9]]);
        let out = reorder(&m).unwrap();
        assert_eq!(out.col_order, vec![0]);
        assert!(is_permutation(&out.row_order, 3));
    }

    #[test]
    fn empty_matrix_short_circuits() {
        let out = reorder(&LabeledMatrix::default()).unwrap();
        assert!(out.row_order.is_empty());
        assert!(out.col_order.is_empty());
        assert!(out.matrix.is_empty());
    }

    #[test]
    fn identical_input_gives_identical_order() {
        let m = matrix(&[&[1.0, 1.0], &[1.0, 1.0], &[1.0, 1.0], &[2.0, 0.0]]);
        let a = reorder(&m).unwrap();
        let b = reorder(&m).unwrap();
        assert_eq!(a, b);
        assert!(is_permutation(&a.row_order, 4));
    }

    #[test]
    fn linkage_reports_degenerate_and_non_finite_input() {
        let one: [&[f64]; 1] = [&[1.0]];
        assert_eq!(
            ward_linkage(&one),
            Err(PipelineError::InsufficientObservations(1))
        );
        let m = matrix(&[&[0.0, f64::NAN], &[1.0, 2.0]]);
        assert_eq!(
            reorder(&m),
            Err(PipelineError::NonFiniteValue { row: 0, col: 1 })
        );
    }
}
