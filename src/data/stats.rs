use std::collections::BTreeMap;

use super::aggregate::{group_values, GroupKey};
use super::error::PipelineError;
use super::model::{Dimension, Record};

/// Five-number summary of one box in a box plot.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub count: usize,
    pub lower_whisker: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

/// Quantile of already sorted data by linear interpolation between closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

impl BoxStats {
    /// Summarise `values`. Whiskers reach the furthest observations within
    /// 1.5 IQR of the quartiles; the rest are outliers. `None` when empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let (lo_fence, hi_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

        let inside = sorted.iter().copied().filter(|v| *v >= lo_fence && *v <= hi_fence);
        let lower_whisker = inside.clone().fold(f64::INFINITY, f64::min);
        let upper_whisker = inside.fold(f64::NEG_INFINITY, f64::max);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|v| *v < lo_fence || *v > hi_fence)
            .collect();

        Some(BoxStats {
            count: sorted.len(),
            lower_whisker,
            q1,
            median,
            q3,
            upper_whisker,
            outliers,
        })
    }
}

/// Box statistics of `value_field` per group key.
pub fn box_groups<'a, I>(
    records: I,
    group_by: &[Dimension],
    value_field: &str,
) -> Result<BTreeMap<GroupKey, BoxStats>, PipelineError>
where
    I: IntoIterator<Item = &'a Record>,
{
    Ok(group_values(records, group_by, value_field)?
        .into_iter()
        .filter_map(|(key, values)| BoxStats::from_values(&values).map(|s| (key, s)))
        .collect())
}

/// Linearly map the finite entries of `values` onto `[lo, hi]`.
///
/// A constant column maps to `lo`; non-finite entries pass through unchanged.
pub fn min_max_scale(values: &mut [f64], lo: f64, hi: f64) {
    let Some((min, max)) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((a, b)) => Some((a.min(v), b.max(v))),
        })
    else {
        return;
    };
    let range = if max - min == 0.0 { 1.0 } else { max - min };
    let scale = (hi - lo) / range;
    for v in values.iter_mut().filter(|v| v.is_finite()) {
        *v = lo + (*v - min) * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::fixtures::record;
    use crate::data::model::SHAP_VALUE;

    #[test]
    fn quartiles_interpolate_linearly() {
        let stats = BoxStats::from_values(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.q1, 1.75);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.q3, 3.25);
        assert_eq!(stats.lower_whisker, 1.0);
        assert_eq!(stats.upper_whisker, 4.0);
        assert!(stats.outliers.is_empty());
    }

    #[test]
    fn far_values_become_outliers() {
        let stats = BoxStats::from_values(&[1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 40.0]).unwrap();
        assert_eq!(stats.outliers, vec![40.0]);
        assert_eq!(stats.upper_whisker, 4.0);
        assert_eq!(stats.median, 3.0);
    }

    #[test]
    fn empty_and_single_value() {
        assert!(BoxStats::from_values(&[]).is_none());
        assert!(BoxStats::from_values(&[f64::NAN]).is_none());
        let one = BoxStats::from_values(&[2.0]).unwrap();
        assert_eq!((one.lower_whisker, one.median, one.upper_whisker), (2.0, 2.0, 2.0));
    }

    #[test]
    fn boxes_per_group() {
        let records = vec![
            record("A", "t", "f", 1.0),
            record("A", "t", "f", 3.0),
            record("B", "t", "f", 5.0),
        ];
        let boxes = box_groups(&records, &[Dimension::Cluster], SHAP_VALUE).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[&vec!["A".to_string()]].median, 2.0);
    }

    #[test]
    fn scaling_maps_to_range() {
        let mut values = vec![2.0, 4.0, f64::NAN, 6.0];
        min_max_scale(&mut values, -1.0, 1.0);
        assert_eq!(values[0], -1.0);
        assert_eq!(values[1], 0.0);
        assert!(values[2].is_nan());
        assert_eq!(values[3], 1.0);

        let mut constant = vec![3.0, 3.0];
        min_max_scale(&mut constant, -1.0, 1.0);
        assert_eq!(constant, vec![-1.0, -1.0]);
    }
}
