use std::collections::BTreeMap;
use std::fmt;

use super::error::PipelineError;
use super::model::{Dimension, Record};

/// Values of the group-by dimensions, in group-by order.
pub type GroupKey = Vec<String>;

/// How the values of one group are reduced to a single number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMethod {
    Sum,
    #[default]
    Mean,
}

impl AggregationMethod {
    pub fn label(self) -> &'static str {
        match self {
            AggregationMethod::Sum => "Sum",
            AggregationMethod::Mean => "Mean",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The sparse result of [`aggregate`]: one reduced value per key that had at
/// least one numeric observation.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedTable {
    pub group_by: Vec<Dimension>,
    pub value_field: String,
    pub method: AggregationMethod,
    pub groups: BTreeMap<GroupKey, f64>,
}

impl GroupedTable {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, key: &[String]) -> Option<f64> {
        self.groups.get(key).copied()
    }
}

/// Check a group-by list: 1 to 3 dimensions, none repeated.
pub fn validate_group_by(group_by: &[Dimension]) -> Result<(), PipelineError> {
    if group_by.is_empty() || group_by.len() > 3 {
        return Err(PipelineError::GroupByArity(group_by.len()));
    }
    for (i, dim) in group_by.iter().enumerate() {
        if group_by[..i].contains(dim) {
            return Err(PipelineError::DuplicateDimension(*dim));
        }
    }
    Ok(())
}

/// Collect the numeric values of `value_field` per group key.
///
/// Records lacking a category for one of the group-by dimensions, or whose
/// value is missing, are skipped. Values keep record order within a key.
pub fn group_values<'a, I>(
    records: I,
    group_by: &[Dimension],
    value_field: &str,
) -> Result<BTreeMap<GroupKey, Vec<f64>>, PipelineError>
where
    I: IntoIterator<Item = &'a Record>,
{
    validate_group_by(group_by)?;

    let mut groups: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for rec in records {
        let Some(value) = rec.value(value_field).filter(|v| !v.is_nan()) else {
            continue;
        };
        let key: Option<GroupKey> = group_by
            .iter()
            .map(|dim| rec.category(*dim).map(str::to_string))
            .collect();
        if let Some(key) = key {
            groups.entry(key).or_default().push(value);
        }
    }
    Ok(groups)
}

/// Group records by `group_by` and reduce `value_field` with `method`.
pub fn aggregate<'a, I>(
    records: I,
    group_by: &[Dimension],
    value_field: &str,
    method: AggregationMethod,
) -> Result<GroupedTable, PipelineError>
where
    I: IntoIterator<Item = &'a Record>,
{
    let groups = group_values(records, group_by, value_field)?
        .into_iter()
        .map(|(key, values)| {
            let sum: f64 = values.iter().sum();
            let reduced = match method {
                AggregationMethod::Sum => sum,
                AggregationMethod::Mean => sum / values.len() as f64,
            };
            (key, reduced)
        })
        .collect::<BTreeMap<_, _>>();

    log::debug!(
        "aggregated {value_field} by {group_by:?} ({method}) into {} groups",
        groups.len()
    );

    Ok(GroupedTable {
        group_by: group_by.to_vec(),
        value_field: value_field.to_string(),
        method,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::fixtures::record;
    use crate::data::model::SHAP_VALUE;

    fn key(parts: &[&str]) -> GroupKey {
        parts.iter().map(|p| p.to_string()).collect()
    }

    fn sample() -> Vec<Record> {
        vec![
            record("A", "t", "f", 10.0),
            record("A", "t", "f", 20.0),
            record("B", "t", "f", 5.0),
        ]
    }

    #[test]
    fn sum_and_mean_per_key() {
        let records = sample();
        let sum = aggregate(&records, &[Dimension::Cluster], SHAP_VALUE, AggregationMethod::Sum)
            .unwrap();
        assert_eq!(sum.get(&key(&["A"])), Some(30.0));
        assert_eq!(sum.get(&key(&["B"])), Some(5.0));

        let mean = aggregate(&records, &[Dimension::Cluster], SHAP_VALUE, AggregationMethod::Mean)
            .unwrap();
        assert_eq!(mean.get(&key(&["A"])), Some(15.0));
        assert_eq!(mean.get(&key(&["B"])), Some(5.0));
        assert_eq!(mean.len(), 2);
    }

    #[test]
    fn missing_values_are_excluded_from_sum_and_count() {
        let mut records = sample();
        let mut bad = record("A", "t", "f", 0.0);
        bad.values.insert(SHAP_VALUE.to_string(), None);
        records.push(bad);
        let mut only_missing = record("C", "t", "f", 0.0);
        only_missing.values.insert(SHAP_VALUE.to_string(), None);
        records.push(only_missing);

        let mean = aggregate(&records, &[Dimension::Cluster], SHAP_VALUE, AggregationMethod::Mean)
            .unwrap();
        assert_eq!(mean.get(&key(&["A"])), Some(15.0));
        assert_eq!(mean.get(&key(&["C"])), None);
    }

    #[test]
    fn nan_values_do_not_count_towards_the_mean() {
        let records = vec![
            record("A", "t", "f", 1.0),
            record("A", "t", "f", f64::NAN),
            record("A", "t", "f", 3.0),
        ];
        let mean = aggregate(&records, &[Dimension::Cluster], SHAP_VALUE, AggregationMethod::Mean)
            .unwrap();
        assert_eq!(mean.get(&key(&["A"])), Some(2.0));
        let sum = aggregate(&records, &[Dimension::Cluster], SHAP_VALUE, AggregationMethod::Sum)
            .unwrap();
        assert_eq!(sum.get(&key(&["A"])), Some(4.0));
    }

    #[test]
    fn keys_follow_group_by_order() {
        let records = vec![record("CL1", "(0, 5]", "alpha", 1.0)];
        let grouped = aggregate(
            &records,
            &[Dimension::Frequency, Dimension::Cluster],
            SHAP_VALUE,
            AggregationMethod::Sum,
        )
        .unwrap();
        assert_eq!(grouped.get(&key(&["alpha", "CL1"])), Some(1.0));
    }

    #[test]
    fn empty_input_gives_empty_table() {
        let grouped = aggregate(&Vec::<Record>::new(), &[Dimension::Cluster], SHAP_VALUE, AggregationMethod::Sum)
            .unwrap();
        assert!(grouped.is_empty());
    }

    #[test]
    fn group_by_must_have_one_to_three_distinct_dimensions() {
        let records = sample();
        assert_eq!(
            aggregate(&records, &[], SHAP_VALUE, AggregationMethod::Sum),
            Err(PipelineError::GroupByArity(0))
        );
        let four = [
            Dimension::Cluster,
            Dimension::Frequency,
            Dimension::Stimulus,
            Dimension::TargetScore,
        ];
        assert_eq!(
            aggregate(&records, &four, SHAP_VALUE, AggregationMethod::Sum),
            Err(PipelineError::GroupByArity(4))
        );
        assert_eq!(
            aggregate(
                &records,
                &[Dimension::Cluster, Dimension::Cluster],
                SHAP_VALUE,
                AggregationMethod::Sum
            ),
            Err(PipelineError::DuplicateDimension(Dimension::Cluster))
        );
    }
}
