use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::aggregate::{aggregate, AggregationMethod, GroupKey};
use super::error::PipelineError;
use super::model::{Dimension, Record, LINEAR_COEFFICIENT, SHAP_VALUE};
use super::stats::min_max_scale;

/// Which model a comparison value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelKind {
    Linear,
    Shap,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Linear, ModelKind::Shap];

    /// Numeric column holding this model's value.
    pub fn value_field(self) -> &'static str {
        match self {
            ModelKind::Linear => LINEAR_COEFFICIENT,
            ModelKind::Shap => SHAP_VALUE,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Linear => f.write_str("Linear Model Coefficients"),
            ModelKind::Shap => f.write_str("LightGBM SHAP Values"),
        }
    }
}

/// One bar of the comparison chart (long format).
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub feature: String,
    pub stimulus: String,
    pub target_score: String,
    pub model: ModelKind,
    pub value: f64,
}

const COMPARISON_KEY: [Dimension; 3] = [
    Dimension::Feature,
    Dimension::Stimulus,
    Dimension::TargetScore,
];

/// Average both models' values per (feature, stimulus, target score),
/// optionally min-max scale each model to [-1, 1], and emit one row per
/// key and model.
///
/// A key lacking a numeric value for one model yields no row for that model.
pub fn compare_models<'a, I>(records: I, scaled: bool) -> Result<Vec<ComparisonRow>, PipelineError>
where
    I: IntoIterator<Item = &'a Record> + Clone,
{
    let per_model: Vec<(ModelKind, BTreeMap<GroupKey, f64>)> = ModelKind::ALL
        .into_iter()
        .map(|model| {
            aggregate(
                records.clone(),
                &COMPARISON_KEY,
                model.value_field(),
                AggregationMethod::Mean,
            )
            .map(|g| (model, g.groups))
        })
        .collect::<Result<_, _>>()?;

    let keys: BTreeSet<&GroupKey> = per_model.iter().flat_map(|(_, g)| g.keys()).collect();

    // Wide table: one column per model, NaN where the model has no value.
    let mut columns: Vec<Vec<f64>> = per_model
        .iter()
        .map(|(_, groups)| {
            keys.iter()
                .map(|k| groups.get(*k).copied().unwrap_or(f64::NAN))
                .collect()
        })
        .collect();
    if scaled {
        for column in &mut columns {
            min_max_scale(column, -1.0, 1.0);
        }
    }

    let mut rows = Vec::new();
    for ((model, _), column) in per_model.iter().zip(&columns) {
        for (key, value) in keys.iter().zip(column) {
            if value.is_nan() {
                continue;
            }
            rows.push(ComparisonRow {
                feature: key[0].clone(),
                stimulus: key[1].clone(),
                target_score: key[2].clone(),
                model: *model,
                value: *value,
            });
        }
    }
    log::debug!("comparison produced {} rows over {} keys", rows.len(), keys.len());
    Ok(rows)
}
