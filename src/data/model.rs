use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the SHAP value column in every source file.
pub const SHAP_VALUE: &str = "SHAP_value";

/// Name of the linear-model coefficient column in the comparison file.
pub const LINEAR_COEFFICIENT: &str = "params_significant";

// ---------------------------------------------------------------------------
// Dimension – a categorical column of the record table
// ---------------------------------------------------------------------------

/// A categorical column. The first five are the filterable dimensions;
/// `Feature` only exists in the coefficient-comparison table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Cluster,
    #[serde(rename = "Time Period")]
    TimePeriod,
    Frequency,
    Stimulus,
    TargetScore,
    #[serde(rename = "features")]
    Feature,
}

impl Dimension {
    /// Dimensions offered as sidebar filters, in display order.
    pub const FILTERABLE: [Dimension; 5] = [
        Dimension::Cluster,
        Dimension::TimePeriod,
        Dimension::Frequency,
        Dimension::Stimulus,
        Dimension::TargetScore,
    ];

    /// Column header used in the source files.
    pub fn column_name(self) -> &'static str {
        match self {
            Dimension::Cluster => "Cluster",
            Dimension::TimePeriod => "Time Period",
            Dimension::Frequency => "Frequency",
            Dimension::Stimulus => "Stimulus",
            Dimension::TargetScore => "TargetScore",
            Dimension::Feature => "features",
        }
    }

    pub fn from_column_name(name: &str) -> Option<Dimension> {
        [Dimension::Feature]
            .into_iter()
            .chain(Dimension::FILTERABLE)
            .find(|d| d.column_name() == name)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

// ---------------------------------------------------------------------------
// Record – one row of the source table
// ---------------------------------------------------------------------------

/// One observation: five categories, an optional feature name and the
/// numeric columns of the source file.
///
/// A numeric cell that could not be parsed is stored as `None` and is
/// excluded from every aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub cluster: String,
    pub time_period: String,
    pub frequency: String,
    pub stimulus: String,
    pub target_score: String,
    pub feature: Option<String>,
    /// Numeric columns: column_name → value (None when missing).
    pub values: BTreeMap<String, Option<f64>>,
}

impl Record {
    /// The record's value for a categorical dimension.
    pub fn category(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Cluster => Some(&self.cluster),
            Dimension::TimePeriod => Some(&self.time_period),
            Dimension::Frequency => Some(&self.frequency),
            Dimension::Stimulus => Some(&self.stimulus),
            Dimension::TargetScore => Some(&self.target_score),
            Dimension::Feature => self.feature.as_deref(),
        }
    }

    /// The record's value for a numeric column, `None` if missing or absent.
    pub fn value(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied().flatten()
    }
}

// ---------------------------------------------------------------------------
// RecordTable – a loaded (or filtered) table
// ---------------------------------------------------------------------------

/// An immutable table of records with pre-computed observed domains.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordTable {
    pub records: Vec<Record>,
    /// Numeric column names, in the order first seen.
    pub value_columns: Vec<String>,
    /// For each dimension the sorted set of observed values.
    pub unique_values: BTreeMap<Dimension, BTreeSet<String>>,
}

impl RecordTable {
    /// Build the domain index from the records.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut value_columns: Vec<String> = Vec::new();
        let mut unique_values: BTreeMap<Dimension, BTreeSet<String>> = BTreeMap::new();

        for rec in &records {
            for dim in Dimension::FILTERABLE.into_iter().chain([Dimension::Feature]) {
                if let Some(val) = rec.category(dim) {
                    unique_values
                        .entry(dim)
                        .or_default()
                        .insert(val.to_string());
                }
            }
            for col in rec.values.keys() {
                if !value_columns.contains(col) {
                    value_columns.push(col.clone());
                }
            }
        }

        RecordTable {
            records,
            value_columns,
            unique_values,
        }
    }

    /// Observed values of a dimension (empty if none).
    pub fn domain(&self, dim: Dimension) -> BTreeSet<String> {
        self.unique_values.get(&dim).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A SHAP record with the given categories and value.
    pub fn record(cluster: &str, time: &str, freq: &str, value: f64) -> Record {
        Record {
            cluster: cluster.to_string(),
            time_period: time.to_string(),
            frequency: freq.to_string(),
            stimulus: "S1".to_string(),
            target_score: "T1".to_string(),
            feature: None,
            values: BTreeMap::from([(SHAP_VALUE.to_string(), Some(value))]),
        }
    }

    /// Two records of 1.0 for every Cluster × Time Period × Frequency combination.
    pub fn grid_table() -> RecordTable {
        let mut records = Vec::new();
        for cluster in ["CL1", "CL2"] {
            for time in ["(-4, 0]", "(0, 5]"] {
                for freq in ["delta", "theta"] {
                    records.push(record(cluster, time, freq, 1.0));
                    records.push(record(cluster, time, freq, 1.0));
                }
            }
        }
        RecordTable::from_records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn domains_are_indexed_per_dimension() {
        let table = grid_table();
        assert_eq!(table.len(), 16);
        assert_eq!(
            table.domain(Dimension::Cluster).into_iter().collect::<Vec<_>>(),
            vec!["CL1", "CL2"]
        );
        assert!(table.domain(Dimension::Feature).is_empty());
        assert_eq!(table.value_columns, vec![SHAP_VALUE.to_string()]);
    }

    #[test]
    fn column_names_round_trip() {
        for dim in Dimension::FILTERABLE {
            assert_eq!(Dimension::from_column_name(dim.column_name()), Some(dim));
        }
        assert_eq!(Dimension::from_column_name("features"), Some(Dimension::Feature));
        assert_eq!(Dimension::from_column_name("SHAP_value"), None);
    }

    #[test]
    fn missing_value_reads_as_none() {
        let mut rec = record("CL1", "(0, 5]", "alpha", 2.0);
        rec.values.insert(SHAP_VALUE.to_string(), None);
        assert_eq!(rec.value(SHAP_VALUE), None);
        assert_eq!(rec.value("absent"), None);
    }
}
