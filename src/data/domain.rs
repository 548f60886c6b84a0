use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::model::Dimension;

// ---------------------------------------------------------------------------
// CategoryDomain – canonical order and labels of one dimension
// ---------------------------------------------------------------------------

/// Canonical ordering and display labels for one categorical dimension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryDomain {
    /// Values in canonical display order.
    #[serde(default)]
    pub order: Vec<String>,
    /// Human-readable label per value. Values without an entry display as-is.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl CategoryDomain {
    fn new(entries: &[(&str, &str)]) -> Self {
        CategoryDomain {
            order: entries.iter().map(|(v, _)| v.to_string()).collect(),
            labels: entries
                .iter()
                .map(|(v, l)| (v.to_string(), l.to_string()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// DomainRegistry
// ---------------------------------------------------------------------------

/// Static per-dimension configuration: canonical orders and display labels.
///
/// Serialized as a JSON object keyed by column name:
///
/// ```json
/// {
///   "Frequency": { "order": ["delta", "theta"], "labels": { "delta": "Delta (1-4 Hz)" } },
///   "Time Period": { "order": ["(-4, 0]", "(0, 4]"] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainRegistry {
    domains: BTreeMap<Dimension, CategoryDomain>,
}

impl DomainRegistry {
    /// Registry with no canonical orders; every lookup falls back to data order.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in EEG tables: frequency bands, analysis windows and
    /// electrode clusters.
    pub fn eeg_defaults() -> Self {
        let mut registry = Self::empty();
        registry.insert(
            Dimension::Frequency,
            CategoryDomain::new(&[
                ("delta", "Delta (1-4 Hz)"),
                ("theta", "Theta (4-8 Hz)"),
                ("alpha", "Alpha (8-13 Hz)"),
                ("beta", "Beta (13-30 Hz)"),
                ("gamma", "Gamma (30-45 Hz)"),
            ]),
        );
        registry.insert(
            Dimension::TimePeriod,
            CategoryDomain::new(&[
                ("(-4, 0]", "Baseline (-4 to 0 s)"),
                ("(0, 5]", "Early (0 to 5 s)"),
                ("(5, 10]", "Middle (5 to 10 s)"),
                ("(10, 15]", "Late (10 to 15 s)"),
            ]),
        );
        registry.insert(
            Dimension::Cluster,
            CategoryDomain::new(&[
                ("CL1", "Left frontal"),
                ("CL2", "Right frontal"),
                ("CL3", "Central"),
                ("CL4", "Left temporal"),
                ("CL5", "Right temporal"),
                ("CL6", "Parietal"),
                ("CL7", "Occipital"),
            ]),
        );
        registry
    }

    /// Parse a registry from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing domain registry JSON")
    }

    /// Load a registry file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading domain registry {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn insert(&mut self, dim: Dimension, domain: CategoryDomain) {
        self.domains.insert(dim, domain);
    }

    /// Canonical order of a dimension, if one is configured.
    pub fn canonical_order(&self, dim: Dimension) -> Option<&[String]> {
        self.domains
            .get(&dim)
            .map(|d| d.order.as_slice())
            .filter(|o| !o.is_empty())
    }

    /// Like [`canonical_order`](Self::canonical_order) but an error when absent.
    pub fn require_order(&self, dim: Dimension) -> Result<&[String], PipelineError> {
        self.canonical_order(dim)
            .ok_or(PipelineError::MissingCanonicalOrder(dim))
    }

    /// Position of `value` in the canonical order of `dim`.
    pub fn order_index(&self, dim: Dimension, value: &str) -> Option<usize> {
        self.canonical_order(dim)?.iter().position(|v| v == value)
    }

    /// Display label for a value, falling back to the value itself.
    pub fn label<'a>(&'a self, dim: Dimension, value: &'a str) -> &'a str {
        self.domains
            .get(&dim)
            .and_then(|d| d.labels.get(value))
            .map(String::as_str)
            .unwrap_or(value)
    }

    /// Sort observed values: canonical values first in canonical order,
    /// then the rest alphabetically.
    pub fn sort_values<I>(&self, dim: Dimension, values: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut values: Vec<String> = values.into_iter().collect();
        values.sort_by_cached_key(|v| {
            let rank = self.order_index(dim, v).unwrap_or(usize::MAX);
            (rank, v.clone())
        });
        values.dedup();
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_fall_back_to_value() {
        let reg = DomainRegistry::eeg_defaults();
        assert_eq!(reg.label(Dimension::Frequency, "delta"), "Delta (1-4 Hz)");
        assert_eq!(reg.label(Dimension::Frequency, "mu"), "mu");
        assert_eq!(reg.label(Dimension::Stimulus, "S1"), "S1");
    }

    #[test]
    fn sort_puts_canonical_values_first() {
        let reg = DomainRegistry::eeg_defaults();
        let sorted = reg.sort_values(
            Dimension::Frequency,
            ["gamma", "zeta", "alpha", "delta", "beta"].map(String::from),
        );
        assert_eq!(sorted, vec!["delta", "alpha", "beta", "gamma", "zeta"]);
        assert_eq!(reg.order_index(Dimension::Frequency, "theta"), Some(1));
    }

    #[test]
    fn empty_registry_sorts_alphabetically() {
        let reg = DomainRegistry::empty();
        let sorted = reg.sort_values(Dimension::Cluster, ["b", "a", "c"].map(String::from));
        assert_eq!(sorted, vec!["a", "b", "c"]);
        assert_eq!(
            reg.require_order(Dimension::Cluster),
            Err(PipelineError::MissingCanonicalOrder(Dimension::Cluster))
        );
    }

    #[test]
    fn parses_json_keyed_by_column_name() {
        let reg = DomainRegistry::from_json(
            r#"{
                "Time Period": { "order": ["early", "late"], "labels": { "late": "Late window" } },
                "Cluster": { "order": ["CL2", "CL1"] }
            }"#,
        )
        .unwrap();
        assert_eq!(
            reg.canonical_order(Dimension::TimePeriod).unwrap(),
            &["early".to_string(), "late".to_string()]
        );
        assert_eq!(reg.label(Dimension::TimePeriod, "late"), "Late window");
        assert_eq!(reg.order_index(Dimension::Cluster, "CL1"), Some(1));
        assert!(reg.canonical_order(Dimension::Frequency).is_none());
    }

    #[test]
    fn rejects_unknown_dimension_keys() {
        assert!(DomainRegistry::from_json(r#"{ "Electrode": { "order": [] } }"#).is_err());
    }
}
