use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::domain::DomainRegistry;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SHAP_EXPLORER_CONFIG";

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "shap_explorer.json";

// ---------------------------------------------------------------------------
// ExplorerConfig
// ---------------------------------------------------------------------------

/// Where the input files live. Every field may be omitted in the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// SHAP values averaged per record.
    pub shap_mean_file: PathBuf,
    /// SHAP values summed per record.
    pub shap_sum_file: PathBuf,
    /// Linear coefficients next to SHAP values, per feature.
    pub coefficients_file: PathBuf,
    /// Square model cross-performance matrix.
    pub model_performance_file: PathBuf,
    /// Canonical orders and labels; the built-in EEG tables when absent.
    pub domain_file: Option<PathBuf>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            shap_mean_file: PathBuf::from("data/shap_values_mean.csv"),
            shap_sum_file: PathBuf::from("data/shap_values_sum.csv"),
            coefficients_file: PathBuf::from("data/coefficients.csv"),
            model_performance_file: PathBuf::from("data/model_performance.csv"),
            domain_file: None,
        }
    }
}

impl ExplorerConfig {
    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Resolve the configuration: `$SHAP_EXPLORER_CONFIG`, then
    /// `shap_explorer.json` in the working directory, then defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }
        log::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// The domain registry named by `domain_file`, or the built-in one.
    pub fn load_registry(&self) -> Result<DomainRegistry> {
        match &self.domain_file {
            Some(path) => DomainRegistry::load(path),
            None => Ok(DomainRegistry::eeg_defaults()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::data::model::Dimension;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, r#"{{ "shap_sum_file": "other/sum.csv" }}"#).unwrap();
        let config = ExplorerConfig::from_file(tmp.path()).unwrap();
        assert_eq!(config.shap_sum_file, PathBuf::from("other/sum.csv"));
        assert_eq!(config.shap_mean_file, ExplorerConfig::default().shap_mean_file);
        assert!(config.domain_file.is_none());
    }

    #[test]
    fn registry_comes_from_domain_file() {
        let mut domain = tempfile::NamedTempFile::new().unwrap();
        write!(domain, r#"{{ "Cluster": {{ "order": ["B", "A"] }} }}"#).unwrap();
        let config = ExplorerConfig {
            domain_file: Some(domain.path().to_path_buf()),
            ..Default::default()
        };
        let registry = config.load_registry().unwrap();
        assert_eq!(registry.order_index(Dimension::Cluster, "A"), Some(1));
        assert!(registry.canonical_order(Dimension::Frequency).is_none());

        let builtin = ExplorerConfig::default().load_registry().unwrap();
        assert!(builtin.canonical_order(Dimension::Frequency).is_some());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "not json").unwrap();
        assert!(ExplorerConfig::from_file(tmp.path()).is_err());
    }
}
