use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ExplorerConfig;
use crate::data::aggregate::{AggregationMethod, GroupKey, GroupedTable};
use crate::data::compare::{compare_models, ComparisonRow};
use crate::data::domain::DomainRegistry;
use crate::data::error::PipelineError;
use crate::data::filter::{apply_filter, filtered_indices, init_selection, Selection};
use crate::data::loader::{load_matrix_csv, TableCache};
use crate::data::model::{Dimension, RecordTable};
use crate::data::pipeline::{
    build_bar_groups, build_heatmap, BarRequest, Heatmap, HeatmapRequest, OrderingStrategy,
};
use crate::data::pivot::LabeledMatrix;
use crate::data::reindex::OutOfOrderPolicy;
use crate::data::stats::{box_groups, BoxStats};

// ---------------------------------------------------------------------------
// Selections made outside the filters
// ---------------------------------------------------------------------------

/// Which SHAP file is explored; also fixes the heatmap aggregation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSource {
    #[default]
    Averaged,
    Summed,
}

impl DataSource {
    pub const ALL: [DataSource; 2] = [DataSource::Averaged, DataSource::Summed];

    pub fn label(self) -> &'static str {
        match self {
            DataSource::Averaged => "Averaged SHAP Values",
            DataSource::Summed => "Summed SHAP Values",
        }
    }

    pub fn method(self) -> AggregationMethod {
        match self {
            DataSource::Averaged => AggregationMethod::Mean,
            DataSource::Summed => AggregationMethod::Sum,
        }
    }

    pub fn path(self, config: &ExplorerConfig) -> &Path {
        match self {
            DataSource::Averaged => &config.shap_mean_file,
            DataSource::Summed => &config.shap_sum_file,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Overview,
    Heatmap,
    Coefficients,
    ModelPerformance,
}

impl Page {
    pub const ALL: [Page; 4] = [
        Page::Overview,
        Page::Heatmap,
        Page::Coefficients,
        Page::ModelPerformance,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Page::Overview => "Bar & Box Plots",
            Page::Heatmap => "Hierarchical Heatmap",
            Page::Coefficients => "Model Coefficients",
            Page::ModelPerformance => "Model Performance",
        }
    }

    /// Pages driven by the selected SHAP source and its filters.
    pub fn uses_shap_source(self) -> bool {
        matches!(self, Page::Overview | Page::Heatmap)
    }
}

/// Heatmap controls.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapOptions {
    /// Canonical registry order instead of hierarchical clustering.
    pub canonical: bool,
    pub policy: OutOfOrderPolicy,
    pub fill_value: f64,
    /// Show registry display labels instead of raw values.
    pub display_labels: bool,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        Self {
            canonical: false,
            policy: OutOfOrderPolicy::Drop,
            fill_value: 0.0,
            display_labels: false,
        }
    }
}

/// Coefficient comparison controls.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareOptions {
    pub scaled: bool,
    pub partition_rows: bool,
    pub partition_cols: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            scaled: true,
            partition_rows: false,
            partition_cols: false,
        }
    }
}

/// Derived data for the current page. Recomputed from scratch on every change.
#[derive(Debug, Default)]
pub struct Views {
    pub bars: Option<Result<GroupedTable, PipelineError>>,
    pub boxes: Option<Result<BTreeMap<GroupKey, BoxStats>, PipelineError>>,
    pub heatmap: Option<Result<Heatmap, PipelineError>>,
    pub comparison: Option<Result<Vec<ComparisonRow>, PipelineError>>,
}

impl Views {
    /// Failures of the views computed for the current page.
    pub fn errors(&self) -> impl Iterator<Item = &PipelineError> {
        [
            self.bars.as_ref().and_then(|r| r.as_ref().err()),
            self.boxes.as_ref().and_then(|r| r.as_ref().err()),
            self.heatmap.as_ref().and_then(|r| r.as_ref().err()),
            self.comparison.as_ref().and_then(|r| r.as_ref().err()),
        ]
        .into_iter()
        .flatten()
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub config: ExplorerConfig,
    pub registry: DomainRegistry,
    pub cache: TableCache,

    pub page: Page,
    pub source: DataSource,
    /// File backing the SHAP pages; the source's file unless opened manually.
    pub shap_path: Option<PathBuf>,

    /// SHAP table for the Overview and Heatmap pages.
    pub dataset: Option<Arc<RecordTable>>,
    pub filters: Selection,

    /// Coefficient table for the comparison page.
    pub coefficients: Option<Arc<RecordTable>>,
    pub coefficient_filters: Selection,

    pub model_performance: Option<LabeledMatrix>,

    /// Number of records passing the active page's filters.
    pub visible_count: usize,

    pub bar_request: BarRequest,
    pub box_request: BarRequest,
    pub heatmap_options: HeatmapOptions,
    pub compare_options: CompareOptions,

    pub views: Views,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,

    dirty: bool,
}

impl AppState {
    pub fn new(config: ExplorerConfig, registry: DomainRegistry) -> Self {
        let mut state = Self {
            config,
            registry,
            cache: TableCache::default(),
            page: Page::default(),
            source: DataSource::default(),
            shap_path: None,
            dataset: None,
            filters: Selection::new(),
            coefficients: None,
            coefficient_filters: Selection::new(),
            model_performance: None,
            visible_count: 0,
            bar_request: BarRequest::default(),
            box_request: BarRequest::default(),
            heatmap_options: HeatmapOptions::default(),
            compare_options: CompareOptions::default(),
            views: Views::default(),
            status_message: None,
            dirty: true,
        };
        state.set_source(DataSource::default());
        state
    }

    fn report(&mut self, context: &str, err: anyhow::Error) {
        log::error!("{context}: {err:#}");
        self.status_message = Some(format!("{context}: {err:#}"));
    }

    // -- Loading --

    /// Switch the SHAP source and load its file.
    pub fn set_source(&mut self, source: DataSource) {
        self.source = source;
        let path = source.path(&self.config).to_path_buf();
        self.load_shap_file(&path);
    }

    /// Load a SHAP table from `path` for the Overview and Heatmap pages.
    pub fn load_shap_file(&mut self, path: &Path) {
        match self.cache.get_or_load(path) {
            Ok(table) => {
                self.status_message = table
                    .is_empty()
                    .then(|| format!("{} contains no records", path.display()));
                self.filters = init_selection(&table);
                self.dataset = Some(table);
                self.shap_path = Some(path.to_path_buf());
            }
            Err(e) => {
                self.dataset = None;
                self.filters.clear();
                self.report("Failed to load SHAP values", e);
            }
        }
        self.mark_dirty();
    }

    /// Load a coefficient table for the comparison page.
    pub fn load_coefficient_file(&mut self, path: &Path) {
        match self.cache.get_or_load(path) {
            Ok(table) => {
                self.coefficient_filters = init_selection(&table);
                self.coefficients = Some(table);
                self.status_message = None;
            }
            Err(e) => {
                self.coefficients = None;
                self.report("Failed to load coefficients", e);
            }
        }
        self.mark_dirty();
    }

    pub fn load_model_performance_file(&mut self, path: &Path) {
        match load_matrix_csv(path) {
            Ok(matrix) => {
                log::info!(
                    "Loaded {}x{} performance matrix from {}",
                    matrix.n_rows(),
                    matrix.n_cols(),
                    path.display()
                );
                self.model_performance = Some(matrix);
                self.status_message = None;
            }
            Err(e) => {
                self.model_performance = None;
                self.report("Failed to load model performance", e);
            }
        }
    }

    /// Load a user-picked file into whatever the current page shows.
    pub fn open_file(&mut self, path: &Path) {
        match self.page {
            Page::Overview | Page::Heatmap => self.load_shap_file(path),
            Page::Coefficients => self.load_coefficient_file(path),
            Page::ModelPerformance => self.load_model_performance_file(path),
        }
    }

    /// Switch page, loading the page's configured file on first visit.
    pub fn set_page(&mut self, page: Page) {
        self.page = page;
        match page {
            Page::Coefficients if self.coefficients.is_none() => {
                let path = self.config.coefficients_file.clone();
                self.load_coefficient_file(&path);
            }
            Page::ModelPerformance if self.model_performance.is_none() => {
                let path = self.config.model_performance_file.clone();
                self.load_model_performance_file(&path);
            }
            _ => {}
        }
        self.mark_dirty();
    }

    /// Drop every cached table and load the current files again.
    pub fn reload(&mut self) {
        log::info!("Clearing {} cached tables", self.cache.len());
        self.cache.clear();
        self.coefficients = None;
        self.model_performance = None;
        let shap = self
            .shap_path
            .clone()
            .unwrap_or_else(|| self.source.path(&self.config).to_path_buf());
        self.load_shap_file(&shap);
        self.set_page(self.page);
    }

    // -- Filters --

    /// The table and selection the sidebar filters act on.
    pub fn active_table(&self) -> Option<(&RecordTable, &Selection)> {
        if self.page.uses_shap_source() {
            self.dataset.as_deref().map(|t| (t, &self.filters))
        } else if self.page == Page::Coefficients {
            self.coefficients
                .as_deref()
                .map(|t| (t, &self.coefficient_filters))
        } else {
            None
        }
    }

    fn active_selection_mut(&mut self) -> &mut Selection {
        if self.page == Page::Coefficients {
            &mut self.coefficient_filters
        } else {
            &mut self.filters
        }
    }

    /// Toggle a single value in a dimension's filter.
    pub fn toggle_filter_value(&mut self, dim: Dimension, value: &str) {
        let selected = self.active_selection_mut().entry(dim).or_default();
        if !selected.remove(value) {
            selected.insert(value.to_string());
        }
        self.mark_dirty();
    }

    /// Select all observed values of a dimension.
    pub fn select_all(&mut self, dim: Dimension) {
        let Some(all) = self.active_table().map(|(t, _)| t.domain(dim)) else {
            return;
        };
        self.active_selection_mut().insert(dim, all);
        self.mark_dirty();
    }

    /// Deselect all values of a dimension.
    pub fn select_none(&mut self, dim: Dimension) {
        self.active_selection_mut().insert(dim, BTreeSet::new());
        self.mark_dirty();
    }

    // -- Derived views --

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The heatmap parameters implied by the current controls.
    pub fn heatmap_request(&self) -> HeatmapRequest {
        let strategy = if self.heatmap_options.canonical {
            OrderingStrategy::Canonical(self.heatmap_options.policy)
        } else {
            OrderingStrategy::Hierarchical
        };
        HeatmapRequest {
            method: self.source.method(),
            fill_value: self.heatmap_options.fill_value,
            strategy,
            ..HeatmapRequest::default()
        }
    }

    /// Recompute the current page's views from the loaded tables.
    pub fn refresh(&mut self) {
        self.dirty = false;
        let mut views = Views::default();
        self.visible_count = self
            .active_table()
            .map(|(t, s)| filtered_indices(t, s).len())
            .unwrap_or(0);

        match self.page {
            Page::Overview => {
                if let Some(table) = &self.dataset {
                    views.bars = Some(build_bar_groups(table, &self.filters, &self.bar_request));
                    let filtered = apply_filter(table, &self.filters);
                    views.boxes = Some(box_groups(
                        &filtered.records,
                        &self.box_request.group_by(),
                        &self.box_request.value_field,
                    ));
                }
            }
            Page::Heatmap => {
                if let Some(table) = &self.dataset {
                    views.heatmap = Some(build_heatmap(
                        table,
                        &self.filters,
                        &self.heatmap_request(),
                        &self.registry,
                    ));
                }
            }
            Page::Coefficients => {
                if let Some(table) = &self.coefficients {
                    let filtered = apply_filter(table, &self.coefficient_filters);
                    views.comparison =
                        Some(compare_models(&filtered.records, self.compare_options.scaled));
                }
            }
            Page::ModelPerformance => {}
        }

        for err in views.errors() {
            log::warn!("pipeline failed: {err}");
        }
        self.views = views;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CSV: &str = "Cluster,Time Period,Frequency,Stimulus,TargetScore,SHAP_value\n\
        CL1,\"(-4, 0]\",delta,S1,T1,1\n\
        CL2,\"(-4, 0]\",delta,S1,T1,2\n\
        CL1,\"(0, 5]\",theta,S2,T1,3\n\
        CL2,\"(0, 5]\",theta,S2,T1,4\n";

    fn state_with_csv() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mean.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{CSV}").unwrap();
        let config = ExplorerConfig {
            shap_mean_file: path.clone(),
            shap_sum_file: path,
            ..Default::default()
        };
        (AppState::new(config, DomainRegistry::eeg_defaults()), dir)
    }

    #[test]
    fn loading_a_source_selects_everything() {
        let (mut state, _dir) = state_with_csv();
        assert!(state.status_message.is_none());
        state.refresh();
        assert_eq!(state.visible_count, 4);
        assert_eq!(state.filters[&Dimension::Cluster].len(), 2);
        let bars = state.views.bars.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(bars.get(&["CL1".to_string()]), Some(4.0));
    }

    #[test]
    fn heatmap_uses_the_source_method() {
        let (mut state, _dir) = state_with_csv();
        state.set_source(DataSource::Summed);
        state.set_page(Page::Heatmap);
        state.refresh();
        let heatmap = state.views.heatmap.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(state.heatmap_request().method, AggregationMethod::Sum);
        assert_eq!(heatmap.matrix.n_cols(), 2);
        assert_eq!(heatmap.matrix.n_rows(), 2);
    }

    #[test]
    fn toggling_filters_marks_views_dirty() {
        let (mut state, _dir) = state_with_csv();
        state.refresh();
        assert!(!state.is_dirty());
        state.toggle_filter_value(Dimension::Stimulus, "S2");
        assert!(state.is_dirty());
        state.refresh();
        assert_eq!(state.visible_count, 2);

        state.select_none(Dimension::Cluster);
        state.refresh();
        assert_eq!(state.visible_count, 0);

        state.select_all(Dimension::Cluster);
        state.toggle_filter_value(Dimension::Stimulus, "S2");
        state.refresh();
        assert_eq!(state.visible_count, 4);
    }

    #[test]
    fn header_only_file_reports_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Cluster,Time Period,Frequency,Stimulus,TargetScore,SHAP_value").unwrap();
        let config = ExplorerConfig {
            shap_mean_file: path,
            ..Default::default()
        };
        let mut state = AppState::new(config, DomainRegistry::eeg_defaults());
        assert!(state.dataset.is_some());
        assert!(state.status_message.as_deref().unwrap().contains("no records"));
        state.refresh();
        assert_eq!(state.visible_count, 0);
    }

    #[test]
    fn missing_file_reports_status() {
        let config = ExplorerConfig {
            shap_mean_file: PathBuf::from("/nonexistent/mean.csv"),
            ..Default::default()
        };
        let mut state = AppState::new(config, DomainRegistry::empty());
        assert!(state.dataset.is_none());
        assert!(state.status_message.is_some());
        state.refresh();
        assert!(state.views.bars.is_none());
    }
}
