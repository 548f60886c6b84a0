use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::color::ColorMap;
use crate::data::model::Dimension;
use crate::state::{AppState, DataSource, Page};

// ---------------------------------------------------------------------------
// Left side panel – source and filter widgets
// ---------------------------------------------------------------------------

/// Render the left filter panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    if state.page.uses_shap_source() {
        ui.heading("Data Source");
        for source in DataSource::ALL {
            if ui.radio(state.source == source, source.label()).clicked() && state.source != source
            {
                state.set_source(source);
            }
        }
        ui.separator();
    }

    ui.heading("Filters");
    ui.separator();

    let Some((table, _)) = state.active_table() else {
        ui.label("No data loaded.");
        return;
    };

    // Clone what we need so we can mutate state inside the loop.
    let domains: Vec<(Dimension, Vec<String>)> = Dimension::FILTERABLE
        .into_iter()
        .map(|dim| (dim, state.registry.sort_values(dim, table.domain(dim))))
        .collect();
    let time_colors = ColorMap::new(
        Dimension::TimePeriod,
        table.domain(Dimension::TimePeriod),
        &state.registry,
    );

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for (dim, all_values) in &domains {
                let dim = *dim;
                let selected = state
                    .active_table()
                    .and_then(|(_, sel)| sel.get(&dim).cloned())
                    .unwrap_or_default();

                // Show count of selected / total in the header
                let n_selected = all_values.iter().filter(|v| selected.contains(*v)).count();
                let header_text = format!("{dim}  ({n_selected}/{})", all_values.len());

                egui::CollapsingHeader::new(RichText::new(header_text).strong())
                    .id_salt(dim.column_name())
                    .default_open(dim == Dimension::Cluster)
                    .show(ui, |ui: &mut Ui| {
                        ui.horizontal(|ui: &mut Ui| {
                            if ui.small_button("All").clicked() {
                                state.select_all(dim);
                            }
                            if ui.small_button("None").clicked() {
                                state.select_none(dim);
                            }
                        });

                        for val in all_values {
                            let mut text = RichText::new(state.registry.label(dim, val));
                            if dim == Dimension::TimePeriod {
                                text = text.color(time_colors.color_for(val));
                            }
                            let mut checked = selected.contains(val);
                            if ui.checkbox(&mut checked, text).changed() {
                                state.toggle_filter_value(dim, val);
                            }
                        }
                    });
            }
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            if ui.button("Reload (clear cache)").clicked() {
                state.reload();
                ui.close_menu();
            }
        });

        ui.separator();

        for page in Page::ALL {
            if ui.selectable_label(state.page == page, page.label()).clicked()
                && state.page != page
            {
                state.set_page(page);
            }
        }

        ui.separator();

        if let Some((table, _)) = state.active_table() {
            ui.label(format!(
                "{} records loaded, {} visible",
                table.len(),
                state.visible_count
            ));
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
        if let Some(err) = state.views.errors().next() {
            ui.label(RichText::new(err.to_string()).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialog
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let title = match state.page {
        Page::Overview | Page::Heatmap => "Open SHAP values",
        Page::Coefficients => "Open model coefficients",
        Page::ModelPerformance => "Open model performance matrix",
    };
    let dialog = rfd::FileDialog::new().set_title(title);
    let dialog = if state.page == Page::ModelPerformance {
        dialog.add_filter("CSV", &["csv"])
    } else {
        dialog
            .add_filter("Supported files", &["csv", "parquet", "pq"])
            .add_filter("CSV", &["csv"])
            .add_filter("Parquet", &["parquet", "pq"])
    };

    if let Some(path) = dialog.pick_file() {
        state.open_file(&path);
    }
}
