use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use eframe::egui::{self, Color32, RichText, ScrollArea, Stroke, Ui};
use egui_plot::{Bar, BarChart, BoxElem, BoxPlot, BoxSpread, GridMark, Legend, Plot, PlotUi, Points};

use crate::color::generate_palette;
use crate::data::aggregate::GroupKey;
use crate::data::compare::ComparisonRow;
use crate::data::domain::DomainRegistry;
use crate::data::model::Dimension;
use crate::data::pipeline::BarRequest;
use crate::data::stats::BoxStats;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Facet layout
// ---------------------------------------------------------------------------

/// Where a chart role sits inside a group key, and whose order it follows.
#[derive(Debug, Clone, Copy)]
struct Role {
    position: usize,
    dim: Option<Dimension>,
}

#[derive(Debug, Clone, PartialEq)]
struct Series<T> {
    name: Option<String>,
    /// (index into the x categories, value)
    points: Vec<(usize, T)>,
}

/// Grouped values arranged as a grid of small charts.
#[derive(Debug, Clone, PartialEq)]
struct FacetLayout<T> {
    x_values: Vec<String>,
    rows: Vec<Option<String>>,
    cols: Vec<Option<String>>,
    series_names: Vec<Option<String>>,
    /// `cells[row][col]` holds one entry per series name, possibly empty.
    cells: Vec<Vec<Vec<Series<T>>>>,
}

fn role_values<T>(
    groups: &BTreeMap<GroupKey, T>,
    role: Option<Role>,
    registry: &DomainRegistry,
) -> Vec<Option<String>> {
    let Some(role) = role else {
        return vec![None];
    };
    let observed = groups.keys().map(|k| k[role.position].clone());
    let sorted = match role.dim {
        Some(dim) => registry.sort_values(dim, observed),
        None => {
            let mut values: Vec<String> = observed.collect();
            values.sort();
            values.dedup();
            values
        }
    };
    sorted.into_iter().map(Some).collect()
}

fn key_matches(key: &[String], role: Option<Role>, value: &Option<String>) -> bool {
    match (role, value) {
        (Some(role), Some(v)) => key[role.position] == *v,
        _ => true,
    }
}

fn layout_facets<T: Clone>(
    groups: &BTreeMap<GroupKey, T>,
    x: Role,
    row: Option<Role>,
    col: Option<Role>,
    series: Option<Role>,
    registry: &DomainRegistry,
) -> FacetLayout<T> {
    let x_values: Vec<String> = role_values(groups, Some(x), registry)
        .into_iter()
        .flatten()
        .collect();
    let rows = role_values(groups, row, registry);
    let cols = role_values(groups, col, registry);
    let series_names = role_values(groups, series, registry);

    let cells = rows
        .iter()
        .map(|r| {
            cols.iter()
                .map(|c| {
                    series_names
                        .iter()
                        .map(|s| {
                            let points = groups
                                .iter()
                                .filter(|(key, _)| {
                                    key_matches(key, row, r)
                                        && key_matches(key, col, c)
                                        && key_matches(key, series, s)
                                })
                                .filter_map(|(key, value)| {
                                    let xi = x_values.iter().position(|v| *v == key[x.position])?;
                                    Some((xi, value.clone()))
                                })
                                .collect();
                            Series {
                                name: s.clone(),
                                points,
                            }
                        })
                        .collect()
                })
                .collect()
        })
        .collect();

    FacetLayout {
        x_values,
        rows,
        cols,
        series_names,
        cells,
    }
}

fn bar_roles(request: &BarRequest) -> (Role, Option<Role>, Option<Role>) {
    let role = |position: Option<usize>, dim: Option<Dimension>| {
        Some(Role {
            position: position?,
            dim: Some(dim?),
        })
    };
    (
        Role {
            position: 0,
            dim: Some(request.x),
        },
        role(request.row_position(), request.row_partition),
        role(request.col_position(), request.col_partition),
    )
}

/// Comparison rows keyed by `[feature, stimulus?, target?, model]`. Rows that
/// share a key once partitions are dropped stack, so their values add up.
fn comparison_groups(
    rows: &[ComparisonRow],
    by_stimulus: bool,
    by_target: bool,
) -> BTreeMap<GroupKey, f64> {
    let mut groups = BTreeMap::new();
    for row in rows {
        let mut key = vec![row.feature.clone()];
        if by_stimulus {
            key.push(row.stimulus.clone());
        }
        if by_target {
            key.push(row.target_score.clone());
        }
        key.push(row.model.to_string());
        *groups.entry(key).or_insert(0.0) += row.value;
    }
    groups
}

// ---------------------------------------------------------------------------
// Drawing helpers
// ---------------------------------------------------------------------------

/// Axis formatter that prints category names at integer positions.
fn category_axis(labels: Vec<String>) -> impl Fn(GridMark, &RangeInclusive<f64>) -> String {
    move |mark, _range| {
        let i = mark.value.round();
        if (mark.value - i).abs() > 1e-6 || i < 0.0 {
            return String::new();
        }
        labels.get(i as usize).cloned().unwrap_or_default()
    }
}

/// Offset and width of series `s` out of `n` inside one category slot.
fn slot(s: usize, n: usize) -> (f64, f64) {
    let width = 0.8 / n.max(1) as f64;
    let offset = (s as f64 - (n as f64 - 1.0) / 2.0) * width;
    (offset, width)
}

fn facet_title(
    row: &Option<String>,
    col: &Option<String>,
    registry: &DomainRegistry,
    dims: (Option<Dimension>, Option<Dimension>),
) -> Option<String> {
    let part = |v: &Option<String>, dim: Option<Dimension>| {
        v.as_ref().map(|v| match dim {
            Some(dim) => format!("{dim} = {}", registry.label(dim, v)),
            None => v.clone(),
        })
    };
    let parts: Vec<String> = [part(row, dims.0), part(col, dims.1)]
        .into_iter()
        .flatten()
        .collect();
    (!parts.is_empty()).then(|| parts.join(" | "))
}

fn show_bars(plot_ui: &mut PlotUi, series: &[Series<f64>], colors: &[Color32]) {
    let n = series.len();
    for (s, (ser, color)) in series.iter().zip(colors).enumerate() {
        if ser.points.is_empty() {
            continue;
        }
        let (offset, width) = slot(s, n);
        let bars = ser
            .points
            .iter()
            .map(|(xi, v)| Bar::new(*xi as f64 + offset, *v).width(width))
            .collect();
        let mut chart = BarChart::new(bars).color(*color);
        if let Some(name) = &ser.name {
            chart = chart.name(name);
        }
        plot_ui.bar_chart(chart);
    }
}

fn show_boxes(plot_ui: &mut PlotUi, series: &[Series<BoxStats>], colors: &[Color32]) {
    let n = series.len();
    for (s, (ser, color)) in series.iter().zip(colors).enumerate() {
        if ser.points.is_empty() {
            continue;
        }
        let (offset, width) = slot(s, n);
        let mut outliers = Vec::new();
        let boxes = ser
            .points
            .iter()
            .map(|(xi, stats)| {
                let x = *xi as f64 + offset;
                outliers.extend(stats.outliers.iter().map(|y| [x, *y]));
                BoxElem::new(
                    x,
                    BoxSpread::new(
                        stats.lower_whisker,
                        stats.q1,
                        stats.median,
                        stats.q3,
                        stats.upper_whisker,
                    ),
                )
                .box_width(width * 0.9)
                .whisker_width(width * 0.5)
                .fill(color.gamma_multiply(0.4))
                .stroke(Stroke::new(1.0, *color))
            })
            .collect();
        let mut plot = BoxPlot::new(boxes).color(*color);
        if let Some(name) = &ser.name {
            plot = plot.name(name);
        }
        plot_ui.box_plot(plot);
        if !outliers.is_empty() {
            plot_ui.points(Points::new(outliers).radius(2.0).color(*color));
        }
    }
}

/// Draw every cell of `layout` with `draw`, one row of plots per facet row.
fn facet_grid<T>(
    ui: &mut Ui,
    id: &str,
    layout: &FacetLayout<T>,
    titles: impl Fn(&Option<String>, &Option<String>) -> Option<String>,
    x_labels: &[String],
    y_label: &str,
    height: f32,
    draw: impl Fn(&mut PlotUi, &[Series<T>], &[Color32]),
) {
    let colors = generate_palette(layout.series_names.len());
    let plot_height = (height / layout.rows.len().max(1) as f32).max(160.0);

    for (ri, row) in layout.rows.iter().enumerate() {
        ui.columns(layout.cols.len().max(1), |columns| {
            for (ci, col) in layout.cols.iter().enumerate() {
                let ui = &mut columns[ci];
                if let Some(title) = titles(row, col) {
                    ui.label(RichText::new(title).strong());
                }
                Plot::new(format!("{id}_{ri}_{ci}"))
                    .height(plot_height)
                    .legend(Legend::default())
                    .x_axis_formatter(category_axis(x_labels.to_vec()))
                    .y_axis_label(y_label)
                    .allow_drag(true)
                    .allow_zoom(true)
                    .show(ui, |plot_ui| draw(plot_ui, &layout.cells[ri][ci], &colors));
            }
        });
    }
}

fn show_error(ui: &mut Ui, err: &impl std::fmt::Display) {
    ui.label(RichText::new(format!("Cannot compute view: {err}")).color(Color32::RED));
}

fn empty_notice(ui: &mut Ui) {
    ui.centered_and_justified(|ui: &mut Ui| {
        ui.heading("No data for the current selection");
    });
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

fn dimension_combo(ui: &mut Ui, id: &str, label: &str, value: &mut Dimension) -> bool {
    let mut changed = false;
    ui.label(label);
    egui::ComboBox::from_id_salt(id)
        .selected_text(value.to_string())
        .show_ui(ui, |ui: &mut Ui| {
            for dim in Dimension::FILTERABLE {
                changed |= ui.selectable_value(value, dim, dim.to_string()).changed();
            }
        });
    changed
}

fn partition_combo(ui: &mut Ui, id: &str, label: &str, value: &mut Option<Dimension>) -> bool {
    let mut changed = false;
    ui.label(label);
    let text = value.map(|d| d.to_string()).unwrap_or_else(|| "None".into());
    egui::ComboBox::from_id_salt(id)
        .selected_text(text)
        .show_ui(ui, |ui: &mut Ui| {
            changed |= ui.selectable_value(value, None, "None").changed();
            for dim in Dimension::FILTERABLE {
                changed |= ui.selectable_value(value, Some(dim), dim.to_string()).changed();
            }
        });
    changed
}

fn request_controls(ui: &mut Ui, id: &str, request: &mut BarRequest) -> bool {
    let mut changed = false;
    ui.horizontal(|ui: &mut Ui| {
        changed |= dimension_combo(ui, &format!("{id}_x"), "X axis", &mut request.x);
        changed |= partition_combo(ui, &format!("{id}_rows"), "Rows", &mut request.row_partition);
        changed |= partition_combo(ui, &format!("{id}_color"), "Colour", &mut request.col_partition);
    });
    changed
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Bar chart and box plot of the filtered SHAP values.
pub fn overview_page(ui: &mut Ui, state: &mut AppState) {
    if state.dataset.is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a file to view SHAP values  (File → Open…)");
        });
        return;
    }

    let registry = &state.registry;
    let y_label = format!("{} SHAP Value", state.source.method());
    let half = (ui.available_height() / 2.0 - 60.0).max(200.0);
    let mut changed = false;

    ScrollArea::vertical().show(ui, |ui: &mut Ui| {
        ui.heading(format!("SHAP values by {} (summed)", state.bar_request.x));
        changed |= request_controls(ui, "bar", &mut state.bar_request);
        match &state.views.bars {
            Some(Ok(grouped)) if !grouped.is_empty() => {
                let (x, row, col) = bar_roles(&state.bar_request);
                let layout = layout_facets(&grouped.groups, x, row, None, col, registry);
                let x_labels: Vec<String> = layout
                    .x_values
                    .iter()
                    .map(|v| registry.label(state.bar_request.x, v).to_string())
                    .collect();
                let dims = (state.bar_request.row_partition, None);
                facet_grid(
                    ui,
                    "bars",
                    &layout,
                    |r, c| facet_title(r, c, registry, dims),
                    &x_labels,
                    &y_label,
                    half,
                    show_bars,
                );
            }
            Some(Ok(_)) => empty_notice(ui),
            Some(Err(e)) => show_error(ui, e),
            None => {}
        }

        ui.separator();

        ui.heading(format!("SHAP value distribution by {}", state.box_request.x));
        changed |= request_controls(ui, "box", &mut state.box_request);
        match &state.views.boxes {
            Some(Ok(boxes)) if !boxes.is_empty() => {
                let (x, row, col) = bar_roles(&state.box_request);
                let layout = layout_facets(boxes, x, row, None, col, registry);
                let x_labels: Vec<String> = layout
                    .x_values
                    .iter()
                    .map(|v| registry.label(state.box_request.x, v).to_string())
                    .collect();
                let dims = (state.box_request.row_partition, None);
                facet_grid(
                    ui,
                    "boxes",
                    &layout,
                    |r, c| facet_title(r, c, registry, dims),
                    &x_labels,
                    "SHAP Value",
                    half,
                    show_boxes,
                );
            }
            Some(Ok(_)) => empty_notice(ui),
            Some(Err(e)) => show_error(ui, e),
            None => {}
        }
    });

    if changed {
        state.mark_dirty();
    }
}

/// Linear-model coefficients next to SHAP values, per feature.
pub fn comparison_page(ui: &mut Ui, state: &mut AppState) {
    if state.coefficients.is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a coefficient file  (File → Open…)");
        });
        return;
    }

    let mut changed = false;
    ui.horizontal(|ui: &mut Ui| {
        changed |= ui
            .checkbox(&mut state.compare_options.scaled, "Min-max scale to [-1, 1]")
            .changed();
        ui.checkbox(&mut state.compare_options.partition_rows, "Rows by Stimulus");
        ui.checkbox(&mut state.compare_options.partition_cols, "Columns by TargetScore");
    });
    if changed {
        state.mark_dirty();
    }

    let options = &state.compare_options;
    let registry = &state.registry;
    match &state.views.comparison {
        Some(Ok(rows)) if !rows.is_empty() => {
            let groups = comparison_groups(rows, options.partition_rows, options.partition_cols);
            let mut next = 1;
            let mut take = |on: bool, dim: Dimension| {
                on.then(|| {
                    let role = Role {
                        position: next,
                        dim: Some(dim),
                    };
                    next += 1;
                    role
                })
            };
            let row = take(options.partition_rows, Dimension::Stimulus);
            let col = take(options.partition_cols, Dimension::TargetScore);
            let series = Role {
                position: next,
                dim: None,
            };
            let x = Role {
                position: 0,
                dim: Some(Dimension::Feature),
            };
            let layout = layout_facets(&groups, x, row, col, Some(series), registry);
            let y_label = if options.scaled {
                "Scaled value"
            } else {
                "Value"
            };
            let dims = (row.and_then(|r| r.dim), col.and_then(|c| c.dim));
            let height = ui.available_height() - 20.0;
            ScrollArea::vertical().show(ui, |ui: &mut Ui| {
                facet_grid(
                    ui,
                    "comparison",
                    &layout,
                    |r, c| facet_title(r, c, registry, dims),
                    &layout.x_values,
                    y_label,
                    height,
                    show_bars,
                );
            });
        }
        Some(Ok(_)) => empty_notice(ui),
        Some(Err(e)) => show_error(ui, e),
        None => {}
    }
}
