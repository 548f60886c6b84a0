use eframe::egui::{self, Align2, Color32, FontId, Pos2, Rect, RichText, Sense, Ui, Vec2};

use crate::color::{ColorMap, ColorScale};
use crate::data::pivot::LabeledMatrix;
use crate::data::reindex::OutOfOrderPolicy;
use crate::state::AppState;

const STRIP_WIDTH: f32 = 12.0;
const HEADER_HEIGHT: f32 = 22.0;
const COLORBAR_WIDTH: f32 = 70.0;
const CHAR_WIDTH: f32 = 6.5;

// ---------------------------------------------------------------------------
// Grid geometry
// ---------------------------------------------------------------------------

/// Screen placement of a heatmap's cells.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Grid {
    origin: Pos2,
    cell: Vec2,
    rows: usize,
    cols: usize,
}

impl Grid {
    fn cell_rect(&self, row: usize, col: usize) -> Rect {
        let min = self.origin + Vec2::new(col as f32 * self.cell.x, row as f32 * self.cell.y);
        Rect::from_min_size(min, self.cell)
    }

    /// Cell under `pos`, if any.
    fn cell_at(&self, pos: Pos2) -> Option<(usize, usize)> {
        let rel = pos - self.origin;
        if rel.x < 0.0 || rel.y < 0.0 {
            return None;
        }
        let col = (rel.x / self.cell.x) as usize;
        let row = (rel.y / self.cell.y) as usize;
        (row < self.rows && col < self.cols).then_some((row, col))
    }
}

/// Labels and colours of one heatmap drawing.
struct HeatmapView<'a> {
    matrix: &'a LabeledMatrix,
    row_labels: &'a [String],
    col_labels: &'a [String],
    scale: ColorScale,
    /// One colour per row, drawn as a strip left of the cells.
    row_strip: Option<Vec<Color32>>,
}

/// Paint the matrix and return the hovered cell.
fn paint_heatmap(ui: &mut Ui, view: &HeatmapView<'_>) -> Option<(usize, usize)> {
    let (rows, cols) = (view.matrix.n_rows(), view.matrix.n_cols());
    let longest = view.row_labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let label_width = (longest as f32 * CHAR_WIDTH).clamp(60.0, 280.0);
    let strip = if view.row_strip.is_some() { STRIP_WIDTH + 4.0 } else { 0.0 };

    let available = ui.available_size();
    let cell_h = ((available.y - HEADER_HEIGHT - 30.0) / rows as f32).clamp(6.0, 36.0);
    let height = HEADER_HEIGHT + cell_h * rows as f32;
    let (response, painter) = ui.allocate_painter(Vec2::new(available.x, height), Sense::hover());
    let rect = response.rect;

    let grid_left = rect.left() + label_width + strip + 6.0;
    let cell_w = ((rect.right() - COLORBAR_WIDTH - grid_left) / cols as f32).max(4.0);
    let grid = Grid {
        origin: Pos2::new(grid_left, rect.top() + HEADER_HEIGHT),
        cell: Vec2::new(cell_w, cell_h),
        rows,
        cols,
    };
    let text_color = ui.visuals().text_color();
    let font = FontId::proportional(11.0);

    for (c, label) in view.col_labels.iter().enumerate() {
        let top = grid.cell_rect(0, c).center_top() - Vec2::new(0.0, 4.0);
        painter.text(top, Align2::CENTER_BOTTOM, label, font.clone(), text_color);
    }

    let show_values = cell_h >= 16.0 && cell_w >= 40.0;
    for r in 0..rows {
        let first = grid.cell_rect(r, 0);
        painter.text(
            Pos2::new(rect.left() + label_width, first.center().y),
            Align2::RIGHT_CENTER,
            &view.row_labels[r],
            font.clone(),
            text_color,
        );
        if let Some(strip_colors) = &view.row_strip {
            let strip_rect = Rect::from_min_size(
                Pos2::new(grid_left - STRIP_WIDTH - 2.0, first.top()),
                Vec2::new(STRIP_WIDTH, cell_h),
            );
            painter.rect_filled(strip_rect, 0.0, strip_colors[r]);
        }
        for c in 0..cols {
            let value = view.matrix.get(r, c);
            let cell = grid.cell_rect(r, c);
            painter.rect_filled(cell.shrink(0.5), 0.0, view.scale.color_for(value));
            if show_values && value.is_finite() {
                painter.text(
                    cell.center(),
                    Align2::CENTER_CENTER,
                    format!("{value:.2}"),
                    font.clone(),
                    Color32::WHITE,
                );
            }
        }
    }

    // Colour bar
    let bar = Rect::from_min_size(
        Pos2::new(rect.right() - COLORBAR_WIDTH + 10.0, grid.origin.y),
        Vec2::new(14.0, cell_h * rows as f32),
    );
    let steps = 32;
    for i in 0..steps {
        let t = i as f64 / (steps - 1) as f64;
        let value = view.scale.max - t * (view.scale.max - view.scale.min);
        let y = bar.top() + bar.height() * i as f32 / steps as f32;
        let slice = Rect::from_min_size(
            Pos2::new(bar.left(), y),
            Vec2::new(bar.width(), bar.height() / steps as f32 + 0.5),
        );
        painter.rect_filled(slice, 0.0, view.scale.color_for(value));
    }
    painter.text(
        bar.right_top() + Vec2::new(3.0, 0.0),
        Align2::LEFT_TOP,
        format!("{:.2}", view.scale.max),
        font.clone(),
        text_color,
    );
    painter.text(
        bar.right_bottom() + Vec2::new(3.0, 0.0),
        Align2::LEFT_BOTTOM,
        format!("{:.2}", view.scale.min),
        font,
        text_color,
    );

    response.hover_pos().and_then(|pos| grid.cell_at(pos))
}

fn hover_readout(ui: &mut Ui, view: &HeatmapView<'_>, hovered: Option<(usize, usize)>) {
    let text = match hovered {
        Some((r, c)) => format!(
            "{}  ×  {}:  {:.4}",
            view.row_labels[r],
            view.col_labels[c],
            view.matrix.get(r, c)
        ),
        None => "Hover a cell to see its value".to_string(),
    };
    ui.label(text);
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Aggregated SHAP values as a clustered or canonically ordered heatmap.
pub fn heatmap_page(ui: &mut Ui, state: &mut AppState) {
    if state.dataset.is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a file to view SHAP values  (File → Open…)");
        });
        return;
    }

    let mut changed = false;
    let options = &mut state.heatmap_options;
    ui.horizontal(|ui: &mut Ui| {
        changed |= ui
            .radio_value(&mut options.canonical, false, "Hierarchical clustering")
            .changed();
        changed |= ui
            .radio_value(&mut options.canonical, true, "Canonical order")
            .changed();
        if options.canonical {
            ui.label("Values outside the order:");
            egui::ComboBox::from_id_salt("reindex_policy")
                .selected_text(options.policy.label())
                .show_ui(ui, |ui: &mut Ui| {
                    for policy in OutOfOrderPolicy::ALL {
                        changed |= ui
                            .selectable_value(&mut options.policy, policy, policy.label())
                            .changed();
                    }
                });
        }
        ui.separator();
        ui.label("Fill");
        changed |= ui
            .add(egui::DragValue::new(&mut options.fill_value).speed(0.01))
            .changed();
        ui.checkbox(&mut options.display_labels, "Display labels");
    });
    if changed {
        state.mark_dirty();
    }

    let registry = &state.registry;
    let display = state.heatmap_options.display_labels;
    match &state.views.heatmap {
        Some(Ok(heatmap)) if !heatmap.matrix.is_empty() => {
            let title = format!(
                "{} SHAP values: {} × {}",
                state.source.method(),
                heatmap
                    .row_dims
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                heatmap.col_dim
            );
            ui.heading(title);

            let row_labels = heatmap.row_labels(registry, display);
            let col_labels = heatmap.col_labels(registry, display);
            let groups = heatmap.row_groups();
            let strip_map = heatmap.row_dims.first().map(|dim| {
                ColorMap::new(*dim, groups.iter().map(|g| g.to_string()), registry)
            });
            let row_strip = strip_map
                .as_ref()
                .map(|cm| groups.iter().map(|g| cm.color_for(g)).collect());

            if let Some(cm) = &strip_map {
                ui.horizontal_wrapped(|ui: &mut Ui| {
                    for (label, color) in cm.legend_entries(registry) {
                        ui.label(RichText::new(format!("■ {label}")).color(color));
                    }
                });
            }

            let view = HeatmapView {
                matrix: &heatmap.matrix,
                row_labels: &row_labels,
                col_labels: &col_labels,
                scale: ColorScale::new(heatmap.matrix.value_range(), None),
                row_strip,
            };
            let hovered = paint_heatmap(ui, &view);
            hover_readout(ui, &view, hovered);
        }
        Some(Ok(_)) => {
            ui.label("No data for the current selection");
        }
        Some(Err(e)) => {
            ui.label(RichText::new(format!("Cannot compute heatmap: {e}")).color(Color32::RED));
        }
        None => {}
    }
}

/// Lower bound of the model performance colour scale.
pub const PERFORMANCE_FLOOR: f64 = 0.5;

/// Square model cross-performance matrix.
pub fn model_performance_page(ui: &mut Ui, state: &AppState) {
    let Some(matrix) = &state.model_performance else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a model performance matrix  (File → Open…)");
        });
        return;
    };

    ui.heading("Model cross-performance");
    let row_labels: Vec<String> = matrix.row_labels.iter().map(|k| k.join(", ")).collect();
    let view = HeatmapView {
        matrix,
        row_labels: &row_labels,
        col_labels: &matrix.col_labels,
        scale: ColorScale::new(matrix.value_range(), Some(PERFORMANCE_FLOOR)),
        row_strip: None,
    };
    let hovered = paint_heatmap(ui, &view);
    hover_readout(ui, &view, hovered);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_lookup() {
        let grid = Grid {
            origin: Pos2::new(10.0, 20.0),
            cell: Vec2::new(5.0, 4.0),
            rows: 2,
            cols: 3,
        };
        assert_eq!(grid.cell_at(Pos2::new(11.0, 21.0)), Some((0, 0)));
        assert_eq!(grid.cell_at(Pos2::new(24.0, 27.0)), Some((1, 2)));
        assert_eq!(grid.cell_at(Pos2::new(26.0, 21.0)), None);
        assert_eq!(grid.cell_at(Pos2::new(9.0, 21.0)), None);
        assert_eq!(grid.cell_rect(1, 2).min, Pos2::new(20.0, 24.0));
    }
}
