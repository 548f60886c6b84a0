use eframe::egui;

use crate::state::{AppState, Page};
use crate::ui::{heatmap, panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct ShapExplorerApp {
    pub state: AppState,
}

impl ShapExplorerApp {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl eframe::App for ShapExplorerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar and page tabs ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: source and filters ----
        if self.state.page != Page::ModelPerformance {
            egui::SidePanel::left("filter_panel")
                .default_width(220.0)
                .resizable(true)
                .show(ctx, |ui| {
                    panels::side_panel(ui, &mut self.state);
                });
        }

        // Widgets above may have changed the selection.
        if self.state.is_dirty() {
            self.state.refresh();
        }

        // ---- Central panel: current page ----
        egui::CentralPanel::default().show(ctx, |ui| match self.state.page {
            Page::Overview => plot::overview_page(ui, &mut self.state),
            Page::Heatmap => heatmap::heatmap_page(ui, &mut self.state),
            Page::Coefficients => plot::comparison_page(ui, &mut self.state),
            Page::ModelPerformance => heatmap::model_performance_page(ui, &self.state),
        });

        // Page controls take effect on the next frame.
        if self.state.is_dirty() {
            ctx.request_repaint();
        }
    }
}
