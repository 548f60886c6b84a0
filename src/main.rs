mod app;
mod color;
mod config;
mod data;
mod state;
mod ui;

use app::ShapExplorerApp;
use config::ExplorerConfig;
use data::domain::DomainRegistry;
use eframe::egui;
use state::AppState;

fn main() -> eframe::Result {
    env_logger::init();

    let config = ExplorerConfig::load().unwrap_or_else(|e| {
        log::error!("Failed to read configuration, using defaults: {e:#}");
        ExplorerConfig::default()
    });
    let registry = config.load_registry().unwrap_or_else(|e| {
        log::warn!("Failed to read domain registry, using built-in orders: {e:#}");
        DomainRegistry::eeg_defaults()
    });
    log::info!("Configuration: {config:?}");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };

    eframe::run_native(
        "SHAP Explorer",
        options,
        Box::new(move |_cc| Ok(Box::new(ShapExplorerApp::new(AppState::new(config, registry))))),
    )
}
