use std::collections::BTreeMap;

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};

use crate::data::domain::DomainRegistry;
use crate::data::model::Dimension;

// ---------------------------------------------------------------------------
// Categorical palette
// ---------------------------------------------------------------------------

fn to_color32(rgb: Srgb) -> Color32 {
    Color32::from_rgb(
        (rgb.red.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            to_color32(hsl.into_color())
        })
        .collect()
}

/// Maps the values of one dimension to distinct colours.
///
/// Colours are assigned by position in the registry order, so the same
/// value always gets the same colour for the same set of values.
#[derive(Debug, Clone)]
pub struct ColorMap {
    pub dimension: Dimension,
    mapping: BTreeMap<String, Color32>,
    order: Vec<String>,
    default_color: Color32,
}

impl ColorMap {
    pub fn new<I>(dimension: Dimension, values: I, registry: &DomainRegistry) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let order = registry.sort_values(dimension, values);
        let palette = generate_palette(order.len());
        let mapping = order.iter().cloned().zip(palette).collect();
        ColorMap {
            dimension,
            mapping,
            order,
            default_color: Color32::GRAY,
        }
    }

    /// Look up the colour for a given value.
    pub fn color_for(&self, value: &str) -> Color32 {
        self.mapping
            .get(value)
            .copied()
            .unwrap_or(self.default_color)
    }

    /// Legend entries (display label → colour) in canonical order.
    pub fn legend_entries(&self, registry: &DomainRegistry) -> Vec<(String, Color32)> {
        self.order
            .iter()
            .map(|v| (registry.label(self.dimension, v).to_string(), self.color_for(v)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Continuous scale
// ---------------------------------------------------------------------------

/// Viridis anchor colours, evenly spaced from 0 to 1.
const VIRIDIS: [(f32, f32, f32); 6] = [
    (0.267, 0.005, 0.329),
    (0.255, 0.267, 0.529),
    (0.165, 0.471, 0.557),
    (0.133, 0.659, 0.518),
    (0.478, 0.820, 0.318),
    (0.992, 0.906, 0.145),
];

/// Viridis colour at `t` in [0, 1] (clamped).
pub fn viridis(t: f32) -> Color32 {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (VIRIDIS.len() - 1) as f32;
    let i = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - i as f32;

    let anchor = |(r, g, b): (f32, f32, f32)| -> LinSrgb { Srgb::new(r, g, b).into_linear() };
    let mixed = anchor(VIRIDIS[i]).mix(anchor(VIRIDIS[i + 1]), frac);
    to_color32(Srgb::from_linear(mixed))
}

/// Linear mapping from a value range onto the viridis scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub min: f64,
    pub max: f64,
}

impl ColorScale {
    /// Scale over `range`, with an optional fixed lower bound.
    pub fn new(range: Option<(f64, f64)>, min_override: Option<f64>) -> Self {
        let (lo, hi) = range.unwrap_or((0.0, 1.0));
        let min = min_override.unwrap_or(lo);
        ColorScale {
            min,
            max: hi.max(min),
        }
    }

    pub fn color_for(&self, value: f64) -> Color32 {
        if !value.is_finite() {
            return Color32::DARK_GRAY;
        }
        let span = self.max - self.min;
        let t = if span > 0.0 {
            (value - self.min) / span
        } else {
            0.5
        };
        viridis(t as f32)
    }
}
