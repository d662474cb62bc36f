use serde::{Deserialize, Serialize};

/// Tuning knobs shared by the matchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    /// Templates no larger than this (either side, physical px) skip the
    /// downscaled retry; shrinking them erases thin icon strokes.
    pub small_icon_px: u32,
    pub fallback_scale: f32,
    /// Colour components narrower or shorter than this are noise.
    pub min_component_px: u32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            small_icon_px: 40,
            fallback_scale: 0.5,
            min_component_px: 2,
        }
    }
}
