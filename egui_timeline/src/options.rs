//! 画布选项模块
//!
//! 可调整的布局、拾取和渲染常量。宿主可以使用默认值，也可以从 JSON 文件加载。

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read canvas options: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse canvas options: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid canvas option `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasOptions {
    pub default_track_height: f32,
    /// Height of one expanded automation sub-lane
    pub automation_lane_height: f32,
    pub ruler_height: f32,
    pub section_lane_height: f32,
    /// Vertical gap between a track row and its container rectangles
    pub container_inset: f32,
    /// Width of the edge zones of a container, in screen pixels
    pub zone_margin: f32,
    pub note_hit_radius: f32,
    pub breakpoint_hit_radius: f32,
    /// Tiles are reused within `[ppb / tolerance, ppb * tolerance]`
    pub tile_zoom_tolerance: f32,
    /// Adaptive snapping switches from bars to beats at this pixels-per-beat
    pub adaptive_beat_threshold: f32,
    /// Beat grid lines are drawn from this pixels-per-beat upwards
    pub beat_line_threshold: f32,
    pub min_container_length_bars: f64,
    pub layout_budget_ms: f64,
    pub buffer_budget_ms: f64,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            default_track_height: 80.0,
            automation_lane_height: 40.0,
            ruler_height: 24.0,
            section_lane_height: 20.0,
            container_inset: 1.0,
            zone_margin: 8.0,
            note_hit_radius: 2.0,
            breakpoint_hit_radius: 5.0,
            tile_zoom_tolerance: 2.0,
            adaptive_beat_threshold: 40.0,
            beat_line_threshold: 12.0,
            min_container_length_bars: 0.25,
            layout_budget_ms: 2.0,
            buffer_budget_ms: 20.0,
        }
    }
}

impl CanvasOptions {
    /// Top of the first track row: the ruler plus the section lane
    pub fn track_area_top(&self) -> f32 {
        self.ruler_height + self.section_lane_height
    }

    pub fn from_json_str(json: &str) -> Result<Self, OptionsError> {
        let options: CanvasOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, OptionsError> {
        log::info!("Loading canvas options from {:?}", path);
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        let positive = [
            ("default_track_height", self.default_track_height),
            ("automation_lane_height", self.automation_lane_height),
            ("zone_margin", self.zone_margin),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(OptionsError::Invalid {
                    field,
                    reason: format!("must be positive, got {}", value),
                });
            }
        }
        if !(self.tile_zoom_tolerance.is_finite() && self.tile_zoom_tolerance >= 1.0) {
            return Err(OptionsError::Invalid {
                field: "tile_zoom_tolerance",
                reason: format!("must be at least 1.0, got {}", self.tile_zoom_tolerance),
            });
        }
        let non_negative = [
            ("ruler_height", self.ruler_height),
            ("section_lane_height", self.section_lane_height),
            ("container_inset", self.container_inset),
            ("note_hit_radius", self.note_hit_radius),
            ("breakpoint_hit_radius", self.breakpoint_hit_radius),
            ("adaptive_beat_threshold", self.adaptive_beat_threshold),
            ("beat_line_threshold", self.beat_line_threshold),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(OptionsError::Invalid {
                    field,
                    reason: format!("must be zero or more, got {}", value),
                });
            }
        }
        if !(self.min_container_length_bars.is_finite() && self.min_container_length_bars > 0.0) {
            return Err(OptionsError::Invalid {
                field: "min_container_length_bars",
                reason: format!("must be positive, got {}", self.min_container_length_bars),
            });
        }
        Ok(())
    }
}
