//! 小节/像素换算与网格对齐模块
//!
//! 布局、拾取、交互控制器和缓冲区构建器都通过 [`BarScale`] 在小节和像素之间换算。
//! 小节从 1 开始，第 1 小节位于 x = 0。

use crate::structure::{GridMode, TimeSignature};

/// Lowest zoom the canvas accepts; invalid zoom values fall back to it
pub const MIN_PIXELS_PER_BAR: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BarScale {
    pixels_per_bar: f32,
}

impl BarScale {
    pub fn new(pixels_per_bar: f32) -> Self {
        let pixels_per_bar = if pixels_per_bar.is_finite() && pixels_per_bar >= MIN_PIXELS_PER_BAR {
            pixels_per_bar
        } else {
            log::warn!(
                "Invalid pixels-per-bar {}, falling back to {}",
                pixels_per_bar,
                MIN_PIXELS_PER_BAR
            );
            MIN_PIXELS_PER_BAR
        };
        Self { pixels_per_bar }
    }

    pub fn pixels_per_bar(&self) -> f32 {
        self.pixels_per_bar
    }

    /// x coordinate of the start of `bar`
    pub fn bar_to_x(&self, bar: f64) -> f32 {
        ((bar - 1.0) * self.pixels_per_bar as f64) as f32
    }

    /// Raw (unsnapped) bar position under `x`
    pub fn x_to_bar(&self, x: f32) -> f64 {
        x as f64 / self.pixels_per_bar as f64 + 1.0
    }

    pub fn bars_to_width(&self, bars: f64) -> f32 {
        (bars * self.pixels_per_bar as f64) as f32
    }

    pub fn width_to_bars(&self, width: f32) -> f64 {
        width as f64 / self.pixels_per_bar as f64
    }

    pub fn pixels_per_beat(&self, time_signature: TimeSignature) -> f32 {
        self.pixels_per_bar / time_signature.beats() as f32
    }
}

/// Everything the snap policy needs, captured per configure call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapSettings {
    pub scale: BarScale,
    pub time_signature: TimeSignature,
    pub grid_mode: GridMode,
    pub enabled: bool,
    pub adaptive_beat_threshold: f32,
}

impl SnapSettings {
    /// Size of one grid step in bars
    pub fn grid_unit_bars(&self) -> f64 {
        match self.grid_mode {
            GridMode::Fixed(resolution) => match resolution.whole_note_fraction() {
                Some(fraction) => fraction / self.time_signature.whole_notes_per_bar(),
                None => 1.0,
            },
            GridMode::Adaptive => {
                if self.scale.pixels_per_beat(self.time_signature) >= self.adaptive_beat_threshold {
                    1.0 / self.time_signature.beats()
                } else {
                    1.0
                }
            }
        }
    }

    /// Snaps a raw bar position to the active grid; never returns less than bar 1
    pub fn snap_bar(&self, raw_bar: f64) -> f64 {
        if !raw_bar.is_finite() {
            return 1.0;
        }
        if !self.enabled {
            return raw_bar.max(1.0);
        }
        let unit = self.grid_unit_bars();
        if !(unit > 0.0) {
            return raw_bar.max(1.0);
        }
        let snapped = 1.0 + ((raw_bar - 1.0) / unit).round() * unit;
        snapped.max(1.0)
    }

    /// Snapped bar under the screen x coordinate
    pub fn bar_at_x(&self, x: f32) -> f64 {
        self.snap_bar(self.scale.x_to_bar(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::GridResolution;

    fn settings(ppb: f32, grid_mode: GridMode, enabled: bool) -> SnapSettings {
        SnapSettings {
            scale: BarScale::new(ppb),
            time_signature: TimeSignature::default(),
            grid_mode,
            enabled,
            adaptive_beat_threshold: 40.0,
        }
    }

    #[test]
    fn bar_and_pixel_conversions_are_inverse() {
        let scale = BarScale::new(120.0);
        assert_eq!(scale.bar_to_x(3.0), 240.0);
        assert_eq!(scale.bars_to_width(4.0), 480.0);
        assert_eq!(scale.x_to_bar(240.0), 3.0);
        for bar in [1.0, 1.5, 7.25, 33.0] {
            assert!((scale.x_to_bar(scale.bar_to_x(bar)) - bar).abs() < 1e-6);
        }
    }

    #[test]
    fn invalid_zoom_falls_back() {
        assert_eq!(BarScale::new(0.0).pixels_per_bar(), MIN_PIXELS_PER_BAR);
        assert_eq!(BarScale::new(f32::NAN).pixels_per_bar(), MIN_PIXELS_PER_BAR);
    }

    #[test]
    fn disabled_snap_returns_raw_bar() {
        let snap = settings(120.0, GridMode::Adaptive, false);
        assert!((snap.bar_at_x(150.0) - 2.25).abs() < 1e-9);
        assert_eq!(snap.bar_at_x(-50.0), 1.0);
    }

    #[test]
    fn adaptive_snaps_to_bars_when_zoomed_out() {
        // 80 px per bar => 20 px per beat, below the 40 px threshold
        let snap = settings(80.0, GridMode::Adaptive, true);
        assert_eq!(snap.grid_unit_bars(), 1.0);
        assert_eq!(snap.bar_at_x(100.0), 2.0);
    }

    #[test]
    fn adaptive_snaps_to_beats_when_zoomed_in() {
        // 200 px per bar => 50 px per beat
        let snap = settings(200.0, GridMode::Adaptive, true);
        assert_eq!(snap.grid_unit_bars(), 0.25);
        assert_eq!(snap.bar_at_x(260.0), 2.25);
    }

    #[test]
    fn fixed_grid_uses_note_value() {
        let snap = settings(120.0, GridMode::Fixed(GridResolution::Eighth), true);
        assert_eq!(snap.grid_unit_bars(), 0.125);
        assert_eq!(snap.bar_at_x(16.0), 1.125);

        let mut six_eight = settings(120.0, GridMode::Fixed(GridResolution::Eighth), true);
        six_eight.time_signature = TimeSignature { beats_per_bar: 6, beat_unit: 8 };
        assert!((six_eight.grid_unit_bars() - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn snapping_never_goes_below_bar_one() {
        let snap = settings(120.0, GridMode::Fixed(GridResolution::Bar), true);
        assert_eq!(snap.snap_bar(-3.0), 1.0);
        assert_eq!(snap.snap_bar(f64::NAN), 1.0);
    }
}
