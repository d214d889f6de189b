//! GPU buffer builder
//!
//! Flattens a scene into plain `#[repr(C)]` instance records that can be
//! uploaded as-is with `bytemuck::cast_slice`. The software renderer reads
//! the same records, so geometry is computed once per frame.

use super::Viewport;
use crate::geometry::BarScale;
use crate::interaction::DragPreview;
use crate::layout::{Scene, SectionLayout, TrackLayout};
use crate::options::CanvasOptions;
use crate::structure::{ContainerId, GridMode, Selection, TimeSignature};
use bytemuck::{Pod, Zeroable};
use egui::{Color32, Pos2, Rect, Rgba, Vec2};
use std::ops::RangeInclusive;
use std::time::Instant;

/// Containers narrower than this (in pixels) get no waveform record
pub const MIN_WAVEFORM_WIDTH: f32 = 4.0;
const MIN_WAVEFORM_PEAKS: usize = 4;
const HANDLE_SIZE: f32 = 6.0;

const TRACK_BG_EVEN: Color32 = Color32::from_rgb(32, 32, 36);
const TRACK_BG_ODD: Color32 = Color32::from_rgb(38, 38, 43);
const BAR_SHADE: Color32 = Color32::from_rgba_premultiplied(6, 6, 8, 8);
const BAR_LINE: Color32 = Color32::from_rgb(70, 70, 78);
const BEAT_LINE: Color32 = Color32::from_rgb(50, 50, 56);
const HEADER_BG: Color32 = Color32::from_rgb(24, 24, 28);
const RULER_TICK: Color32 = Color32::from_rgb(140, 140, 150);
const NOTE_COLOR: Color32 = Color32::from_rgb(235, 235, 255);
const FADE_COLOR: Color32 = Color32::from_rgb(255, 255, 255);
const AUTOMATION_COLOR: Color32 = Color32::from_rgb(255, 200, 80);
const HIGHLIGHT_COLOR: Color32 = Color32::from_rgb(255, 255, 255);
const SELECTION_COLOR: Color32 = Color32::from_rgba_premultiplied(40, 60, 100, 60);
const GHOST_COLOR: Color32 = Color32::from_rgba_premultiplied(90, 90, 120, 90);
const PLAYHEAD_COLOR: Color32 = Color32::from_rgb(255, 80, 80);
const CURSOR_COLOR: Color32 = Color32::from_rgb(200, 200, 200);

/// What a rect record represents; renderers style and order by it
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RectKind {
    TrackBackground = 0,
    BarShade = 1,
    ContainerFill = 2,
    CloneFill = 3,
    Note = 4,
    AutomationHandle = 5,
    Highlight = 6,
    SelectionRange = 7,
    DragGhost = 8,
    HeaderBackground = 9,
    Section = 10,
}

impl RectKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => RectKind::TrackBackground,
            1 => RectKind::BarShade,
            2 => RectKind::ContainerFill,
            3 => RectKind::CloneFill,
            4 => RectKind::Note,
            5 => RectKind::AutomationHandle,
            6 => RectKind::Highlight,
            7 => RectKind::SelectionRange,
            8 => RectKind::DragGhost,
            9 => RectKind::HeaderBackground,
            10 => RectKind::Section,
            _ => return None,
        })
    }

    /// Paint order; lower layers go first
    pub fn layer(self) -> u8 {
        match self {
            RectKind::TrackBackground => 0,
            RectKind::BarShade => 1,
            RectKind::ContainerFill | RectKind::CloneFill => 3,
            RectKind::Note => 5,
            RectKind::AutomationHandle => 6,
            RectKind::Highlight => 7,
            RectKind::SelectionRange => 8,
            RectKind::DragGhost => 9,
            RectKind::HeaderBackground => 10,
            RectKind::Section => 11,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    BarLine = 0,
    BeatLine = 1,
    FadeCurve = 2,
    Automation = 3,
    RulerTick = 4,
    Playhead = 5,
    Cursor = 6,
}

impl LineKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => LineKind::BarLine,
            1 => LineKind::BeatLine,
            2 => LineKind::FadeCurve,
            3 => LineKind::Automation,
            4 => LineKind::RulerTick,
            5 => LineKind::Playhead,
            6 => LineKind::Cursor,
            _ => return None,
        })
    }

    pub fn layer(self) -> u8 {
        match self {
            LineKind::BarLine | LineKind::BeatLine => 2,
            LineKind::FadeCurve | LineKind::Automation => 6,
            LineKind::RulerTick => 12,
            LineKind::Playhead | LineKind::Cursor => 13,
        }
    }
}

/// Waveforms are painted between container fills and notes
pub const WAVEFORM_LAYER: u8 = 4;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RectInstance {
    pub min: [f32; 2],
    pub max: [f32; 2],
    /// Linear premultiplied RGBA
    pub color: [f32; 4],
    pub kind: u32,
    pub _padding: [u32; 3],
}

impl RectInstance {
    fn new(rect: Rect, color: Color32, kind: RectKind) -> Self {
        Self {
            min: [rect.min.x, rect.min.y],
            max: [rect.max.x, rect.max.y],
            color: Rgba::from(color).to_array(),
            kind: kind as u32,
            _padding: [0; 3],
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_min_max(Pos2::new(self.min[0], self.min[1]), Pos2::new(self.max[0], self.max[1]))
    }

    pub fn kind(&self) -> Option<RectKind> {
        RectKind::from_u32(self.kind)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LineInstance {
    pub start: [f32; 2],
    pub end: [f32; 2],
    pub color: [f32; 4],
    pub width: f32,
    pub kind: u32,
    pub _padding: [u32; 2],
}

impl LineInstance {
    fn new(start: Pos2, end: Pos2, width: f32, color: Color32, kind: LineKind) -> Self {
        Self {
            start: [start.x, start.y],
            end: [end.x, end.y],
            color: Rgba::from(color).to_array(),
            width,
            kind: kind as u32,
            _padding: [0; 2],
        }
    }

    pub fn points(&self) -> [Pos2; 2] {
        [
            Pos2::new(self.start[0], self.start[1]),
            Pos2::new(self.end[0], self.end[1]),
        ]
    }

    pub fn kind(&self) -> Option<LineKind> {
        LineKind::from_u32(self.kind)
    }
}

/// One container's waveform: a slice of [`DrawBuffers::peaks`] stretched
/// over `rect`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WaveformParams {
    pub rect_min: [f32; 2],
    pub rect_max: [f32; 2],
    pub color: [f32; 4],
    pub peak_offset: u32,
    pub peak_count: u32,
    /// Container id split into 32-bit halves, for tile lookups
    pub container_id_lo: u32,
    pub container_id_hi: u32,
}

impl WaveformParams {
    pub fn rect(&self) -> Rect {
        Rect::from_min_max(
            Pos2::new(self.rect_min[0], self.rect_min[1]),
            Pos2::new(self.rect_max[0], self.rect_max[1]),
        )
    }

    pub fn container_id(&self) -> ContainerId {
        ContainerId(u64::from(self.container_id_hi) << 32 | u64::from(self.container_id_lo))
    }

    pub fn peak_range(&self) -> std::ops::Range<usize> {
        let start = self.peak_offset as usize;
        start..start + self.peak_count as usize
    }
}

/// Vertex-shader uniforms for the visible rect
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub projection: [[f32; 4]; 4],
}

/// Column-major orthographic projection: `(left, top)` maps to `(-1, +1)`
/// and `(right, bottom)` to `(+1, -1)`
pub fn ortho_projection(left: f32, right: f32, top: f32, bottom: f32) -> [[f32; 4]; 4] {
    let width = right - left;
    let height = bottom - top;
    let (sx, tx) = if width != 0.0 {
        (2.0 / width, -(right + left) / width)
    } else {
        (0.0, 0.0)
    };
    let (sy, ty) = if height != 0.0 {
        (-2.0 / height, (bottom + top) / height)
    } else {
        (0.0, 0.0)
    };
    [
        [sx, 0.0, 0.0, 0.0],
        [0.0, sy, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [tx, ty, 0.0, 1.0],
    ]
}

/// Reduces `peaks` to at most `max_peaks` values, keeping the loudest
/// absolute amplitude of each bucket
pub fn downsample_peaks(peaks: &[f32], max_peaks: usize) -> Vec<f32> {
    if peaks.len() <= max_peaks {
        return peaks.iter().map(|p| p.abs()).collect();
    }
    (0..max_peaks)
        .map(|i| {
            let start = i * peaks.len() / max_peaks;
            let end = ((i + 1) * peaks.len() / max_peaks).max(start + 1);
            peaks[start..end].iter().fold(0.0f32, |acc, p| acc.max(p.abs()))
        })
        .collect()
}

/// Peak budget for a waveform drawn `width_px` wide
pub fn peak_budget(width_px: f32) -> usize {
    MIN_WAVEFORM_PEAKS.max((width_px / 2.0) as usize)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpec {
    pub pixels_per_bar: f32,
    pub total_bars: u32,
    pub time_signature: TimeSignature,
    pub grid_mode: GridMode,
    /// Subdivision lines are only drawn at least this far apart
    pub beat_line_threshold: f32,
    pub ruler_height: f32,
    /// Ruler plus section lane
    pub header_height: f32,
}

impl GridSpec {
    pub fn from_scene(scene: &Scene, options: &CanvasOptions) -> Self {
        Self {
            pixels_per_bar: scene.scale.pixels_per_bar(),
            total_bars: scene.total_bars,
            time_signature: scene.time_signature,
            grid_mode: scene.grid_mode,
            beat_line_threshold: options.beat_line_threshold,
            ruler_height: options.ruler_height,
            header_height: scene.track_area_top,
        }
    }

    /// Spacing of the subdivision lines inside a bar, in bars
    pub fn subdivision_bars(&self) -> f64 {
        match self.grid_mode {
            GridMode::Fixed(resolution) => resolution
                .whole_note_fraction()
                .map(|fraction| fraction / self.time_signature.whole_notes_per_bar())
                .unwrap_or(1.0),
            GridMode::Adaptive => 1.0 / self.time_signature.beats(),
        }
    }

    /// Bars whose span intersects `[left, right]`, clamped to the content
    ///
    /// The lower bound never exceeds the upper bound, even when the view is
    /// scrolled past the last bar. `None` when there are no bars at all.
    pub fn visible_bars(&self, left: f32, right: f32) -> Option<RangeInclusive<u32>> {
        if self.total_bars == 0 {
            return None;
        }
        let scale = BarScale::new(self.pixels_per_bar);
        let last = self.total_bars as f64;
        let clamp = |x: f32| {
            let bar = scale.x_to_bar(x).floor();
            if bar.is_finite() {
                bar.clamp(1.0, last) as u32
            } else {
                1
            }
        };
        let high = clamp(right);
        let low = clamp(left).min(high);
        Some(low..=high)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BufferStats {
    pub visible_containers: usize,
    pub waveform_count: usize,
    pub rect_count: usize,
    pub line_count: usize,
    pub build_ms: f64,
}

#[derive(Clone, Debug, Default)]
pub struct DrawBuffers {
    pub rects: Vec<RectInstance>,
    pub lines: Vec<LineInstance>,
    pub waveforms: Vec<WaveformParams>,
    /// Downsampled peaks referenced by `waveforms`
    pub peaks: Vec<f32>,
    pub uniforms: Option<Uniforms>,
    pub stats: BufferStats,
}

impl DrawBuffers {
    pub fn rects_of(&self, kind: RectKind) -> impl Iterator<Item = &RectInstance> {
        self.rects.iter().filter(move |r| r.kind == kind as u32)
    }

    pub fn lines_of(&self, kind: LineKind) -> impl Iterator<Item = &LineInstance> {
        self.lines.iter().filter(move |l| l.kind == kind as u32)
    }

    pub fn rect_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.rects)
    }

    pub fn line_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.lines)
    }

    pub fn waveform_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.waveforms)
    }
}

pub struct BufferBuilder {
    budget_ms: f64,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self::new(CanvasOptions::default().buffer_budget_ms)
    }
}

impl BufferBuilder {
    pub fn new(budget_ms: f64) -> Self {
        Self { budget_ms }
    }

    pub fn build(
        &self,
        tracks: &[TrackLayout],
        sections: &[SectionLayout],
        grid: GridSpec,
        selection: &Selection,
        viewport: &Viewport,
    ) -> DrawBuffers {
        let started = Instant::now();
        let scale = BarScale::new(grid.pixels_per_bar);
        let visible = viewport.visible_rect;
        let extent = viewport.canvas_size.y.max(visible.max.y);
        let mut out = DrawBuffers::default();

        // Track rows
        for (index, track) in tracks.iter().enumerate() {
            if track.bottom() < visible.top() || track.y > visible.bottom() {
                continue;
            }
            let color = if index % 2 == 0 { TRACK_BG_EVEN } else { TRACK_BG_ODD };
            out.rects.push(RectInstance::new(
                Rect::from_min_max(Pos2::new(visible.left(), track.y), Pos2::new(visible.right(), track.bottom())),
                color,
                RectKind::TrackBackground,
            ));
        }

        // Grid
        let bars = grid.visible_bars(visible.left(), visible.right());
        if let Some(bars) = bars.clone() {
            let subdivision = grid.subdivision_bars();
            let draw_subdivisions = subdivision < 1.0 && scale.bars_to_width(subdivision) >= grid.beat_line_threshold;
            for bar in bars {
                let left = scale.bar_to_x(bar as f64);
                let right = scale.bar_to_x(bar as f64 + 1.0);
                if bar % 2 == 0 {
                    out.rects.push(RectInstance::new(
                        Rect::from_min_max(Pos2::new(left, 0.0), Pos2::new(right, extent)),
                        BAR_SHADE,
                        RectKind::BarShade,
                    ));
                }
                out.lines.push(LineInstance::new(
                    Pos2::new(left, 0.0),
                    Pos2::new(left, extent),
                    1.0,
                    BAR_LINE,
                    LineKind::BarLine,
                ));
                if draw_subdivisions {
                    let steps = (1.0 / subdivision).round() as u32;
                    for step in 1..steps {
                        let x = scale.bar_to_x(bar as f64 + step as f64 * subdivision);
                        out.lines.push(LineInstance::new(
                            Pos2::new(x, 0.0),
                            Pos2::new(x, extent),
                            1.0,
                            BEAT_LINE,
                            LineKind::BeatLine,
                        ));
                    }
                }
            }
        }

        // Containers
        for track in tracks {
            for container in &track.containers {
                let automation_bottom = container
                    .automation
                    .iter()
                    .map(|lane| lane.lane_rect.bottom())
                    .fold(container.rect.bottom(), f32::max);
                let footprint = Rect::from_min_max(
                    container.rect.min,
                    Pos2::new(container.rect.max.x, automation_bottom),
                );
                if !footprint.intersects(visible) {
                    continue;
                }
                out.stats.visible_containers += 1;

                let fill_kind = if container.is_clone {
                    RectKind::CloneFill
                } else {
                    RectKind::ContainerFill
                };
                out.rects.push(RectInstance::new(container.rect, container.color, fill_kind));

                if let Some(peaks) = &container.peaks {
                    let width = container.rect.width();
                    if width >= MIN_WAVEFORM_WIDTH {
                        let downsampled = downsample_peaks(peaks, peak_budget(width));
                        out.waveforms.push(WaveformParams {
                            rect_min: [container.rect.min.x, container.rect.min.y],
                            rect_max: [container.rect.max.x, container.rect.max.y],
                            color: Rgba::from(waveform_color(container.color)).to_array(),
                            peak_offset: out.peaks.len() as u32,
                            peak_count: downsampled.len() as u32,
                            container_id_lo: container.container_id.0 as u32,
                            container_id_hi: (container.container_id.0 >> 32) as u32,
                        });
                        out.peaks.extend(downsampled);
                    }
                }

                for glyph in &container.note_glyphs {
                    out.rects.push(RectInstance::new(glyph.rect, NOTE_COLOR, RectKind::Note));
                }

                for outline in [&container.enter_fade_outline, &container.exit_fade_outline] {
                    for pair in outline.windows(2) {
                        out.lines
                            .push(LineInstance::new(pair[0], pair[1], 1.5, FADE_COLOR, LineKind::FadeCurve));
                    }
                }

                for lane in &container.automation {
                    for pair in lane.handles.windows(2) {
                        out.lines.push(LineInstance::new(
                            pair[0].pos,
                            pair[1].pos,
                            1.5,
                            AUTOMATION_COLOR,
                            LineKind::Automation,
                        ));
                    }
                    for handle in &lane.handles {
                        out.rects.push(RectInstance::new(
                            Rect::from_center_size(handle.pos, Vec2::splat(HANDLE_SIZE)),
                            AUTOMATION_COLOR,
                            RectKind::AutomationHandle,
                        ));
                    }
                }

                if container.is_selected {
                    out.rects
                        .push(RectInstance::new(container.rect, HIGHLIGHT_COLOR, RectKind::Highlight));
                }
            }
        }

        // Selection range and drag ghost
        let tracks_top = visible.top() + grid.header_height;
        if let Some(range) = selection.bar_range {
            out.rects.push(range_rect(range.start, range.end, tracks_top, extent, scale));
        }
        match viewport.drag_preview {
            Some(DragPreview::Container { rect, .. }) => {
                out.rects.push(RectInstance::new(rect, GHOST_COLOR, RectKind::DragGhost));
            }
            Some(DragPreview::Range(range)) => {
                out.rects.push(range_rect(range.start, range.end, tracks_top, extent, scale));
            }
            None => {}
        }

        // Header, pinned to the top of the view
        out.rects.push(RectInstance::new(
            Rect::from_min_size(visible.min, Vec2::new(visible.width(), grid.header_height)),
            HEADER_BG,
            RectKind::HeaderBackground,
        ));
        for section in sections {
            let rect = section.rect.translate(Vec2::new(0.0, visible.top()));
            if rect.max.x < visible.left() || rect.min.x > visible.right() {
                continue;
            }
            out.rects.push(RectInstance::new(rect, section.color, RectKind::Section));
            if section.is_selected {
                out.rects.push(RectInstance::new(rect, HIGHLIGHT_COLOR, RectKind::Highlight));
            }
        }
        if let Some(bars) = bars {
            for bar in bars {
                let x = scale.bar_to_x(bar as f64);
                out.lines.push(LineInstance::new(
                    Pos2::new(x, visible.top()),
                    Pos2::new(x, visible.top() + grid.ruler_height),
                    1.0,
                    RULER_TICK,
                    LineKind::RulerTick,
                ));
            }
        }

        // Playhead and cursor
        let playhead_x = scale.bar_to_x(viewport.playhead_bar);
        if playhead_x.is_finite() && playhead_x >= visible.left() && playhead_x <= visible.right() {
            out.lines.push(LineInstance::new(
                Pos2::new(playhead_x, visible.top()),
                Pos2::new(playhead_x, extent),
                2.0,
                PLAYHEAD_COLOR,
                LineKind::Playhead,
            ));
        }
        if let Some(cursor_x) = viewport.cursor_x.filter(|x| x.is_finite()) {
            out.lines.push(LineInstance::new(
                Pos2::new(cursor_x, visible.top()),
                Pos2::new(cursor_x, extent),
                1.0,
                CURSOR_COLOR,
                LineKind::Cursor,
            ));
        }

        out.uniforms = Some(Uniforms {
            projection: ortho_projection(visible.left(), visible.right(), visible.top(), visible.bottom()),
        });
        out.stats.waveform_count = out.waveforms.len();
        out.stats.rect_count = out.rects.len();
        out.stats.line_count = out.lines.len();
        out.stats.build_ms = started.elapsed().as_secs_f64() * 1000.0;
        if out.stats.build_ms > self.budget_ms {
            log::warn!(
                "Buffer build took {:.2}ms (budget {:.2}ms): {} rects, {} lines, {} waveforms",
                out.stats.build_ms,
                self.budget_ms,
                out.stats.rect_count,
                out.stats.line_count,
                out.stats.waveform_count
            );
        }
        out
    }
}

/// Waveforms are drawn in a lighter shade of their container
pub fn waveform_color(container_color: Color32) -> Color32 {
    Color32::from_rgb(
        container_color.r() / 2 + 128,
        container_color.g() / 2 + 128,
        container_color.b() / 2 + 128,
    )
}

fn range_rect(start_bar: f64, end_bar: f64, top: f32, bottom: f32, scale: BarScale) -> RectInstance {
    RectInstance::new(
        Rect::from_min_max(
            Pos2::new(scale.bar_to_x(start_bar), top),
            Pos2::new(scale.bar_to_x(end_bar), bottom.max(top)),
        ),
        SELECTION_COLOR,
        RectKind::SelectionRange,
    )
}
