//! 布局构建模块
//!
//! 把 [`Snapshot`] 转换为 [`Scene`]：音轨行、容器和段落的屏幕矩形，以及淡入淡出、
//! MIDI 和自动化的子几何。构建结果只取决于快照、选项和宿主 [`ContentResolver`] 的返回值。

use crate::geometry::BarScale;
use crate::options::CanvasOptions;
use crate::structure::{
    BreakpointId, Container, ContainerId, Fade, GridMode, LaneId, MidiSequence, NoteId, SectionId,
    Selection, Snapshot, TimeSignature, TrackId, TrackKind, TrackSnapshot,
};
use egui::{Color32, Pos2, Rect, Vec2};
use std::sync::Arc;
use std::time::Instant;

/// Number of straight segments used to approximate a fade curve
pub const FADE_SEGMENTS: usize = 12;

/// Fewest pitch rows a MIDI preview is spread over
const MIN_PITCH_ROWS: u8 = 12;

/// 提供快照之外的容器内容（峰值和 MIDI）
///
/// 两个查询都在布局时调用。返回 `None` 表示没有内容可画，不视为错误。
pub trait ContentResolver {
    fn peaks(&self, container: &Container) -> Option<Arc<[f32]>>;
    fn midi(&self, container: &Container) -> Option<MidiSequence>;
}

/// Resolver for hosts that have no content to show
pub struct NoContent;

impl ContentResolver for NoContent {
    fn peaks(&self, _container: &Container) -> Option<Arc<[f32]>> {
        None
    }

    fn midi(&self, _container: &Container) -> Option<MidiSequence> {
        None
    }
}

/// Resolver backed by two closures
pub struct ContentFns<P, M> {
    pub peaks: P,
    pub midi: M,
}

impl<P, M> ContentResolver for ContentFns<P, M>
where
    P: Fn(&Container) -> Option<Arc<[f32]>>,
    M: Fn(&Container) -> Option<MidiSequence>,
{
    fn peaks(&self, container: &Container) -> Option<Arc<[f32]>> {
        (self.peaks)(container)
    }

    fn midi(&self, container: &Container) -> Option<MidiSequence> {
        (self.midi)(container)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NoteGlyph {
    pub note_id: NoteId,
    pub rect: Rect,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BreakpointHandle {
    pub breakpoint_id: BreakpointId,
    pub pos: Pos2,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AutomationLaneLayout {
    pub lane_id: LaneId,
    pub lane_rect: Rect,
    pub handles: Vec<BreakpointHandle>,
}

#[derive(Clone, Debug)]
pub struct ContainerLayout {
    pub container_id: ContainerId,
    pub track_id: TrackId,
    pub rect: Rect,
    pub start_bar: f64,
    pub length_bars: f64,
    pub audio_duration_bars: Option<f64>,
    pub color: Color32,
    pub peaks: Option<Arc<[f32]>>,
    pub midi: Option<MidiSequence>,
    pub note_glyphs: Vec<NoteGlyph>,
    pub enter_fade: Option<Fade>,
    pub exit_fade: Option<Fade>,
    pub enter_fade_outline: Vec<Pos2>,
    pub exit_fade_outline: Vec<Pos2>,
    pub automation: Vec<AutomationLaneLayout>,
    pub is_selected: bool,
    pub is_clone: bool,
    pub content_revision: u64,
}

impl ContainerLayout {
    /// Length that actually carries audio: the audio duration when it is
    /// shorter than the nominal length
    pub fn audible_length_bars(&self) -> f64 {
        match self.audio_duration_bars {
            Some(duration) if duration > 0.0 && duration < self.length_bars => duration,
            _ => self.length_bars,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrackLayout {
    pub track_id: TrackId,
    pub kind: TrackKind,
    pub y: f32,
    pub height: f32,
    /// Height without the expanded automation lanes
    pub base_height: f32,
    pub containers: Vec<ContainerLayout>,
}

impl TrackLayout {
    pub fn contains_y(&self, y: f32) -> bool {
        y >= self.y && y < self.y + self.height
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SectionLayout {
    pub section_id: SectionId,
    pub rect: Rect,
    pub color: Color32,
    pub is_selected: bool,
}

#[derive(Clone, Debug)]
pub struct Scene {
    pub tracks: Vec<TrackLayout>,
    pub sections: Vec<SectionLayout>,
    pub scale: BarScale,
    pub total_bars: u32,
    pub time_signature: TimeSignature,
    pub grid_mode: GridMode,
    pub selection: Selection,
    pub track_area_top: f32,
    /// Bottom of the last track row
    pub content_height: f32,
}

impl Scene {
    /// A scene with no tracks, used before the first configure call
    pub fn empty(options: &CanvasOptions) -> Self {
        let top = options.track_area_top();
        Self {
            tracks: Vec::new(),
            sections: Vec::new(),
            scale: BarScale::new(120.0),
            total_bars: 0,
            time_signature: TimeSignature::default(),
            grid_mode: GridMode::Adaptive,
            selection: Selection::default(),
            track_area_top: top,
            content_height: top,
        }
    }

    pub fn content_width(&self) -> f32 {
        self.scale.bars_to_width(self.total_bars as f64)
    }

    pub fn track_at_y(&self, y: f32) -> Option<&TrackLayout> {
        self.tracks.iter().find(|track| track.contains_y(y))
    }

    pub fn track(&self, track_id: TrackId) -> Option<&TrackLayout> {
        self.tracks.iter().find(|track| track.track_id == track_id)
    }

    pub fn container(&self, container_id: ContainerId) -> Option<(&TrackLayout, &ContainerLayout)> {
        self.tracks.iter().find_map(|track| {
            track
                .containers
                .iter()
                .find(|c| c.container_id == container_id)
                .map(|c| (track, c))
        })
    }

    pub fn container_count(&self) -> usize {
        self.tracks.iter().map(|t| t.containers.len()).sum()
    }
}

pub struct LayoutBuilder {
    options: CanvasOptions,
}

impl LayoutBuilder {
    pub fn new(options: CanvasOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CanvasOptions {
        &self.options
    }

    /// 音轨行的实际高度，包含展开的自动化子轨
    pub fn track_height(&self, track: &TrackSnapshot) -> f32 {
        self.base_height(track)
            + track.expanded_lane_count() as f32 * self.options.automation_lane_height
    }

    fn base_height(&self, track: &TrackSnapshot) -> f32 {
        match track.height {
            Some(height) if height.is_finite() && height > 0.0 => height,
            _ => self.options.default_track_height,
        }
    }

    pub fn build(&self, snapshot: &Snapshot, resolver: &dyn ContentResolver) -> Scene {
        let started = Instant::now();
        let scale = BarScale::new(snapshot.pixels_per_bar);
        let track_area_top = self.options.track_area_top();

        let mut y = track_area_top;
        let mut tracks = Vec::with_capacity(snapshot.tracks.len());
        for track in &snapshot.tracks {
            let layout = self.layout_track(track, y, scale, snapshot, resolver);
            y += layout.height;
            tracks.push(layout);
        }

        let sections = snapshot
            .sections
            .iter()
            .map(|section| SectionLayout {
                section_id: section.id,
                rect: Rect::from_min_size(
                    Pos2::new(scale.bar_to_x(section.start_bar), self.options.ruler_height),
                    Vec2::new(
                        scale.bars_to_width(section.length_bars.max(0.0)),
                        self.options.section_lane_height,
                    ),
                ),
                color: section.color,
                is_selected: snapshot.selection.section_id == Some(section.id),
            })
            .collect();

        let scene = Scene {
            tracks,
            sections,
            scale,
            total_bars: snapshot.total_bars,
            time_signature: snapshot.time_signature,
            grid_mode: snapshot.grid_mode,
            selection: snapshot.selection.clone(),
            track_area_top,
            content_height: y,
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        if elapsed_ms > self.options.layout_budget_ms {
            log::warn!(
                "Layout of {} tracks / {} containers took {:.2}ms (budget {:.2}ms)",
                scene.tracks.len(),
                scene.container_count(),
                elapsed_ms,
                self.options.layout_budget_ms
            );
        }
        scene
    }

    fn layout_track(
        &self,
        track: &TrackSnapshot,
        y: f32,
        scale: BarScale,
        snapshot: &Snapshot,
        resolver: &dyn ContentResolver,
    ) -> TrackLayout {
        let base_height = self.base_height(track);
        let height = self.track_height(track);
        let containers = track
            .containers
            .iter()
            .map(|container| self.layout_container(track, container, y, base_height, scale, snapshot, resolver))
            .collect();

        TrackLayout {
            track_id: track.id,
            kind: track.kind,
            y,
            height,
            base_height,
            containers,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn layout_container(
        &self,
        track: &TrackSnapshot,
        container: &Container,
        track_y: f32,
        base_height: f32,
        scale: BarScale,
        snapshot: &Snapshot,
        resolver: &dyn ContentResolver,
    ) -> ContainerLayout {
        let length_bars = container.length_bars.max(0.0);
        let mut layout = ContainerLayout {
            container_id: container.id,
            track_id: track.id,
            rect: Rect::NOTHING,
            start_bar: container.start_bar,
            length_bars,
            audio_duration_bars: container.audio_duration_bars,
            color: container.color,
            peaks: None,
            midi: None,
            note_glyphs: Vec::new(),
            enter_fade: sanitize_fade(container.enter_fade, length_bars),
            exit_fade: sanitize_fade(container.exit_fade, length_bars),
            enter_fade_outline: Vec::new(),
            exit_fade_outline: Vec::new(),
            automation: Vec::new(),
            is_selected: snapshot.selection.container_ids.contains(&container.id),
            is_clone: container.is_clone(),
            content_revision: container.content_revision,
        };

        let inset = self.options.container_inset;
        layout.rect = Rect::from_min_size(
            Pos2::new(scale.bar_to_x(container.start_bar), track_y + inset),
            Vec2::new(
                scale.bars_to_width(layout.audible_length_bars()),
                (base_height - 2.0 * inset).max(1.0),
            ),
        );

        match track.kind {
            TrackKind::Audio => {
                layout.peaks = resolver.peaks(container).filter(|peaks| !peaks.is_empty());
            }
            TrackKind::Midi => {
                if let Some(sequence) = resolver.midi(container) {
                    layout.note_glyphs = note_glyphs(layout.rect, &sequence, scale);
                    layout.midi = Some(sequence);
                }
            }
        }

        if let Some(fade) = layout.enter_fade {
            layout.enter_fade_outline = fade_outline(layout.rect, fade, scale, FadeSide::Enter);
        }
        if let Some(fade) = layout.exit_fade {
            layout.exit_fade_outline = fade_outline(layout.rect, fade, scale, FadeSide::Exit);
        }

        if track.automation_expanded {
            layout.automation = self.automation_layout(track, container, track_y + base_height, scale);
        }

        layout
    }

    fn automation_layout(
        &self,
        track: &TrackSnapshot,
        container: &Container,
        lanes_top: f32,
        scale: BarScale,
    ) -> Vec<AutomationLaneLayout> {
        let lane_height = self.options.automation_lane_height;
        let left = scale.bar_to_x(container.start_bar);
        let width = scale.bars_to_width(container.length_bars.max(0.0));

        container
            .automation
            .iter()
            .filter_map(|lane| {
                let index = track.automation_lanes.iter().position(|id| *id == lane.lane_id)?;
                let top = lanes_top + index as f32 * lane_height;
                let handles = lane
                    .breakpoints
                    .iter()
                    .map(|bp| BreakpointHandle {
                        breakpoint_id: bp.id,
                        pos: Pos2::new(
                            left + scale.bars_to_width(bp.offset_bars),
                            top + (1.0 - bp.value.clamp(0.0, 1.0)) * lane_height,
                        ),
                    })
                    .collect();
                Some(AutomationLaneLayout {
                    lane_id: lane.lane_id,
                    lane_rect: Rect::from_min_size(Pos2::new(left, top), Vec2::new(width, lane_height)),
                    handles,
                })
            })
            .collect()
    }
}

fn sanitize_fade(fade: Option<Fade>, length_bars: f64) -> Option<Fade> {
    fade.filter(|f| f.duration_bars.is_finite() && f.duration_bars > 0.0)
        .map(|f| Fade {
            duration_bars: f.duration_bars.min(length_bars),
            curve: f.curve,
        })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeSide {
    Enter,
    Exit,
}

/// Polyline tracing the gain ramp of a fade across the container rectangle
pub fn fade_outline(rect: Rect, fade: Fade, scale: BarScale, side: FadeSide) -> Vec<Pos2> {
    let fade_width = scale.bars_to_width(fade.duration_bars).clamp(0.0, rect.width());
    let start_x = match side {
        FadeSide::Enter => rect.left(),
        FadeSide::Exit => rect.right() - fade_width,
    };
    (0..=FADE_SEGMENTS)
        .map(|i| {
            let t = i as f32 / FADE_SEGMENTS as f32;
            let gain = match side {
                FadeSide::Enter => fade.curve.gain(t),
                FadeSide::Exit => fade.curve.gain(1.0 - t),
            };
            Pos2::new(start_x + t * fade_width, rect.bottom() - gain * rect.height())
        })
        .collect()
}

/// Note rectangles inside a container, spread over the sequence's pitch range
pub fn note_glyphs(rect: Rect, sequence: &MidiSequence, scale: BarScale) -> Vec<NoteGlyph> {
    let Some((low, high)) = sequence.pitch_range() else {
        return Vec::new();
    };
    let used_rows = high - low + 1;
    let rows = used_rows.max(MIN_PITCH_ROWS);
    let lowest = low.saturating_sub((rows - used_rows) / 2);
    let row_height = rect.height() / rows as f32;

    sequence
        .notes
        .iter()
        .filter_map(|note| {
            let row = note.pitch.saturating_sub(lowest) as f32;
            let glyph = Rect::from_min_size(
                Pos2::new(
                    rect.left() + scale.bars_to_width(note.offset_bars),
                    rect.bottom() - (row + 1.0) * row_height,
                ),
                Vec2::new(scale.bars_to_width(note.length_bars).max(1.0), row_height),
            )
            .intersect(rect);
            glyph.is_positive().then_some(NoteGlyph {
                note_id: note.id,
                rect: glyph,
            })
        })
        .collect()
}
