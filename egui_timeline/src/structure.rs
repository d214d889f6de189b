//! 数据结构模块
//!
//! 定义了画布布局所用的只读项目状态，包括音轨、容器、段落、缩放、选择和网格设置。
//! 宿主构建 [`Snapshot`]，每次 configure 时交给画布。

use egui::Color32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

// Color32 serialization helper
#[derive(Serialize, Deserialize)]
struct Color32Helper {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl From<Color32> for Color32Helper {
    fn from(color: Color32) -> Self {
        Self {
            r: color.r(),
            g: color.g(),
            b: color.b(),
            a: color.a(),
        }
    }
}

impl From<Color32Helper> for Color32 {
    fn from(helper: Color32Helper) -> Self {
        Color32::from_rgba_unmultiplied(helper.r, helper.g, helper.b, helper.a)
    }
}

fn serialize_color32<S>(color: &Color32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Color32Helper::from(*color).serialize(serializer)
}

fn deserialize_color32<'de, D>(deserializer: D) -> Result<Color32, D::Error>
where
    D: Deserializer<'de>,
{
    let helper = Color32Helper::deserialize(deserializer)?;
    Ok(Color32::from(helper))
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $counter:ident) => {
        static $counter: AtomicU64 = AtomicU64::new(1);

        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            pub fn next() -> Self {
                $name($counter.fetch_add(1, Ordering::Relaxed))
            }
        }
    };
}

id_type!(TrackId, TRACK_ID_COUNTER);
id_type!(
    /// Identity of a placed container. Clone drags mint new ids with [`ContainerId::next`].
    ContainerId,
    CONTAINER_ID_COUNTER
);
id_type!(SectionId, SECTION_ID_COUNTER);
id_type!(NoteId, NOTE_ID_COUNTER);
id_type!(LaneId, LANE_ID_COUNTER);
id_type!(BreakpointId, BREAKPOINT_ID_COUNTER);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Midi,
}

/// 淡入淡出曲线类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FadeCurve {
    #[default]
    Linear,
    EqualPower,
    Exponential,
    SCurve,
}

impl FadeCurve {
    /// Gain of a fade-in at normalized position `t` (0.0 to 1.0)
    pub fn gain(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            FadeCurve::EqualPower => (t * std::f32::consts::FRAC_PI_2).sin(),
            FadeCurve::Exponential => t * t,
            FadeCurve::SCurve => t * t * (3.0 - 2.0 * t),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fade {
    pub duration_bars: f64,
    pub curve: FadeCurve,
}

impl Fade {
    pub fn new(duration_bars: f64, curve: FadeCurve) -> Self {
        Self { duration_bars, curve }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub offset_bars: f64, // relative to the container start
    pub value: f32,       // 0.0 - 1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationLane {
    pub lane_id: LaneId,
    pub breakpoints: Vec<Breakpoint>,
}

/// 放置在音轨上的音频或 MIDI 内容区域
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub start_bar: f64,   // 1-based
    pub length_bars: f64,
    /// Real audio extent when it is shorter than the bar-rounded length
    pub audio_duration_bars: Option<f64>,
    pub enter_fade: Option<Fade>,
    pub exit_fade: Option<Fade>,
    pub clone_of: Option<ContainerId>,
    #[serde(serialize_with = "serialize_color32", deserialize_with = "deserialize_color32")]
    pub color: Color32,
    /// Bumped by the host whenever the underlying audio/MIDI content changes
    pub content_revision: u64,
    pub automation: Vec<AutomationLane>,
}

impl Container {
    pub fn new(name: impl Into<String>, start_bar: f64, length_bars: f64) -> Self {
        Self {
            id: ContainerId::next(),
            name: name.into(),
            start_bar,
            length_bars,
            audio_duration_bars: None,
            enter_fade: None,
            exit_fade: None,
            clone_of: None,
            color: Color32::from_rgb(150, 150, 250),
            content_revision: 0,
            automation: Vec::new(),
        }
    }

    pub fn end_bar(&self) -> f64 {
        self.start_bar + self.length_bars
    }

    pub fn is_clone(&self) -> bool {
        self.clone_of.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub kind: TrackKind,
    pub name: String,
    pub height: Option<f32>, // per-track override of the default height
    pub automation_lanes: Vec<LaneId>,
    pub automation_expanded: bool,
    pub containers: Vec<Container>,
}

impl TrackSnapshot {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: TrackId::next(),
            kind,
            name: name.into(),
            height: None,
            automation_lanes: Vec::new(),
            automation_expanded: false,
            containers: Vec::new(),
        }
    }

    pub fn expanded_lane_count(&self) -> usize {
        if self.automation_expanded {
            self.automation_lanes.len()
        } else {
            0
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub start_bar: f64,
    pub length_bars: f64,
    #[serde(serialize_with = "serialize_color32", deserialize_with = "deserialize_color32")]
    pub color: Color32,
}

impl Section {
    pub fn new(name: impl Into<String>, start_bar: f64, length_bars: f64) -> Self {
        Self {
            id: SectionId::next(),
            name: name.into(),
            start_bar,
            length_bars,
            color: Color32::from_rgb(90, 110, 160),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_bar: u8,
    pub beat_unit: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            beat_unit: 4,
        }
    }
}

impl TimeSignature {
    pub fn beats(self) -> f64 {
        self.beats_per_bar.max(1) as f64
    }

    /// Bar length expressed in whole notes (4/4 = 1.0, 6/8 = 0.75)
    pub fn whole_notes_per_bar(self) -> f64 {
        self.beats() / self.beat_unit.max(1) as f64
    }
}

/// Note value used by a fixed grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridResolution {
    Bar,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl GridResolution {
    /// Note value as a fraction of a whole note, `None` for whole bars
    pub fn whole_note_fraction(self) -> Option<f64> {
        match self {
            GridResolution::Bar => None,
            GridResolution::Half => Some(1.0 / 2.0),
            GridResolution::Quarter => Some(1.0 / 4.0),
            GridResolution::Eighth => Some(1.0 / 8.0),
            GridResolution::Sixteenth => Some(1.0 / 16.0),
            GridResolution::ThirtySecond => Some(1.0 / 32.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridMode {
    #[default]
    Adaptive,
    Fixed(GridResolution),
}

/// 闭区间、升序的小节范围
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarRange {
    pub start: f64,
    pub end: f64,
}

impl BarRange {
    /// Builds an ascending range regardless of the order of the two ends
    pub fn normalized(a: f64, b: f64) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn contains(&self, bar: f64) -> bool {
        (self.start..=self.end).contains(&bar)
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub container_ids: BTreeSet<ContainerId>,
    pub section_id: Option<SectionId>,
    pub bar_range: Option<BarRange>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tracks: Vec<TrackSnapshot>,
    pub sections: Vec<Section>,
    pub time_signature: TimeSignature,
    pub pixels_per_bar: f32,
    pub total_bars: u32,
    pub selection: Selection,
    pub grid_mode: GridMode,
    pub snap_enabled: bool,
    pub playhead_bar: f64,
    pub cursor_x: Option<f32>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            sections: Vec::new(),
            time_signature: TimeSignature::default(),
            pixels_per_bar: 120.0,
            total_bars: 64,
            selection: Selection::default(),
            grid_mode: GridMode::Adaptive,
            snap_enabled: true,
            playhead_bar: 1.0,
            cursor_x: None,
        }
    }
}

impl Snapshot {
    pub fn track(&self, track_id: TrackId) -> Option<&TrackSnapshot> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn container(&self, container_id: ContainerId) -> Option<(&TrackSnapshot, &Container)> {
        self.tracks.iter().find_map(|track| {
            track
                .containers
                .iter()
                .find(|c| c.id == container_id)
                .map(|c| (track, c))
        })
    }
}

/// A resolved MIDI note, positioned in bars relative to its container
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiNote {
    pub id: NoteId,
    pub offset_bars: f64,
    pub length_bars: f64,
    pub pitch: u8,    // MIDI note number (0-127)
    pub velocity: u8, // 0-127
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiSequence {
    pub notes: Vec<MidiNote>,
}

impl MidiSequence {
    /// Lowest and highest pitch, `None` when there are no notes
    pub fn pitch_range(&self) -> Option<(u8, u8)> {
        let low = self.notes.iter().map(|n| n.pitch).min()?;
        let high = self.notes.iter().map(|n| n.pitch).max()?;
        Some((low, high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_range_is_always_ascending() {
        let range = BarRange::normalized(3.0, 1.0);
        assert_eq!(range.start, 1.0);
        assert_eq!(range.end, 3.0);
        assert!(range.contains(2.0));
        assert_eq!(range.length(), 2.0);
    }

    #[test]
    fn time_signature_bar_length() {
        assert_eq!(TimeSignature::default().whole_notes_per_bar(), 1.0);
        let six_eight = TimeSignature { beats_per_bar: 6, beat_unit: 8 };
        assert_eq!(six_eight.whole_notes_per_bar(), 0.75);
    }

    #[test]
    fn fade_curves_span_zero_to_one() {
        for curve in [
            FadeCurve::Linear,
            FadeCurve::EqualPower,
            FadeCurve::Exponential,
            FadeCurve::SCurve,
        ] {
            assert!(curve.gain(0.0).abs() < 1e-6);
            assert!((curve.gain(1.0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn snapshot_survives_json() {
        let mut track = TrackSnapshot::new("Drums", TrackKind::Audio);
        track.containers.push(Container::new("Loop", 3.0, 4.0));
        let snapshot = Snapshot {
            tracks: vec![track],
            ..Snapshot::default()
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn container_lookup_returns_owning_track() {
        let mut track = TrackSnapshot::new("Keys", TrackKind::Midi);
        let container = Container::new("Chords", 1.0, 2.0);
        let id = container.id;
        track.containers.push(container);
        let snapshot = Snapshot {
            tracks: vec![track],
            ..Snapshot::default()
        };

        let (owner, found) = snapshot.container(id).unwrap();
        assert_eq!(found.id, id);
        assert_eq!(owner.name, "Keys");
        assert!(snapshot.container(ContainerId(u64::MAX)).is_none());
    }
}
