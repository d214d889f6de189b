//! 交互控制器模块
//!
//! 把指针事件转换为编辑命令。按下时根据 [`PickResult`] 确定手势，拖动时更新
//! 临时状态，释放时通过 [`CommandSink`] 提交。状态只有空闲和拖动两种。

use crate::command::CommandSink;
use crate::geometry::SnapSettings;
use crate::layout::{ContainerLayout, Scene};
use crate::picking::{ContainerZone, PickResult};
use crate::structure::{BarRange, ContainerId, Fade, FadeCurve, TrackId};
use egui::{Modifiers, Pos2, Rect};

/// What the controller reads on every event
#[derive(Clone, Copy)]
pub struct InteractionContext<'a> {
    pub scene: &'a Scene,
    pub snap: SnapSettings,
}

/// Ghost geometry of the drag in progress, for renderers
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragPreview {
    Container {
        container_id: ContainerId,
        track_id: TrackId,
        rect: Rect,
        is_clone: bool,
    },
    Range(BarRange),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EdgeKind {
    Resize,
    Trim,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

#[derive(Clone, Debug)]
enum Gesture {
    /// `committed` is the last value sent to the sink
    Scrub {
        bar: f64,
        committed: f64,
    },
    RangeSelect {
        anchor_bar: f64,
        current_bar: f64,
    },
    MoveContainer {
        container_id: ContainerId,
        source_track: TrackId,
        target_track: TrackId,
        original_start: f64,
        start_bar: f64,
        is_clone: bool,
        /// Container rect top relative to its track row
        offset_y: f32,
        rect: Rect,
    },
    Fade {
        container_id: ContainerId,
        side: Side,
        initial_duration: f64,
        curve: FadeCurve,
        length_bars: f64,
        duration: f64,
        committed: f64,
    },
    Edge {
        container_id: ContainerId,
        track_id: TrackId,
        kind: EdgeKind,
        side: Side,
        original_start: f64,
        original_length: f64,
        start_bar: f64,
        length_bars: f64,
        rect: Rect,
    },
}

#[derive(Clone, Debug)]
enum InteractionState {
    Idle,
    Dragging { press_pos: Pos2, gesture: Gesture },
}

pub struct InteractionController {
    state: InteractionState,
    min_container_length_bars: f64,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(0.25)
    }
}

impl InteractionController {
    pub fn new(min_container_length_bars: f64) -> Self {
        Self {
            state: InteractionState::Idle,
            min_container_length_bars: min_container_length_bars.max(f64::EPSILON),
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, InteractionState::Dragging { .. })
    }

    /// Drops any gesture in progress without committing it
    pub fn reset(&mut self) {
        if self.is_dragging() {
            log::debug!("Dropping active drag");
        }
        self.state = InteractionState::Idle;
    }

    pub fn pointer_down(
        &mut self,
        pos: Pos2,
        pick: PickResult,
        modifiers: Modifiers,
        click_count: u32,
        ctx: InteractionContext<'_>,
        sink: &mut dyn CommandSink,
    ) {
        self.reset();
        let snap = ctx.snap;

        match pick {
            PickResult::Ruler => {
                let bar = snap.bar_at_x(pos.x);
                if modifiers.shift {
                    log::debug!("Range select from bar {}", bar);
                    self.start(
                        pos,
                        Gesture::RangeSelect {
                            anchor_bar: bar,
                            current_bar: bar,
                        },
                    );
                } else {
                    log::debug!("Scrub from bar {}", bar);
                    sink.set_playhead(bar);
                    self.start(pos, Gesture::Scrub { bar, committed: bar });
                }
            }
            PickResult::Container {
                container_id,
                track_id,
                zone,
            } => {
                let Some((track, container)) = ctx.scene.container(container_id) else {
                    log::debug!("Pick refers to unknown container {:?}", container_id);
                    return;
                };
                if click_count >= 2 {
                    sink.open_container_editor(container_id, track_id);
                    return;
                }
                sink.select_container(container_id, track_id, modifiers);

                let gesture = match zone {
                    ContainerZone::Move => Gesture::MoveContainer {
                        container_id,
                        source_track: track_id,
                        target_track: track_id,
                        original_start: container.start_bar,
                        start_bar: container.start_bar,
                        is_clone: modifiers.alt,
                        offset_y: container.rect.top() - track.y,
                        rect: container.rect,
                    },
                    ContainerZone::FadeLeft | ContainerZone::FadeRight => {
                        let (side, fade) = if zone == ContainerZone::FadeLeft {
                            (Side::Left, container.enter_fade)
                        } else {
                            (Side::Right, container.exit_fade)
                        };
                        let initial_duration = fade.map(|f| f.duration_bars).unwrap_or(0.0);
                        Gesture::Fade {
                            container_id,
                            side,
                            initial_duration,
                            curve: fade.map(|f| f.curve).unwrap_or_default(),
                            length_bars: container.length_bars,
                            duration: initial_duration,
                            committed: initial_duration,
                        }
                    }
                    ContainerZone::ResizeLeft
                    | ContainerZone::ResizeRight
                    | ContainerZone::TrimLeft
                    | ContainerZone::TrimRight => edge_gesture(container, track_id, zone),
                };
                log::debug!("Container {:?} press in {:?} zone", container_id, zone);
                self.start(pos, gesture);
            }
            PickResult::MidiNote {
                container_id,
                track_id,
                note_id,
            } => {
                if ctx.scene.container(container_id).is_none() {
                    log::debug!("Pick refers to unknown container {:?}", container_id);
                } else if click_count >= 2 {
                    sink.open_container_editor(container_id, track_id);
                } else if modifiers.alt {
                    sink.remove_midi_note(container_id, note_id);
                } else {
                    sink.select_container(container_id, track_id, modifiers);
                }
            }
            PickResult::AutomationBreakpoint {
                container_id,
                track_id,
                lane_id,
                breakpoint_id,
            } => {
                if modifiers.alt {
                    sink.remove_automation_breakpoint(container_id, lane_id, breakpoint_id);
                } else {
                    sink.select_container(container_id, track_id, modifiers);
                }
            }
            PickResult::TrackBackground { .. } => {
                sink.set_playhead(snap.bar_at_x(pos.x));
            }
            PickResult::EmptyArea => {}
        }
    }

    pub fn pointer_drag(&mut self, pos: Pos2, ctx: InteractionContext<'_>, sink: &mut dyn CommandSink) {
        self.track_pointer(pos, ctx);
        if let InteractionState::Dragging { gesture, .. } = &mut self.state {
            commit_live(gesture, sink);
        }
    }

    pub fn pointer_up(&mut self, pos: Pos2, ctx: InteractionContext<'_>, sink: &mut dyn CommandSink) {
        self.track_pointer(pos, ctx);
        let state = std::mem::replace(&mut self.state, InteractionState::Idle);
        let InteractionState::Dragging { mut gesture, .. } = state else {
            return;
        };
        // The release can land where no drag event reached
        commit_live(&mut gesture, sink);

        match gesture {
            Gesture::RangeSelect {
                anchor_bar,
                current_bar,
            } => sink.select_range(BarRange::normalized(anchor_bar, current_bar)),
            Gesture::MoveContainer {
                container_id,
                source_track,
                target_track,
                original_start,
                start_bar,
                is_clone,
                ..
            } => {
                let moved = start_bar != original_start || target_track != source_track;
                if !moved {
                    return;
                }
                if is_clone {
                    let new_id = ContainerId::next();
                    log::debug!("Cloning {:?} as {:?} at bar {}", container_id, new_id, start_bar);
                    sink.clone_container(container_id, new_id, target_track, start_bar);
                } else {
                    sink.move_container(container_id, target_track, start_bar);
                }
            }
            Gesture::Edge {
                container_id,
                track_id,
                kind,
                original_start,
                original_length,
                start_bar,
                length_bars,
                ..
            } => {
                if start_bar == original_start && length_bars == original_length {
                    return;
                }
                match kind {
                    EdgeKind::Resize => sink.resize_container(container_id, track_id, start_bar, length_bars),
                    EdgeKind::Trim => sink.trim_container(container_id, track_id, start_bar, length_bars),
                }
            }
            Gesture::Scrub { .. } | Gesture::Fade { .. } => {}
        }
    }

    pub fn drag_preview(&self) -> Option<DragPreview> {
        let InteractionState::Dragging { gesture, .. } = &self.state else {
            return None;
        };
        match *gesture {
            Gesture::RangeSelect {
                anchor_bar,
                current_bar,
            } => Some(DragPreview::Range(BarRange::normalized(anchor_bar, current_bar))),
            Gesture::MoveContainer {
                container_id,
                target_track,
                is_clone,
                rect,
                ..
            } => Some(DragPreview::Container {
                container_id,
                track_id: target_track,
                rect,
                is_clone,
            }),
            Gesture::Edge {
                container_id,
                track_id,
                rect,
                ..
            } => Some(DragPreview::Container {
                container_id,
                track_id,
                rect,
                is_clone: false,
            }),
            Gesture::Scrub { .. } | Gesture::Fade { .. } => None,
        }
    }

    fn start(&mut self, press_pos: Pos2, gesture: Gesture) {
        self.state = InteractionState::Dragging { press_pos, gesture };
    }

    fn track_pointer(&mut self, pos: Pos2, ctx: InteractionContext<'_>) {
        let min_length = self.min_container_length_bars;
        let InteractionState::Dragging { press_pos, gesture } = &mut self.state else {
            return;
        };
        let snap = ctx.snap;
        let delta_bars = snap.scale.width_to_bars(pos.x - press_pos.x);

        match gesture {
            Gesture::Scrub { bar, .. } => {
                *bar = snap.bar_at_x(pos.x);
            }
            Gesture::RangeSelect { current_bar, .. } => {
                *current_bar = snap.bar_at_x(pos.x);
            }
            Gesture::MoveContainer {
                target_track,
                original_start,
                start_bar,
                offset_y,
                rect,
                ..
            } => {
                *start_bar = snap.snap_bar(*original_start + delta_bars);
                let mut top = rect.top();
                if let Some(track) = ctx.scene.track_at_y(pos.y) {
                    *target_track = track.track_id;
                    top = track.y + *offset_y;
                }
                *rect = Rect::from_min_size(Pos2::new(snap.scale.bar_to_x(*start_bar), top), rect.size());
            }
            Gesture::Fade {
                side,
                initial_duration,
                length_bars,
                duration,
                ..
            } => {
                let delta = match side {
                    Side::Left => delta_bars,
                    Side::Right => -delta_bars,
                };
                *duration = (*initial_duration + delta).clamp(0.0, length_bars.max(0.0));
            }
            Gesture::Edge {
                side,
                original_start,
                original_length,
                start_bar,
                length_bars,
                rect,
                ..
            } => {
                let end = *original_start + *original_length;
                match side {
                    Side::Left => {
                        let lowest_end = (end - min_length).max(1.0);
                        let start = snap.snap_bar(*original_start + delta_bars).clamp(1.0, lowest_end);
                        *start_bar = start;
                        *length_bars = end - start;
                    }
                    Side::Right => {
                        let new_end = snap.snap_bar(end + delta_bars).max(*original_start + min_length);
                        *start_bar = *original_start;
                        *length_bars = new_end - *original_start;
                    }
                }
                rect.min.x = snap.scale.bar_to_x(*start_bar);
                rect.max.x = rect.min.x + snap.scale.bars_to_width(*length_bars);
            }
        }
    }
}

/// Sends the live value of a scrub or fade when it moved since the last send
fn commit_live(gesture: &mut Gesture, sink: &mut dyn CommandSink) {
    match gesture {
        Gesture::Scrub { bar, committed } => {
            if *bar != *committed {
                sink.set_playhead(*bar);
                *committed = *bar;
            }
        }
        Gesture::Fade {
            container_id,
            side,
            curve,
            duration,
            committed,
            ..
        } => {
            if *duration != *committed {
                let fade = (*duration > 0.0).then(|| Fade::new(*duration, *curve));
                match side {
                    Side::Left => sink.set_container_enter_fade(*container_id, fade),
                    Side::Right => sink.set_container_exit_fade(*container_id, fade),
                }
                *committed = *duration;
            }
        }
        _ => {}
    }
}

fn edge_gesture(container: &ContainerLayout, track_id: TrackId, zone: ContainerZone) -> Gesture {
    let kind = match zone {
        ContainerZone::TrimLeft | ContainerZone::TrimRight => EdgeKind::Trim,
        _ => EdgeKind::Resize,
    };
    let side = if zone.is_left_edge() { Side::Left } else { Side::Right };
    Gesture::Edge {
        container_id: container.container_id,
        track_id,
        kind,
        side,
        original_start: container.start_bar,
        original_length: container.length_bars,
        start_bar: container.start_bar,
        length_bars: container.length_bars,
        rect: container.rect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandLog, EditCommand};
    use crate::geometry::BarScale;
    use crate::layout::{LayoutBuilder, NoContent};
    use crate::options::CanvasOptions;
    use crate::structure::{
        BreakpointId, Container, GridMode, LaneId, NoteId, Snapshot, TimeSignature, TrackKind, TrackSnapshot,
    };

    struct Fixture {
        scene: Scene,
        container_id: ContainerId,
        track_id: TrackId,
        second_track: TrackId,
    }

    impl Fixture {
        fn new(container: Container) -> Self {
            let container_id = container.id;
            let mut track = TrackSnapshot::new("A", TrackKind::Audio);
            track.containers.push(container);
            let second = TrackSnapshot::new("B", TrackKind::Audio);
            let track_id = track.id;
            let second_track = second.id;
            let snapshot = Snapshot {
                tracks: vec![track, second],
                pixels_per_bar: 120.0,
                ..Snapshot::default()
            };
            let scene = LayoutBuilder::new(CanvasOptions::default()).build(&snapshot, &NoContent);
            Self {
                scene,
                container_id,
                track_id,
                second_track,
            }
        }

        fn ctx(&self) -> InteractionContext<'_> {
            InteractionContext {
                scene: &self.scene,
                snap: SnapSettings {
                    scale: BarScale::new(120.0),
                    time_signature: TimeSignature::default(),
                    grid_mode: GridMode::Adaptive,
                    enabled: true,
                    adaptive_beat_threshold: 40.0,
                },
            }
        }

        fn row_y(&self, index: usize) -> f32 {
            self.scene.tracks[index].y + 40.0
        }

        fn container_pick(&self, zone: ContainerZone) -> PickResult {
            PickResult::Container {
                container_id: self.container_id,
                track_id: self.track_id,
                zone,
            }
        }
    }

    fn alt() -> Modifiers {
        Modifiers {
            alt: true,
            ..Modifiers::NONE
        }
    }

    fn shift() -> Modifiers {
        Modifiers {
            shift: true,
            ..Modifiers::NONE
        }
    }

    #[test]
    fn move_drag_commits_snapped_start() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.row_y(0);

        controller.pointer_down(
            Pos2::new(240.0, y),
            fx.container_pick(ContainerZone::Move),
            Modifiers::NONE,
            1,
            fx.ctx(),
            &mut log,
        );
        controller.pointer_drag(Pos2::new(300.0, y), fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(360.0, y), fx.ctx(), &mut log);

        let commands = log.take_commands();
        assert!(matches!(commands[0], EditCommand::SelectContainer { .. }));
        assert_eq!(
            commands.last(),
            Some(&EditCommand::MoveContainer {
                container_id: fx.container_id,
                track_id: fx.track_id,
                new_start_bar: 2.0,
            })
        );
        assert!(!controller.is_dragging());
    }

    #[test]
    fn move_follows_pointer_to_another_track() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();

        controller.pointer_down(
            Pos2::new(100.0, fx.row_y(0)),
            fx.container_pick(ContainerZone::Move),
            Modifiers::NONE,
            1,
            fx.ctx(),
            &mut log,
        );
        controller.pointer_drag(Pos2::new(100.0, fx.row_y(1)), fx.ctx(), &mut log);
        match controller.drag_preview() {
            Some(DragPreview::Container { track_id, rect, .. }) => {
                assert_eq!(track_id, fx.second_track);
                assert!(rect.top() > fx.scene.tracks[1].y);
            }
            other => panic!("unexpected preview {:?}", other),
        }
        controller.pointer_up(Pos2::new(100.0, fx.row_y(1)), fx.ctx(), &mut log);

        assert_eq!(
            log.last(),
            Some(&EditCommand::MoveContainer {
                container_id: fx.container_id,
                track_id: fx.second_track,
                new_start_bar: 1.0,
            })
        );
    }

    #[test]
    fn click_without_movement_only_selects() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let pos = Pos2::new(200.0, fx.row_y(0));

        controller.pointer_down(pos, fx.container_pick(ContainerZone::Move), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_up(pos, fx.ctx(), &mut log);
        assert_eq!(log.commands().len(), 1);
        assert!(matches!(log.commands()[0], EditCommand::SelectContainer { .. }));
    }

    #[test]
    fn alt_drag_clones_and_leaves_source() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.row_y(0);

        controller.pointer_down(Pos2::new(100.0, y), fx.container_pick(ContainerZone::Move), alt(), 1, fx.ctx(), &mut log);
        assert!(matches!(
            controller.drag_preview(),
            Some(DragPreview::Container { is_clone: true, .. })
        ));
        controller.pointer_up(Pos2::new(580.0, y), fx.ctx(), &mut log);

        let commands = log.take_commands();
        assert!(!commands.iter().any(|c| matches!(c, EditCommand::MoveContainer { .. })));
        match commands.last() {
            Some(EditCommand::CloneContainer {
                source_id,
                new_id,
                new_start_bar,
                ..
            }) => {
                assert_eq!(*source_id, fx.container_id);
                assert_ne!(*new_id, fx.container_id);
                assert_eq!(*new_start_bar, 5.0);
            }
            other => panic!("expected a clone, got {:?}", other),
        }
    }

    #[test]
    fn shift_drag_on_ruler_selects_ascending_range() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();

        controller.pointer_down(Pos2::new(240.0, 5.0), PickResult::Ruler, shift(), 1, fx.ctx(), &mut log);
        controller.pointer_drag(Pos2::new(100.0, 5.0), fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(0.0, 5.0), fx.ctx(), &mut log);

        assert_eq!(
            log.take_commands(),
            vec![EditCommand::SelectRange {
                range: BarRange { start: 1.0, end: 3.0 }
            }]
        );
    }

    #[test]
    fn ruler_scrub_sets_playhead_on_press_and_drag() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();

        controller.pointer_down(Pos2::new(240.0, 5.0), PickResult::Ruler, Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_drag(Pos2::new(600.0, 5.0), fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(600.0, 5.0), fx.ctx(), &mut log);

        assert_eq!(
            log.take_commands(),
            vec![
                EditCommand::SetPlayhead { bar: 3.0 },
                EditCommand::SetPlayhead { bar: 6.0 }
            ]
        );
    }

    #[test]
    fn left_fade_grows_dragging_right_and_clears_at_zero() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.scene.tracks[0].y + 5.0;

        controller.pointer_down(Pos2::new(2.0, y), fx.container_pick(ContainerZone::FadeLeft), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_drag(Pos2::new(62.0, y), fx.ctx(), &mut log);
        assert_eq!(
            log.last(),
            Some(&EditCommand::SetContainerEnterFade {
                container_id: fx.container_id,
                fade: Some(Fade::new(0.5, FadeCurve::Linear)),
            })
        );

        controller.pointer_drag(Pos2::new(-200.0, y), fx.ctx(), &mut log);
        assert_eq!(
            log.last(),
            Some(&EditCommand::SetContainerEnterFade {
                container_id: fx.container_id,
                fade: None,
            })
        );
    }

    #[test]
    fn right_fade_grows_dragging_left_and_keeps_curve() {
        let mut container = Container::new("Loop", 1.0, 4.0);
        container.exit_fade = Some(Fade::new(1.0, FadeCurve::SCurve));
        let fx = Fixture::new(container);
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.scene.tracks[0].y + 5.0;

        controller.pointer_down(Pos2::new(478.0, y), fx.container_pick(ContainerZone::FadeRight), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_drag(Pos2::new(358.0, y), fx.ctx(), &mut log);
        assert_eq!(
            log.last(),
            Some(&EditCommand::SetContainerExitFade {
                container_id: fx.container_id,
                fade: Some(Fade::new(2.0, FadeCurve::SCurve)),
            })
        );

        // Never longer than the container
        controller.pointer_drag(Pos2::new(-2000.0, y), fx.ctx(), &mut log);
        assert_eq!(
            log.last(),
            Some(&EditCommand::SetContainerExitFade {
                container_id: fx.container_id,
                fade: Some(Fade::new(4.0, FadeCurve::SCurve)),
            })
        );
    }

    #[test]
    fn resize_right_edge_keeps_start() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.row_y(0);

        controller.pointer_down(Pos2::new(478.0, y), fx.container_pick(ContainerZone::ResizeRight), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(598.0, y), fx.ctx(), &mut log);

        assert_eq!(
            log.last(),
            Some(&EditCommand::ResizeContainer {
                container_id: fx.container_id,
                track_id: fx.track_id,
                start_bar: 1.0,
                length_bars: 5.0,
            })
        );
    }

    #[test]
    fn trim_left_edge_respects_minimum_length() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.scene.tracks[0].y + 70.0;

        controller.pointer_down(Pos2::new(2.0, y), fx.container_pick(ContainerZone::TrimLeft), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_drag(Pos2::new(2000.0, y), fx.ctx(), &mut log);
        assert!(matches!(controller.drag_preview(), Some(DragPreview::Container { .. })));
        controller.pointer_up(Pos2::new(2000.0, y), fx.ctx(), &mut log);

        assert_eq!(
            log.last(),
            Some(&EditCommand::TrimContainer {
                container_id: fx.container_id,
                track_id: fx.track_id,
                start_bar: 4.75,
                length_bars: 0.25,
            })
        );
    }

    #[test]
    fn trim_left_edge_never_before_bar_one() {
        let fx = Fixture::new(Container::new("Loop", 2.0, 2.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.scene.tracks[0].y + 70.0;

        controller.pointer_down(Pos2::new(122.0, y), fx.container_pick(ContainerZone::TrimLeft), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(-500.0, y), fx.ctx(), &mut log);

        assert_eq!(
            log.last(),
            Some(&EditCommand::TrimContainer {
                container_id: fx.container_id,
                track_id: fx.track_id,
                start_bar: 1.0,
                length_bars: 3.0,
            })
        );
    }

    #[test]
    fn double_click_opens_editor_without_dragging() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();

        controller.pointer_down(Pos2::new(200.0, fx.row_y(0)), fx.container_pick(ContainerZone::Move), Modifiers::NONE, 2, fx.ctx(), &mut log);
        assert!(!controller.is_dragging());
        assert_eq!(
            log.take_commands(),
            vec![EditCommand::OpenContainerEditor {
                container_id: fx.container_id,
                track_id: fx.track_id,
            }]
        );
    }

    #[test]
    fn alt_click_removes_notes_plain_click_selects() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let note = PickResult::MidiNote {
            container_id: fx.container_id,
            track_id: fx.track_id,
            note_id: NoteId(4),
        };
        let pos = Pos2::new(10.0, fx.row_y(0));

        controller.pointer_down(pos, note, alt(), 1, fx.ctx(), &mut log);
        controller.pointer_down(pos, note, Modifiers::NONE, 1, fx.ctx(), &mut log);
        let commands = log.take_commands();
        assert_eq!(
            commands[0],
            EditCommand::RemoveMidiNote {
                container_id: fx.container_id,
                note_id: NoteId(4),
            }
        );
        assert!(matches!(commands[1], EditCommand::SelectContainer { .. }));
    }

    #[test]
    fn track_background_click_moves_playhead_and_empty_area_does_nothing() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();

        controller.pointer_down(
            Pos2::new(970.0, fx.row_y(1)),
            PickResult::TrackBackground {
                track_id: fx.second_track,
            },
            Modifiers::NONE,
            1,
            fx.ctx(),
            &mut log,
        );
        controller.pointer_down(Pos2::new(10.0, 900.0), PickResult::EmptyArea, Modifiers::NONE, 1, fx.ctx(), &mut log);
        assert_eq!(log.take_commands(), vec![EditCommand::SetPlayhead { bar: 9.0 }]);
    }

    #[test]
    fn reset_drops_the_drag_without_committing() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.row_y(0);

        controller.pointer_down(Pos2::new(200.0, y), fx.container_pick(ContainerZone::Move), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_drag(Pos2::new(800.0, y), fx.ctx(), &mut log);
        controller.reset();
        controller.pointer_up(Pos2::new(800.0, y), fx.ctx(), &mut log);

        assert!(controller.drag_preview().is_none());
        assert!(!log.commands().iter().any(|c| matches!(c, EditCommand::MoveContainer { .. })));
    }

    #[test]
    fn release_commits_fade_past_the_last_drag() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.scene.tracks[0].y + 5.0;

        controller.pointer_down(Pos2::new(2.0, y), fx.container_pick(ContainerZone::FadeLeft), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_drag(Pos2::new(62.0, y), fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(242.0, y), fx.ctx(), &mut log);

        assert_eq!(
            log.last(),
            Some(&EditCommand::SetContainerEnterFade {
                container_id: fx.container_id,
                fade: Some(Fade::new(2.0, FadeCurve::Linear)),
            })
        );
    }

    #[test]
    fn release_commits_scrub_without_any_drag() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();

        controller.pointer_down(Pos2::new(0.0, 5.0), PickResult::Ruler, Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(600.0, 5.0), fx.ctx(), &mut log);

        assert_eq!(
            log.take_commands(),
            vec![
                EditCommand::SetPlayhead { bar: 1.0 },
                EditCommand::SetPlayhead { bar: 6.0 }
            ]
        );
    }

    #[test]
    fn resize_left_edge_keeps_end() {
        let fx = Fixture::new(Container::new("Loop", 2.0, 2.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.row_y(0);

        controller.pointer_down(Pos2::new(122.0, y), fx.container_pick(ContainerZone::ResizeLeft), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(2.0, y), fx.ctx(), &mut log);

        assert_eq!(
            log.last(),
            Some(&EditCommand::ResizeContainer {
                container_id: fx.container_id,
                track_id: fx.track_id,
                start_bar: 1.0,
                length_bars: 3.0,
            })
        );
    }

    #[test]
    fn trim_right_edge_keeps_start() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let y = fx.scene.tracks[0].y + 70.0;

        controller.pointer_down(Pos2::new(478.0, y), fx.container_pick(ContainerZone::TrimRight), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_up(Pos2::new(358.0, y), fx.ctx(), &mut log);

        assert_eq!(
            log.last(),
            Some(&EditCommand::TrimContainer {
                container_id: fx.container_id,
                track_id: fx.track_id,
                start_bar: 1.0,
                length_bars: 3.0,
            })
        );
    }

    #[test]
    fn alt_click_removes_breakpoints_plain_click_selects() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let breakpoint = PickResult::AutomationBreakpoint {
            container_id: fx.container_id,
            track_id: fx.track_id,
            lane_id: LaneId(3),
            breakpoint_id: BreakpointId(9),
        };
        let pos = Pos2::new(10.0, fx.row_y(0));

        controller.pointer_down(pos, breakpoint, alt(), 1, fx.ctx(), &mut log);
        assert!(!controller.is_dragging());
        controller.pointer_down(pos, breakpoint, Modifiers::NONE, 1, fx.ctx(), &mut log);

        let commands = log.take_commands();
        assert_eq!(
            commands[0],
            EditCommand::RemoveAutomationBreakpoint {
                container_id: fx.container_id,
                lane_id: LaneId(3),
                breakpoint_id: BreakpointId(9),
            }
        );
        assert!(matches!(commands[1], EditCommand::SelectContainer { .. }));
    }

    #[test]
    fn move_outside_all_rows_keeps_last_track() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();

        controller.pointer_down(Pos2::new(100.0, fx.row_y(0)), fx.container_pick(ContainerZone::Move), Modifiers::NONE, 1, fx.ctx(), &mut log);
        controller.pointer_drag(Pos2::new(340.0, fx.row_y(1)), fx.ctx(), &mut log);
        let Some(DragPreview::Container { rect: inside, .. }) = controller.drag_preview() else {
            panic!("expected a container preview");
        };

        controller.pointer_drag(Pos2::new(340.0, 10_000.0), fx.ctx(), &mut log);
        match controller.drag_preview() {
            Some(DragPreview::Container { track_id, rect, .. }) => {
                assert_eq!(track_id, fx.second_track);
                assert_eq!(rect, inside);
            }
            other => panic!("unexpected preview {:?}", other),
        }
        controller.pointer_up(Pos2::new(340.0, 10_000.0), fx.ctx(), &mut log);

        assert_eq!(
            log.last(),
            Some(&EditCommand::MoveContainer {
                container_id: fx.container_id,
                track_id: fx.second_track,
                new_start_bar: 3.0,
            })
        );
    }

    #[test]
    fn double_click_on_unknown_container_is_ignored() {
        let fx = Fixture::new(Container::new("Loop", 1.0, 4.0));
        let mut controller = InteractionController::default();
        let mut log = CommandLog::new();
        let stale = PickResult::Container {
            container_id: ContainerId(u64::MAX),
            track_id: fx.track_id,
            zone: ContainerZone::Move,
        };

        controller.pointer_down(Pos2::new(200.0, fx.row_y(0)), stale, Modifiers::NONE, 2, fx.ctx(), &mut log);
        assert!(log.is_empty());
        assert!(!controller.is_dragging());
    }
}
