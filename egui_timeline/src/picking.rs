//! Picking engine
//!
//! Maps a canvas-space point to whatever is under it. Picking never fails:
//! every point resolves to some [`PickResult`], with [`PickResult::EmptyArea`]
//! as the fallback.

use crate::layout::{ContainerLayout, Scene, TrackLayout};
use crate::options::CanvasOptions;
use crate::structure::{BreakpointId, ContainerId, LaneId, NoteId, TrackId};
use egui::{Pos2, Rect};

/// Region of a container rectangle, decided by a 3-row grid with edge columns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerZone {
    Move,
    ResizeLeft,
    ResizeRight,
    FadeLeft,
    FadeRight,
    TrimLeft,
    TrimRight,
}

impl ContainerZone {
    pub fn is_fade(self) -> bool {
        matches!(self, ContainerZone::FadeLeft | ContainerZone::FadeRight)
    }

    /// True for the zones that move the container's left edge
    pub fn is_left_edge(self) -> bool {
        matches!(
            self,
            ContainerZone::ResizeLeft | ContainerZone::FadeLeft | ContainerZone::TrimLeft
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickResult {
    Ruler,
    TrackBackground {
        track_id: TrackId,
    },
    Container {
        container_id: ContainerId,
        track_id: TrackId,
        zone: ContainerZone,
    },
    MidiNote {
        container_id: ContainerId,
        track_id: TrackId,
        note_id: NoteId,
    },
    AutomationBreakpoint {
        container_id: ContainerId,
        track_id: TrackId,
        lane_id: LaneId,
        breakpoint_id: BreakpointId,
    },
    EmptyArea,
}

impl PickResult {
    /// Container the pick belongs to, for containers and their notes/breakpoints
    pub fn container(&self) -> Option<(ContainerId, TrackId)> {
        match *self {
            PickResult::Container {
                container_id, track_id, ..
            }
            | PickResult::MidiNote {
                container_id, track_id, ..
            }
            | PickResult::AutomationBreakpoint {
                container_id, track_id, ..
            } => Some((container_id, track_id)),
            _ => None,
        }
    }
}

/// Resolves `point` (canvas coordinates, scroll included) against the scene
///
/// The header (ruler and section lane) is pinned to the top of
/// `visible_rect`, so it shadows whatever track rows scroll underneath it.
pub fn pick(
    point: Pos2,
    scene: &Scene,
    visible_rect: Rect,
    canvas_width: f32,
    options: &CanvasOptions,
) -> PickResult {
    if !(point.x.is_finite() && point.y.is_finite()) {
        return PickResult::EmptyArea;
    }
    if point.x < 0.0 || point.x > canvas_width {
        return PickResult::EmptyArea;
    }
    if point.y < visible_rect.top() + scene.track_area_top {
        return PickResult::Ruler;
    }

    let Some(track) = scene.track_at_y(point.y) else {
        return PickResult::EmptyArea;
    };

    for container in track.containers.iter().rev() {
        if let Some(result) = pick_container(point, track, container, options) {
            return result;
        }
    }

    PickResult::TrackBackground {
        track_id: track.track_id,
    }
}

fn pick_container(
    point: Pos2,
    track: &TrackLayout,
    container: &ContainerLayout,
    options: &CanvasOptions,
) -> Option<PickResult> {
    // Breakpoint handles sit in the automation lanes below the container rect
    let radius_sq = options.breakpoint_hit_radius * options.breakpoint_hit_radius;
    for lane in &container.automation {
        if let Some(handle) = lane
            .handles
            .iter()
            .find(|handle| handle.pos.distance_sq(point) <= radius_sq)
        {
            return Some(PickResult::AutomationBreakpoint {
                container_id: container.container_id,
                track_id: track.track_id,
                lane_id: lane.lane_id,
                breakpoint_id: handle.breakpoint_id,
            });
        }
    }

    if !container.rect.contains(point) {
        return None;
    }

    if let Some(glyph) = container
        .note_glyphs
        .iter()
        .rev()
        .find(|glyph| glyph.rect.expand(options.note_hit_radius).contains(point))
    {
        return Some(PickResult::MidiNote {
            container_id: container.container_id,
            track_id: track.track_id,
            note_id: glyph.note_id,
        });
    }

    Some(PickResult::Container {
        container_id: container.container_id,
        track_id: track.track_id,
        zone: zone_at(container.rect, point, options.zone_margin),
    })
}

/// Zone of `point` inside `rect`; the edge margin shrinks to a third of
/// narrow containers so `Move` stays reachable
pub fn zone_at(rect: Rect, point: Pos2, margin: f32) -> ContainerZone {
    let margin = margin.min(rect.width() / 3.0);
    let local_x = point.x - rect.left();
    let local_y = point.y - rect.top();
    let row_height = rect.height() / 3.0;

    let left = local_x < margin;
    let right = local_x > rect.width() - margin;
    if !left && !right {
        return ContainerZone::Move;
    }

    if local_y < row_height {
        if left {
            ContainerZone::FadeLeft
        } else {
            ContainerZone::FadeRight
        }
    } else if local_y < 2.0 * row_height {
        if left {
            ContainerZone::ResizeLeft
        } else {
            ContainerZone::ResizeRight
        }
    } else if left {
        ContainerZone::TrimLeft
    } else {
        ContainerZone::TrimRight
    }
}
