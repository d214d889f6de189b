//! 配置变化检测模块
//!
//! [`LayoutSignature`] 把影响布局的快照字段折叠成一个哈希值，项目未变化时
//! configure 调用跳过重建。播放头、光标等每帧状态不参与哈希。

use crate::structure::{Container, ContainerId, Fade, Selection, Snapshot, TrackSnapshot};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutSignature(u64);

impl LayoutSignature {
    pub fn of(snapshot: &Snapshot) -> Self {
        let mut hasher = DefaultHasher::new();

        snapshot.pixels_per_bar.to_bits().hash(&mut hasher);
        snapshot.total_bars.hash(&mut hasher);
        snapshot.time_signature.hash(&mut hasher);
        snapshot.grid_mode.hash(&mut hasher);
        hash_selection(&snapshot.selection, &mut hasher);

        snapshot.tracks.len().hash(&mut hasher);
        for track in &snapshot.tracks {
            hash_track(track, &mut hasher);
        }

        snapshot.sections.len().hash(&mut hasher);
        for section in &snapshot.sections {
            section.id.hash(&mut hasher);
            section.start_bar.to_bits().hash(&mut hasher);
            section.length_bars.to_bits().hash(&mut hasher);
            section.color.to_array().hash(&mut hasher);
        }

        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

fn hash_selection(selection: &Selection, hasher: &mut impl Hasher) {
    selection.container_ids.hash(hasher);
    selection.section_id.hash(hasher);
    match selection.bar_range {
        Some(range) => {
            1u8.hash(hasher);
            range.start.to_bits().hash(hasher);
            range.end.to_bits().hash(hasher);
        }
        None => 0u8.hash(hasher),
    }
}

fn hash_track(track: &TrackSnapshot, hasher: &mut impl Hasher) {
    track.id.hash(hasher);
    track.kind.hash(hasher);
    track.height.map(f32::to_bits).hash(hasher);
    track.automation_lanes.hash(hasher);
    track.automation_expanded.hash(hasher);

    track.containers.len().hash(hasher);
    for container in &track.containers {
        hash_container(container, hasher);
    }
}

fn hash_container(container: &Container, hasher: &mut impl Hasher) {
    container.id.hash(hasher);
    container.start_bar.to_bits().hash(hasher);
    container.length_bars.to_bits().hash(hasher);
    container.audio_duration_bars.map(f64::to_bits).hash(hasher);
    hash_fade(container.enter_fade, hasher);
    hash_fade(container.exit_fade, hasher);
    container.clone_of.hash(hasher);
    container.color.to_array().hash(hasher);
    container.content_revision.hash(hasher);

    for lane in &container.automation {
        lane.lane_id.hash(hasher);
        lane.breakpoints.len().hash(hasher);
        for breakpoint in &lane.breakpoints {
            breakpoint.id.hash(hasher);
            breakpoint.offset_bars.to_bits().hash(hasher);
            breakpoint.value.to_bits().hash(hasher);
        }
    }
}

fn hash_fade(fade: Option<Fade>, hasher: &mut impl Hasher) {
    match fade {
        Some(fade) => {
            1u8.hash(hasher);
            fade.duration_bars.to_bits().hash(hasher);
            fade.curve.hash(hasher);
        }
        None => 0u8.hash(hasher),
    }
}

/// Remembers the last signature and content revisions seen
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<LayoutSignature>,
    revisions: HashMap<ContainerId, u64>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `signature`; true when it differs from the previous one
    pub fn observe(&mut self, signature: LayoutSignature) -> bool {
        let changed = self.last != Some(signature);
        self.last = Some(signature);
        changed
    }

    /// Containers whose content revision moved since the last call
    ///
    /// Containers that disappeared from the snapshot are reported as well so
    /// their cached content can be dropped.
    pub fn stale_content(&mut self, snapshot: &Snapshot) -> Vec<ContainerId> {
        let mut current = HashMap::with_capacity(self.revisions.len());
        let mut stale = Vec::new();
        for container in snapshot.tracks.iter().flat_map(|t| &t.containers) {
            if let Some(previous) = self.revisions.get(&container.id) {
                if *previous != container.content_revision {
                    stale.push(container.id);
                }
            }
            current.insert(container.id, container.content_revision);
        }
        stale.extend(self.revisions.keys().filter(|id| !current.contains_key(id)).copied());
        self.revisions = current;
        stale
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.revisions.clear();
    }
}
