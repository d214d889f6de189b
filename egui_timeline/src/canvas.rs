//! 时间轴画布模块
//!
//! [`TimelineCanvas`] 面向宿主应用，把各个组件串起来：快照变化时重建场景，
//! 指针事件经过拾取和交互控制器，场景交给渲染器绘制。

use crate::change::{ChangeDetector, LayoutSignature};
use crate::command::CommandSink;
use crate::geometry::SnapSettings;
use crate::interaction::{DragPreview, InteractionContext, InteractionController};
use crate::layout::{ContainerLayout, ContentResolver, LayoutBuilder, Scene};
use crate::options::CanvasOptions;
use crate::picking::{self, PickResult};
use crate::render::{BufferRenderer, CanvasRenderer, DrawBuffers, Viewport};
use crate::structure::{ContainerId, Snapshot};
use crate::tile_cache::WaveformTileCache;
use egui::{Modifiers, Pos2, Rect, Vec2};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigureOutcome {
    Rebuilt,
    Unchanged,
}

pub struct TimelineCanvas {
    options: CanvasOptions,
    builder: LayoutBuilder,
    detector: ChangeDetector,
    scene: Arc<Scene>,
    tiles: WaveformTileCache,
    controller: InteractionController,
    buffers: BufferRenderer,
    snap_enabled: bool,
    playhead_bar: f64,
    cursor_x: Option<f32>,
    layout_builds: u64,
}

impl Default for TimelineCanvas {
    fn default() -> Self {
        Self::new(CanvasOptions::default())
    }
}

impl TimelineCanvas {
    pub fn new(options: CanvasOptions) -> Self {
        Self {
            builder: LayoutBuilder::new(options.clone()),
            detector: ChangeDetector::new(),
            scene: Arc::new(Scene::empty(&options)),
            tiles: WaveformTileCache::new(options.tile_zoom_tolerance),
            controller: InteractionController::new(options.min_container_length_bars),
            buffers: BufferRenderer::new(&options),
            snap_enabled: true,
            playhead_bar: 1.0,
            cursor_x: None,
            layout_builds: 0,
            options,
        }
    }

    pub fn options(&self) -> &CanvasOptions {
        &self.options
    }

    /// 替换选项，下一次 configure 调用会重建场景
    pub fn set_options(&mut self, options: CanvasOptions) {
        *self = Self {
            tiles: std::mem::take(&mut self.tiles),
            ..Self::new(options)
        };
        self.tiles.set_zoom_tolerance(self.options.tile_zoom_tolerance);
    }

    /// 接收宿主当前的项目状态
    ///
    /// 只有影响布局的内容变化时才重新布局。播放头、光标和对齐开关每次都会刷新。
    pub fn configure(&mut self, snapshot: &Snapshot, resolver: &dyn ContentResolver) -> ConfigureOutcome {
        self.snap_enabled = snapshot.snap_enabled;
        self.playhead_bar = snapshot.playhead_bar;
        self.cursor_x = snapshot.cursor_x;

        if !self.detector.observe(LayoutSignature::of(snapshot)) {
            log::trace!("Snapshot unchanged, keeping scene");
            return ConfigureOutcome::Unchanged;
        }

        let scene = Arc::new(self.builder.build(snapshot, resolver));
        let mut stale = self.detector.stale_content(snapshot);
        stale.extend(reshaped_containers(&self.scene, &scene));
        for container_id in stale {
            self.tiles.invalidate(container_id);
        }
        self.scene = scene;
        self.layout_builds += 1;
        log::debug!(
            "Rebuilt scene #{}: {} tracks, {} containers",
            self.layout_builds,
            self.scene.tracks.len(),
            self.scene.container_count()
        );
        ConfigureOutcome::Rebuilt
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// 创建以来的布局次数
    pub fn layout_builds(&self) -> u64 {
        self.layout_builds
    }

    /// 内容尺寸：时间轴宽度 × 最后一条音轨的底部
    pub fn content_size(&self) -> Vec2 {
        Vec2::new(self.scene.content_width(), self.scene.content_height)
    }

    pub fn snap_settings(&self) -> SnapSettings {
        SnapSettings {
            scale: self.scene.scale,
            time_signature: self.scene.time_signature,
            grid_mode: self.scene.grid_mode,
            enabled: self.snap_enabled,
            adaptive_beat_threshold: self.options.adaptive_beat_threshold,
        }
    }

    pub fn pick(&self, point: Pos2, visible_rect: Rect, canvas_width: f32) -> PickResult {
        picking::pick(point, &self.scene, visible_rect, canvas_width, &self.options)
    }

    /// 拾取 `pos` 处的目标，并开始对应的手势
    #[allow(clippy::too_many_arguments)]
    pub fn pointer_down(
        &mut self,
        pos: Pos2,
        modifiers: Modifiers,
        click_count: u32,
        visible_rect: Rect,
        canvas_width: f32,
        sink: &mut dyn CommandSink,
    ) -> PickResult {
        let pick = self.pick(pos, visible_rect, canvas_width);
        let ctx = InteractionContext {
            scene: self.scene.as_ref(),
            snap: self.snap_settings(),
        };
        self.controller
            .pointer_down(pos, pick, modifiers, click_count, ctx, sink);
        pick
    }

    pub fn pointer_drag(&mut self, pos: Pos2, sink: &mut dyn CommandSink) {
        let ctx = InteractionContext {
            scene: self.scene.as_ref(),
            snap: self.snap_settings(),
        };
        self.controller.pointer_drag(pos, ctx, sink);
    }

    pub fn pointer_up(&mut self, pos: Pos2, sink: &mut dyn CommandSink) {
        let ctx = InteractionContext {
            scene: self.scene.as_ref(),
            snap: self.snap_settings(),
        };
        self.controller.pointer_up(pos, ctx, sink);
    }

    pub fn is_dragging(&self) -> bool {
        self.controller.is_dragging()
    }

    pub fn drag_preview(&self) -> Option<DragPreview> {
        self.controller.drag_preview()
    }

    /// 生成本帧的视口，包含画布的播放头、光标和拖动预览
    pub fn viewport(&self, canvas_size: Vec2, visible_rect: Rect) -> Viewport {
        Viewport {
            canvas_size,
            visible_rect,
            playhead_bar: self.playhead_bar,
            cursor_x: self.cursor_x,
            drag_preview: self.drag_preview(),
        }
    }

    pub fn build_buffers(&self, viewport: &Viewport) -> DrawBuffers {
        self.buffers.build(&self.scene, viewport)
    }

    pub fn draw_with<R: CanvasRenderer>(&mut self, renderer: &mut R, viewport: &Viewport) -> R::Output {
        renderer.draw(&self.scene, &mut self.tiles, viewport)
    }

    pub fn tiles(&self) -> &WaveformTileCache {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut WaveformTileCache {
        &mut self.tiles
    }

    /// 清空项目：场景、图块、拖动状态和变化记录
    pub fn reset(&mut self) {
        log::debug!("Resetting timeline canvas");
        self.scene = Arc::new(Scene::empty(&self.options));
        self.tiles.invalidate_all();
        self.controller.reset();
        self.detector.reset();
        self.playhead_bar = 1.0;
        self.cursor_x = None;
    }
}

/// Containers whose audible length or row height differs between two scenes
fn reshaped_containers(previous: &Scene, next: &Scene) -> Vec<ContainerId> {
    let geometry = |c: &ContainerLayout| (c.audible_length_bars().to_bits(), c.rect.height().to_bits());
    let before: HashMap<ContainerId, (u64, u32)> = previous
        .tracks
        .iter()
        .flat_map(|t| &t.containers)
        .map(|c| (c.container_id, geometry(c)))
        .collect();

    next.tracks
        .iter()
        .flat_map(|t| &t.containers)
        .filter(|c| before.get(&c.container_id).is_some_and(|old| *old != geometry(c)))
        .map(|c| c.container_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandLog;
    use crate::layout::NoContent;
    use crate::structure::{Container, TrackKind, TrackSnapshot};

    fn snapshot() -> Snapshot {
        let mut track = TrackSnapshot::new("Audio", TrackKind::Audio);
        track.containers.push(Container::new("A", 1.0, 4.0));
        Snapshot {
            tracks: vec![track],
            ..Snapshot::default()
        }
    }

    #[test]
    fn unchanged_configure_skips_layout() {
        let mut canvas = TimelineCanvas::default();
        let mut snapshot = snapshot();
        assert_eq!(canvas.configure(&snapshot, &NoContent), ConfigureOutcome::Rebuilt);
        let scene = Arc::clone(canvas.scene());

        snapshot.playhead_bar = 9.0;
        assert_eq!(canvas.configure(&snapshot, &NoContent), ConfigureOutcome::Unchanged);
        assert_eq!(canvas.layout_builds(), 1);
        assert!(Arc::ptr_eq(&scene, canvas.scene()));

        let vp = canvas.viewport(Vec2::new(800.0, 400.0), Rect::from_min_size(Pos2::ZERO, Vec2::new(800.0, 400.0)));
        assert_eq!(vp.playhead_bar, 9.0);
    }

    #[test]
    fn reset_forgets_scene_and_history() {
        let mut canvas = TimelineCanvas::default();
        let snapshot = snapshot();
        canvas.configure(&snapshot, &NoContent);
        canvas.reset();
        assert_eq!(canvas.scene().container_count(), 0);
        assert_eq!(canvas.configure(&snapshot, &NoContent), ConfigureOutcome::Rebuilt);
        assert_eq!(canvas.layout_builds(), 2);
    }

    #[test]
    fn pointer_down_picks_internally() {
        let mut canvas = TimelineCanvas::default();
        canvas.configure(&snapshot(), &NoContent);
        let mut log = CommandLog::new();
        let visible = Rect::from_min_size(Pos2::ZERO, Vec2::new(800.0, 400.0));
        let y = canvas.scene().tracks[0].y + 40.0;

        let pick = canvas.pointer_down(Pos2::new(200.0, y), Modifiers::NONE, 1, visible, 800.0, &mut log);
        assert!(pick.container().is_some());
        assert!(canvas.is_dragging());
        canvas.pointer_up(Pos2::new(200.0, y), &mut log);
        assert!(!canvas.is_dragging());
    }

    #[test]
    fn configure_after_set_options_uses_new_metrics() {
        let mut canvas = TimelineCanvas::default();
        let snapshot = snapshot();
        canvas.configure(&snapshot, &NoContent);
        assert_eq!(canvas.scene().tracks[0].height, 80.0);

        canvas.set_options(CanvasOptions {
            default_track_height: 120.0,
            tile_zoom_tolerance: 3.0,
            ..CanvasOptions::default()
        });
        assert_eq!(canvas.configure(&snapshot, &NoContent), ConfigureOutcome::Rebuilt);
        assert_eq!(canvas.scene().tracks[0].height, 120.0);
        assert_eq!(canvas.tiles().zoom_tolerance(), 3.0);
    }

    #[test]
    fn reshaped_container_drops_its_tiles() {
        let mut canvas = TimelineCanvas::default();
        let mut snapshot = snapshot();
        let id = snapshot.tracks[0].containers[0].id;
        canvas.configure(&snapshot, &NoContent);
        let height = canvas.scene().tracks[0].containers[0].rect.height();
        canvas
            .tiles_mut()
            .generate_tile(id, &[0.5; 64], 4.0, 120.0, height, egui::Color32::WHITE);

        // Zoom alone keeps the tile
        snapshot.pixels_per_bar = 130.0;
        canvas.configure(&snapshot, &NoContent);
        assert!(canvas.tiles().tile(id, 130.0).is_some());

        snapshot.tracks[0].containers[0].length_bars = 6.0;
        assert_eq!(canvas.configure(&snapshot, &NoContent), ConfigureOutcome::Rebuilt);
        assert!(canvas.tiles().tile(id, 130.0).is_none());

        canvas
            .tiles_mut()
            .generate_tile(id, &[0.5; 64], 6.0, 130.0, height, egui::Color32::WHITE);
        snapshot.tracks[0].height = Some(140.0);
        canvas.configure(&snapshot, &NoContent);
        assert!(canvas.tiles().tile(id, 130.0).is_none());
    }
}
