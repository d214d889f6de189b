//! 渲染策略模块
//!
//! 两种后端都从同一份 [`DrawBuffers`] 出发：[`BufferRenderer`] 直接交给 GPU 宿主，
//! [`ShapeRenderer`] 转换为 `egui::Shape` 供 egui painter 绘制。

pub mod buffers;

pub use buffers::{
    downsample_peaks, ortho_projection, peak_budget, BufferBuilder, BufferStats, DrawBuffers, GridSpec,
    LineInstance, LineKind, RectInstance, RectKind, Uniforms, WaveformParams,
};

use crate::interaction::DragPreview;
use crate::layout::{ContainerLayout, Scene};
use crate::options::CanvasOptions;
use crate::structure::ContainerId;
use crate::tile_cache::WaveformTileCache;
use buffers::WAVEFORM_LAYER;
use egui::{Color32, ColorImage, Pos2, Rect, Rgba, Shape, Stroke, TextureHandle, TextureId, TextureOptions, Vec2};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-frame view parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub canvas_size: Vec2,
    /// Visible part of the canvas, in canvas coordinates
    pub visible_rect: Rect,
    pub playhead_bar: f64,
    pub cursor_x: Option<f32>,
    pub drag_preview: Option<DragPreview>,
}

impl Viewport {
    pub fn new(canvas_size: Vec2, visible_rect: Rect) -> Self {
        Self {
            canvas_size,
            visible_rect,
            playhead_bar: 1.0,
            cursor_x: None,
            drag_preview: None,
        }
    }
}

pub trait CanvasRenderer {
    type Output;

    fn draw(&mut self, scene: &Scene, tiles: &mut WaveformTileCache, viewport: &Viewport) -> Self::Output;
}

/// GPU path: produces the raw instance buffers
pub struct BufferRenderer {
    builder: BufferBuilder,
    options: CanvasOptions,
}

impl BufferRenderer {
    pub fn new(options: &CanvasOptions) -> Self {
        Self {
            builder: BufferBuilder::new(options.buffer_budget_ms),
            options: options.clone(),
        }
    }

    pub fn build(&self, scene: &Scene, viewport: &Viewport) -> DrawBuffers {
        self.builder.build(
            &scene.tracks,
            &scene.sections,
            GridSpec::from_scene(scene, &self.options),
            &scene.selection,
            viewport,
        )
    }
}

impl CanvasRenderer for BufferRenderer {
    type Output = DrawBuffers;

    fn draw(&mut self, scene: &Scene, _tiles: &mut WaveformTileCache, viewport: &Viewport) -> DrawBuffers {
        self.build(scene, viewport)
    }
}

/// Supplies textures for waveform tiles
pub trait TileTextures {
    fn waveform_texture(
        &mut self,
        tiles: &mut WaveformTileCache,
        container: &ContainerLayout,
        pixels_per_bar: f32,
    ) -> Option<TextureId>;
}

/// Always falls back to drawing peak columns
pub struct NoTextures;

impl TileTextures for NoTextures {
    fn waveform_texture(
        &mut self,
        _tiles: &mut WaveformTileCache,
        _container: &ContainerLayout,
        _pixels_per_bar: f32,
    ) -> Option<TextureId> {
        None
    }
}

/// Uploads cached tiles as egui textures, one live texture per container
pub struct EguiTileTextures {
    ctx: egui::Context,
    uploaded: HashMap<ContainerId, (Arc<ColorImage>, TextureHandle)>,
}

impl EguiTileTextures {
    pub fn new(ctx: egui::Context) -> Self {
        Self {
            ctx,
            uploaded: HashMap::new(),
        }
    }

    /// Drops textures of containers that are gone from the scene
    pub fn retain_scene(&mut self, scene: &Scene) {
        self.uploaded.retain(|id, _| scene.container(*id).is_some());
    }

    pub fn len(&self) -> usize {
        self.uploaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploaded.is_empty()
    }
}

impl TileTextures for EguiTileTextures {
    fn waveform_texture(
        &mut self,
        tiles: &mut WaveformTileCache,
        container: &ContainerLayout,
        pixels_per_bar: f32,
    ) -> Option<TextureId> {
        let peaks = container.peaks.as_ref()?;
        let tile = tiles.tile_or_generate(
            container.container_id,
            peaks,
            container.audible_length_bars(),
            pixels_per_bar,
            container.rect.height(),
            buffers::waveform_color(container.color),
        )?;

        if let Some((image, handle)) = self.uploaded.get(&container.container_id) {
            if Arc::ptr_eq(image, &tile.image) {
                return Some(handle.id());
            }
        }

        let handle = self.ctx.load_texture(
            format!("waveform-{}", container.container_id.0),
            (*tile.image).clone(),
            TextureOptions::LINEAR,
        );
        let id = handle.id();
        self.uploaded
            .insert(container.container_id, (Arc::clone(&tile.image), handle));
        Some(id)
    }
}

/// Software path: converts the buffers into egui shapes
pub struct ShapeRenderer<T: TileTextures = NoTextures> {
    buffers: BufferRenderer,
    textures: T,
}

impl ShapeRenderer<NoTextures> {
    pub fn new(options: &CanvasOptions) -> Self {
        Self::with_textures(options, NoTextures)
    }
}

impl<T: TileTextures> ShapeRenderer<T> {
    pub fn with_textures(options: &CanvasOptions, textures: T) -> Self {
        Self {
            buffers: BufferRenderer::new(options),
            textures,
        }
    }

    pub fn textures_mut(&mut self) -> &mut T {
        &mut self.textures
    }

    fn waveform_shapes(
        &mut self,
        scene: &Scene,
        tiles: &mut WaveformTileCache,
        buffers: &DrawBuffers,
        out: &mut Vec<(u8, Shape)>,
    ) {
        let containers: HashMap<ContainerId, &ContainerLayout> = scene
            .tracks
            .iter()
            .flat_map(|t| &t.containers)
            .filter(|c| c.peaks.is_some())
            .map(|c| (c.container_id, c))
            .collect();
        let ppb = scene.scale.pixels_per_bar();

        for params in &buffers.waveforms {
            let rect = params.rect();
            let texture = containers
                .get(&params.container_id())
                .and_then(|container| self.textures.waveform_texture(tiles, container, ppb));
            match texture {
                Some(texture_id) => out.push((
                    WAVEFORM_LAYER,
                    Shape::image(
                        texture_id,
                        rect,
                        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    ),
                )),
                None => {
                    let peaks = buffers.peaks.get(params.peak_range()).unwrap_or(&[]);
                    let color = to_color32(params.color);
                    out.extend(peak_columns(rect, peaks, color).map(|shape| (WAVEFORM_LAYER, shape)));
                }
            }
        }
    }
}

impl<T: TileTextures> CanvasRenderer for ShapeRenderer<T> {
    type Output = Vec<Shape>;

    fn draw(&mut self, scene: &Scene, tiles: &mut WaveformTileCache, viewport: &Viewport) -> Vec<Shape> {
        let buffers = self.buffers.build(scene, viewport);
        let mut layered: Vec<(u8, Shape)> =
            Vec::with_capacity(buffers.rects.len() + buffers.lines.len() + buffers.peaks.len());

        for instance in &buffers.rects {
            let Some(kind) = instance.kind() else {
                continue;
            };
            let rect = instance.rect();
            let color = to_color32(instance.color);
            let shape = match kind {
                RectKind::Highlight => Shape::rect_stroke(rect, 3.0, Stroke::new(1.5, color)),
                RectKind::ContainerFill | RectKind::CloneFill | RectKind::Section => {
                    Shape::rect_filled(rect, 3.0, color)
                }
                RectKind::Note | RectKind::AutomationHandle => Shape::rect_filled(rect, 1.0, color),
                _ => Shape::rect_filled(rect, 0.0, color),
            };
            layered.push((kind.layer(), shape));
        }

        for instance in &buffers.lines {
            let Some(kind) = instance.kind() else {
                continue;
            };
            layered.push((
                kind.layer(),
                Shape::line_segment(instance.points(), Stroke::new(instance.width, to_color32(instance.color))),
            ));
        }

        self.waveform_shapes(scene, tiles, &buffers, &mut layered);

        layered.sort_by_key(|(layer, _)| *layer);
        layered.into_iter().map(|(_, shape)| shape).collect()
    }
}

fn to_color32(color: [f32; 4]) -> Color32 {
    Color32::from(Rgba::from_rgba_premultiplied(color[0], color[1], color[2], color[3]))
}

/// Mirrored vertical strokes, one per peak, spread evenly across `rect`
fn peak_columns(rect: Rect, peaks: &[f32], color: Color32) -> impl Iterator<Item = Shape> + '_ {
    let step = if peaks.is_empty() {
        0.0
    } else {
        rect.width() / peaks.len() as f32
    };
    let center = rect.center().y;
    let half_height = rect.height() / 2.0;
    let stroke = Stroke::new((step * 0.8).max(1.0), color);
    peaks.iter().enumerate().map(move |(i, peak)| {
        let x = rect.left() + (i as f32 + 0.5) * step;
        let half = peak.clamp(0.0, 1.0) * half_height;
        Shape::line_segment([Pos2::new(x, center - half), Pos2::new(x, center + half)], stroke)
    })
}
