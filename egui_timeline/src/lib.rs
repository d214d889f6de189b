//! # egui_timeline
//!
//! 一个 DAW（数字音频工作站）风格的编排画布：音频和 MIDI 容器按小节网格排列在音轨上，
//! 支持段落、淡入淡出、自动化和播放头。
//!
//! ## 功能特性
//!
//! - **布局**：不可变的 [`Snapshot`] 生成屏幕矩形组成的 [`Scene`]
//! - **波形**：峰值数据光栅化为图块，在相近的缩放级别间复用
//! - **拾取**：画布上任意一点都能解析为标尺、音轨、容器区域、音符或自动化断点
//! - **手势**：拖动播放头、范围选择、移动/复制、淡入淡出、调整大小和裁剪，通过 [`CommandSink`] 发出
//! - **渲染**：供 GPU 宿主使用的 `bytemuck` 实例缓冲区，或供 egui painter 使用的 `egui::Shape`
//!
//! ## 基本使用
//!
//! ```rust
//! use egui_timeline::{
//!     CommandLog, Container, NoContent, Snapshot, TimelineCanvas, TrackKind, TrackSnapshot,
//! };
//!
//! let mut track = TrackSnapshot::new("Drums", TrackKind::Audio);
//! track.containers.push(Container::new("Loop", 3.0, 4.0));
//! let snapshot = Snapshot { tracks: vec![track], ..Snapshot::default() };
//!
//! let mut canvas = TimelineCanvas::default();
//! canvas.configure(&snapshot, &NoContent);
//!
//! let rect = canvas.scene().tracks[0].containers[0].rect;
//! assert_eq!(rect.min.x, 240.0);
//! assert_eq!(rect.width(), 480.0);
//!
//! // 手势结果进入命令接收器，由宿主应用到自己的数据模型
//! let mut commands = CommandLog::new();
//! let visible = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(1000.0, 400.0));
//! canvas.pointer_down(egui::pos2(500.0, 10.0), egui::Modifiers::NONE, 1, visible, 1000.0, &mut commands);
//! assert_eq!(commands.take_commands().len(), 1);
//! ```

pub mod canvas;
pub mod change;
pub mod command;
pub mod geometry;
pub mod interaction;
pub mod layout;
pub mod options;
pub mod picking;
pub mod render;
pub mod structure;
pub mod tile_cache;
pub mod utils;

pub use canvas::{ConfigureOutcome, TimelineCanvas};
pub use change::{ChangeDetector, LayoutSignature};
pub use command::{CommandLog, CommandSink, EditCommand};
pub use geometry::{BarScale, SnapSettings};
pub use interaction::{DragPreview, InteractionContext, InteractionController};
pub use layout::{ContainerLayout, ContentFns, ContentResolver, LayoutBuilder, NoContent, Scene, TrackLayout};
pub use options::{CanvasOptions, OptionsError};
pub use picking::{pick, ContainerZone, PickResult};
pub use render::{
    BufferRenderer, CanvasRenderer, DrawBuffers, EguiTileTextures, NoTextures, ShapeRenderer, TileTextures, Viewport,
};
pub use structure::{
    AutomationLane, BarRange, Breakpoint, BreakpointId, Container, ContainerId, Fade, FadeCurve, GridMode,
    GridResolution, LaneId, MidiNote, MidiSequence, NoteId, Section, SectionId, Selection, Snapshot, TimeSignature,
    TrackId, TrackKind, TrackSnapshot,
};
pub use tile_cache::{WaveformTile, WaveformTileCache};
