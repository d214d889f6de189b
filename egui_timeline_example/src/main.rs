use eframe::egui;
use egui_timeline::utils::{format_bar_length, format_bar_position};
use egui_timeline::{
    AutomationLane, BarRange, Breakpoint, BreakpointId, CanvasOptions, CommandSink, Container, ContainerId,
    ContentResolver, EguiTileTextures, Fade, FadeCurve, GridMode, GridResolution, LaneId, MidiNote, MidiSequence,
    NoteId, Section, ShapeRenderer, Snapshot, TimelineCanvas, TrackId, TrackKind, TrackSnapshot,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const DOUBLE_CLICK_SECS: f64 = 0.3;
const DOUBLE_CLICK_DISTANCE: f32 = 6.0;

fn main() -> eframe::Result<()> {
    env_logger::init();

    let native_options = eframe::NativeOptions::default();
    eframe::run_native(
        "egui_timeline Example",
        native_options,
        Box::new(|cc| Ok(Box::new(TimelineApp::new(cc)))),
    )
}

/// Host-side project: the snapshot plus the content the canvas resolves
struct Project {
    snapshot: Snapshot,
    peaks: HashMap<ContainerId, Arc<[f32]>>,
    midi: HashMap<ContainerId, MidiSequence>,
    status: String,
}

impl Project {
    fn demo() -> Self {
        let mut project = Self {
            snapshot: Snapshot {
                total_bars: 48,
                ..Snapshot::default()
            },
            peaks: HashMap::new(),
            midi: HashMap::new(),
            status: String::new(),
        };

        let lane_id = LaneId::next();
        let mut drums = TrackSnapshot::new("Drums", TrackKind::Audio);
        drums.automation_lanes = vec![lane_id];
        for start in [1.0, 5.0, 9.0] {
            let mut container = Container::new("Beat", start, 4.0);
            container.color = egui::Color32::from_rgb(90, 140, 200);
            container.automation.push(AutomationLane {
                lane_id,
                breakpoints: (0..5)
                    .map(|i| Breakpoint {
                        id: BreakpointId::next(),
                        offset_bars: i as f64,
                        value: if i % 2 == 0 { 0.8 } else { 0.4 },
                    })
                    .collect(),
            });
            project.peaks.insert(container.id, synth_peaks(2048, start as usize));
            drums.containers.push(container);
        }

        let mut vocals = TrackSnapshot::new("Vocals", TrackKind::Audio);
        vocals.height = Some(110.0);
        let mut take = Container::new("Take 3", 3.0, 6.0);
        take.audio_duration_bars = Some(5.6);
        take.enter_fade = Some(Fade::new(0.5, FadeCurve::EqualPower));
        take.exit_fade = Some(Fade::new(1.0, FadeCurve::SCurve));
        take.color = egui::Color32::from_rgb(200, 120, 90);
        project.peaks.insert(take.id, synth_peaks(4096, 7));
        vocals.containers.push(take);

        let mut keys = TrackSnapshot::new("Keys", TrackKind::Midi);
        for start in [1.0, 9.0] {
            let mut container = Container::new("Chords", start, 8.0);
            container.color = egui::Color32::from_rgb(120, 190, 120);
            project.midi.insert(container.id, demo_chords());
            keys.containers.push(container);
        }

        project.snapshot.tracks = vec![drums, vocals, keys];
        project.snapshot.sections = vec![
            Section::new("Intro", 1.0, 4.0),
            Section::new("Verse", 5.0, 8.0),
            Section::new("Chorus", 13.0, 8.0),
        ];
        project
    }

    fn container_mut(&mut self, container_id: ContainerId) -> Option<&mut Container> {
        self.snapshot
            .tracks
            .iter_mut()
            .flat_map(|t| t.containers.iter_mut())
            .find(|c| c.id == container_id)
    }

    fn take_container(&mut self, container_id: ContainerId) -> Option<Container> {
        self.snapshot.tracks.iter_mut().find_map(|track| {
            let index = track.containers.iter().position(|c| c.id == container_id)?;
            Some(track.containers.remove(index))
        })
    }

    fn track_mut(&mut self, track_id: TrackId) -> Option<&mut TrackSnapshot> {
        self.snapshot.tracks.iter_mut().find(|t| t.id == track_id)
    }

    fn set_extent(&mut self, container_id: ContainerId, start_bar: f64, length_bars: f64) {
        if let Some(container) = self.container_mut(container_id) {
            container.start_bar = start_bar;
            container.length_bars = length_bars;
            if let Some(duration) = container.audio_duration_bars {
                container.audio_duration_bars = Some(duration.min(length_bars));
            }
        }
    }
}

impl ContentResolver for Project {
    fn peaks(&self, container: &Container) -> Option<Arc<[f32]>> {
        self.peaks
            .get(&container.clone_of.unwrap_or(container.id))
            .cloned()
    }

    fn midi(&self, container: &Container) -> Option<MidiSequence> {
        self.midi.get(&container.clone_of.unwrap_or(container.id)).cloned()
    }
}

impl CommandSink for Project {
    fn set_playhead(&mut self, bar: f64) {
        self.snapshot.playhead_bar = bar;
    }

    fn select_range(&mut self, range: BarRange) {
        log::info!("[EditCommand] select range {:.2}..{:.2}", range.start, range.end);
        self.snapshot.selection.bar_range = Some(range);
    }

    fn move_container(&mut self, container_id: ContainerId, track_id: TrackId, new_start_bar: f64) {
        log::info!("[EditCommand] move {:?} to {:?} at bar {}", container_id, track_id, new_start_bar);
        let Some(mut container) = self.take_container(container_id) else {
            return;
        };
        container.start_bar = new_start_bar;
        if let Some(track) = self.track_mut(track_id) {
            track.containers.push(container);
        }
    }

    fn clone_container(
        &mut self,
        source_id: ContainerId,
        new_id: ContainerId,
        track_id: TrackId,
        new_start_bar: f64,
    ) {
        log::info!("[EditCommand] clone {:?} as {:?} at bar {}", source_id, new_id, new_start_bar);
        let Some(mut clone) = self.container_mut(source_id).map(|c| c.clone()) else {
            return;
        };
        clone.id = new_id;
        clone.clone_of = Some(clone.clone_of.unwrap_or(source_id));
        clone.start_bar = new_start_bar;
        if let Some(track) = self.track_mut(track_id) {
            track.containers.push(clone);
        }
    }

    fn select_container(&mut self, container_id: ContainerId, _track_id: TrackId, modifiers: egui::Modifiers) {
        let selection = &mut self.snapshot.selection.container_ids;
        if modifiers.command || modifiers.shift {
            if !selection.remove(&container_id) {
                selection.insert(container_id);
            }
        } else {
            selection.clear();
            selection.insert(container_id);
        }
    }

    fn open_container_editor(&mut self, container_id: ContainerId, track_id: TrackId) {
        log::info!("[EditCommand] open editor for {:?} on {:?}", container_id, track_id);
        self.status = format!("Editor requested for container {}", container_id.0);
    }

    fn set_container_enter_fade(&mut self, container_id: ContainerId, fade: Option<Fade>) {
        if let Some(container) = self.container_mut(container_id) {
            container.enter_fade = fade;
        }
    }

    fn set_container_exit_fade(&mut self, container_id: ContainerId, fade: Option<Fade>) {
        if let Some(container) = self.container_mut(container_id) {
            container.exit_fade = fade;
        }
    }

    fn remove_midi_note(&mut self, container_id: ContainerId, note_id: NoteId) {
        log::info!("[EditCommand] remove note {:?} from {:?}", note_id, container_id);
        let Some(container) = self.container_mut(container_id) else {
            return;
        };
        let content_id = container.clone_of.unwrap_or(container_id);
        if let Some(sequence) = self.midi.get_mut(&content_id) {
            sequence.notes.retain(|n| n.id != note_id);
        }
        // Clones share the content, so all of them are stale
        for container in self.snapshot.tracks.iter_mut().flat_map(|t| t.containers.iter_mut()) {
            if container.id == content_id || container.clone_of == Some(content_id) {
                container.content_revision += 1;
            }
        }
    }

    fn remove_automation_breakpoint(
        &mut self,
        container_id: ContainerId,
        lane_id: LaneId,
        breakpoint_id: BreakpointId,
    ) {
        log::info!("[EditCommand] remove breakpoint {:?} from {:?}", breakpoint_id, container_id);
        if let Some(container) = self.container_mut(container_id) {
            for lane in container.automation.iter_mut().filter(|l| l.lane_id == lane_id) {
                lane.breakpoints.retain(|b| b.id != breakpoint_id);
            }
        }
    }

    fn resize_container(&mut self, container_id: ContainerId, _track_id: TrackId, start_bar: f64, length_bars: f64) {
        log::info!(
            "[EditCommand] resize {:?} to bar {} for {}",
            container_id,
            start_bar,
            format_bar_length(length_bars)
        );
        self.set_extent(container_id, start_bar, length_bars);
    }

    fn trim_container(&mut self, container_id: ContainerId, _track_id: TrackId, start_bar: f64, length_bars: f64) {
        log::info!(
            "[EditCommand] trim {:?} to bar {} for {}",
            container_id,
            start_bar,
            format_bar_length(length_bars)
        );
        self.set_extent(container_id, start_bar, length_bars);
    }
}

fn synth_peaks(count: usize, seed: usize) -> Arc<[f32]> {
    (0..count)
        .map(|i| {
            let t = i as f32 / count as f32;
            let beat = ((t * 16.0).fract() * -6.0).exp();
            let wobble = ((i + seed * 131) as f32 * 0.37).sin().abs() * 0.3;
            (beat * 0.7 + wobble).min(1.0)
        })
        .collect()
}

fn demo_chords() -> MidiSequence {
    let chords: [[u8; 3]; 4] = [[60, 64, 67], [57, 60, 64], [53, 57, 60], [55, 59, 62]];
    let notes = chords
        .iter()
        .enumerate()
        .flat_map(|(bar, chord)| {
            chord.iter().map(move |pitch| MidiNote {
                id: NoteId::next(),
                offset_bars: bar as f64 * 2.0,
                length_bars: 1.75,
                pitch: *pitch,
                velocity: 96,
            })
        })
        .collect();
    MidiSequence { notes }
}

fn load_options() -> CanvasOptions {
    match std::env::var("TIMELINE_OPTIONS") {
        Ok(path) => CanvasOptions::load_from_path(Path::new(&path)).unwrap_or_else(|err| {
            log::error!("{}; using defaults", err);
            CanvasOptions::default()
        }),
        Err(_) => CanvasOptions::default(),
    }
}

struct TimelineApp {
    project: Project,
    canvas: TimelineCanvas,
    renderer: ShapeRenderer<EguiTileTextures>,
    started: Instant,
    last_press: Option<(f64, egui::Pos2)>,
}

impl TimelineApp {
    fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let options = load_options();
        Self {
            project: Project::demo(),
            renderer: ShapeRenderer::with_textures(&options, EguiTileTextures::new(cc.egui_ctx.clone())),
            canvas: TimelineCanvas::new(options),
            started: Instant::now(),
            last_press: None,
        }
    }

    fn click_count(&mut self, pos: egui::Pos2) -> u32 {
        let now = self.started.elapsed().as_secs_f64();
        let count = match self.last_press {
            Some((time, last)) if now - time < DOUBLE_CLICK_SECS && last.distance(pos) < DOUBLE_CLICK_DISTANCE => 2,
            _ => 1,
        };
        self.last_press = if count == 2 { None } else { Some((now, pos)) };
        count
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let snapshot = &mut self.project.snapshot;
            ui.add(egui::Slider::new(&mut snapshot.pixels_per_bar, 20.0..=600.0).text("Zoom"));
            ui.checkbox(&mut snapshot.snap_enabled, "Snap");

            egui::ComboBox::from_label("Grid")
                .selected_text(format!("{:?}", snapshot.grid_mode))
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut snapshot.grid_mode, GridMode::Adaptive, "Adaptive");
                    for resolution in [
                        GridResolution::Bar,
                        GridResolution::Quarter,
                        GridResolution::Eighth,
                        GridResolution::Sixteenth,
                    ] {
                        ui.selectable_value(
                            &mut snapshot.grid_mode,
                            GridMode::Fixed(resolution),
                            format!("{:?}", resolution),
                        );
                    }
                });

            let mut expanded = snapshot.tracks.iter().any(|t| t.automation_expanded);
            if ui.checkbox(&mut expanded, "Automation").changed() {
                for track in &mut snapshot.tracks {
                    track.automation_expanded = expanded;
                }
            }

            ui.separator();
            ui.label(format!(
                "Playhead {}",
                format_bar_position(snapshot.playhead_bar, snapshot.time_signature)
            ));
            if !self.project.status.is_empty() {
                ui.separator();
                ui.label(&self.project.status);
            }
        });
    }

    fn timeline(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::both()
            .auto_shrink([false, false])
            .show_viewport(ui, |ui, visible| {
                let content = self.canvas.content_size();
                let size = egui::vec2(content.x.max(visible.width()), content.y.max(visible.height()));
                let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click_and_drag());
                let origin = rect.min.to_vec2();
                let to_canvas = |pos: egui::Pos2| pos - origin;

                let (modifiers, pressed, released, hover) = ui.input(|i| {
                    (
                        i.modifiers,
                        i.pointer.primary_pressed(),
                        i.pointer.primary_released(),
                        i.pointer.hover_pos(),
                    )
                });

                self.project.snapshot.cursor_x = hover.filter(|p| rect.contains(*p)).map(|p| to_canvas(p).x);

                if pressed && response.hovered() {
                    if let Some(pos) = hover {
                        let pos = to_canvas(pos);
                        let clicks = self.click_count(pos);
                        let pick = self
                            .canvas
                            .pointer_down(pos, modifiers, clicks, visible, size.x, &mut self.project);
                        log::debug!("Pointer down at {:?}: {:?}", pos, pick);
                    }
                } else if response.dragged() {
                    if let Some(pos) = response.interact_pointer_pos() {
                        self.canvas.pointer_drag(to_canvas(pos), &mut self.project);
                    }
                }
                if released && self.canvas.is_dragging() {
                    let pos = hover.or(response.interact_pointer_pos()).unwrap_or(rect.min);
                    self.canvas.pointer_up(to_canvas(pos), &mut self.project);
                }

                let viewport = self.canvas.viewport(size, visible);
                let mut shapes = self.canvas.draw_with(&mut self.renderer, &viewport);
                for shape in &mut shapes {
                    shape.translate(origin);
                }
                ui.painter().extend(shapes);
            });
    }
}

impl eframe::App for TimelineApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.canvas.configure(&self.project.snapshot, &self.project) == egui_timeline::ConfigureOutcome::Rebuilt {
                self.renderer.textures_mut().retain_scene(self.canvas.scene());
            }
            self.timeline(ui);
        });
    }
}
