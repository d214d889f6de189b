//! 编辑命令模块
//!
//! 画布从不修改项目。手势的结果通过宿主提供的 [`CommandSink`] 发出，
//! 撤销、持久化和下一个快照都由宿主负责。

use crate::structure::{BarRange, BreakpointId, ContainerId, Fade, LaneId, NoteId, TrackId};
use egui::Modifiers;

pub trait CommandSink {
    fn set_playhead(&mut self, bar: f64);
    fn select_range(&mut self, range: BarRange);
    fn move_container(&mut self, container_id: ContainerId, track_id: TrackId, new_start_bar: f64);
    /// `new_id` is freshly minted by the canvas; the source stays where it is
    fn clone_container(
        &mut self,
        source_id: ContainerId,
        new_id: ContainerId,
        track_id: TrackId,
        new_start_bar: f64,
    );
    fn select_container(&mut self, container_id: ContainerId, track_id: TrackId, modifiers: Modifiers);
    fn open_container_editor(&mut self, container_id: ContainerId, track_id: TrackId);
    fn set_container_enter_fade(&mut self, container_id: ContainerId, fade: Option<Fade>);
    fn set_container_exit_fade(&mut self, container_id: ContainerId, fade: Option<Fade>);
    fn remove_midi_note(&mut self, container_id: ContainerId, note_id: NoteId);
    fn remove_automation_breakpoint(
        &mut self,
        container_id: ContainerId,
        lane_id: LaneId,
        breakpoint_id: BreakpointId,
    );
    /// Stretches the container; content keeps its timing
    fn resize_container(&mut self, container_id: ContainerId, track_id: TrackId, start_bar: f64, length_bars: f64);
    /// Cuts the container's window into its content
    fn trim_container(&mut self, container_id: ContainerId, track_id: TrackId, start_bar: f64, length_bars: f64);
}

/// 一次命令接收器调用，以值的形式表示
#[derive(Clone, Debug, PartialEq)]
pub enum EditCommand {
    SetPlayhead {
        bar: f64,
    },
    SelectRange {
        range: BarRange,
    },
    MoveContainer {
        container_id: ContainerId,
        track_id: TrackId,
        new_start_bar: f64,
    },
    CloneContainer {
        source_id: ContainerId,
        new_id: ContainerId,
        track_id: TrackId,
        new_start_bar: f64,
    },
    SelectContainer {
        container_id: ContainerId,
        track_id: TrackId,
        modifiers: Modifiers,
    },
    OpenContainerEditor {
        container_id: ContainerId,
        track_id: TrackId,
    },
    SetContainerEnterFade {
        container_id: ContainerId,
        fade: Option<Fade>,
    },
    SetContainerExitFade {
        container_id: ContainerId,
        fade: Option<Fade>,
    },
    RemoveMidiNote {
        container_id: ContainerId,
        note_id: NoteId,
    },
    RemoveAutomationBreakpoint {
        container_id: ContainerId,
        lane_id: LaneId,
        breakpoint_id: BreakpointId,
    },
    ResizeContainer {
        container_id: ContainerId,
        track_id: TrackId,
        start_bar: f64,
        length_bars: f64,
    },
    TrimContainer {
        container_id: ContainerId,
        track_id: TrackId,
        start_bar: f64,
        length_bars: f64,
    },
}

impl EditCommand {
    /// 把命令重新发给另一个接收器
    pub fn dispatch(self, sink: &mut dyn CommandSink) {
        match self {
            EditCommand::SetPlayhead { bar } => sink.set_playhead(bar),
            EditCommand::SelectRange { range } => sink.select_range(range),
            EditCommand::MoveContainer {
                container_id,
                track_id,
                new_start_bar,
            } => sink.move_container(container_id, track_id, new_start_bar),
            EditCommand::CloneContainer {
                source_id,
                new_id,
                track_id,
                new_start_bar,
            } => sink.clone_container(source_id, new_id, track_id, new_start_bar),
            EditCommand::SelectContainer {
                container_id,
                track_id,
                modifiers,
            } => sink.select_container(container_id, track_id, modifiers),
            EditCommand::OpenContainerEditor { container_id, track_id } => {
                sink.open_container_editor(container_id, track_id)
            }
            EditCommand::SetContainerEnterFade { container_id, fade } => {
                sink.set_container_enter_fade(container_id, fade)
            }
            EditCommand::SetContainerExitFade { container_id, fade } => sink.set_container_exit_fade(container_id, fade),
            EditCommand::RemoveMidiNote { container_id, note_id } => sink.remove_midi_note(container_id, note_id),
            EditCommand::RemoveAutomationBreakpoint {
                container_id,
                lane_id,
                breakpoint_id,
            } => sink.remove_automation_breakpoint(container_id, lane_id, breakpoint_id),
            EditCommand::ResizeContainer {
                container_id,
                track_id,
                start_bar,
                length_bars,
            } => sink.resize_container(container_id, track_id, start_bar, length_bars),
            EditCommand::TrimContainer {
                container_id,
                track_id,
                start_bar,
                length_bars,
            } => sink.trim_container(container_id, track_id, start_bar, length_bars),
        }
    }
}

/// 记录所有命令的接收器，便于之后检查
#[derive(Debug, Default)]
pub struct CommandLog {
    commands: Vec<EditCommand>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[EditCommand] {
        &self.commands
    }

    /// 取出已记录的命令，并清空记录
    pub fn take_commands(&mut self) -> Vec<EditCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn last(&self) -> Option<&EditCommand> {
        self.commands.last()
    }
}

impl CommandSink for CommandLog {
    fn set_playhead(&mut self, bar: f64) {
        self.commands.push(EditCommand::SetPlayhead { bar });
    }

    fn select_range(&mut self, range: BarRange) {
        self.commands.push(EditCommand::SelectRange { range });
    }

    fn move_container(&mut self, container_id: ContainerId, track_id: TrackId, new_start_bar: f64) {
        self.commands.push(EditCommand::MoveContainer {
            container_id,
            track_id,
            new_start_bar,
        });
    }

    fn clone_container(
        &mut self,
        source_id: ContainerId,
        new_id: ContainerId,
        track_id: TrackId,
        new_start_bar: f64,
    ) {
        self.commands.push(EditCommand::CloneContainer {
            source_id,
            new_id,
            track_id,
            new_start_bar,
        });
    }

    fn select_container(&mut self, container_id: ContainerId, track_id: TrackId, modifiers: Modifiers) {
        self.commands.push(EditCommand::SelectContainer {
            container_id,
            track_id,
            modifiers,
        });
    }

    fn open_container_editor(&mut self, container_id: ContainerId, track_id: TrackId) {
        self.commands
            .push(EditCommand::OpenContainerEditor { container_id, track_id });
    }

    fn set_container_enter_fade(&mut self, container_id: ContainerId, fade: Option<Fade>) {
        self.commands
            .push(EditCommand::SetContainerEnterFade { container_id, fade });
    }

    fn set_container_exit_fade(&mut self, container_id: ContainerId, fade: Option<Fade>) {
        self.commands
            .push(EditCommand::SetContainerExitFade { container_id, fade });
    }

    fn remove_midi_note(&mut self, container_id: ContainerId, note_id: NoteId) {
        self.commands.push(EditCommand::RemoveMidiNote { container_id, note_id });
    }

    fn remove_automation_breakpoint(
        &mut self,
        container_id: ContainerId,
        lane_id: LaneId,
        breakpoint_id: BreakpointId,
    ) {
        self.commands.push(EditCommand::RemoveAutomationBreakpoint {
            container_id,
            lane_id,
            breakpoint_id,
        });
    }

    fn resize_container(&mut self, container_id: ContainerId, track_id: TrackId, start_bar: f64, length_bars: f64) {
        self.commands.push(EditCommand::ResizeContainer {
            container_id,
            track_id,
            start_bar,
            length_bars,
        });
    }

    fn trim_container(&mut self, container_id: ContainerId, track_id: TrackId, start_bar: f64, length_bars: f64) {
        self.commands.push(EditCommand::TrimContainer {
            container_id,
            track_id,
            start_bar,
            length_bars,
        });
    }
}
