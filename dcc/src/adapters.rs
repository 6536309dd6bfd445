/*
    An adapter knows two things about one tool: how to spell "render these frames of this scene"
    on its command line, and how to read the text it prints while doing so. None of these tools
    offer a structured progress protocol, so the parsers are line based pattern matchers kept
    separate per tool.
*/
use crate::{
    frame_range::{self, Frame},
    models::{
        application::ApplicationType,
        event::{RenderEvent, Stream, SubProgress},
        installation::Installation,
        settings::AppSettings,
        unit::{RenderUnit, Strategy},
    },
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

pub mod after_effects;
pub mod blender;
pub mod cinema4d;
pub mod houdini;
pub mod maya;
pub mod nuke;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{adapter} adapter was given {found} settings")]
    SettingsMismatch {
        adapter: ApplicationType,
        found: ApplicationType,
    },
    #[error("Path cannot be passed on the command line: {0:?}")]
    InvalidPath(PathBuf),
}

/// A file the adapter needs on disk for the duration of the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportFile {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub support_files: Vec<SupportFile>,
}

impl Invocation {
    pub fn new(program: &Path, args: Vec<String>) -> Self {
        Self {
            program: program.to_path_buf(),
            args,
            support_files: Vec::new(),
        }
    }
}

/// What a parser needs to know about the invocation it is reading.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub unit: RenderUnit,
    /// The job's whole frame sequence, ascending.
    pub frames: Arc<[Frame]>,
}

impl ParseContext {
    pub fn new(unit: RenderUnit, frames: Arc<[Frame]>) -> Self {
        Self { unit, frames }
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn index_of(&self, frame: Frame) -> Option<usize> {
        self.frames.binary_search(&frame).ok()
    }
}

/// Incremental reader of one process's output.
pub trait OutputParser: Send {
    /// Structured events first, then the chunk itself as `RawOutput`.
    fn parse_chunk(&mut self, text: &str, stream: Stream) -> Vec<RenderEvent>;

    /// Called once with the exit code. `None` means the process was killed by a signal.
    fn finish(&mut self, exit_code: Option<i32>) -> Vec<RenderEvent>;
}

pub trait Adapter: Send + Sync {
    fn application(&self) -> ApplicationType;

    fn strategy(&self) -> Strategy;

    /// Non-interactive binary when the installation ships one.
    fn executable<'a>(&self, installation: &'a Installation) -> &'a Path {
        installation.batch_executable()
    }

    /// Split the remaining frames into process invocations.
    fn units(&self, frames: &[Frame], _settings: &AppSettings) -> Vec<RenderUnit> {
        match self.strategy() {
            Strategy::PerFrame => frames.iter().copied().map(RenderUnit::Frame).collect(),
            Strategy::Range => frame_range::runs(frames)
                .into_iter()
                .map(|(start, end)| RenderUnit::Range { start, end })
                .collect(),
        }
    }

    fn build_arguments(
        &self,
        executable: &Path,
        scene: &Path,
        unit: &RenderUnit,
        settings: &AppSettings,
    ) -> Result<Invocation, AdapterError>;

    fn parser(&self, context: ParseContext) -> Box<dyn OutputParser>;
}

pub fn adapter_for(application: ApplicationType) -> &'static dyn Adapter {
    match application {
        ApplicationType::Blender => &blender::BlenderAdapter,
        ApplicationType::Cinema4d => &cinema4d::Cinema4dAdapter,
        ApplicationType::Houdini => &houdini::HoudiniAdapter,
        ApplicationType::AfterEffects => &after_effects::AfterEffectsAdapter,
        ApplicationType::Nuke => &nuke::NukeAdapter,
        ApplicationType::Maya => &maya::MayaAdapter,
    }
}

pub(crate) fn mismatch(adapter: ApplicationType, settings: &AppSettings) -> AdapterError {
    AdapterError::SettingsMismatch {
        adapter,
        found: settings.application(),
    }
}

pub(crate) fn path_arg(path: &Path) -> Result<String, AdapterError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| AdapterError::InvalidPath(path.to_path_buf()))
}

/// Splits chunks into complete lines, holding back a trailing partial line.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(index) = self.partial.find(['\n', '\r']) {
            let line: String = self.partial.drain(..=index).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_owned());
            }
        }
        lines
    }

    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        (!rest.trim().is_empty()).then_some(rest)
    }
}

/// Where the parser thinks the tool currently is.
#[derive(Debug)]
pub(crate) struct FrameState {
    pub context: ParseContext,
    pub current: Frame,
    last_line: Option<String>,
}

impl FrameState {
    fn new(context: ParseContext) -> Self {
        let current = context.unit.start();
        Self {
            context,
            current,
            last_line: None,
        }
    }

    /// Move to `frame` when it belongs to this invocation and to the job's sequence.
    pub fn enter(&mut self, frame: Frame) -> bool {
        if self.context.unit.contains(frame) && self.context.index_of(frame).is_some() {
            self.current = frame;
            true
        } else {
            false
        }
    }

    pub fn progress(&self, detail: Option<SubProgress>) -> RenderEvent {
        RenderEvent::Progress {
            frame: Some(self.current),
            detail,
            frame_index: self.context.index_of(self.current),
            total_frames: self.context.total_frames(),
        }
    }

    pub fn rendered(&self, output: &str) -> RenderEvent {
        RenderEvent::FrameRendered {
            frame: self.current,
            output: PathBuf::from(output.trim().trim_matches(['\'', '"'])),
            frame_index: self.context.index_of(self.current),
            total_frames: self.context.total_frames(),
        }
    }

    /// Last non-empty line seen on either stream.
    pub fn last_line(&self) -> Option<&str> {
        self.last_line.as_deref()
    }
}

/// Exit handling shared by every tool: zero or a signal is success.
pub(crate) fn exit_events(exit_code: Option<i32>, last_line: Option<&str>) -> Vec<RenderEvent> {
    match exit_code {
        None | Some(0) => vec![RenderEvent::Complete],
        Some(code) => {
            let message = match last_line {
                Some(line) => format!("Render process exited with code {code}: {}", line.trim()),
                None => format!("Render process exited with code {code}"),
            };
            vec![RenderEvent::Error {
                message,
                exit_code: Some(code),
            }]
        }
    }
}

/// Per-tool pattern matching over complete lines.
pub(crate) trait LineRules: Send {
    fn line(&mut self, state: &mut FrameState, line: &str, events: &mut Vec<RenderEvent>);

    fn exit(&mut self, state: &FrameState, exit_code: Option<i32>) -> Vec<RenderEvent> {
        exit_events(exit_code, state.last_line())
    }
}

pub(crate) struct LineParser<R> {
    state: FrameState,
    rules: R,
    stdout: LineBuffer,
    stderr: LineBuffer,
}

impl<R: LineRules> LineParser<R> {
    pub fn new(context: ParseContext, rules: R) -> Self {
        Self {
            state: FrameState::new(context),
            rules,
            stdout: LineBuffer::default(),
            stderr: LineBuffer::default(),
        }
    }

    fn feed(&mut self, line: &str, events: &mut Vec<RenderEvent>) {
        self.state.last_line = Some(line.trim().to_owned());
        self.rules.line(&mut self.state, line, events);
    }
}

impl<R: LineRules> OutputParser for LineParser<R> {
    fn parse_chunk(&mut self, text: &str, stream: Stream) -> Vec<RenderEvent> {
        let lines = match stream {
            Stream::Stdout => self.stdout.push(text),
            Stream::Stderr => self.stderr.push(text),
        };
        let mut events = Vec::new();
        for line in lines {
            self.feed(&line, &mut events);
        }
        events.push(RenderEvent::RawOutput {
            text: text.to_owned(),
            stream,
        });
        events
    }

    fn finish(&mut self, exit_code: Option<i32>) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        let rest: Vec<String> = [self.stdout.flush(), self.stderr.flush()]
            .into_iter()
            .flatten()
            .collect();
        for line in rest {
            self.feed(&line, &mut events);
        }
        events.extend(self.rules.exit(&self.state, exit_code));
        events
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn context(unit: RenderUnit, frames: &[Frame]) -> ParseContext {
        ParseContext::new(unit, Arc::from(frames))
    }

    /// Drop raw output so assertions only look at structured events.
    pub fn structured(events: Vec<RenderEvent>) -> Vec<RenderEvent> {
        events
            .into_iter()
            .filter(|e| !matches!(e, RenderEvent::RawOutput { .. }))
            .collect()
    }
}
