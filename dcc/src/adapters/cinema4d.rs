use super::{
    mismatch, path_arg, AdapterError, FrameState, Invocation, LineParser, LineRules,
    OutputParser, ParseContext,
};
use crate::models::{
    application::ApplicationType,
    event::{RenderEvent, SubProgress},
    settings::AppSettings,
    unit::{RenderUnit, Strategy},
};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

static FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Rendering frame\s+(\d+)").unwrap());
static SAVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Saved|Writing):\s*(.+)").unwrap());
static PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Progress:?\s*(\d+(?:\.\d+)?)\s*%").unwrap());

/// Drives `Commandline` (or the combined binary) with `-render`.
pub struct Cinema4dAdapter;

impl super::Adapter for Cinema4dAdapter {
    fn application(&self) -> ApplicationType {
        ApplicationType::Cinema4d
    }

    fn strategy(&self) -> Strategy {
        Strategy::Range
    }

    fn build_arguments(
        &self,
        executable: &Path,
        scene: &Path,
        unit: &RenderUnit,
        settings: &AppSettings,
    ) -> Result<Invocation, AdapterError> {
        let AppSettings::Cinema4d(settings) = settings else {
            return Err(mismatch(self.application(), settings));
        };

        let mut args = Vec::new();
        if settings.no_gui != Some(false) {
            args.push("-nogui".to_owned());
        }
        args.extend([
            "-render".to_owned(),
            path_arg(scene)?,
            "-frame".to_owned(),
            unit.start().to_string(),
            unit.end().to_string(),
            "1".to_owned(),
        ]);
        if let Some(threads) = settings.threads.filter(|t| *t > 0) {
            args.extend(["-threads".to_owned(), threads.to_string()]);
        }
        if let Some(take) = settings.take.as_deref().filter(|t| !t.is_empty()) {
            args.extend(["-take".to_owned(), take.to_owned()]);
        }
        Ok(Invocation::new(executable, args))
    }

    fn parser(&self, context: ParseContext) -> Box<dyn OutputParser> {
        Box::new(LineParser::new(context, Cinema4dRules))
    }
}

pub(crate) struct Cinema4dRules;

impl LineRules for Cinema4dRules {
    fn line(&mut self, state: &mut FrameState, line: &str, events: &mut Vec<RenderEvent>) {
        if let Some(frame) = FRAME.captures(line).and_then(|c| c[1].parse().ok()) {
            if state.enter(frame) {
                events.push(state.progress(None));
            }
        } else if let Some(saved) = SAVED.captures(line) {
            events.push(state.rendered(&saved[1]));
        } else if let Some(value) = PROGRESS.captures(line).and_then(|c| c[1].parse().ok()) {
            events.push(state.progress(Some(SubProgress::Percent { value })));
        }
    }
}
