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

pub const DEFAULT_RENDER_NODE: &str = "/out/mantra1";

static FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Rendering frame|Frame)\s+(\d+)").unwrap());
static SAVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Writing image to|Saving):\s*(.+)").unwrap());
static ALF_PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ALF_PROGRESS\s+(\d+(?:\.\d+)?)%").unwrap());

/// Runs `hbatch -c "render -f start end <node>" scene.hip`.
pub struct HoudiniAdapter;

impl super::Adapter for HoudiniAdapter {
    fn application(&self) -> ApplicationType {
        ApplicationType::Houdini
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
        let AppSettings::Houdini(settings) = settings else {
            return Err(mismatch(self.application(), settings));
        };

        let node = settings
            .render_node
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_RENDER_NODE);

        let mut command = String::from("render");
        if let Some(verbose) = settings.verbose {
            command.push_str(&format!(" -V {verbose}"));
        }
        command.push_str(&format!(" -f {} {} {node}", unit.start(), unit.end()));

        let mut args = Vec::new();
        if let Some(threads) = settings.threads.filter(|t| *t > 0) {
            args.extend(["-j".to_owned(), threads.to_string()]);
        }
        args.extend(["-c".to_owned(), command, path_arg(scene)?]);
        Ok(Invocation::new(executable, args))
    }

    fn parser(&self, context: ParseContext) -> Box<dyn OutputParser> {
        Box::new(LineParser::new(context, HoudiniRules))
    }
}

pub(crate) struct HoudiniRules;

impl LineRules for HoudiniRules {
    fn line(&mut self, state: &mut FrameState, line: &str, events: &mut Vec<RenderEvent>) {
        if let Some(saved) = SAVED.captures(line) {
            events.push(state.rendered(&saved[1]));
        } else if let Some(frame) = FRAME.captures(line).and_then(|c| c[1].parse().ok()) {
            if state.enter(frame) {
                events.push(state.progress(None));
            }
        } else if let Some(value) = ALF_PROGRESS.captures(line).and_then(|c| c[1].parse().ok()) {
            events.push(state.progress(Some(SubProgress::Percent { value })));
        }
    }
}
