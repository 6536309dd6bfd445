use super::{
    mismatch, path_arg, AdapterError, FrameState, Invocation, LineParser, LineRules,
    OutputParser, ParseContext,
};
use crate::models::{
    application::ApplicationType,
    event::RenderEvent,
    settings::AppSettings,
    unit::{RenderUnit, Strategy},
};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

// Frame 12 (3 of 10)
static FRAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*Frame\s+(\d+)").unwrap());
// Writing /renders/comp.0012.exr took 1.52 seconds
static WRITING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*Writing\s+(.+?)(?:\s+took\s+[\d.]+\s+seconds?)?\s*$").unwrap()
});

/// Terminal mode render: `nuke -F start-end -x script.nk`.
pub struct NukeAdapter;

impl super::Adapter for NukeAdapter {
    fn application(&self) -> ApplicationType {
        ApplicationType::Nuke
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
        let AppSettings::Nuke(settings) = settings else {
            return Err(mismatch(self.application(), settings));
        };

        // interpreter options go before the frame range
        let mut args = Vec::new();
        if let Some(cache) = settings.cache_size.as_deref().filter(|c| !c.is_empty()) {
            args.extend(["-c".to_owned(), cache.to_owned()]);
        }
        if let Some(threads) = settings.threads.filter(|t| *t > 0) {
            args.extend(["-m".to_owned(), threads.to_string()]);
        }
        if let Some(verbose) = settings.verbose {
            args.extend(["-V".to_owned(), verbose.to_string()]);
        }
        if settings.continue_on_error == Some(true) {
            args.push("--cont".to_owned());
        }

        args.extend([
            "-F".to_owned(),
            format!("{}-{}", unit.start(), unit.end()),
            "-x".to_owned(),
        ]);
        if let Some(node) = settings.write_node.as_deref().filter(|n| !n.is_empty()) {
            args.extend(["-X".to_owned(), node.to_owned()]);
        }
        args.push(path_arg(scene)?);
        Ok(Invocation::new(executable, args))
    }

    fn parser(&self, context: ParseContext) -> Box<dyn OutputParser> {
        Box::new(LineParser::new(context, NukeRules))
    }
}

pub(crate) struct NukeRules;

impl LineRules for NukeRules {
    fn line(&mut self, state: &mut FrameState, line: &str, events: &mut Vec<RenderEvent>) {
        if let Some(frame) = FRAME.captures(line).and_then(|c| c[1].parse().ok()) {
            if state.enter(frame) {
                events.push(state.progress(None));
            }
        } else if let Some(written) = WRITING.captures(line) {
            events.push(state.rendered(&written[1]));
        }
    }
}
