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
    LazyLock::new(|| Regex::new(r"(?i)(?:Rendering frame|\bFrame)\s+(\d+)").unwrap());
static SAVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Finished Rendering|Writing image:?|Saved file:?)\s+(\S.*)").unwrap()
});
// Arnold: 00:00:05  1024MB         |    40% done - 12 rays/pixel
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%\s+done").unwrap());

/// Drives the `Render` batch binary.
pub struct MayaAdapter;

impl super::Adapter for MayaAdapter {
    fn application(&self) -> ApplicationType {
        ApplicationType::Maya
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
        let AppSettings::Maya(settings) = settings else {
            return Err(mismatch(self.application(), settings));
        };

        let mut args = Vec::new();
        if let Some(renderer) = settings.renderer.as_deref().filter(|r| !r.is_empty()) {
            args.extend(["-r".to_owned(), renderer.to_owned()]);
        }
        args.extend([
            "-s".to_owned(),
            unit.start().to_string(),
            "-e".to_owned(),
            unit.end().to_string(),
        ]);
        if let Some(camera) = settings.camera.as_deref().filter(|c| !c.is_empty()) {
            args.extend(["-cam".to_owned(), camera.to_owned()]);
        }
        if let Some(layer) = settings.render_layer.as_deref().filter(|l| !l.is_empty()) {
            args.extend(["-rl".to_owned(), layer.to_owned()]);
        }
        if let Some(verbose) = settings.verbose {
            args.extend(["-v".to_owned(), verbose.to_string()]);
        }
        if let Some(threads) = settings.threads.filter(|t| *t > 0) {
            args.extend(["-n".to_owned(), threads.to_string()]);
        }
        args.push(path_arg(scene)?);
        Ok(Invocation::new(executable, args))
    }

    fn parser(&self, context: ParseContext) -> Box<dyn OutputParser> {
        Box::new(LineParser::new(context, MayaRules))
    }
}

pub(crate) struct MayaRules;

impl LineRules for MayaRules {
    fn line(&mut self, state: &mut FrameState, line: &str, events: &mut Vec<RenderEvent>) {
        if let Some(saved) = SAVED.captures(line) {
            events.push(state.rendered(&saved[1]));
        } else if let Some(value) = PERCENT.captures(line).and_then(|c| c[1].parse().ok()) {
            events.push(state.progress(Some(SubProgress::Percent { value })));
        } else if let Some(frame) = FRAME.captures(line).and_then(|c| c[1].parse().ok()) {
            if state.enter(frame) {
                events.push(state.progress(None));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{test_support::*, Adapter};
    use super::*;
    use crate::models::{event::Stream, settings::MayaSettings};

    #[test]
    fn flag_value_pairs() {
        let settings = MayaSettings {
            renderer: Some("arnold".to_owned()),
            camera: Some("shotCam".to_owned()),
            render_layer: Some("beauty".to_owned()),
            verbose: Some(1),
            threads: Some(0),
        };
        let invocation = MayaAdapter
            .build_arguments(
                Path::new("/usr/autodesk/maya2025/bin/Render"),
                Path::new("/jobs/shot.mb"),
                &RenderUnit::Range { start: 1, end: 24 },
                &AppSettings::Maya(settings),
            )
            .unwrap();
        assert_eq!(
            invocation.args,
            [
                "-r",
                "arnold",
                "-s",
                "1",
                "-e",
                "24",
                "-cam",
                "shotCam",
                "-rl",
                "beauty",
                "-v",
                "1",
                "/jobs/shot.mb"
            ]
        );
    }

    #[test]
    fn arnold_progress_and_output() {
        let mut parser =
            MayaAdapter.parser(context(RenderUnit::Range { start: 1, end: 2 }, &[1, 2]));
        let events = structured(parser.parse_chunk(
            "Rendering frame 2\n00:00:05 1024MB | 40% done - 12 rays/pixel\nFinished Rendering /r/images/shot.0002.exr\n",
            Stream::Stdout,
        ));
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[1],
            RenderEvent::Progress {
                frame: Some(2),
                detail: Some(SubProgress::Percent { .. }),
                ..
            }
        ));
        assert!(matches!(events[2], RenderEvent::FrameRendered { frame: 2, .. }));
    }
}
