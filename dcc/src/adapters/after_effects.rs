/*
    aerender renders whatever sits in the project's render queue unless `-comp` names a
    composition, so frame numbers here are inferred from the progress lines and are a best effort
    mapping. The process also exits 0 when the queue was empty, which is reported as an error.
*/
use super::{
    exit_events, mismatch, path_arg, AdapterError, FrameState, Invocation, LineParser, LineRules,
    OutputParser, ParseContext,
};
use crate::{
    frame_range::Frame,
    models::{
        application::ApplicationType,
        event::RenderEvent,
        settings::AppSettings,
        unit::{RenderUnit, Strategy},
    },
};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

// PROGRESS:  0;00;00;04 (5): 1 Seconds
static PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PROGRESS:\s+[\d:;]+\s+\((\d+)\)").unwrap());
static WRITING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Writing:\s*(.+)").unwrap());
static FINISHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Finished Composition:\s*(.+)|PROGRESS:\s+Finished composition)").unwrap()
});

pub struct AfterEffectsAdapter;

fn composition(settings: &AppSettings) -> Option<&str> {
    match settings {
        AppSettings::AfterEffects(ae) => ae.composition.as_deref().filter(|c| !c.trim().is_empty()),
        _ => None,
    }
}

impl super::Adapter for AfterEffectsAdapter {
    fn application(&self) -> ApplicationType {
        ApplicationType::AfterEffects
    }

    fn strategy(&self) -> Strategy {
        Strategy::Range
    }

    // Without a composition the whole project queue renders in one go.
    fn units(&self, frames: &[Frame], settings: &AppSettings) -> Vec<RenderUnit> {
        if composition(settings).is_some() {
            return crate::frame_range::runs(frames)
                .into_iter()
                .map(|(start, end)| RenderUnit::Range { start, end })
                .collect();
        }
        match (frames.first(), frames.last()) {
            (Some(&start), Some(&end)) => vec![RenderUnit::Range { start, end }],
            _ => Vec::new(),
        }
    }

    fn build_arguments(
        &self,
        executable: &Path,
        scene: &Path,
        unit: &RenderUnit,
        settings: &AppSettings,
    ) -> Result<Invocation, AdapterError> {
        let AppSettings::AfterEffects(ae) = settings else {
            return Err(mismatch(self.application(), settings));
        };

        let mut args = vec!["-project".to_owned(), path_arg(scene)?];
        if let Some(comp) = composition(settings) {
            args.extend([
                "-comp".to_owned(),
                comp.to_owned(),
                "-s".to_owned(),
                unit.start().to_string(),
                "-e".to_owned(),
                unit.end().to_string(),
            ]);
        }
        if let Some(template) = ae.render_settings.as_deref().filter(|t| !t.is_empty()) {
            args.extend(["-RStemplate".to_owned(), template.to_owned()]);
        }
        if let Some(template) = ae.output_module.as_deref().filter(|t| !t.is_empty()) {
            args.extend(["-OMtemplate".to_owned(), template.to_owned()]);
        }
        if ae.multi_frame_rendering == Some(true) {
            let percent = ae.max_cpu_percent.unwrap_or(100).clamp(1, 100);
            args.extend(["-mfr".to_owned(), "ON".to_owned(), percent.to_string()]);
        }
        args.extend(["-v".to_owned(), "ERRORS_AND_PROGRESS".to_owned()]);
        Ok(Invocation::new(executable, args))
    }

    fn parser(&self, context: ParseContext) -> Box<dyn OutputParser> {
        Box::new(LineParser::new(context, AfterEffectsRules::default()))
    }
}

#[derive(Default)]
pub(crate) struct AfterEffectsRules {
    saw_artifact: bool,
    // the project render passed onto a frame the job does not ask for
    in_gap: bool,
}

impl LineRules for AfterEffectsRules {
    fn line(&mut self, state: &mut FrameState, line: &str, events: &mut Vec<RenderEvent>) {
        if let Some(written) = WRITING.captures(line) {
            self.saw_artifact = true;
            if !self.in_gap {
                events.push(state.rendered(&written[1]));
            }
        } else if let Some(finished) = FINISHED.captures(line) {
            self.saw_artifact = true;
            if let Some(output) = finished.get(1) {
                events.push(state.rendered(output.as_str()));
            }
        } else if let Some(count) = PROGRESS
            .captures(line)
            .and_then(|c| c[1].parse::<Frame>().ok())
        {
            // count is 1 based within the render
            let frame = state.context.unit.start() + count.saturating_sub(1);
            self.in_gap = !state.enter(frame);
            if !self.in_gap {
                events.push(state.progress(None));
            }
        }
    }

    fn exit(&mut self, state: &FrameState, exit_code: Option<i32>) -> Vec<RenderEvent> {
        match exit_code {
            None | Some(0) if !self.saw_artifact => vec![RenderEvent::Error {
                message: "aerender exited successfully but rendered nothing. Check the project's render queue or the composition name".to_owned(),
                exit_code,
            }],
            _ => exit_events(exit_code, state.last_line()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{test_support::*, Adapter};
    use super::*;
    use crate::models::{event::Stream, settings::AfterEffectsSettings};
    use std::path::PathBuf;

    fn args(settings: AfterEffectsSettings) -> Vec<String> {
        AfterEffectsAdapter
            .build_arguments(
                Path::new("aerender"),
                Path::new("/jobs/promo.aep"),
                &RenderUnit::Range { start: 0, end: 99 },
                &AppSettings::AfterEffects(settings),
            )
            .unwrap()
            .args
    }

    #[test]
    fn project_wide_without_composition() {
        assert_eq!(
            args(AfterEffectsSettings::default()),
            ["-project", "/jobs/promo.aep", "-v", "ERRORS_AND_PROGRESS"]
        );

        let settings = AppSettings::AfterEffects(AfterEffectsSettings::default());
        assert_eq!(
            AfterEffectsAdapter.units(&[1, 2, 3, 10], &settings),
            vec![RenderUnit::Range { start: 1, end: 10 }]
        );
    }

    #[test]
    fn composition_enables_frame_flags() {
        let settings = AfterEffectsSettings {
            composition: Some("Main Comp".to_owned()),
            render_settings: Some("Best Settings".to_owned()),
            output_module: Some("Lossless".to_owned()),
            multi_frame_rendering: Some(true),
            max_cpu_percent: Some(80),
        };
        assert_eq!(
            args(settings),
            [
                "-project",
                "/jobs/promo.aep",
                "-comp",
                "Main Comp",
                "-s",
                "0",
                "-e",
                "99",
                "-RStemplate",
                "Best Settings",
                "-OMtemplate",
                "Lossless",
                "-mfr",
                "ON",
                "80",
                "-v",
                "ERRORS_AND_PROGRESS"
            ]
        );
    }

    #[test]
    fn silent_success_is_an_error() {
        let mut parser =
            AfterEffectsAdapter.parser(context(RenderUnit::Range { start: 0, end: 9 }, &[0, 9]));
        parser.parse_chunk("aerender version 24.0\nPROGRESS: Launching\n", Stream::Stdout);
        let events = parser.finish(Some(0));
        assert!(matches!(
            events.as_slice(),
            [RenderEvent::Error {
                exit_code: Some(0),
                ..
            }]
        ));
    }

    #[test]
    fn progress_maps_to_frames() {
        let frames: Vec<Frame> = (10..=19).collect();
        let mut parser = AfterEffectsAdapter
            .parser(context(RenderUnit::Range { start: 10, end: 19 }, &frames));
        let events = structured(parser.parse_chunk(
            "PROGRESS:  0;00;00;02 (3): 0 Seconds\nWriting: /out/promo_00012.png\nPROGRESS: Finished composition \"Main\"\n",
            Stream::Stdout,
        ));
        assert!(matches!(
            events[0],
            RenderEvent::Progress {
                frame: Some(12),
                frame_index: Some(2),
                ..
            }
        ));
        assert_eq!(
            events[1],
            RenderEvent::FrameRendered {
                frame: 12,
                output: PathBuf::from("/out/promo_00012.png"),
                frame_index: Some(2),
                total_frames: 10,
            }
        );
        assert_eq!(parser.finish(Some(0)), vec![RenderEvent::Complete]);
    }

    #[test]
    fn project_render_skips_frames_outside_the_job() {
        let mut parser = AfterEffectsAdapter
            .parser(context(RenderUnit::Range { start: 1, end: 10 }, &[1, 2, 3, 10]));
        let events = structured(parser.parse_chunk(
            "PROGRESS:  0;00;00;02 (3): 0 Seconds\n\
             Writing: /out/promo_0003.png\n\
             PROGRESS:  0;00;00;04 (5): 0 Seconds\n\
             Writing: /out/promo_0005.png\n\
             PROGRESS:  0;00;00;09 (10): 0 Seconds\n\
             Writing: /out/promo_0010.png\n",
            Stream::Stdout,
        ));
        let rendered: Vec<(Frame, PathBuf)> = events
            .iter()
            .filter_map(|e| match e {
                RenderEvent::FrameRendered { frame, output, .. } => Some((*frame, output.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            rendered,
            [
                (3, PathBuf::from("/out/promo_0003.png")),
                (10, PathBuf::from("/out/promo_0010.png")),
            ]
        );
        assert!(events.iter().all(|e| !matches!(
            e,
            RenderEvent::Progress { frame: Some(5), .. }
        )));
        assert_eq!(parser.finish(Some(0)), vec![RenderEvent::Complete]);
    }
}
