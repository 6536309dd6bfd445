/*
    Blender is rendered one frame per process.

    Cycles device selection lives in user preferences, which `-b` with factory startup does not
    load. A small python script passed with `--python` sets the compute backend and the scene's
    sample count after the blend file is opened and before `-f` triggers the render.
*/
use super::{
    mismatch, path_arg, AdapterError, FrameState, Invocation, LineParser, LineRules,
    OutputParser, ParseContext, SupportFile,
};
use crate::models::{
    application::ApplicationType,
    event::{RenderEvent, SubProgress},
    settings::{AppSettings, BlenderSettings},
    unit::{RenderUnit, Strategy},
};
use regex::Regex;
use std::{path::Path, sync::LazyLock};
use uuid::Uuid;

static SAVED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Saved:\s*'?([^'\n]+)'?").unwrap());
static SAMPLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Sample\s+(\d+)/(\d+)").unwrap());
static TILES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Rendered\s+(\d+)/(\d+)\s+Tiles").unwrap());
static FRA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Fra:\s*(\d+)").unwrap());

pub struct BlenderAdapter;

// python run after the blend file is loaded
fn device_script(settings: &BlenderSettings) -> Option<String> {
    if settings.cycles_device.is_none() && settings.samples.is_none() {
        return None;
    }

    let mut script = String::from("import bpy\n");
    if let Some(device) = settings.cycles_device {
        script.push_str(&format!(
            "prefs = bpy.context.preferences.addons['cycles'].preferences\n\
             prefs.compute_device_type = '{}'\n\
             prefs.get_devices()\n\
             for device in prefs.devices:\n    device.use = True\n",
            device.compute_device_type()
        ));
    }
    script.push_str("for scene in bpy.data.scenes:\n");
    if let Some(device) = settings.cycles_device {
        let target = if device.is_gpu() { "GPU" } else { "CPU" };
        script.push_str(&format!("    scene.cycles.device = '{target}'\n"));
    }
    if let Some(samples) = settings.samples {
        script.push_str(&format!("    scene.cycles.samples = {samples}\n"));
    }
    Some(script)
}

impl super::Adapter for BlenderAdapter {
    fn application(&self) -> ApplicationType {
        ApplicationType::Blender
    }

    fn strategy(&self) -> Strategy {
        Strategy::PerFrame
    }

    fn build_arguments(
        &self,
        executable: &Path,
        scene: &Path,
        unit: &RenderUnit,
        settings: &AppSettings,
    ) -> Result<Invocation, AdapterError> {
        let AppSettings::Blender(settings) = settings else {
            return Err(mismatch(self.application(), settings));
        };

        let mut args = vec!["-b".to_owned(), path_arg(scene)?];
        if let Some(engine) = settings.engine {
            args.extend(["-E".to_owned(), engine.to_string()]);
        }
        if let Some(threads) = settings.threads {
            args.extend(["-t".to_owned(), threads.to_string()]);
        }
        if let Some(output) = &settings.output_path {
            args.extend(["-o".to_owned(), path_arg(output)?]);
        }
        if let Some(format) = settings.format {
            args.extend([
                "-F".to_owned(),
                format.to_string(),
                "-x".to_owned(),
                "1".to_owned(),
            ]);
        }

        let mut support_files = Vec::new();
        if let Some(contents) = device_script(settings) {
            let path = std::env::temp_dir().join(format!("renderq_blender_{}.py", Uuid::new_v4()));
            args.extend(["--python".to_owned(), path_arg(&path)?]);
            support_files.push(SupportFile { path, contents });
        }

        match unit {
            RenderUnit::Frame(frame) => args.extend(["-f".to_owned(), frame.to_string()]),
            RenderUnit::Range { start, end } => args.extend([
                "-s".to_owned(),
                start.to_string(),
                "-e".to_owned(),
                end.to_string(),
                "-a".to_owned(),
            ]),
        }

        let mut invocation = Invocation::new(executable, args);
        invocation.support_files = support_files;
        Ok(invocation)
    }

    fn parser(&self, context: ParseContext) -> Box<dyn OutputParser> {
        Box::new(LineParser::new(context, BlenderRules))
    }
}

pub(crate) struct BlenderRules;

impl LineRules for BlenderRules {
    fn line(&mut self, state: &mut FrameState, line: &str, events: &mut Vec<RenderEvent>) {
        if let Some(frame) = FRA
            .captures(line)
            .and_then(|c| c[1].parse().ok())
        {
            state.enter(frame);
        }

        if let Some(saved) = SAVED.captures(line) {
            events.push(state.rendered(&saved[1]));
        } else if let Some(sample) = SAMPLE.captures(line) {
            if let (Ok(current), Ok(total)) = (sample[1].parse(), sample[2].parse()) {
                events.push(state.progress(Some(SubProgress::Samples { current, total })));
            }
        } else if let Some(tiles) = TILES.captures(line) {
            if let (Ok(current), Ok(total)) = (tiles[1].parse(), tiles[2].parse()) {
                events.push(state.progress(Some(SubProgress::Tiles { current, total })));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{test_support::*, Adapter};
    use super::*;
    use crate::models::{device::Device, engine::Engine, event::Stream, format::Format};
    use std::path::PathBuf;

    fn blender(settings: BlenderSettings, unit: RenderUnit) -> Invocation {
        BlenderAdapter
            .build_arguments(
                Path::new("/opt/blender/blender"),
                Path::new("/work/shot.blend"),
                &unit,
                &AppSettings::Blender(settings),
            )
            .unwrap()
    }

    #[test]
    fn minimal_frame_invocation() {
        let invocation = blender(BlenderSettings::default(), RenderUnit::Frame(7));
        assert_eq!(invocation.args, ["-b", "/work/shot.blend", "-f", "7"]);
        assert!(invocation.support_files.is_empty());
    }

    #[test]
    fn engine_threads_and_format_precede_the_frame() {
        let settings = BlenderSettings {
            engine: Some(Engine::Eevee),
            threads: Some(8),
            output_path: Some(PathBuf::from("/renders/shot_####")),
            format: Some(Format::OpenExr),
            ..Default::default()
        };
        let invocation = blender(settings, RenderUnit::Frame(1));
        assert_eq!(
            invocation.args,
            [
                "-b",
                "/work/shot.blend",
                "-E",
                "BLENDER_EEVEE",
                "-t",
                "8",
                "-o",
                "/renders/shot_####",
                "-F",
                "OPEN_EXR",
                "-x",
                "1",
                "-f",
                "1"
            ]
        );
    }

    #[test]
    fn device_selection_injects_a_script() {
        let settings = BlenderSettings {
            cycles_device: Some(Device::OPTIX),
            samples: Some(256),
            ..Default::default()
        };
        let invocation = blender(settings, RenderUnit::Frame(3));
        let python = invocation
            .args
            .iter()
            .position(|a| a == "--python")
            .unwrap();
        let frame = invocation.args.iter().position(|a| a == "-f").unwrap();
        assert!(python < frame);

        let script = &invocation.support_files[0];
        assert_eq!(invocation.args[python + 1], script.path.to_str().unwrap());
        assert!(script.contents.contains("compute_device_type = 'OPTIX'"));
        assert!(script.contents.contains("scene.cycles.device = 'GPU'"));
        assert!(script.contents.contains("scene.cycles.samples = 256"));
    }

    #[test]
    fn range_unit_uses_animation_flags() {
        let invocation = blender(
            BlenderSettings::default(),
            RenderUnit::Range { start: 1, end: 4 },
        );
        assert_eq!(
            invocation.args,
            ["-b", "/work/shot.blend", "-s", "1", "-e", "4", "-a"]
        );
    }

    #[test]
    fn rejects_foreign_settings() {
        let result = BlenderAdapter.build_arguments(
            Path::new("blender"),
            Path::new("shot.blend"),
            &RenderUnit::Frame(1),
            &AppSettings::empty(ApplicationType::Maya),
        );
        assert!(matches!(result, Err(AdapterError::SettingsMismatch { .. })));
    }

    #[test]
    fn parses_samples_tiles_and_saved() {
        let mut parser = BlenderAdapter.parser(context(RenderUnit::Frame(2), &[1, 2, 3]));
        let events = structured(parser.parse_chunk(
            "Fra:2 Mem:12.00M | Sample 32/128\nFra:2 | Rendered 3/16 Tiles\nSaved: '/tmp/out_0002.png'\n",
            Stream::Stdout,
        ));
        assert_eq!(
            events,
            vec![
                RenderEvent::Progress {
                    frame: Some(2),
                    detail: Some(SubProgress::Samples {
                        current: 32,
                        total: 128
                    }),
                    frame_index: Some(1),
                    total_frames: 3,
                },
                RenderEvent::Progress {
                    frame: Some(2),
                    detail: Some(SubProgress::Tiles {
                        current: 3,
                        total: 16
                    }),
                    frame_index: Some(1),
                    total_frames: 3,
                },
                RenderEvent::FrameRendered {
                    frame: 2,
                    output: PathBuf::from("/tmp/out_0002.png"),
                    frame_index: Some(1),
                    total_frames: 3,
                },
            ]
        );
    }

    #[test]
    fn raw_output_follows_structured_events() {
        let mut parser = BlenderAdapter.parser(context(RenderUnit::Frame(1), &[1]));
        let events = parser.parse_chunk("Saved: 'a.png'\n", Stream::Stdout);
        assert!(matches!(events[0], RenderEvent::FrameRendered { .. }));
        assert!(matches!(events[1], RenderEvent::RawOutput { .. }));
    }

    #[test]
    fn failure_carries_last_line() {
        let mut parser = BlenderAdapter.parser(context(RenderUnit::Frame(1), &[1]));
        parser.parse_chunk("Error: File format is not supported\n", Stream::Stderr);
        let events = parser.finish(Some(1));
        assert_eq!(
            events,
            vec![RenderEvent::Error {
                message: "Render process exited with code 1: Error: File format is not supported"
                    .to_owned(),
                exit_code: Some(1),
            }]
        );
    }
}
