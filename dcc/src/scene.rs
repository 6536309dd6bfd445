/*
    Scene details read before a file is queued.

    Blender opens the file headless and a short python script prints the scene as a single JSON
    line prefixed with `BLEND_INFO_JSON:`. The other tools have no cheap command line inspection,
    so they get fixed defaults with `is_defaults` set for the caller to confirm.
*/
use crate::{
    frame_range::Frame,
    models::application::ApplicationType,
    process::{ProcessEvent, ProcessMeta, ProcessRunner, SpawnOptions},
    Stream,
};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

pub const SCENE_INFO_MARKER: &str = "BLEND_INFO_JSON:";
/// Opening a heavy scene can take a while, a probe past this is killed.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(120);
// padding Blender uses when the output path has no '#'
const DEFAULT_PADDING: usize = 4;

const PROBE_SCRIPT: &str = r#"import bpy
import json
import os
import sys

scene = bpy.context.scene
output_path = bpy.path.abspath(scene.render.filepath)
file_format = scene.render.image_settings.file_format

info = {
    "frameStart": scene.frame_start,
    "frameEnd": scene.frame_end,
    "fps": scene.render.fps,
    "outputPath": output_path,
    "outputDir": os.path.dirname(output_path),
    "outputPattern": os.path.basename(output_path),
    "renderEngine": scene.render.engine,
    "resolution": {
        "x": scene.render.resolution_x,
        "y": scene.render.resolution_y,
        "percentage": scene.render.resolution_percentage
    },
    "format": file_format,
    "isVideoOutput": file_format in ['FFMPEG', 'AVI_JPEG', 'AVI_RAW']
}

print("BLEND_INFO_JSON:" + json.dumps(info))
sys.stdout.flush()
sys.exit(0)
"#;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Unable to write the scene probe script: {0}")]
    Script(#[from] io::Error),
    #[error("{0}")]
    Spawn(String),
    #[error("Scene probe did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Failed to get scene info: {0}")]
    NoInfo(String),
    #[error("Failed to parse scene info: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneResolution {
    pub x: u32,
    pub y: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInfo {
    pub application_type: ApplicationType,
    pub frame_start: Frame,
    pub frame_end: Frame,
    pub fps: f32,
    pub output_path: String,
    pub output_dir: String,
    pub output_pattern: String,
    pub render_engine: Option<String>,
    pub resolution: Option<SceneResolution>,
    pub format: String,
    pub is_video_output: bool,
    /// Values are placeholders, the scene itself was not read.
    pub is_defaults: bool,
}

// what the probe script prints
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlendReport {
    frame_start: Frame,
    frame_end: Frame,
    fps: f32,
    output_path: String,
    output_dir: String,
    output_pattern: String,
    render_engine: Option<String>,
    resolution: Option<SceneResolution>,
    format: String,
    #[serde(default)]
    is_video_output: bool,
}

impl From<BlendReport> for SceneInfo {
    fn from(report: BlendReport) -> Self {
        Self {
            application_type: ApplicationType::Blender,
            frame_start: report.frame_start,
            frame_end: report.frame_end,
            fps: report.fps,
            output_path: report.output_path,
            output_dir: report.output_dir,
            output_pattern: report.output_pattern,
            render_engine: report.render_engine,
            resolution: report.resolution,
            format: report.format,
            is_video_output: report.is_video_output,
            is_defaults: false,
        }
    }
}

/// Placeholder info for `scene`: frames 1-250 at 24 fps, written to `render/` beside the file.
pub fn defaults_for(application: ApplicationType, scene: &Path) -> SceneInfo {
    let stem = scene
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output_dir = scene
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join("render");
    let format = match application {
        ApplicationType::AfterEffects => "PNG",
        _ => "exr",
    };
    SceneInfo {
        application_type: application,
        frame_start: 1,
        frame_end: 250,
        fps: 24.0,
        output_path: output_dir.join(&stem).to_string_lossy().into_owned(),
        output_dir: output_dir.to_string_lossy().into_owned(),
        output_pattern: format!("{stem}_####"),
        render_engine: None,
        resolution: None,
        format: format.to_owned(),
        is_video_output: false,
        is_defaults: true,
    }
}

/// Find the probe's JSON line in captured stdout.
pub fn read_report(stdout: &str) -> Option<Result<SceneInfo, SceneError>> {
    let line = stdout
        .lines()
        .find_map(|line| line.split_once(SCENE_INFO_MARKER).map(|(_, json)| json))?;
    Some(
        serde_json::from_str::<BlendReport>(line.trim())
            .map(SceneInfo::from)
            .map_err(SceneError::from),
    )
}

// Blender prints add-on import noise on stderr that says nothing about the scene.
fn diagnostic(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.contains("addon_utils.py")
                && !line.contains("ModuleNotFoundError")
                && !line.contains("ImportError")
        })
        .collect();
    match lines.len() {
        0 => "Unknown error".to_owned(),
        n => lines[n.saturating_sub(5)..].join("\n"),
    }
}

/// Read frame span, output and format of a scene. Only Blender is actually opened.
pub async fn inspect(
    runner: &ProcessRunner,
    application: ApplicationType,
    executable: &Path,
    scene: &Path,
) -> Result<SceneInfo, SceneError> {
    if application != ApplicationType::Blender {
        return Ok(defaults_for(application, scene));
    }

    let script = std::env::temp_dir().join(format!("renderq_scene_info_{}.py", Uuid::new_v4().simple()));
    tokio::fs::write(&script, PROBE_SCRIPT).await?;

    let args = [
        PathBuf::from("-b"),
        scene.to_path_buf(),
        PathBuf::from("--python-exit-code"),
        PathBuf::from("1"),
        PathBuf::from("--python"),
        script.clone(),
    ];
    let mut handle = runner.spawn_tracked(
        executable,
        &args,
        SpawnOptions::default(),
        ProcessMeta::new("probe"),
    );

    let mut stdout = String::new();
    let mut stderr = String::new();
    let outcome = timeout(PROBE_TIMEOUT, async {
        while let Some(event) = handle.events.recv().await {
            match event {
                ProcessEvent::Output {
                    stream: Stream::Stdout,
                    text,
                } => stdout.push_str(&text),
                ProcessEvent::Output {
                    stream: Stream::Stderr,
                    text,
                } => stderr.push_str(&text),
                ProcessEvent::Exited { .. } => return Ok(()),
                ProcessEvent::Failed(message) => return Err(SceneError::Spawn(message)),
            }
        }
        Ok(())
    })
    .await;

    if outcome.is_err() {
        tracing::warn!(scene = %scene.display(), "scene probe timed out");
        let _ = runner.terminate(handle.id, true).await;
    }
    if let Err(e) = tokio::fs::remove_file(&script).await {
        tracing::debug!("could not remove {}: {e}", script.display());
    }
    runner.discard(&handle.id);

    outcome.map_err(|_| SceneError::Timeout(PROBE_TIMEOUT))??;
    match read_report(&stdout) {
        Some(info) => info,
        None => Err(SceneError::NoInfo(diagnostic(&stderr))),
    }
}

/// A frame already present in the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingFrame {
    pub frame: Frame,
    pub file: PathBuf,
}

/// Frames of `frames` that already have a file in `output_dir`.
///
/// `pattern` is the output file name with `#` standing for the zero padded frame number, e.g.
/// `shot_####`. The text before the first `#` must prefix the file name, followed by the frame
/// number and then anything but another digit. A missing directory has no frames.
pub fn existing_frames(
    output_dir: &Path,
    pattern: &str,
    frames: &[Frame],
) -> io::Result<Vec<ExistingFrame>> {
    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let (prefix, padding) = match pattern.find('#') {
        Some(start) => {
            let hashes = pattern[start..].chars().take_while(|c| *c == '#').count();
            (&pattern[..start], hashes)
        }
        None => (pattern, DEFAULT_PADDING),
    };

    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let mut found = Vec::new();
    for &frame in frames {
        let number = format!("{frame:0padding$}");
        let hit = names.iter().find(|name| {
            name.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix(number.as_str()))
                .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
        });
        if let Some(name) = hit {
            found.push(ExistingFrame {
                frame,
                file: output_dir.join(name),
            });
        }
    }
    Ok(found)
}
