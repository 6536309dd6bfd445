/*
    A render job is one scene file plus the frames to render from it. The record doubles as the
    persisted queue entry, so every field tolerates being missing in older files and runtime only
    state is normalised away by `to_persisted` before saving.
*/
use super::settings::AppDefaults;
use chrono::{DateTime, Utc};
use dcc::{
    frame_range::{self, Frame},
    models::{
        engine::Engine,
        settings::{AppSettings, BlenderSettings},
    },
    scene::{self, ExistingFrame, SceneInfo},
    ApplicationType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use uuid::Uuid;

/// Per-frame durations kept for the estimate.
pub const FRAME_TIME_WINDOW: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Job {id} cannot go from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub id: String,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    #[default]
    Idle,
    Rendering,
    Paused,
    Complete,
    Error,
    #[serde(rename = "missing-app", alias = "missing-application")]
    MissingApp,
    Loading,
}

impl JobStatus {
    /// Status changes a render may make on its own. `reset` is the only way out of
    /// `Complete` and `Error`.
    pub fn can_become(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Idle, Rendering)
                | (Idle, MissingApp)
                | (Loading, Idle)
                | (Loading, MissingApp)
                | (MissingApp, Idle)
                | (Rendering, Paused)
                | (Paused, Rendering)
                | (Rendering, Complete)
                | (Rendering, Error)
                | (Paused, Error)
                | (Rendering, Idle)
                | (Paused, Idle)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Rendering | JobStatus::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
    pub percentage: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            x: 1920,
            y: 1080,
            percentage: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderJob {
    pub id: String,
    pub file_path: PathBuf,
    pub file_name: String,
    pub application_type: ApplicationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_executable_path: Option<PathBuf>,

    pub frame_ranges: String,
    pub use_custom_frame_range: bool,
    pub original_frame_start: Frame,
    pub original_frame_end: Frame,

    pub output_path: String,
    pub output_dir: String,
    /// Output file name with `#` for the frame number, e.g. `shot_####`.
    pub output_pattern: String,
    pub format: String,
    pub resolution: Resolution,
    pub fps: f32,
    pub is_video_output: bool,

    /// Typed per-application options. Unset options fall back to the application defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_settings: Option<AppSettings>,

    pub status: JobStatus,
    pub progress: f32,
    /// Frames finished in the current attempt.
    pub current_frame: usize,
    pub total_frames: usize,
    /// Seconds.
    pub elapsed_time: f64,
    /// Seconds.
    pub estimated_time_remaining: f64,
    pub last_rendered_frame: Option<PathBuf>,
    pub error: Option<String>,
    pub render_start_time: Option<DateTime<Utc>>,
    /// Seconds per frame, newest last.
    pub frame_times: Vec<f64>,
    pub rendered_frame_paths: Vec<PathBuf>,
    pub exr_layers: Vec<String>,

    // Older queue files kept these at the top level. Folded into `app_settings` on load.
    #[serde(skip_serializing)]
    render_engine: Option<String>,
    #[serde(skip_serializing)]
    take_name: Option<String>,
    #[serde(skip_serializing)]
    render_node: Option<String>,
    #[serde(skip_serializing)]
    composition: Option<String>,
    #[serde(skip_serializing)]
    render_settings_template: Option<String>,
    #[serde(skip_serializing)]
    output_module_template: Option<String>,
    #[serde(skip_serializing)]
    write_node: Option<String>,
}

impl Default for RenderJob {
    fn default() -> Self {
        Self {
            id: String::new(),
            file_path: PathBuf::new(),
            file_name: String::new(),
            application_type: ApplicationType::Blender,
            app_executable_path: None,
            frame_ranges: String::new(),
            use_custom_frame_range: false,
            original_frame_start: 1,
            original_frame_end: 250,
            output_path: String::new(),
            output_dir: String::new(),
            output_pattern: String::new(),
            format: "PNG".to_owned(),
            resolution: Resolution::default(),
            fps: 24.0,
            is_video_output: false,
            app_settings: None,
            status: JobStatus::Idle,
            progress: 0.0,
            current_frame: 0,
            total_frames: 0,
            elapsed_time: 0.0,
            estimated_time_remaining: 0.0,
            last_rendered_frame: None,
            error: None,
            render_start_time: None,
            frame_times: Vec::new(),
            rendered_frame_paths: Vec::new(),
            exr_layers: Vec::new(),
            render_engine: None,
            take_name: None,
            render_node: None,
            composition: None,
            render_settings_template: None,
            output_module_template: None,
            write_node: None,
        }
    }
}

impl RenderJob {
    /// New job for a scene. The application is inferred from the file extension.
    pub fn new(file_path: impl AsRef<Path>, application_type: ApplicationType) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut job = Self {
            id: format!("job_{}", Uuid::new_v4().simple()),
            file_path,
            file_name,
            application_type,
            ..Default::default()
        };
        job.recompute_total_frames();
        job
    }

    pub fn with_frame_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.frame_ranges = ranges.into();
        self.use_custom_frame_range = true;
        self.recompute_total_frames();
        self
    }

    pub fn with_scene_range(mut self, start: Frame, end: Frame) -> Self {
        self.original_frame_start = start;
        self.original_frame_end = end;
        self.recompute_total_frames();
        self
    }

    pub fn with_settings(mut self, settings: AppSettings) -> Self {
        self.app_settings = Some(settings);
        self
    }

    pub fn with_executable(mut self, path: impl AsRef<Path>) -> Self {
        self.app_executable_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Range text the job renders: the custom range, or the scene's own span.
    pub fn effective_range(&self) -> String {
        if self.use_custom_frame_range {
            self.frame_ranges.clone()
        } else {
            frame_range::span(self.original_frame_start, self.original_frame_end)
        }
    }

    pub fn frames(&self) -> Vec<Frame> {
        frame_range::parse(&self.effective_range())
    }

    pub fn recompute_total_frames(&mut self) {
        self.total_frames = self.frames().len();
    }

    /// Take frame span, output and format from what the scene itself says.
    pub fn apply_scene_info(&mut self, info: &SceneInfo) {
        self.original_frame_start = info.frame_start;
        self.original_frame_end = info.frame_end;
        self.fps = info.fps;
        self.output_path = info.output_path.clone();
        self.output_dir = info.output_dir.clone();
        self.output_pattern = info.output_pattern.clone();
        self.format = info.format.clone();
        self.is_video_output = info.is_video_output;
        if let Some(resolution) = info.resolution {
            self.resolution = Resolution {
                x: resolution.x,
                y: resolution.y,
                percentage: resolution.percentage,
            };
        }

        // the scene's engine unless the job already picked one
        let engine = info.render_engine.as_deref().and_then(Engine::from_name);
        if let (ApplicationType::Blender, Some(engine)) = (self.application_type, engine) {
            match &mut self.app_settings {
                Some(AppSettings::Blender(blender)) => {
                    blender.engine.get_or_insert(engine);
                }
                None => {
                    self.app_settings = Some(AppSettings::Blender(BlenderSettings {
                        engine: Some(engine),
                        ..Default::default()
                    }))
                }
                Some(_) => {}
            }
        }
        self.recompute_total_frames();
    }

    /// Frames of this job already written to its output directory.
    pub fn existing_frames(&self) -> io::Result<Vec<ExistingFrame>> {
        let output = Path::new(&self.output_path);
        let dir = match self.output_dir.as_str() {
            "" => output.parent().unwrap_or_else(|| Path::new("")),
            dir => Path::new(dir),
        };
        let pattern = match self.output_pattern.as_str() {
            "" => output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            pattern => pattern.to_owned(),
        };
        if dir.as_os_str().is_empty() {
            return Ok(Vec::new());
        }
        scene::existing_frames(dir, &pattern, &self.frames())
    }

    /// Job settings layered over the application defaults.
    pub fn effective_settings(&self, defaults: &AppDefaults) -> AppSettings {
        let base = defaults.for_app(self.application_type);
        match &self.app_settings {
            Some(settings) if settings.application() == self.application_type => {
                settings.layered_over(&base)
            }
            Some(settings) => {
                tracing::warn!(
                    job = %self.id,
                    "ignoring {} settings on a {} job",
                    settings.application(),
                    self.application_type
                );
                base
            }
            None => base,
        }
    }

    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_become(next) {
            return Err(InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(job = %self.id, "{:?} -> {:?}", self.status, next);
        self.status = next;
        Ok(())
    }

    /// Clear the runtime counters of the current attempt.
    pub fn clear_progress(&mut self) {
        self.progress = 0.0;
        self.current_frame = 0;
        self.elapsed_time = 0.0;
        self.estimated_time_remaining = 0.0;
        self.render_start_time = None;
    }

    /// Back to idle regardless of status, ready to be rendered again.
    pub fn reset(&mut self) {
        self.status = JobStatus::Idle;
        self.error = None;
        self.clear_progress();
        self.frame_times.clear();
        self.last_rendered_frame = None;
        self.rendered_frame_paths.clear();
    }

    pub fn record_frame_time(&mut self, seconds: f64) {
        self.frame_times.push(seconds);
        if self.frame_times.len() > FRAME_TIME_WINDOW {
            let excess = self.frame_times.len() - FRAME_TIME_WINDOW;
            self.frame_times.drain(..excess);
        }
    }

    pub fn mean_frame_time(&self) -> Option<f64> {
        if self.frame_times.is_empty() {
            None
        } else {
            Some(self.frame_times.iter().sum::<f64>() / self.frame_times.len() as f64)
        }
    }

    /// Record an output path once.
    pub fn add_rendered_frame(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !self.rendered_frame_paths.iter().any(|p| p == path) {
            self.rendered_frame_paths.push(path.to_path_buf());
        }
        self.last_rendered_frame = Some(path.to_path_buf());
    }

    /// Copy suitable for the queue file: runtime state dropped, unfinished work back to idle.
    pub fn to_persisted(&self) -> RenderJob {
        let complete = self.status == JobStatus::Complete;
        let mut job = self.clone();
        job.status = match self.status {
            JobStatus::Rendering | JobStatus::Paused | JobStatus::Loading => JobStatus::Idle,
            other => other,
        };
        job.progress = if complete { 100.0 } else { 0.0 };
        job.current_frame = 0;
        job.elapsed_time = 0.0;
        job.estimated_time_remaining = 0.0;
        job.render_start_time = None;
        job.frame_times.clear();
        if job.status != JobStatus::MissingApp {
            job.error = None;
        }
        if !complete {
            job.last_rendered_frame = None;
            job.rendered_frame_paths.clear();
        }
        job
    }

    /// Read a job from a queue file entry, accepting older layouts.
    pub fn from_stored(mut value: Value) -> Result<RenderJob, serde_json::Error> {
        if let Value::Object(map) = &mut value {
            let application = map
                .get("applicationType")
                .and_then(Value::as_str)
                .unwrap_or(ApplicationType::Blender.id())
                .to_owned();
            // older files stored an untagged settings bag
            if let Some(Value::Object(settings)) = map.get_mut("appSettings") {
                settings
                    .entry("application")
                    .or_insert(Value::String(application));
            }
            let broken = map
                .get("appSettings")
                .filter(|s| !s.is_null())
                .is_some_and(|s| serde_json::from_value::<AppSettings>(s.clone()).is_err());
            if broken {
                tracing::warn!("dropping unreadable appSettings from stored job");
                map.remove("appSettings");
            }
        }

        let mut job: RenderJob = serde_json::from_value(value)?;
        job.fold_legacy_fields();
        job.recompute_total_frames();
        Ok(job)
    }

    fn fold_legacy_fields(&mut self) {
        let mut settings = self
            .app_settings
            .take()
            .filter(|s| s.application() == self.application_type)
            .unwrap_or_else(|| AppSettings::empty(self.application_type));

        match &mut settings {
            AppSettings::Blender(blender) => {
                if blender.engine.is_none() {
                    blender.engine = self.render_engine.as_deref().and_then(Engine::from_name);
                }
            }
            AppSettings::Cinema4d(c4d) => {
                c4d.take = c4d.take.take().or(self.take_name.take());
            }
            AppSettings::Houdini(houdini) => {
                houdini.render_node = houdini.render_node.take().or(self.render_node.take());
            }
            AppSettings::AfterEffects(ae) => {
                ae.composition = ae.composition.take().or(self.composition.take());
                ae.render_settings = ae
                    .render_settings
                    .take()
                    .or(self.render_settings_template.take());
                ae.output_module = ae.output_module.take().or(self.output_module_template.take());
            }
            AppSettings::Nuke(nuke) => {
                nuke.write_node = nuke
                    .write_node
                    .take()
                    .or(self.write_node.take())
                    .or(self.render_node.take());
            }
            AppSettings::Maya(_) => {}
        }

        self.render_engine = None;
        self.take_name = None;
        self.render_node = None;
        self.composition = None;
        self.render_settings_template = None;
        self.output_module_template = None;
        self.write_node = None;

        if settings != AppSettings::empty(self.application_type) {
            self.app_settings = Some(settings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcc::models::settings::{AfterEffectsSettings, BlenderSettings};
    use serde_json::json;

    #[test]
    fn total_frames_follow_the_effective_range() {
        let mut job = RenderJob::new("/work/shot.blend", ApplicationType::Blender);
        assert_eq!(job.total_frames, 250);

        job = job.with_frame_ranges("1-10, 20-30, 50");
        assert_eq!(job.total_frames, 22);

        job.use_custom_frame_range = false;
        job.original_frame_end = 5;
        job.recompute_total_frames();
        assert_eq!(job.total_frames, 5);
    }

    #[test]
    fn persisted_copy_drops_runtime_state() {
        let mut job = RenderJob::new("/work/shot.blend", ApplicationType::Blender);
        job.status = JobStatus::Paused;
        job.progress = 42.0;
        job.current_frame = 3;
        job.error = Some("stale".to_owned());
        job.frame_times = vec![1.0, 2.0];
        job.add_rendered_frame("/out/0001.png");

        let saved = job.to_persisted();
        assert_eq!(saved.status, JobStatus::Idle);
        assert_eq!(saved.progress, 0.0);
        assert_eq!(saved.current_frame, 0);
        assert!(saved.error.is_none());
        assert!(saved.frame_times.is_empty());
        assert!(saved.rendered_frame_paths.is_empty());

        job.status = JobStatus::Complete;
        let saved = job.to_persisted();
        assert_eq!(saved.progress, 100.0);
        assert_eq!(saved.rendered_frame_paths.len(), 1);

        job.status = JobStatus::MissingApp;
        job.error = Some("Nuke is not installed or not found".to_owned());
        assert!(job.to_persisted().error.is_some());
    }

    #[test]
    fn legacy_entries_load() {
        let stored = json!({
            "id": "job_1",
            "filePath": "/work/promo.aep",
            "applicationType": "aftereffects",
            "composition": "Main",
            "outputModuleTemplate": "Lossless",
            "status": "missing-application",
            "appSettings": { "multiFrameRendering": true }
        });
        let job = RenderJob::from_stored(stored).unwrap();
        assert_eq!(job.status, JobStatus::MissingApp);
        assert_eq!(
            job.app_settings,
            Some(AppSettings::AfterEffects(AfterEffectsSettings {
                composition: Some("Main".to_owned()),
                output_module: Some("Lossless".to_owned()),
                multi_frame_rendering: Some(true),
                ..Default::default()
            }))
        );
        // defaults: scene span 1-250
        assert_eq!(job.total_frames, 250);
    }

    #[test]
    fn entries_without_application_are_blender() {
        let stored = json!({
            "id": "job_2",
            "filePath": "/work/old.blend",
            "renderEngine": "BLENDER_EEVEE",
            "frameRanges": "1-3",
            "useCustomFrameRange": true
        });
        let job = RenderJob::from_stored(stored).unwrap();
        assert_eq!(job.application_type, ApplicationType::Blender);
        assert_eq!(job.total_frames, 3);
        assert_eq!(
            job.app_settings,
            Some(AppSettings::Blender(BlenderSettings {
                engine: Some(Engine::Eevee),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn transitions_are_one_directional() {
        let mut job = RenderJob::new("/work/shot.blend", ApplicationType::Blender);
        job.transition(JobStatus::Rendering).unwrap();
        job.transition(JobStatus::Paused).unwrap();
        job.transition(JobStatus::Rendering).unwrap();
        job.transition(JobStatus::Complete).unwrap();
        assert!(job.transition(JobStatus::Rendering).is_err());

        job.reset();
        assert_eq!(job.status, JobStatus::Idle);
        assert!(job.transition(JobStatus::Complete).is_err());
    }

    #[test]
    fn frame_time_window_is_bounded() {
        let mut job = RenderJob::default();
        for i in 0..150 {
            job.record_frame_time(i as f64);
        }
        assert_eq!(job.frame_times.len(), FRAME_TIME_WINDOW);
        assert_eq!(job.frame_times[0], 50.0);
    }

    #[test]
    fn scene_info_fills_the_job() {
        let info = SceneInfo {
            application_type: ApplicationType::Blender,
            frame_start: 101,
            frame_end: 148,
            fps: 25.0,
            output_path: "/r/shot_####".to_owned(),
            output_dir: "/r".to_owned(),
            output_pattern: "shot_####".to_owned(),
            render_engine: Some("BLENDER_EEVEE_NEXT".to_owned()),
            resolution: Some(dcc::scene::SceneResolution {
                x: 1280,
                y: 720,
                percentage: 50,
            }),
            format: "OPEN_EXR".to_owned(),
            is_video_output: false,
            is_defaults: false,
        };
        let mut job = RenderJob::new("/work/shot.blend", ApplicationType::Blender);
        job.apply_scene_info(&info);
        assert_eq!(job.total_frames, 48);
        assert_eq!(job.effective_range(), "101-148");
        assert_eq!(job.resolution.x, 1280);
        assert_eq!(job.output_pattern, "shot_####");
        assert_eq!(
            job.app_settings,
            Some(AppSettings::Blender(BlenderSettings {
                engine: Some(Engine::EeveeNext),
                ..Default::default()
            }))
        );

        // an engine the user picked stays
        let mut job = RenderJob::new("/work/shot.blend", ApplicationType::Blender).with_settings(
            AppSettings::Blender(BlenderSettings {
                engine: Some(Engine::Cycles),
                ..Default::default()
            }),
        );
        job.apply_scene_info(&info);
        assert!(matches!(
            job.app_settings,
            Some(AppSettings::Blender(BlenderSettings {
                engine: Some(Engine::Cycles),
                ..
            }))
        ));
    }

    #[test]
    fn existing_frames_use_the_output_pattern() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("comp_0002.exr"), b"").unwrap();
        std::fs::write(dir.path().join("comp_0009.exr"), b"").unwrap();

        let mut job = RenderJob::new("/work/comp.nk", ApplicationType::Nuke).with_frame_ranges("1-3");
        assert!(job.existing_frames().unwrap().is_empty());

        job.output_path = dir.path().join("comp_####").to_string_lossy().into_owned();
        let found = job.existing_frames().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].frame, 2);
        assert_eq!(found[0].file, dir.path().join("comp_0002.exr"));
    }
}
