use super::{
    event_sink::EventSink,
    session::{RenderPlan, RenderSession, SessionError, SessionUpdate},
};
use crate::{
    domains::job_store::{JobStore, JobStoreError},
    models::{
        event::QueueEvent,
        job::{InvalidTransition, JobStatus, RenderJob},
        settings::Settings,
    },
};
use chrono::Utc;
use dcc::{
    adapter_for,
    frame_range::{self, Frame, FrameRangeError},
    scene::{self, ExistingFrame, SceneError, SceneInfo},
    AppSettings, ApplicationType, DiscoveryError, InstallationProvider, ProcessRunner,
};
use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job {0} not found")]
    NotFound(String),
    #[error("Job {0} is being rendered")]
    JobActive(String),
    #[error("Position {index} is outside a queue of {len} jobs")]
    OutOfBounds { index: usize, len: usize },
    #[error("Invalid frame range for job {id}: {source}")]
    FrameRange {
        id: String,
        source: FrameRangeError,
    },
    #[error("Job {0} has no frames to render")]
    NoFrames(String),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("Unable to read the output directory: {0}")]
    Output(#[from] std::io::Error),
}

/// Fields of a job the user may edit while it is not rendering.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub frame_ranges: Option<String>,
    pub use_custom_frame_range: Option<bool>,
    pub original_frame_start: Option<Frame>,
    pub original_frame_end: Option<Frame>,
    pub output_path: Option<String>,
    pub output_dir: Option<String>,
    /// `Some(None)` clears the override.
    pub app_executable_path: Option<Option<PathBuf>>,
    pub app_settings: Option<AppSettings>,
}

impl JobUpdate {
    fn apply_to(self, job: &mut RenderJob) {
        if let Some(ranges) = self.frame_ranges {
            job.frame_ranges = ranges;
        }
        if let Some(custom) = self.use_custom_frame_range {
            job.use_custom_frame_range = custom;
        }
        if let Some(start) = self.original_frame_start {
            job.original_frame_start = start;
        }
        if let Some(end) = self.original_frame_end {
            job.original_frame_end = end;
        }
        if let Some(path) = self.output_path {
            job.output_path = path;
        }
        if let Some(dir) = self.output_dir {
            job.output_dir = dir;
        }
        if let Some(path) = self.app_executable_path {
            job.app_executable_path = path;
        }
        if let Some(settings) = self.app_settings {
            job.app_settings = Some(settings);
        }
        job.recompute_total_frames();
    }
}

/// Frame counts and estimate over every job that can render.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueTotals {
    pub total_frames: usize,
    pub rendered_frames: usize,
    /// 0 to 100.
    pub progress: f32,
    /// Seconds.
    pub estimated_time_remaining: f64,
}

// Owns the ordered job list and renders the idle jobs one after another through a single
// session. Everything outward goes through the event sink.
pub struct JobQueue {
    jobs: Vec<RenderJob>,
    settings: Settings,
    provider: Arc<dyn InstallationProvider>,
    store: Option<Arc<dyn JobStore>>,
    sink: Arc<dyn EventSink>,
    session: RenderSession,
    updates: UnboundedReceiver<SessionUpdate>,
    /// Job the session is working on.
    current: Option<String>,
    /// Keep advancing after each job.
    rendering: bool,
    /// Jobs that could not start during this pass.
    skipped: HashSet<String>,
}

impl JobQueue {
    pub fn new(
        settings: Settings,
        provider: Arc<dyn InstallationProvider>,
        sink: Arc<dyn EventSink>,
        runner: ProcessRunner,
    ) -> Self {
        let (session, updates) = RenderSession::new(runner);
        Self {
            jobs: Vec::new(),
            settings,
            provider,
            store: None,
            sink,
            session,
            updates,
            current: None,
            rendering: false,
            skipped: HashSet::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn jobs(&self) -> &[RenderJob] {
        &self.jobs
    }

    pub fn job(&self, id: &str) -> Option<&RenderJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn current_job(&self) -> Option<&RenderJob> {
        self.current.as_deref().and_then(|id| self.job(id))
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.validate_applications();
        self.persist().await;
    }

    fn index_of(&self, id: &str) -> Result<usize, QueueError> {
        self.jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_owned()))
    }

    fn ensure_not_active(&self, index: usize) -> Result<(), QueueError> {
        let job = &self.jobs[index];
        if job.status.is_active() || self.current.as_deref() == Some(job.id.as_str()) {
            return Err(QueueError::JobActive(job.id.clone()));
        }
        Ok(())
    }

    /* Queue editing */

    pub async fn add_job(&mut self, mut job: RenderJob) -> String {
        if job.id.is_empty() {
            job.id = format!("job_{}", uuid::Uuid::new_v4().simple());
        }
        job.recompute_total_frames();
        let id = job.id.clone();
        tracing::info!(job = %id, app = %job.application_type, frames = job.total_frames, "job added");
        self.jobs.push(job);
        self.validate_applications();
        self.persist().await;
        id
    }

    pub async fn remove_job(&mut self, id: &str) -> Result<RenderJob, QueueError> {
        let index = self.index_of(id)?;
        self.ensure_not_active(index)?;
        let job = self.jobs.remove(index);
        self.persist().await;
        Ok(job)
    }

    pub async fn update_job(&mut self, id: &str, update: JobUpdate) -> Result<(), QueueError> {
        let index = self.index_of(id)?;
        self.ensure_not_active(index)?;
        update.apply_to(&mut self.jobs[index]);
        self.validate_applications();
        self.persist().await;
        Ok(())
    }

    pub async fn move_job(&mut self, from: usize, to: usize) -> Result<(), QueueError> {
        let len = self.jobs.len();
        for index in [from, to] {
            if index >= len {
                return Err(QueueError::OutOfBounds { index, len });
            }
        }
        let job = self.jobs.remove(from);
        self.jobs.insert(to, job);
        self.persist().await;
        Ok(())
    }

    pub async fn clear_completed(&mut self) {
        self.jobs.retain(|j| j.status != JobStatus::Complete);
        self.persist().await;
    }

    /// Stops any active render first.
    pub async fn clear_all(&mut self) -> Result<(), QueueError> {
        if self.session.active_job().is_some() {
            self.stop_rendering().await?;
        }
        self.jobs.clear();
        self.persist().await;
        Ok(())
    }

    pub async fn reset_job(&mut self, id: &str) -> Result<(), QueueError> {
        let index = self.index_of(id)?;
        self.ensure_not_active(index)?;
        self.jobs[index].reset();
        self.skipped.remove(id);
        self.validate_applications();
        self.persist().await;
        Ok(())
    }

    pub async fn record_rendered_frame(
        &mut self,
        id: &str,
        path: impl Into<PathBuf>,
    ) -> Result<(), QueueError> {
        let index = self.index_of(id)?;
        self.jobs[index].add_rendered_frame(path.into());
        self.persist().await;
        Ok(())
    }

    pub async fn set_exr_layers(&mut self, id: &str, layers: Vec<String>) -> Result<(), QueueError> {
        let index = self.index_of(id)?;
        self.jobs[index].exr_layers = layers;
        self.persist().await;
        Ok(())
    }

    /* Applications */

    /// Executable for a job: its own override, then the settings path, then the newest install.
    pub fn resolve_executable(&self, job: &RenderJob) -> Result<PathBuf, DiscoveryError> {
        if let Some(path) = job
            .app_executable_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        {
            return Ok(path.clone());
        }
        if let Some(path) = self.settings.executable_for(job.application_type) {
            return Ok(path.clone());
        }
        let installation = self.provider.latest(job.application_type)?;
        Ok(adapter_for(job.application_type)
            .executable(&installation)
            .to_path_buf())
    }

    /// What the scene of `job` says about frames and output. Blender is asked through a
    /// short headless run, the other applications answer with defaults.
    pub async fn scene_info(&self, job: &RenderJob) -> Result<SceneInfo, QueueError> {
        if job.application_type != ApplicationType::Blender {
            return Ok(scene::defaults_for(job.application_type, &job.file_path));
        }
        let executable = self.resolve_executable(job)?;
        let info = scene::inspect(
            self.session.runner(),
            job.application_type,
            &executable,
            &job.file_path,
        )
        .await?;
        Ok(info)
    }

    pub fn existing_frames(&self, id: &str) -> Result<Vec<ExistingFrame>, QueueError> {
        let index = self.index_of(id)?;
        Ok(self.jobs[index].existing_frames()?)
    }

    /// Mark idle jobs whose application cannot be found, and release ones that can again.
    pub fn validate_applications(&mut self) {
        let mut available: HashMap<ApplicationType, bool> = HashMap::new();
        for index in 0..self.jobs.len() {
            let job = &self.jobs[index];
            if !matches!(
                job.status,
                JobStatus::Idle | JobStatus::MissingApp | JobStatus::Loading
            ) {
                continue;
            }
            let found = if job
                .app_executable_path
                .as_ref()
                .is_some_and(|p| !p.as_os_str().is_empty())
            {
                true
            } else {
                let application = job.application_type;
                *available.entry(application).or_insert_with(|| {
                    self.settings.executable_for(application).is_some()
                        || self.provider.latest(application).is_ok()
                })
            };

            let job = &mut self.jobs[index];
            let next = if found {
                JobStatus::Idle
            } else {
                JobStatus::MissingApp
            };
            if job.status == next {
                continue;
            }
            if job.transition(next).is_ok() {
                job.error = if found {
                    None
                } else {
                    tracing::warn!(job = %job.id, "{} is not installed", job.application_type);
                    Some(format!(
                        "{} is not installed or not found",
                        job.application_type.name()
                    ))
                };
            }
        }
    }

    /* Rendering */

    pub fn build_plan(&self, job: &RenderJob) -> Result<RenderPlan, QueueError> {
        let range = job.effective_range();
        frame_range::validate(&range).map_err(|source| QueueError::FrameRange {
            id: job.id.clone(),
            source,
        })?;
        let frames = job.frames();
        if frames.is_empty() {
            return Err(QueueError::NoFrames(job.id.clone()));
        }
        let executable = self.resolve_executable(job)?;

        let mut settings = job.effective_settings(&self.settings.app_settings);
        if let AppSettings::Blender(blender) = &mut settings {
            if blender.output_path.is_none() && !job.output_path.is_empty() {
                blender.output_path = Some(PathBuf::from(&job.output_path));
            }
        }

        Ok(RenderPlan {
            job_id: job.id.clone(),
            application: job.application_type,
            executable,
            scene: job.file_path.clone(),
            frames,
            settings,
            working_dir: job
                .file_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf()),
        })
    }

    /// Render idle jobs in order. Returns the job that started, if any could.
    pub async fn start_rendering(&mut self) -> Result<Option<String>, QueueError> {
        if let Some(job) = self.session.active_job() {
            return Err(SessionError::Busy(job).into());
        }
        self.skipped.clear();
        self.rendering = true;
        self.validate_applications();
        let started = self.advance();
        self.persist().await;
        Ok(started)
    }

    pub fn pause_rendering(&mut self) -> Result<(), QueueError> {
        Ok(self.session.pause()?)
    }

    pub fn resume_rendering(&mut self) -> Result<(), QueueError> {
        Ok(self.session.resume()?)
    }

    /// Stop the active render and wait for its process to exit. The job returns to idle.
    pub async fn stop_rendering(&mut self) -> Result<(), QueueError> {
        self.rendering = false;
        match self.session.stop().await {
            Ok(()) | Err(SessionError::NotRendering) => {}
            Err(e) => return Err(e.into()),
        }
        while let Ok(update) = self.updates.try_recv() {
            self.apply(update).await;
        }
        Ok(())
    }

    /// Next update of the active render. Pending forever when nothing renders.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    /// Apply updates until the queue has no more work.
    pub async fn run_until_idle(&mut self) {
        while self.rendering || self.session.active_job().is_some() {
            match self.updates.recv().await {
                Some(update) => self.apply(update).await,
                None => break,
            }
        }
    }

    // Start the first idle job not skipped in this pass. Jobs that fail to start are recorded
    // and skipped.
    fn advance(&mut self) -> Option<String> {
        loop {
            let Some(index) = self
                .jobs
                .iter()
                .position(|j| j.status == JobStatus::Idle && !self.skipped.contains(&j.id))
            else {
                tracing::info!("no more jobs to render");
                self.rendering = false;
                self.current = None;
                return None;
            };

            let id = self.jobs[index].id.clone();
            match self.start_job(index) {
                Ok(()) => return Some(id),
                Err(QueueError::Session(SessionError::Busy(other))) => {
                    tracing::warn!(job = %id, "session still busy with {other}");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(job = %id, "unable to start: {e}");
                    self.skipped.insert(id.clone());
                    let job = &mut self.jobs[index];
                    if let QueueError::Discovery(_) = e {
                        let _ = job.transition(JobStatus::MissingApp);
                    }
                    job.error = Some(e.to_string());
                    self.sink.emit(&QueueEvent::RenderError {
                        job_id: id,
                        frame: None,
                        error: e.to_string(),
                        exit_code: None,
                    });
                }
            }
        }
    }

    fn start_job(&mut self, index: usize) -> Result<(), QueueError> {
        let plan = self.build_plan(&self.jobs[index])?;
        self.session.start(plan)?;

        let job = &mut self.jobs[index];
        job.transition(JobStatus::Rendering)?;
        job.clear_progress();
        job.frame_times.clear();
        job.rendered_frame_paths.clear();
        job.last_rendered_frame = None;
        job.error = None;
        job.render_start_time = Some(Utc::now());
        self.current = Some(job.id.clone());
        tracing::info!(job = %job.id, file = %job.file_path.display(), "rendering job");
        Ok(())
    }

    /// Fold one session update into the job and publish it.
    pub async fn apply(&mut self, update: SessionUpdate) {
        let Ok(index) = self.index_of(update.job_id()) else {
            tracing::debug!(job = update.job_id(), "update for a job no longer queued");
            return;
        };
        let finished = update.is_final();

        match update {
            SessionUpdate::Progress {
                job_id,
                frame,
                detail,
                frame_index,
                total_frames,
                completed,
            } => {
                let job = &mut self.jobs[index];
                let partial = detail.as_ref().map(|d| d.fraction()).unwrap_or(0.0);
                job.progress = percent(completed as f32 + partial, total_frames);
                self.sink.emit(&QueueEvent::RenderProgress {
                    job_id,
                    frame,
                    detail,
                    current_frame_index: frame_index,
                    total_frames,
                    progress: job.progress,
                });
            }
            SessionUpdate::FrameRendered {
                job_id,
                frame,
                output,
                frame_index,
                total_frames,
            } => {
                self.jobs[index].add_rendered_frame(&output);
                self.sink.emit(&QueueEvent::FrameRendered {
                    job_id,
                    frame,
                    output_path: output,
                    current_frame_index: frame_index,
                    total_frames,
                });
            }
            SessionUpdate::FrameFinished {
                job_id,
                frame,
                frame_index,
                duration,
                completed,
                total_frames,
            } => {
                let job = &mut self.jobs[index];
                job.current_frame = completed;
                job.total_frames = total_frames;
                job.progress = percent(completed as f32, total_frames);
                job.record_frame_time(duration.as_secs_f64());
                if let Some(start) = job.render_start_time {
                    job.elapsed_time = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
                }
                job.estimated_time_remaining = job.mean_frame_time().unwrap_or(0.0)
                    * total_frames.saturating_sub(completed) as f64;
                self.sink.emit(&QueueEvent::RenderProgress {
                    job_id,
                    frame: Some(frame),
                    detail: None,
                    current_frame_index: frame_index,
                    total_frames,
                    progress: job.progress,
                });
            }
            SessionUpdate::Output {
                job_id,
                text,
                stream,
            } => self.sink.emit(&QueueEvent::RenderOutput {
                job_id,
                output: text,
                stream,
            }),
            SessionUpdate::Process { job_id, process } => {
                if !process.is_running() {
                    self.session.runner().discard(&process.id);
                }
                self.sink.emit(&QueueEvent::ProcessUpdate {
                    job_id,
                    process: Box::new(process),
                });
            }
            SessionUpdate::Paused { job_id, .. } => {
                self.set_status(index, JobStatus::Paused);
                self.sink.emit(&QueueEvent::RenderPaused { job_id });
                self.persist().await;
            }
            SessionUpdate::Resumed { .. } => self.set_status(index, JobStatus::Rendering),
            SessionUpdate::Stopped { .. } => {
                self.set_status(index, JobStatus::Idle);
                self.jobs[index].clear_progress();
            }
            SessionUpdate::Complete { job_id } => {
                self.set_status(index, JobStatus::Complete);
                let job = &mut self.jobs[index];
                job.progress = 100.0;
                job.current_frame = job.total_frames;
                job.estimated_time_remaining = 0.0;
                self.sink.emit(&QueueEvent::RenderComplete { job_id });
            }
            SessionUpdate::Error {
                job_id,
                frame,
                message,
                exit_code,
            } => {
                self.set_status(index, JobStatus::Error);
                self.jobs[index].error = Some(message.clone());
                self.sink.emit(&QueueEvent::RenderError {
                    job_id,
                    frame,
                    error: message,
                    exit_code,
                });
            }
        }

        if finished {
            self.current = None;
            if self.rendering {
                self.advance();
            }
            self.persist().await;
        }
    }

    fn set_status(&mut self, index: usize, status: JobStatus) {
        if let Err(e) = self.jobs[index].transition(status) {
            tracing::warn!("{e}");
        }
    }

    /* Totals */

    /// Totals over every job except ones whose application is missing.
    pub fn totals(&self) -> QueueTotals {
        let mut totals = QueueTotals::default();
        let mut means = Vec::new();
        for job in self.jobs.iter().filter(|j| j.status != JobStatus::MissingApp) {
            totals.total_frames += job.total_frames;
            totals.rendered_frames += match job.status {
                JobStatus::Complete => job.total_frames,
                JobStatus::Rendering | JobStatus::Paused => job.current_frame,
                _ => 0,
            };
            if let Some(mean) = job.mean_frame_time() {
                means.push(mean);
            }
        }
        totals.progress = percent(totals.rendered_frames as f32, totals.total_frames);
        if !means.is_empty() {
            let mean = means.iter().sum::<f64>() / means.len() as f64;
            let remaining = totals.total_frames.saturating_sub(totals.rendered_frames);
            totals.estimated_time_remaining = mean * remaining as f64;
        }
        totals
    }

    /* Persistence */

    pub async fn save(&self) -> Result<(), QueueError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let jobs: Vec<RenderJob> = self
            .jobs
            .iter()
            .filter(|j| j.status != JobStatus::Loading)
            .map(RenderJob::to_persisted)
            .collect();
        store.save(&jobs).await?;
        Ok(())
    }

    /// Replace the queue with the stored one. Refused while rendering.
    pub async fn load(&mut self) -> Result<usize, QueueError> {
        if let Some(job) = self.session.active_job() {
            return Err(QueueError::JobActive(job));
        }
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let mut jobs = store.load().await?;
        for job in &mut jobs {
            job.status = match job.status {
                JobStatus::Rendering | JobStatus::Paused | JobStatus::Loading => JobStatus::Idle,
                other => other,
            };
        }
        self.jobs = jobs;
        self.current = None;
        self.validate_applications();
        Ok(self.jobs.len())
    }

    async fn persist(&self) {
        if !self.settings.auto_save {
            return;
        }
        if let Err(e) = self.save().await {
            tracing::warn!("auto-save failed: {e}");
        }
    }
}

fn percent(done: f32, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        (done / total as f32 * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_sink::TracingSink;
    use dcc::{Installation, KnownInstallations};

    fn queue(installations: Vec<Installation>) -> JobQueue {
        JobQueue::new(
            Settings::default(),
            Arc::new(KnownInstallations(installations)),
            Arc::new(TracingSink),
            ProcessRunner::new(),
        )
    }

    #[tokio::test]
    async fn missing_application_gates_jobs() {
        let mut queue = queue(Vec::new());
        let id = queue
            .add_job(RenderJob::new("/work/comp.nk", ApplicationType::Nuke))
            .await;
        let job = queue.job(&id).unwrap();
        assert_eq!(job.status, JobStatus::MissingApp);
        assert_eq!(job.error.as_deref(), Some("Nuke is not installed or not found"));

        queue
            .update_job(
                &id,
                JobUpdate {
                    app_executable_path: Some(Some(PathBuf::from("/opt/nuke/Nuke15.0"))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let job = queue.job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Idle);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn editing_recomputes_frames() {
        let mut queue = queue(vec![Installation::new(
            ApplicationType::Blender,
            "4.2",
            "/opt/blender/blender",
            "/opt/blender",
        )]);
        let id = queue
            .add_job(RenderJob::new("/work/shot.blend", ApplicationType::Blender))
            .await;
        queue
            .update_job(
                &id,
                JobUpdate {
                    frame_ranges: Some("1-10,20".to_owned()),
                    use_custom_frame_range: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(queue.job(&id).unwrap().total_frames, 11);
        assert!(matches!(
            queue.update_job("nope", JobUpdate::default()).await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn move_and_clear() {
        let mut queue = queue(Vec::new());
        let a = queue.add_job(RenderJob::new("/a.blend", ApplicationType::Blender)).await;
        let b = queue.add_job(RenderJob::new("/b.blend", ApplicationType::Blender)).await;
        queue.move_job(1, 0).await.unwrap();
        assert_eq!(queue.jobs()[0].id, b);
        assert!(matches!(
            queue.move_job(0, 5).await,
            Err(QueueError::OutOfBounds { index: 5, len: 2 })
        ));

        queue.jobs[1].status = JobStatus::Complete;
        queue.clear_completed().await;
        assert_eq!(queue.jobs().len(), 1);
        assert!(queue.job(&a).is_none());

        queue.record_rendered_frame(&b, "/out/1.png").await.unwrap();
        queue.record_rendered_frame(&b, "/out/1.png").await.unwrap();
        assert_eq!(queue.job(&b).unwrap().rendered_frame_paths.len(), 1);

        queue.clear_all().await.unwrap();
        assert!(queue.jobs().is_empty());
    }

    #[test]
    fn totals_skip_missing_applications() {
        let mut queue = queue(Vec::new());
        let mut done = RenderJob::new("/a.blend", ApplicationType::Blender).with_frame_ranges("1-10");
        done.status = JobStatus::Complete;
        done.frame_times = vec![2.0, 4.0];
        let mut running =
            RenderJob::new("/b.blend", ApplicationType::Blender).with_frame_ranges("1-10");
        running.status = JobStatus::Rendering;
        running.current_frame = 5;
        running.frame_times = vec![1.0];
        let mut missing = RenderJob::new("/c.nk", ApplicationType::Nuke).with_frame_ranges("1-100");
        missing.status = JobStatus::MissingApp;
        queue.jobs = vec![done, running, missing];

        let totals = queue.totals();
        assert_eq!(totals.total_frames, 20);
        assert_eq!(totals.rendered_frames, 15);
        assert_eq!(totals.progress, 75.0);
        // mean of per-job means (3.0 and 1.0) times 5 remaining frames
        assert_eq!(totals.estimated_time_remaining, 10.0);
    }

    #[test]
    fn override_beats_settings_and_discovery() {
        let mut queue = queue(vec![Installation::new(
            ApplicationType::Houdini,
            "20.5.332",
            "/opt/hfs20.5/bin/houdini",
            "/opt/hfs20.5",
        )
        .with_command_line("/opt/hfs20.5/bin/hbatch")]);
        let job = RenderJob::new("/work/fx.hip", ApplicationType::Houdini);
        assert_eq!(
            queue.resolve_executable(&job).unwrap(),
            PathBuf::from("/opt/hfs20.5/bin/hbatch")
        );

        queue
            .settings
            .set_executable(ApplicationType::Houdini, "/custom/hbatch");
        assert_eq!(
            queue.resolve_executable(&job).unwrap(),
            PathBuf::from("/custom/hbatch")
        );

        let job = job.with_executable("/job/hbatch");
        assert_eq!(
            queue.resolve_executable(&job).unwrap(),
            PathBuf::from("/job/hbatch")
        );
    }

    #[test]
    fn invalid_ranges_do_not_build_a_plan() {
        let queue = queue(vec![Installation::new(
            ApplicationType::Blender,
            "4.2",
            "/opt/blender/blender",
            "/opt/blender",
        )]);
        let job = RenderJob::new("/a.blend", ApplicationType::Blender).with_frame_ranges("10-1");
        assert!(matches!(
            queue.build_plan(&job),
            Err(QueueError::FrameRange {
                source: FrameRangeError::Descending { start: 10, end: 1 },
                ..
            })
        ));
    }
}
