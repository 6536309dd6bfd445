/*
    One render session drives one job at a time and never has more than one render process alive.
    The session is a cheap handle; the actual work runs on a driver task that owns the frame
    bookkeeping and talks back through an update channel.

    Pause kills the running process. Frames the tool already reported stay counted, anything in
    flight is rendered again on resume. Stop kills the process too, but only returns once the
    process has exited and the session slot is empty again.
*/
use dcc::{
    adapter_for, Adapter, AppSettings, ApplicationType, Frame, Invocation, OutputParser,
    ParseContext, ProcessEvent, ProcessMeta, ProcessRunner, RenderEvent, RenderUnit, SpawnOptions,
    Strategy, Stream, SubProgress, TrackedProcess,
};
use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot,
};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("A render is already running for job {0}")]
    Busy(String),
    #[error("No render is running")]
    NotRendering,
    #[error("Job {0} has no frames to render")]
    NoFrames(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Rendering,
    Paused,
}

/// Everything the driver needs to render one job. Built by the queue before starting.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub job_id: String,
    pub application: ApplicationType,
    pub executable: PathBuf,
    pub scene: PathBuf,
    /// Full frame sequence of the job, ascending.
    pub frames: Vec<Frame>,
    pub settings: AppSettings,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Progress {
        job_id: String,
        frame: Option<Frame>,
        detail: Option<SubProgress>,
        frame_index: Option<usize>,
        total_frames: usize,
        completed: usize,
    },
    FrameRendered {
        job_id: String,
        frame: Frame,
        output: PathBuf,
        frame_index: Option<usize>,
        total_frames: usize,
    },
    /// A frame now counts as produced.
    FrameFinished {
        job_id: String,
        frame: Frame,
        frame_index: Option<usize>,
        duration: Duration,
        completed: usize,
        total_frames: usize,
    },
    Output {
        job_id: String,
        text: String,
        stream: Stream,
    },
    Process {
        job_id: String,
        process: TrackedProcess,
    },
    Paused {
        job_id: String,
        completed: usize,
    },
    Resumed {
        job_id: String,
    },
    Stopped {
        job_id: String,
    },
    Complete {
        job_id: String,
    },
    Error {
        job_id: String,
        frame: Option<Frame>,
        message: String,
        exit_code: Option<i32>,
    },
}

impl SessionUpdate {
    pub fn job_id(&self) -> &str {
        match self {
            SessionUpdate::Progress { job_id, .. }
            | SessionUpdate::FrameRendered { job_id, .. }
            | SessionUpdate::FrameFinished { job_id, .. }
            | SessionUpdate::Output { job_id, .. }
            | SessionUpdate::Process { job_id, .. }
            | SessionUpdate::Paused { job_id, .. }
            | SessionUpdate::Resumed { job_id }
            | SessionUpdate::Stopped { job_id }
            | SessionUpdate::Complete { job_id }
            | SessionUpdate::Error { job_id, .. } => job_id,
        }
    }

    /// Last update of a session.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SessionUpdate::Stopped { .. } | SessionUpdate::Complete { .. } | SessionUpdate::Error { .. }
        )
    }
}

#[derive(Debug)]
enum Control {
    Pause,
    Resume,
    Stop(oneshot::Sender<()>),
}

#[derive(Debug)]
struct ActiveRender {
    job_id: String,
    state: SessionState,
    control: UnboundedSender<Control>,
}

type Slot = Arc<Mutex<Option<ActiveRender>>>;

#[derive(Debug, Clone)]
pub struct RenderSession {
    runner: ProcessRunner,
    active: Slot,
    updates: UnboundedSender<SessionUpdate>,
}

impl RenderSession {
    pub fn new(runner: ProcessRunner) -> (Self, UnboundedReceiver<SessionUpdate>) {
        let (updates, receiver) = mpsc::unbounded_channel();
        let session = Self {
            runner,
            active: Arc::new(Mutex::new(None)),
            updates,
        };
        (session, receiver)
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    pub fn state(&self) -> SessionState {
        lock(&self.active)
            .as_ref()
            .map(|a| a.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn active_job(&self) -> Option<String> {
        lock(&self.active).as_ref().map(|a| a.job_id.clone())
    }

    /// Claim the session and start rendering on a driver task. Must be called inside a tokio
    /// runtime. Fails without side effects when another render holds the session.
    pub fn start(&self, plan: RenderPlan) -> Result<(), SessionError> {
        if plan.frames.is_empty() {
            return Err(SessionError::NoFrames(plan.job_id));
        }
        let (control, control_rx) = mpsc::unbounded_channel();
        {
            let mut active = lock(&self.active);
            if let Some(current) = active.as_ref() {
                return Err(SessionError::Busy(current.job_id.clone()));
            }
            *active = Some(ActiveRender {
                job_id: plan.job_id.clone(),
                state: SessionState::Rendering,
                control,
            });
        }

        tracing::info!(job = %plan.job_id, app = %plan.application, frames = plan.frames.len(), "render started");
        let driver = Driver {
            adapter: adapter_for(plan.application),
            frames: plan.frames.iter().copied().collect(),
            done: BTreeSet::new(),
            runner: self.runner.clone(),
            active: self.active.clone(),
            updates: self.updates.clone(),
            controls: control_rx,
            plan,
        };
        tokio::spawn(driver.run());
        Ok(())
    }

    pub fn pause(&self) -> Result<(), SessionError> {
        self.send(Control::Pause)
    }

    pub fn resume(&self) -> Result<(), SessionError> {
        self.send(Control::Resume)
    }

    /// Kill the active render and wait until its process is gone.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (ack, done) = oneshot::channel();
        self.send(Control::Stop(ack))?;
        // a closed channel means the driver finished on its own meanwhile
        let _ = done.await;
        Ok(())
    }

    fn send(&self, control: Control) -> Result<(), SessionError> {
        let active = lock(&self.active);
        let current = active.as_ref().ok_or(SessionError::NotRendering)?;
        current
            .control
            .send(control)
            .map_err(|_| SessionError::NotRendering)
    }
}

fn lock(slot: &Slot) -> std::sync::MutexGuard<'_, Option<ActiveRender>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Interrupt {
    Pause,
    Stop(Option<oneshot::Sender<()>>),
}

enum UnitOutcome {
    Finished,
    Interrupted(Interrupt),
    Failed {
        frame: Option<Frame>,
        message: String,
        exit_code: Option<i32>,
    },
}

struct Driver {
    plan: RenderPlan,
    adapter: &'static dyn Adapter,
    frames: Arc<[Frame]>,
    done: BTreeSet<Frame>,
    runner: ProcessRunner,
    active: Slot,
    updates: UnboundedSender<SessionUpdate>,
    controls: UnboundedReceiver<Control>,
}

impl Driver {
    async fn run(mut self) {
        let mut paused = false;
        loop {
            if paused {
                match self.controls.recv().await {
                    Some(Control::Resume) => {
                        paused = false;
                        self.set_state(SessionState::Rendering);
                        tracing::info!(job = %self.plan.job_id, "render resumed");
                        self.send(SessionUpdate::Resumed {
                            job_id: self.plan.job_id.clone(),
                        });
                    }
                    Some(Control::Pause) => {}
                    Some(Control::Stop(ack)) => return self.stopped(Some(ack)),
                    None => return self.stopped(None),
                }
                continue;
            }

            // controls that arrived between two units
            match self.controls.try_recv() {
                Ok(Control::Pause) => {
                    paused = true;
                    self.paused();
                    continue;
                }
                Ok(Control::Stop(ack)) => return self.stopped(Some(ack)),
                Ok(Control::Resume) | Err(_) => {}
            }

            let remaining: Vec<Frame> = self
                .frames
                .iter()
                .copied()
                .filter(|f| !self.done.contains(f))
                .collect();
            let Some(unit) = self
                .adapter
                .units(&remaining, &self.plan.settings)
                .into_iter()
                .next()
            else {
                return self.finish(SessionUpdate::Complete {
                    job_id: self.plan.job_id.clone(),
                });
            };

            match self.render_unit(unit, &remaining).await {
                UnitOutcome::Finished => {}
                UnitOutcome::Interrupted(Interrupt::Pause) => {
                    paused = true;
                    self.paused();
                }
                UnitOutcome::Interrupted(Interrupt::Stop(ack)) => return self.stopped(ack),
                UnitOutcome::Failed {
                    frame,
                    message,
                    exit_code,
                } => {
                    tracing::warn!(job = %self.plan.job_id, ?frame, ?exit_code, "render failed: {message}");
                    return self.finish(SessionUpdate::Error {
                        job_id: self.plan.job_id.clone(),
                        frame,
                        message,
                        exit_code,
                    });
                }
            }
        }
    }

    async fn render_unit(&mut self, unit: RenderUnit, remaining: &[Frame]) -> UnitOutcome {
        let failed = |message: String| UnitOutcome::Failed {
            frame: Some(unit.start()),
            message,
            exit_code: None,
        };

        let invocation = match self.adapter.build_arguments(
            &self.plan.executable,
            &self.plan.scene,
            &unit,
            &self.plan.settings,
        ) {
            Ok(invocation) => invocation,
            Err(e) => return failed(e.to_string()),
        };
        if let Err(e) = write_support_files(&invocation).await {
            return failed(format!("Unable to prepare render script: {e}"));
        }

        let mut parser = self.adapter.parser(ParseContext::new(unit, self.frames.clone()));
        let options = SpawnOptions {
            working_dir: self.plan.working_dir.clone(),
            ..Default::default()
        };
        let mut handle = self.runner.spawn_tracked(
            &invocation.program,
            &invocation.args,
            options,
            ProcessMeta::new("render"),
        );
        self.send_process(handle.id);

        let unit_frames: Vec<Frame> = remaining
            .iter()
            .copied()
            .filter(|f| unit.contains(*f))
            .collect();
        let mut last_mark = Instant::now();
        let mut interrupt: Option<Interrupt> = None;
        let mut exit_code = None;
        let mut spawn_error = None;

        loop {
            tokio::select! {
                biased;
                control = self.controls.recv(), if interrupt.is_none() => {
                    interrupt = match control {
                        Some(Control::Resume) => continue,
                        Some(Control::Pause) => Some(Interrupt::Pause),
                        Some(Control::Stop(ack)) => Some(Interrupt::Stop(Some(ack))),
                        None => Some(Interrupt::Stop(None)),
                    };
                    if let Err(e) = self.runner.terminate(handle.id, true).await {
                        tracing::debug!(job = %self.plan.job_id, "terminate: {e}");
                    }
                }
                event = handle.events.recv() => match event {
                    Some(ProcessEvent::Output { stream, text }) => {
                        let events = parser.parse_chunk(&text, stream);
                        self.apply_events(events, &unit_frames, &mut last_mark, interrupt.is_some());
                    }
                    Some(ProcessEvent::Exited { code, .. }) => {
                        exit_code = code;
                        break;
                    }
                    Some(ProcessEvent::Failed(message)) => {
                        spawn_error = Some(message);
                        break;
                    }
                    None => break,
                }
            }
        }

        remove_support_files(&invocation).await;
        self.send_process(handle.id);

        if let Some(message) = spawn_error {
            return failed(message);
        }
        match interrupt {
            // a unit that finished cleanly right as the pause arrived still counts
            Some(Interrupt::Pause) if exit_code == Some(0) => {
                if let UnitOutcome::Failed { .. } =
                    self.finish_unit(&mut *parser, exit_code, &unit_frames, &mut last_mark)
                {
                    tracing::debug!(job = %self.plan.job_id, "ignoring exit result of a paused unit");
                }
                UnitOutcome::Interrupted(Interrupt::Pause)
            }
            Some(interrupt) => UnitOutcome::Interrupted(interrupt),
            None => self.finish_unit(&mut *parser, exit_code, &unit_frames, &mut last_mark),
        }
    }

    fn finish_unit(
        &mut self,
        parser: &mut dyn OutputParser,
        exit_code: Option<i32>,
        unit_frames: &[Frame],
        last_mark: &mut Instant,
    ) -> UnitOutcome {
        let mut failure = None;
        for event in parser.finish(exit_code) {
            match event {
                RenderEvent::Error { message, exit_code } => {
                    failure = Some(UnitOutcome::Failed {
                        frame: unit_frames.iter().copied().find(|f| !self.done.contains(f)),
                        message,
                        exit_code,
                    });
                }
                RenderEvent::Complete => {}
                other => self.apply_events(vec![other], unit_frames, last_mark, false),
            }
        }
        if let Some(failure) = failure {
            return failure;
        }

        let leftover: Vec<Frame> = unit_frames
            .iter()
            .copied()
            .filter(|f| !self.done.contains(f))
            .collect();
        if !leftover.is_empty() {
            let share = last_mark.elapsed() / leftover.len() as u32;
            for frame in leftover {
                self.mark_done(frame, share);
            }
            *last_mark = Instant::now();
        }
        UnitOutcome::Finished
    }

    fn apply_events(
        &mut self,
        events: Vec<RenderEvent>,
        unit_frames: &[Frame],
        last_mark: &mut Instant,
        interrupted: bool,
    ) {
        let job_id = self.plan.job_id.clone();
        for event in events {
            let update = match event {
                RenderEvent::RawOutput { text, stream } => SessionUpdate::Output {
                    job_id: job_id.clone(),
                    text,
                    stream,
                },
                // progress of a process being killed is noise
                _ if interrupted => continue,
                RenderEvent::Progress {
                    frame,
                    detail,
                    frame_index,
                    total_frames,
                } => SessionUpdate::Progress {
                    job_id: job_id.clone(),
                    frame,
                    detail,
                    frame_index,
                    total_frames,
                    completed: self.done.len(),
                },
                RenderEvent::FrameRendered {
                    frame,
                    output,
                    frame_index,
                    total_frames,
                } => {
                    self.send(SessionUpdate::FrameRendered {
                        job_id: job_id.clone(),
                        frame,
                        output,
                        frame_index,
                        total_frames,
                    });
                    let counts_now = self.adapter.strategy() == Strategy::Range
                        && unit_frames.contains(&frame)
                        && !self.done.contains(&frame);
                    if counts_now {
                        self.mark_done(frame, last_mark.elapsed());
                        *last_mark = Instant::now();
                    }
                    continue;
                }
                // exit results only come from `finish`
                RenderEvent::Error { .. } | RenderEvent::Complete => continue,
            };
            self.send(update);
        }
    }

    fn mark_done(&mut self, frame: Frame, duration: Duration) {
        if !self.done.insert(frame) {
            return;
        }
        tracing::debug!(job = %self.plan.job_id, frame, "frame finished in {duration:?}");
        self.send(SessionUpdate::FrameFinished {
            job_id: self.plan.job_id.clone(),
            frame,
            frame_index: self.frames.binary_search(&frame).ok(),
            duration,
            completed: self.done.len(),
            total_frames: self.frames.len(),
        });
    }

    fn send_process(&self, id: Uuid) {
        if let Some(process) = self.runner.get(&id) {
            self.send(SessionUpdate::Process {
                job_id: self.plan.job_id.clone(),
                process,
            });
        }
    }

    fn send(&self, update: SessionUpdate) {
        // the queue may have been dropped, the render finishes regardless
        let _ = self.updates.send(update);
    }

    fn set_state(&self, state: SessionState) {
        if let Some(active) = lock(&self.active).as_mut() {
            active.state = state;
        }
    }

    fn paused(&self) {
        self.set_state(SessionState::Paused);
        tracing::info!(job = %self.plan.job_id, completed = self.done.len(), "render paused");
        self.send(SessionUpdate::Paused {
            job_id: self.plan.job_id.clone(),
            completed: self.done.len(),
        });
    }

    fn stopped(self, ack: Option<oneshot::Sender<()>>) {
        tracing::info!(job = %self.plan.job_id, "render stopped");
        let update = SessionUpdate::Stopped {
            job_id: self.plan.job_id.clone(),
        };
        self.finish(update);
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Free the session first so the receiver of the final update can start the next job.
    fn finish(&self, update: SessionUpdate) {
        lock(&self.active).take();
        if let SessionUpdate::Complete { .. } = update {
            tracing::info!(job = %self.plan.job_id, frames = self.done.len(), "render complete");
        }
        self.send(update);
    }
}

async fn write_support_files(invocation: &Invocation) -> std::io::Result<()> {
    for file in &invocation.support_files {
        tokio::fs::write(&file.path, &file.contents).await?;
    }
    Ok(())
}

async fn remove_support_files(invocation: &Invocation) {
    for file in &invocation.support_files {
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::debug!(path = %file.path.display(), "unable to remove support file: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcc::models::settings::NukeSettings;

    fn plan(job_id: &str, frames: Vec<Frame>) -> RenderPlan {
        RenderPlan {
            job_id: job_id.to_owned(),
            application: ApplicationType::Nuke,
            executable: PathBuf::from("/definitely/not/a/nuke/binary"),
            scene: PathBuf::from("/jobs/comp.nk"),
            frames,
            settings: AppSettings::Nuke(NukeSettings::default()),
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn empty_plans_are_rejected() {
        let (session, _updates) = RenderSession::new(ProcessRunner::new());
        assert_eq!(
            session.start(plan("job_a", Vec::new())),
            Err(SessionError::NoFrames("job_a".to_owned()))
        );
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn controls_need_an_active_render() {
        let (session, _updates) = RenderSession::new(ProcessRunner::new());
        assert_eq!(session.pause(), Err(SessionError::NotRendering));
        assert_eq!(session.resume(), Err(SessionError::NotRendering));
        assert_eq!(session.stop().await, Err(SessionError::NotRendering));
    }

    #[tokio::test]
    async fn spawn_failure_ends_the_session_with_an_error() {
        let (session, mut updates) = RenderSession::new(ProcessRunner::new());
        session.start(plan("job_a", vec![1, 2, 3])).unwrap();

        let mut last = None;
        while let Some(update) = updates.recv().await {
            let done = update.is_final();
            last = Some(update);
            if done {
                break;
            }
        }
        match last {
            Some(SessionUpdate::Error { job_id, message, .. }) => {
                assert_eq!(job_id, "job_a");
                assert!(message.starts_with("Failed to start"), "{message}");
            }
            other => panic!("unexpected final update: {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.runner().list().iter().all(|p| !p.is_running()));
    }
}
