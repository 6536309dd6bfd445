/*
    Command line front end over the queue. Every command works on a queue file so the same file
    can be filled with `add`, inspected with `list` and rendered with `render`.
*/
use super::{
    data_store::json_job_store::JsonJobStore,
    event_sink::TracingSink,
    job_queue::JobQueue,
    session::SessionUpdate,
};
use crate::{
    domains::settings_store::SettingsStore,
    models::job::{JobStatus, RenderJob},
};
use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use dcc::{frame_range, ApplicationType, Discovery, InstallationProvider, ProcessRunner};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::select;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List installed applications
    Discover {
        #[arg(long)]
        app: Option<ApplicationType>,
    },
    /// Check frame range text and show the frames it selects
    Validate { range: String },
    /// Add a scene to a queue file
    Add(AddArgs),
    /// Show the jobs of a queue file
    List { queue: PathBuf },
    /// Show frames of a job already present in its output directory
    Existing { queue: PathBuf, job: String },
    /// Render every idle job of a queue file. Ctrl-C stops the render.
    Render { queue: PathBuf },
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub queue: PathBuf,
    pub scene: PathBuf,
    /// Inferred from the scene extension when omitted
    #[arg(long)]
    pub app: Option<ApplicationType>,
    /// Keep the placeholder scene values instead of reading the scene
    #[arg(long)]
    pub no_inspect: bool,
    /// Custom frame range, e.g. "1-10, 20, 30-35"
    #[arg(long)]
    pub frames: Option<String>,
    #[arg(long)]
    pub start: Option<u32>,
    #[arg(long)]
    pub end: Option<u32>,
    /// Executable to use for this job only
    #[arg(long)]
    pub exe: Option<PathBuf>,
    #[arg(long)]
    pub output: Option<String>,
}

pub struct CliApp {
    settings: Arc<dyn SettingsStore>,
}

impl CliApp {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Discover { app } => self.discover(app).await,
            Commands::Validate { range } => validate(&range),
            Commands::Add(args) => self.add(args).await,
            Commands::List { queue } => self.list(&queue).await,
            Commands::Existing { queue, job } => self.existing(&queue, &job).await,
            Commands::Render { queue } => self.render(&queue).await,
        }
    }

    async fn open(&self, queue_file: &Path) -> anyhow::Result<JobQueue> {
        let settings = self.settings.get().await?;
        let store = Arc::new(JsonJobStore::new(queue_file));
        let mut queue = JobQueue::new(
            settings,
            Arc::new(Discovery::for_current_platform()),
            Arc::new(TracingSink),
            ProcessRunner::new(),
        )
        .with_store(store);
        queue
            .load()
            .await
            .with_context(|| format!("Unable to load queue {}", queue_file.display()))?;
        Ok(queue)
    }

    async fn discover(&self, app: Option<ApplicationType>) -> anyhow::Result<()> {
        let settings = self.settings.get().await?;
        let discovery = Discovery::for_current_platform();
        let apps = match app {
            Some(app) => vec![app],
            None => ApplicationType::ALL.to_vec(),
        };
        for app in apps {
            println!("{}", app.name());
            if let Some(path) = settings.executable_for(app) {
                println!("  configured  {}", path.display());
            }
            let installations = discovery.installations(app);
            if installations.is_empty() && settings.executable_for(app).is_none() {
                println!("  (none found)");
            }
            for installation in installations {
                println!(
                    "  {:<10}  {}",
                    installation.version,
                    installation.batch_executable().display()
                );
            }
        }
        Ok(())
    }

    async fn add(&self, args: AddArgs) -> anyhow::Result<()> {
        let application = match args.app.or_else(|| ApplicationType::from_path(&args.scene)) {
            Some(app) => app,
            None => bail!(
                "Cannot tell which application renders {}. Pass --app",
                args.scene.display()
            ),
        };

        let mut queue = self.open(&args.queue).await?;
        let mut job = RenderJob::new(&args.scene, application);
        if let Some(exe) = args.exe {
            job = job.with_executable(exe);
        }
        if !args.no_inspect {
            match queue.scene_info(&job).await {
                Ok(info) => {
                    if info.is_defaults {
                        println!(
                            "{} scenes are not inspected, using frames {}-{}",
                            application.name(),
                            info.frame_start,
                            info.frame_end
                        );
                    }
                    job.apply_scene_info(&info);
                }
                Err(e) => tracing::warn!("Unable to read scene info, using defaults: {e}"),
            }
        }
        if let (Some(start), Some(end)) = (args.start, args.end) {
            job = job.with_scene_range(start, end);
        }
        if let Some(frames) = args.frames {
            frame_range::validate(&frames).context("Invalid --frames")?;
            job = job.with_frame_ranges(frames);
        }
        if let Some(output) = args.output {
            job.output_path = output;
            job.output_dir.clear();
            job.output_pattern.clear();
        }

        let id = queue.add_job(job).await;
        queue.save().await?;
        if let Some(job) = queue.job(&id) {
            println!(
                "Added {} ({}, {} frames [{}], {:?})",
                job.id,
                job.application_type.name(),
                job.total_frames,
                job.effective_range(),
                job.status
            );
        }
        match queue.existing_frames(&id) {
            Ok(frames) if !frames.is_empty() => println!(
                "  {} of these frames already exist and will be overwritten",
                frames.len()
            ),
            Ok(_) => {}
            Err(e) => tracing::debug!("existing frame check skipped: {e}"),
        }
        Ok(())
    }

    async fn existing(&self, queue_file: &Path, id: &str) -> anyhow::Result<()> {
        let queue = self.open(queue_file).await?;
        let frames = queue.existing_frames(id)?;
        if frames.is_empty() {
            println!("No rendered frames found");
        }
        for frame in frames {
            println!("{:>6}  {}", frame.frame, frame.file.display());
        }
        Ok(())
    }

    async fn list(&self, queue_file: &Path) -> anyhow::Result<()> {
        let queue = self.open(queue_file).await?;
        for (index, job) in queue.jobs().iter().enumerate() {
            println!(
                "{index:>3}  {:<12}  {:<14}  {:<8}  {:>5.1}%  {}  [{}]",
                format!("{:?}", job.status),
                job.application_type.name(),
                job.total_frames,
                job.progress,
                job.file_path.display(),
                job.effective_range()
            );
            if let Some(error) = &job.error {
                println!("     {error}");
            }
        }
        let totals = queue.totals();
        println!(
            "{} / {} frames ({:.1}%), about {:.0}s remaining",
            totals.rendered_frames,
            totals.total_frames,
            totals.progress,
            totals.estimated_time_remaining
        );
        Ok(())
    }

    async fn render(&self, queue_file: &Path) -> anyhow::Result<()> {
        let mut queue = self.open(queue_file).await?;
        if queue.start_rendering().await?.is_none() {
            println!("Nothing to render");
            return Ok(());
        }

        while queue.is_rendering() || queue.session().active_job().is_some() {
            select! {
                update = queue.next_update() => {
                    let Some(update) = update else { break };
                    report(&update);
                    queue.apply(update).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("Stopping render...");
                    queue.stop_rendering().await?;
                }
            }
        }

        queue.save().await?;
        let failed = queue
            .jobs()
            .iter()
            .filter(|j| j.status == JobStatus::Error)
            .count();
        let totals = queue.totals();
        println!(
            "Rendered {} of {} frames",
            totals.rendered_frames, totals.total_frames
        );
        if failed > 0 {
            bail!("{failed} job(s) failed");
        }
        Ok(())
    }
}

fn validate(range: &str) -> anyhow::Result<()> {
    frame_range::validate(range)?;
    let frames = frame_range::parse(range);
    println!("{} frames: {}", frames.len(), frame_range::format(&frames));
    Ok(())
}

fn report(update: &SessionUpdate) {
    match update {
        SessionUpdate::FrameRendered { job_id, frame, output, .. } => {
            println!("[{job_id}] frame {frame} -> {}", output.display())
        }
        SessionUpdate::Complete { job_id } => println!("[{job_id}] complete"),
        SessionUpdate::Error {
            job_id, message, ..
        } => eprintln!("[{job_id}] failed: {message}"),
        SessionUpdate::Paused { job_id, completed } => {
            println!("[{job_id}] paused after {completed} frames")
        }
        _ => {}
    }
}
