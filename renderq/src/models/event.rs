/*
    Outward notifications of the queue. A front end subscribes to these through an `EventSink`;
    they serialize as `{ "event": "render-progress", "jobId": ... }`.
*/
use dcc::{Frame, Stream, SubProgress, TrackedProcess};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum QueueEvent {
    #[serde(rename_all = "camelCase")]
    RenderProgress {
        job_id: String,
        frame: Option<Frame>,
        detail: Option<SubProgress>,
        current_frame_index: Option<usize>,
        total_frames: usize,
        /// Whole job, 0 to 100.
        progress: f32,
    },
    #[serde(rename_all = "camelCase")]
    FrameRendered {
        job_id: String,
        frame: Frame,
        output_path: PathBuf,
        current_frame_index: Option<usize>,
        total_frames: usize,
    },
    #[serde(rename_all = "camelCase")]
    RenderComplete { job_id: String },
    #[serde(rename_all = "camelCase")]
    RenderError {
        job_id: String,
        frame: Option<Frame>,
        error: String,
        exit_code: Option<i32>,
    },
    #[serde(rename_all = "camelCase")]
    RenderPaused { job_id: String },
    #[serde(rename_all = "camelCase")]
    RenderOutput {
        job_id: String,
        output: String,
        stream: Stream,
    },
    #[serde(rename_all = "camelCase")]
    ProcessUpdate {
        job_id: String,
        process: Box<TrackedProcess>,
    },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::RenderProgress { .. } => "render-progress",
            QueueEvent::FrameRendered { .. } => "frame-rendered",
            QueueEvent::RenderComplete { .. } => "render-complete",
            QueueEvent::RenderError { .. } => "render-error",
            QueueEvent::RenderPaused { .. } => "render-paused",
            QueueEvent::RenderOutput { .. } => "render-output",
            QueueEvent::ProcessUpdate { .. } => "process-update",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            QueueEvent::RenderProgress { job_id, .. }
            | QueueEvent::FrameRendered { job_id, .. }
            | QueueEvent::RenderComplete { job_id }
            | QueueEvent::RenderError { job_id, .. }
            | QueueEvent::RenderPaused { job_id }
            | QueueEvent::RenderOutput { job_id, .. }
            | QueueEvent::ProcessUpdate { job_id, .. } => job_id,
        }
    }
}
