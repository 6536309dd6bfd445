use crate::models::event::QueueEvent;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Where the queue publishes its events. Emitting must not block the render loop.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &QueueEvent);
}

/// Logs every event. The default when nothing else listens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &QueueEvent) {
        let job = event.job_id();
        match event {
            QueueEvent::RenderOutput { output, stream, .. } => {
                tracing::trace!(job, ?stream, "{}", output.trim_end())
            }
            QueueEvent::RenderProgress {
                frame, progress, ..
            } => tracing::debug!(job, ?frame, "progress {progress:.1}%"),
            QueueEvent::FrameRendered {
                frame, output_path, ..
            } => tracing::info!(job, frame, "frame rendered: {}", output_path.display()),
            QueueEvent::ProcessUpdate { process, .. } => {
                tracing::debug!(job, pid = ?process.pid, status = ?process.status, "process update")
            }
            QueueEvent::RenderError {
                error, exit_code, ..
            } => tracing::warn!(job, ?exit_code, "render failed: {error}"),
            QueueEvent::RenderComplete { .. } | QueueEvent::RenderPaused { .. } => {
                tracing::info!(job, "{}", event.name())
            }
        }
    }
}

/// Forwards events to a channel, e.g. a UI bridge or a test.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<QueueEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<QueueEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &QueueEvent) {
        // a dropped receiver only means nobody is listening anymore
        let _ = self.sender.send(event.clone());
    }
}
