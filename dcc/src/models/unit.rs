use crate::frame_range::Frame;
use serde::{Deserialize, Serialize};

/// How much of a job a single process invocation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderUnit {
    // JSON: "Frame": 12
    Frame(Frame),
    // JSON: "Range": {"start": 1, "end": 10}
    Range { start: Frame, end: Frame },
}

impl RenderUnit {
    pub fn start(&self) -> Frame {
        match self {
            RenderUnit::Frame(frame) => *frame,
            RenderUnit::Range { start, .. } => *start,
        }
    }

    pub fn end(&self) -> Frame {
        match self {
            RenderUnit::Frame(frame) => *frame,
            RenderUnit::Range { end, .. } => *end,
        }
    }

    pub fn contains(&self, frame: Frame) -> bool {
        (self.start()..=self.end()).contains(&frame)
    }

    pub fn frames(&self) -> impl Iterator<Item = Frame> {
        self.start()..=self.end()
    }
}

/// Whether an application renders one frame per process or a whole span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PerFrame,
    Range,
}
