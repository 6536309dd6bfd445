use crate::frame_range::Frame;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Progress inside a single frame, when the tool reports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubProgress {
    Samples { current: u32, total: u32 },
    Tiles { current: u32, total: u32 },
    Percent { value: f32 },
}

impl SubProgress {
    /// Fraction of the current frame done, 0.0 to 1.0.
    pub fn fraction(&self) -> f32 {
        let ratio = match self {
            SubProgress::Samples { current, total } | SubProgress::Tiles { current, total } => {
                if *total == 0 {
                    0.0
                } else {
                    *current as f32 / *total as f32
                }
            }
            SubProgress::Percent { value } => value / 100.0,
        };
        ratio.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Normalised events an output parser produces from a tool's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RenderEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        frame: Option<Frame>,
        detail: Option<SubProgress>,
        /// Zero based position of `frame` inside the job's frame sequence.
        frame_index: Option<usize>,
        total_frames: usize,
    },
    #[serde(rename_all = "camelCase")]
    FrameRendered {
        frame: Frame,
        output: PathBuf,
        frame_index: Option<usize>,
        total_frames: usize,
    },
    RawOutput {
        text: String,
        stream: Stream,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        exit_code: Option<i32>,
    },
    Complete,
}

impl RenderEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderEvent::Error { .. } | RenderEvent::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_progress_fraction_is_clamped() {
        assert_eq!(SubProgress::Samples { current: 64, total: 128 }.fraction(), 0.5);
        assert_eq!(SubProgress::Tiles { current: 3, total: 0 }.fraction(), 0.0);
        assert_eq!(SubProgress::Percent { value: 140.0 }.fraction(), 1.0);
    }

    #[test]
    fn events_serialize_with_kebab_tags() {
        let event = RenderEvent::FrameRendered {
            frame: 3,
            output: PathBuf::from("out_0003.png"),
            frame_index: Some(2),
            total_frames: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "frame-rendered");
        assert_eq!(json["frameIndex"], 2);
    }
}
