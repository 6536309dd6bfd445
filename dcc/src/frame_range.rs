/*
    Frame range text is what the user types into a job: "1-10, 20-30, 50".
    `parse` is lenient and never fails, it is used everywhere a job needs its frame list.
    `validate` is the strict sibling used when accepting user input.
*/
use thiserror::Error;

pub type Frame = u32;

/// Most frames a single range text may describe. Larger sequences are split across jobs.
pub const MAX_FRAMES: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameRangeError {
    #[error("Frame range is empty")]
    Empty,
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Invalid frame number: {0}")]
    InvalidFrame(String),
    #[error("Start frame ({start}) is greater than end frame ({end})")]
    Descending { start: i64, end: i64 },
    #[error("Frame numbers cannot be negative")]
    Negative,
    #[error("Frame range covers {count} frames, the limit is {limit}")]
    TooLarge { count: u64, limit: u64 },
}

enum Token {
    Single(i64),
    Span(i64, i64),
}

// A leading '-' belongs to the number, so the separator is searched from the second character.
fn split_span(token: &str) -> Option<(&str, &str)> {
    let offset = token.char_indices().nth(1)?.0;
    let index = token[offset..].find('-')? + offset;
    Some((&token[..index], &token[index + 1..]))
}

fn read_token(token: &str) -> Result<Token, FrameRangeError> {
    if let Ok(frame) = token.parse::<i64>() {
        return Ok(Token::Single(frame));
    }

    match split_span(token) {
        Some((start, end)) => {
            let start = start.trim().parse::<i64>();
            let end = end.trim().parse::<i64>();
            match (start, end) {
                (Ok(start), Ok(end)) => Ok(Token::Span(start, end)),
                _ => Err(FrameRangeError::InvalidRange(token.to_owned())),
            }
        }
        None if token.contains('-') => Err(FrameRangeError::InvalidRange(token.to_owned())),
        None => Err(FrameRangeError::InvalidFrame(token.to_owned())),
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Parse frame range text into an ascending list of unique frames.
/// Malformed, descending and negative tokens are dropped silently, as is any span
/// that would take the list past [`MAX_FRAMES`].
///
/// # Examples
/// ```
/// use dcc::frame_range::parse;
/// assert_eq!(parse("1-3, 7"), vec![1, 2, 3, 7]);
/// assert!(parse("5-2").is_empty());
/// ```
pub fn parse(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for token in tokens(text) {
        match read_token(token) {
            Ok(Token::Single(frame)) => {
                if let Ok(frame) = Frame::try_from(frame) {
                    frames.push(frame);
                }
            }
            Ok(Token::Span(start, end)) if start <= end => {
                if let (Ok(start), Ok(end)) = (Frame::try_from(start), Frame::try_from(end)) {
                    let len = u64::from(end - start) + 1;
                    if frames.len() as u64 + len <= MAX_FRAMES {
                        frames.extend(start..=end);
                    }
                }
            }
            _ => {}
        }
    }
    frames.sort_unstable();
    frames.dedup();
    frames
}

/// Collapse frames back into compact range text, e.g. `1-3, 7, 9-11`.
pub fn format(frames: &[Frame]) -> String {
    runs(frames)
        .into_iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Strict validation of frame range text. Reports the first offending token.
pub fn validate(text: &str) -> Result<(), FrameRangeError> {
    if text.trim().is_empty() {
        return Err(FrameRangeError::Empty);
    }

    let mut count: u64 = 0;
    for token in text.split(',').map(str::trim) {
        match read_token(token)? {
            Token::Single(frame) if frame < 0 => return Err(FrameRangeError::Negative),
            Token::Single(_) => count += 1,
            Token::Span(start, end) => {
                if start > end {
                    return Err(FrameRangeError::Descending { start, end });
                }
                if start < 0 || end < 0 {
                    return Err(FrameRangeError::Negative);
                }
                count += end.abs_diff(start) + 1;
            }
        }
    }
    if count > MAX_FRAMES {
        return Err(FrameRangeError::TooLarge {
            count,
            limit: MAX_FRAMES,
        });
    }
    Ok(())
}

/// Range text covering the scene's own frame span.
pub fn span(start: Frame, end: Frame) -> String {
    format!("{start}-{end}")
}

/// Group frames into inclusive runs of consecutive numbers. Input need not be sorted.
pub fn runs(frames: &[Frame]) -> Vec<(Frame, Frame)> {
    let mut sorted = frames.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut runs: Vec<(Frame, Frame)> = Vec::new();
    for frame in sorted {
        match runs.last_mut() {
            Some((_, end)) if frame == *end + 1 => *end = frame,
            _ => runs.push((frame, frame)),
        }
    }
    runs
}
