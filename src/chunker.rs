//! Partition a drive's frames into sequence windows
//!
//! Two policies:
//! - **Fixed duration**: `floor(chunk_size_sec * fps)` frames per window, the
//!   last window keeps whatever remains.
//! - **Wall-clock minute**: a new window starts whenever a frame's UTC
//!   minute differs from the previous frame's.
//!
//! Either way every frame lands in exactly one window, windows are in time
//! order, and zero frames give zero windows.

use thiserror::Error;

/// Longest drive a single recording may plausibly hold.
pub const MAX_DRIVE_SEC: f64 = 24.0 * 3600.0;

#[derive(Debug, Error, PartialEq)]
pub enum ChunkError {
    #[error("chunk size of {chunk_size_sec}s at {fps} fps gives an empty window")]
    EmptyWindow { chunk_size_sec: f64, fps: f64 },
    #[error("invalid frame rate {0}")]
    InvalidFps(f64),
    #[error("{frames} frames at {fps} fps is longer than {max_sec}s")]
    ImplausibleFrameCount { frames: u64, fps: f64, max_sec: f64 },
}

/// Inclusive frame range `[start_frame, end_frame]` of one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindow {
    pub index: usize,
    pub start_frame: u64,
    pub end_frame: u64,
}

impl FrameWindow {
    pub fn frame_count(&self) -> u64 {
        self.end_frame - self.start_frame + 1
    }

    pub fn frames(&self) -> std::ops::RangeInclusive<u64> {
        self.start_frame..=self.end_frame
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkPolicy {
    FixedDuration { chunk_size_sec: f64 },
    WallClockMinute,
}

impl ChunkPolicy {
    /// Splits `frame_count` frames recorded at `fps` starting at
    /// `start_epoch_sec` (only used by the minute policy).
    pub fn plan(&self, frame_count: u64, fps: f64, start_epoch_sec: f64) -> Result<Vec<FrameWindow>, ChunkError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ChunkError::InvalidFps(fps));
        }
        if frame_count as f64 > fps * MAX_DRIVE_SEC {
            return Err(ChunkError::ImplausibleFrameCount { frames: frame_count, fps, max_sec: MAX_DRIVE_SEC });
        }
        match *self {
            ChunkPolicy::FixedDuration { chunk_size_sec } => fixed_windows(frame_count, fps, chunk_size_sec),
            ChunkPolicy::WallClockMinute => Ok(minute_windows(frame_count, fps, start_epoch_sec)),
        }
    }
}

/// Frames per window for the fixed policy.
pub fn window_size(chunk_size_sec: f64, fps: f64) -> Result<u64, ChunkError> {
    let size = (chunk_size_sec * fps).floor();
    if !size.is_finite() || size < 1.0 {
        return Err(ChunkError::EmptyWindow { chunk_size_sec, fps });
    }
    Ok(size as u64)
}

pub fn fixed_windows(frame_count: u64, fps: f64, chunk_size_sec: f64) -> Result<Vec<FrameWindow>, ChunkError> {
    let size = window_size(chunk_size_sec, fps)?;
    let mut windows = Vec::new();
    let mut start = 0;
    while start < frame_count {
        let end = (start + size).min(frame_count) - 1;
        windows.push(FrameWindow { index: windows.len(), start_frame: start, end_frame: end });
        start = end + 1;
    }
    Ok(windows)
}

pub fn minute_windows(frame_count: u64, fps: f64, start_epoch_sec: f64) -> Vec<FrameWindow> {
    let minute_of = |frame: u64| ((start_epoch_sec + frame as f64 / fps) / 60.0).floor() as i64;

    let mut windows = Vec::new();
    let mut current: Option<(i64, u64)> = None;
    for frame in 0..frame_count {
        let minute = minute_of(frame);
        match current {
            Some((m, _)) if m == minute => {}
            Some((_, start)) => {
                windows.push(FrameWindow { index: windows.len(), start_frame: start, end_frame: frame - 1 });
                current = Some((minute, frame));
            }
            None => current = Some((minute, frame)),
        }
    }
    if let Some((_, start)) = current {
        windows.push(FrameWindow { index: windows.len(), start_frame: start, end_frame: frame_count - 1 });
    }
    windows
}
