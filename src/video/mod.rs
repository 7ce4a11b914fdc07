//! Video metadata and segment extraction
//!
//! The pipeline only talks to [`VideoTool`]; [`Ffmpeg`] is the production
//! implementation that shells out to `ffprobe`/`ffmpeg`. Tests plug in their
//! own tool so no binaries are needed.

pub mod probe;
pub mod split;

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use probe::Ffmpeg;
pub use split::{SegmentReport, VideoSplitter};

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("cannot read video {0}")]
    Unreadable(PathBuf),
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed { tool: String, status: String, stderr: String },
    #[error("cannot parse probe output: {0}")]
    Parse(String),
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
    #[error("cannot create segment directory {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: i64,
    pub height: i64,
    pub fps: f64,
    pub frame_count: u64,
    pub duration_sec: f64,
    pub codec: String,
    /// Container creation time, when the file carries one.
    pub creation_time: Option<DateTime<Utc>>,
}

impl VideoInfo {
    /// Frame rate cross-checked against `frame_count / duration`. When the
    /// integer parts disagree the measured rate wins, truncated.
    pub fn reconciled_fps(&self) -> f64 {
        if self.duration_sec <= 0.0 || self.frame_count == 0 {
            return self.fps;
        }
        let measured = self.frame_count as f64 / self.duration_sec;
        if self.fps.trunc() != measured.trunc() {
            tracing::warn!(container = self.fps, measured, "frame rate disagrees with frame count, using measured");
            measured.trunc()
        } else {
            self.fps
        }
    }
}

/// Probing and stream-copy extraction of video files.
pub trait VideoTool {
    fn probe(&self, path: &Path) -> Result<VideoInfo, VideoError>;

    /// Writes `frames` frames of `source` starting at `start_sec` to `dest`
    /// without re-encoding.
    fn extract_segment(&self, source: &Path, start_sec: f64, frames: u64, dest: &Path) -> Result<(), VideoError>;
}

pub const FFMPEG_PATH_ENV: &str = "DRIVE2SCHEMA_FFMPEG_PATH";
pub const FFPROBE_PATH_ENV: &str = "DRIVE2SCHEMA_FFPROBE_PATH";

/// Environment override if set and non-empty, bare tool name (PATH lookup) otherwise.
pub fn resolve_tool(env_var: &str, default_name: &str) -> PathBuf {
    match std::env::var_os(env_var) {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => PathBuf::from(default_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(fps: f64, frames: u64, duration: f64) -> VideoInfo {
        VideoInfo {
            width: 1920,
            height: 1080,
            fps,
            frame_count: frames,
            duration_sec: duration,
            codec: "h264".into(),
            creation_time: None,
        }
    }

    #[test]
    fn fps_is_kept_when_consistent() {
        assert_eq!(info(29.97, 1798, 60.0).reconciled_fps(), 29.97);
    }

    #[test]
    fn fps_follows_frame_count_when_inconsistent() {
        assert_eq!(info(90000.0, 1800, 60.0).reconciled_fps(), 30.0);
        assert_eq!(info(30.0, 0, 0.0).reconciled_fps(), 30.0);
    }

    #[test]
    fn tool_falls_back_to_path_lookup() {
        assert_eq!(resolve_tool("DRIVE2SCHEMA_TEST_UNSET_TOOL", "ffprobe"), PathBuf::from("ffprobe"));
    }
}
