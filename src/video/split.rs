//! Cut one sequence's frame window out of the source video

use std::path::{Path, PathBuf};

use super::{VideoError, VideoTool};
use crate::chunker::FrameWindow;

/// Outcome of one split. A frame-count mismatch is reported here, not as an error.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentReport {
    pub path: PathBuf,
    pub start_time_sec: f64,
    pub requested_frames: u64,
    pub produced_frames: u64,
}

impl SegmentReport {
    pub fn matches(&self) -> bool {
        self.requested_frames == self.produced_frames
    }
}

/// `round(start_frame / fps, 3)`
pub fn segment_start_sec(start_frame: u64, fps: f64) -> f64 {
    (start_frame as f64 / fps * 1000.0).round() / 1000.0
}

pub struct VideoSplitter<'a> {
    tool: &'a dyn VideoTool,
}

impl<'a> VideoSplitter<'a> {
    pub fn new(tool: &'a dyn VideoTool) -> Self {
        Self { tool }
    }

    /// Extracts `window` from `source` into `dest` by stream copy, then
    /// re-probes `dest` and compares its frame count with the request.
    pub fn split(
        &self,
        source: &Path,
        fps: f64,
        window: &FrameWindow,
        dest: &Path,
    ) -> Result<SegmentReport, VideoError> {
        if !source.is_file() {
            return Err(VideoError::Unreadable(source.to_path_buf()));
        }
        if let Some(dir) = dest.parent() {
            std::fs::create_dir_all(dir).map_err(|source| VideoError::Output { path: dir.to_path_buf(), source })?;
        }

        let start_time_sec = segment_start_sec(window.start_frame, fps);
        let requested_frames = window.frame_count();
        tracing::info!(
            start_frame = window.start_frame,
            end_frame = window.end_frame,
            start_time_sec,
            "splitting video segment"
        );
        self.tool.extract_segment(source, start_time_sec, requested_frames, dest)?;

        let produced_frames = self.tool.probe(dest)?.frame_count;
        let report = SegmentReport { path: dest.to_path_buf(), start_time_sec, requested_frames, produced_frames };
        if report.matches() {
            tracing::debug!(frames = produced_frames, "segment frame count ok");
        } else {
            tracing::warn!(
                segment = %dest.display(),
                requested = requested_frames,
                produced = produced_frames,
                "segment frame count mismatch"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoInfo;
    use std::cell::RefCell;

    struct FakeTool {
        produced: u64,
        calls: RefCell<Vec<(f64, u64)>>,
        fail: bool,
    }

    impl FakeTool {
        fn new(produced: u64) -> Self {
            Self { produced, calls: RefCell::new(Vec::new()), fail: false }
        }
    }

    impl VideoTool for FakeTool {
        fn probe(&self, _path: &Path) -> Result<VideoInfo, VideoError> {
            Ok(VideoInfo {
                width: 640,
                height: 480,
                fps: 30.0,
                frame_count: self.produced,
                duration_sec: self.produced as f64 / 30.0,
                codec: "h264".into(),
                creation_time: None,
            })
        }

        fn extract_segment(&self, _source: &Path, start_sec: f64, frames: u64, dest: &Path) -> Result<(), VideoError> {
            self.calls.borrow_mut().push((start_sec, frames));
            if self.fail {
                return Err(VideoError::Failed {
                    tool: "ffmpeg".into(),
                    status: "exit status: 1".into(),
                    stderr: "boom".into(),
                });
            }
            std::fs::write(dest, b"segment")
                .map_err(|source| VideoError::Output { path: dest.to_path_buf(), source })
        }
    }

    fn source_file(dir: &Path) -> PathBuf {
        let p = dir.join("drive.mp4");
        std::fs::write(&p, b"video").unwrap();
        p
    }

    #[test]
    fn start_time_is_rounded_to_milliseconds() {
        assert_eq!(segment_start_sec(100, 30.0), 3.333);
        assert_eq!(segment_start_sec(0, 30.0), 0.0);
        assert_eq!(segment_start_sec(200, 30.0), 6.667);
    }

    #[test]
    fn requests_exact_window_and_flags_short_output() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_file(tmp.path());
        let tool = FakeTool::new(119);
        let window = FrameWindow { index: 1, start_frame: 100, end_frame: 219 };
        let dest = tmp.path().join("seq/video/video.mp4");

        let report = VideoSplitter::new(&tool).split(&src, 30.0, &window, &dest).unwrap();
        assert_eq!(tool.calls.borrow().as_slice(), &[(3.333, 120)]);
        assert_eq!(report.requested_frames, 120);
        assert_eq!(report.produced_frames, 119);
        assert!(!report.matches());
        assert!(dest.is_file());
    }

    #[test]
    fn matching_output_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_file(tmp.path());
        let tool = FakeTool::new(60);
        let window = FrameWindow { index: 0, start_frame: 0, end_frame: 59 };
        let report = VideoSplitter::new(&tool).split(&src, 30.0, &window, &tmp.path().join("v.mp4")).unwrap();
        assert!(report.matches());
    }

    #[test]
    fn extraction_failure_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_file(tmp.path());
        let tool = FakeTool { fail: true, ..FakeTool::new(0) };
        let window = FrameWindow { index: 0, start_frame: 0, end_frame: 9 };
        let err = VideoSplitter::new(&tool).split(&src, 30.0, &window, &tmp.path().join("v.mp4")).unwrap_err();
        assert!(matches!(err, VideoError::Failed { .. }));
    }

    #[test]
    fn missing_source_is_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = FakeTool::new(0);
        let window = FrameWindow { index: 0, start_frame: 0, end_frame: 9 };
        let err = VideoSplitter::new(&tool)
            .split(&tmp.path().join("missing.mp4"), 30.0, &window, &tmp.path().join("v.mp4"))
            .unwrap_err();
        assert!(matches!(err, VideoError::Unreadable(_)));
        assert!(tool.calls.borrow().is_empty());
    }
}
