//! ffprobe / ffmpeg wrapper

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{FFMPEG_PATH_ENV, FFPROBE_PATH_ENV, VideoError, VideoInfo, VideoTool, resolve_tool};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    streams: Option<Vec<ProbeStream>>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    tags: Option<ProbeTags>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    tags: Option<ProbeTags>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    creation_time: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Ffmpeg {
    /// Binaries from `DRIVE2SCHEMA_FFMPEG_PATH` / `DRIVE2SCHEMA_FFPROBE_PATH`, else PATH.
    pub fn from_env() -> Self {
        Self { ffmpeg: resolve_tool(FFMPEG_PATH_ENV, "ffmpeg"), ffprobe: resolve_tool(FFPROBE_PATH_ENV, "ffprobe") }
    }

    fn run(&self, program: &Path, cmd: &mut Command) -> Result<Vec<u8>, VideoError> {
        let tool = program.display().to_string();
        tracing::debug!(?cmd, "running");
        let output = cmd.output().map_err(|source| VideoError::Spawn { tool: tool.clone(), source })?;
        if !output.status.success() {
            return Err(VideoError::Failed {
                tool,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::from_env()
    }
}

impl VideoTool for Ffmpeg {
    fn probe(&self, path: &Path) -> Result<VideoInfo, VideoError> {
        if !path.is_file() {
            return Err(VideoError::Unreadable(path.to_path_buf()));
        }
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]).arg(path);
        let stdout = self.run(&self.ffprobe, &mut cmd)?;
        parse_probe_json(&stdout, path)
    }

    fn extract_segment(&self, source: &Path, start_sec: f64, frames: u64, dest: &Path) -> Result<(), VideoError> {
        if !source.is_file() {
            return Err(VideoError::Unreadable(source.to_path_buf()));
        }
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-v", "error", "-ss", &format!("{start_sec:.3}"), "-i"])
            .arg(source)
            .args(["-c:v", "copy", "-c:a", "copy", "-frames:v", &frames.to_string()])
            .arg(dest);
        self.run(&self.ffmpeg, &mut cmd).map(|_| ())
    }
}

/// Turns `ffprobe -print_format json` output into [`VideoInfo`]; the first
/// video stream wins.
pub fn parse_probe_json(json: &[u8], path: &Path) -> Result<VideoInfo, VideoError> {
    let probe: ProbeOutput = serde_json::from_slice(json).map_err(|e| VideoError::Parse(e.to_string()))?;

    let stream = probe
        .streams
        .unwrap_or_default()
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| VideoError::NoVideoStream(path.to_path_buf()))?;

    let fps = parse_frame_rate(stream.r_frame_rate.as_deref())
        .or_else(|| parse_frame_rate(stream.avg_frame_rate.as_deref()))
        .ok_or_else(|| VideoError::Parse("missing frame rate".to_string()))?;

    let format_duration = probe.format.as_ref().and_then(|f| parse_seconds(f.duration.as_deref()));
    let duration_sec = format_duration.or_else(|| parse_seconds(stream.duration.as_deref())).unwrap_or(0.0);

    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(n) => n,
        None => {
            let estimate = (duration_sec * fps).round() as u64;
            tracing::debug!(path = %path.display(), estimate, "no frame count in container, estimating");
            estimate
        }
    };

    let creation_time = probe
        .format
        .as_ref()
        .and_then(|f| f.tags.as_ref())
        .and_then(|t| t.creation_time.as_deref())
        .or_else(|| stream.tags.as_ref().and_then(|t| t.creation_time.as_deref()))
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(VideoInfo {
        width: stream.width.unwrap_or(-1),
        height: stream.height.unwrap_or(-1),
        fps,
        frame_count,
        duration_sec,
        codec: stream.codec_name.unwrap_or_default(),
        creation_time,
    })
}

/// `"30000/1001"` or `"30"` → fps.
fn parse_frame_rate(rate: Option<&str>) -> Option<f64> {
    let rate = rate?;
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value?.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"{
        "streams": [
            {"codec_type": "audio", "codec_name": "aac"},
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "30000/1001", "nb_frames": "1798", "duration": "59.993"}
        ],
        "format": {"duration": "60.000", "tags": {"creation_time": "2019-06-13T00:46:29.000000Z"}}
    }"#;

    #[test]
    fn parses_video_stream() {
        let info = parse_probe_json(PROBE.as_bytes(), Path::new("a.mp4")).unwrap();
        assert_eq!(info.codec, "h264");
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.fps - 29.97).abs() < 1e-2);
        assert_eq!(info.frame_count, 1798);
        assert_eq!(info.duration_sec, 60.0);
        assert_eq!(info.creation_time.unwrap().timestamp(), 1_560_386_789);
    }

    #[test]
    fn missing_frame_count_is_estimated() {
        let json = r#"{"streams": [{"codec_type": "video", "r_frame_rate": "10/1"}], "format": {"duration": "12.0"}}"#;
        let info = parse_probe_json(json.as_bytes(), Path::new("a.mp4")).unwrap();
        assert_eq!(info.frame_count, 120);
        assert!(info.creation_time.is_none());
    }

    #[test]
    fn audio_only_file_is_rejected() {
        let json = r#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(parse_probe_json(json.as_bytes(), Path::new("a.m4a")), Err(VideoError::NoVideoStream(_))));
    }

    #[test]
    fn frame_rate_strings() {
        assert_eq!(parse_frame_rate(Some("30/1")), Some(30.0));
        assert_eq!(parse_frame_rate(Some("25")), Some(25.0));
        assert_eq!(parse_frame_rate(Some("0/0")), None);
        assert_eq!(parse_frame_rate(None), None);
    }

    #[test]
    fn missing_source_is_unreadable() {
        let tool = Ffmpeg { ffmpeg: "ffmpeg".into(), ffprobe: "ffprobe".into() };
        let err = tool.probe(Path::new("/definitely/not/here.mp4")).unwrap_err();
        assert!(matches!(err, VideoError::Unreadable(_)));
    }
}
