//! Match video files with their telemetry logs by file-name prefix

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::Hardware;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("source directory {path} cannot be listed: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("found {videos} videos but {logs} .{extension} telemetry files")]
    CountMismatch { videos: usize, logs: usize, extension: &'static str },
    #[error("no matching telemetry for {0}")]
    Unmatched(String),
    #[error("no drives found in {0}")]
    Empty(PathBuf),
}

/// One drive's inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivePair {
    pub prefix: String,
    pub video: PathBuf,
    pub telemetry: PathBuf,
}

/// Pairs `<prefix>.mp4` with `<prefix>.<telemetry ext>` in `dir`, sorted by prefix.
///
/// Both sides must have the same number of files and the same prefixes.
pub fn pair_sources(dir: &Path, hardware: Hardware) -> Result<Vec<DrivePair>, PairingError> {
    let extension = hardware.telemetry_extension();
    let entries =
        std::fs::read_dir(dir).map_err(|source| PairingError::Unreadable { path: dir.to_path_buf(), source })?;

    let mut videos = BTreeMap::new();
    let mut logs = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| PairingError::Unreadable { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let (Some(stem), Some(ext)) = (path.file_stem(), path.extension()) else {
            continue;
        };
        let stem = stem.to_string_lossy().to_string();
        let ext = ext.to_string_lossy().to_ascii_lowercase();
        if ext == "mp4" {
            videos.insert(stem, path);
        } else if ext == extension {
            logs.insert(stem, path);
        }
    }

    if videos.len() != logs.len() {
        return Err(PairingError::CountMismatch { videos: videos.len(), logs: logs.len(), extension });
    }
    if videos.is_empty() {
        return Err(PairingError::Empty(dir.to_path_buf()));
    }

    let mut pairs = Vec::with_capacity(videos.len());
    for (prefix, video) in videos {
        let telemetry = logs.remove(&prefix).ok_or_else(|| PairingError::Unmatched(video.display().to_string()))?;
        pairs.push(DrivePair { prefix, video, telemetry });
    }
    Ok(pairs)
}

/// Print matched pairs for a source directory
pub fn inspect_sources(dir: &Path, hardware: Hardware) -> anyhow::Result<()> {
    let pairs = pair_sources(dir, hardware)?;
    println!("Source: {} ({})", dir.display(), hardware);
    println!("---------------------------------------------------------------");
    for pair in &pairs {
        let video = pair.video.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let log = pair.telemetry.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        println!("{:<32} {:<36} {}", pair.prefix, video, log);
    }
    println!("{} drive(s)", pairs.len());
    Ok(())
}
