//! On-disk layout of transformed drives
//!
//! ```text
//! <root>/<date>_<diary_token>/
//!     vehicle_<vehicle_id>/
//!         drive_diary.json
//!         drives/<drive_token>/
//!             drive.json
//!             sequences/<NNNNNN>_<sequence_token>/
//!                 sequence.json element.json data.json sensor.json
//!                 video/video.mp4
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::records::Token;

pub const DRIVES_DIR: &str = "drives";
pub const SEQUENCES_DIR: &str = "sequences";
pub const VIDEO_DIR: &str = "video";
pub const SEGMENT_FILE: &str = "video.mp4";

const TOKEN: &str = "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}";

static DIARY_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^([0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}})_({TOKEN})$")).expect("diary pattern"));
static SEQUENCE_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^([0-9]{{6}})_({TOKEN})$")).expect("sequence pattern"));
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{TOKEN}$")).expect("token pattern"));
static VEHICLE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new("^[0-9A-Za-z_-]+$").expect("vehicle pattern"));

#[derive(Debug, Clone)]
pub struct FileSystemLayout {
    root: PathBuf,
}

impl FileSystemLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn diary_dir(&self, date: &str, diary: &Token) -> PathBuf {
        self.root.join(format!("{date}_{diary}"))
    }

    pub fn vehicle_dir(&self, date: &str, diary: &Token, vehicle_id: &str) -> PathBuf {
        self.diary_dir(date, diary).join(format!("vehicle_{vehicle_id}"))
    }

    pub fn drive_dir(&self, date: &str, diary: &Token, vehicle_id: &str, drive: &Token) -> PathBuf {
        self.vehicle_dir(date, diary, vehicle_id).join(DRIVES_DIR).join(drive.as_str())
    }

    pub fn sequence_dir(drive_dir: &Path, index: usize, sequence: &Token) -> PathBuf {
        drive_dir.join(SEQUENCES_DIR).join(format!("{index:06}_{sequence}"))
    }

    /// Segment path relative to its sequence directory, as stored in camera readings.
    pub fn segment_relative() -> String {
        format!("{VIDEO_DIR}/{SEGMENT_FILE}")
    }

    pub fn segment_path(sequence_dir: &Path) -> PathBuf {
        sequence_dir.join(VIDEO_DIR).join(SEGMENT_FILE)
    }
}

/// `(date, diary_token)` of a `<date>_<token>` directory name.
pub fn parse_diary_dir(name: &str) -> Option<(String, Token)> {
    let caps = DIARY_DIR_RE.captures(name)?;
    Some((caps[1].to_string(), Token::from(&caps[2])))
}

/// `(index, sequence_token)` of a `<NNNNNN>_<token>` directory name.
pub fn parse_sequence_dir(name: &str) -> Option<(usize, Token)> {
    let caps = SEQUENCE_DIR_RE.captures(name)?;
    Some((caps[1].parse().ok()?, Token::from(&caps[2])))
}

/// Vehicle id of a `vehicle_<id>` directory name.
pub fn parse_vehicle_dir(name: &str) -> Option<&str> {
    name.strip_prefix("vehicle_").filter(|id| is_valid_vehicle_id(id))
}

pub fn is_token(name: &str) -> bool {
    TOKEN_RE.is_match(name)
}

pub fn is_valid_vehicle_id(id: &str) -> bool {
    VEHICLE_ID_RE.is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_paths() {
        let layout = FileSystemLayout::new("/out");
        let diary = Token::from("d");
        let drive = Token::from("r");
        let dir = layout.drive_dir("2019-06-13", &diary, "sally", &drive);
        assert_eq!(dir, PathBuf::from("/out/2019-06-13_d/vehicle_sally/drives/r"));

        let seq = FileSystemLayout::sequence_dir(&dir, 7, &Token::from("s"));
        assert_eq!(seq, PathBuf::from("/out/2019-06-13_d/vehicle_sally/drives/r/sequences/000007_s"));
        assert_eq!(FileSystemLayout::segment_path(&seq), seq.join("video/video.mp4"));
        assert_eq!(FileSystemLayout::segment_relative(), "video/video.mp4");
    }

    #[test]
    fn generated_names_parse_back() {
        let token = Token::generate();
        let (date, parsed) = parse_diary_dir(&format!("2019-06-13_{token}")).unwrap();
        assert_eq!(date, "2019-06-13");
        assert_eq!(parsed, token);

        let (idx, parsed) = parse_sequence_dir(&format!("000012_{token}")).unwrap();
        assert_eq!(idx, 12);
        assert_eq!(parsed, token);
        assert!(is_token(token.as_str()));
    }

    #[test]
    fn rejects_foreign_names() {
        assert!(parse_diary_dir("2019-6-13_abc").is_none());
        assert!(parse_sequence_dir("12_abc").is_none());
        assert_eq!(parse_vehicle_dir("vehicle_sally"), Some("sally"));
        assert!(parse_vehicle_dir("car_sally").is_none());
        assert!(!is_valid_vehicle_id("../etc"));
    }
}
