//! Transformation options and their resolution from flags and environment

use clap::ValueEnum;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::TransformError;
use crate::layout::is_valid_vehicle_id;

pub const SCHEMA_DIR_ENV: &str = "DRIVE2SCHEMA_SCHEMA_DIR";
pub const DEFAULT_SCHEMA_DIR: &str = "schemas";
pub const DEFAULT_CHUNK_SIZE_SEC: f64 = 60.0;
pub const DEFAULT_LOCATION: &str = "Berlin";

/// Recording hardware a source directory comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Hardware {
    /// Phone rig: `.mp4` + GPS `.xml`
    #[value(name = "oneplus")]
    OnePlus,
    /// Dashcam export: `.mp4` + frame-indexed `.csv`
    Waylens,
    /// Stereo camera (not supported yet)
    Zed,
}

impl Hardware {
    pub fn telemetry_extension(self) -> &'static str {
        match self {
            Hardware::OnePlus => "xml",
            Hardware::Waylens => "csv",
            Hardware::Zed => "svo",
        }
    }
}

impl fmt::Display for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Hardware::OnePlus => "oneplus",
            Hardware::Waylens => "waylens",
            Hardware::Zed => "zed",
        })
    }
}

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub hardware: Hardware,
    pub vehicle_id: String,
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub chunk_size_sec: f64,
    /// Free-form location label stored on new diaries.
    pub location: String,
    pub show_progress: bool,
    /// Also write a JSON copy next to every table.
    pub json_dump: bool,
    /// Directory-backed blob store to push finished diaries to.
    pub push_to: Option<PathBuf>,
}

impl TransformOptions {
    /// Rejects option combinations that make the whole batch pointless.
    pub fn check(&self) -> Result<(), TransformError> {
        if !is_valid_vehicle_id(&self.vehicle_id) {
            return Err(TransformError::Config(format!("invalid vehicle id '{}'", self.vehicle_id)));
        }
        if !(self.chunk_size_sec.is_finite() && self.chunk_size_sec > 0.0) {
            return Err(TransformError::Config(format!("chunk size must be positive, got {}", self.chunk_size_sec)));
        }
        if !self.source_dir.is_dir() {
            return Err(TransformError::Config(format!(
                "source {} is not a directory",
                self.source_dir.display()
            )));
        }
        if same_location(&self.source_dir, &self.dest_dir) {
            return Err(TransformError::Config(format!(
                "source and destination must differ ({})",
                self.source_dir.display()
            )));
        }
        Ok(())
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// `--schema-dir`, else `DRIVE2SCHEMA_SCHEMA_DIR`, else `./schemas`.
pub fn resolve_schema_dir(flag: Option<PathBuf>) -> PathBuf {
    schema_dir_from(flag, std::env::var_os(SCHEMA_DIR_ENV))
}

fn schema_dir_from(flag: Option<PathBuf>, env: Option<OsString>) -> PathBuf {
    flag.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_DIR))
}
