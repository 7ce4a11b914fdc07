use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DEFAULT_CHUNK_SIZE_SEC, DEFAULT_LOCATION, Hardware};

#[derive(Parser, Debug)]
#[command(
    name = "drive2schema",
    about = "Convert dashcam drive recordings into diary/drive/sequence records",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transform every (video, telemetry) pair of a source directory
    Transform {
        /// Recording hardware of the source directory
        #[arg(value_enum)]
        hardware: Hardware,
        /// Vehicle identifier stored on diaries and used in directory names
        #[arg(short = 'v', long = "vehicle")]
        vehicle: String,
        /// Directory holding the <prefix>.mp4 + telemetry pairs
        #[arg(short = 's', long = "source")]
        source: PathBuf,
        /// Destination root of the output tree
        #[arg(short = 'd', long = "dest")]
        dest: PathBuf,
        /// Schema directory (default: $DRIVE2SCHEMA_SCHEMA_DIR or ./schemas)
        #[arg(long = "schema-dir")]
        schema_dir: Option<PathBuf>,
        /// Sequence length in seconds (fixed-duration sources only)
        #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE_SEC)]
        chunk_size: f64,
        /// Location label stored on new diaries
        #[arg(long = "location", default_value = DEFAULT_LOCATION)]
        location: String,
        /// Push every touched diary to this directory-backed store after the batch
        #[arg(long = "push-to")]
        push_to: Option<PathBuf>,
        /// Disable the per-drive progress bar
        #[arg(long = "no-progress", action = ArgAction::SetTrue)]
        no_progress: bool,
        /// Also write a JSON copy of every table
        #[arg(long = "json", action = ArgAction::SetTrue)]
        json: bool,
    },

    /// List the matched (video, telemetry) pairs of a source directory
    Inspect {
        /// Source directory
        source: PathBuf,
        /// Recording hardware of the source directory
        #[arg(long = "hardware", value_enum)]
        hardware: Hardware,
    },

    /// Show the record kinds and their schema files
    Schema {
        #[arg(long = "schema-dir")]
        schema_dir: Option<PathBuf>,
    },

    /// Check an output tree's layout and tables against the schemas
    Validate {
        /// Destination root written by `transform`
        root: PathBuf,
        #[arg(long = "schema-dir")]
        schema_dir: Option<PathBuf>,
    },
}
