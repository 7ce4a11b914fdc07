//! drive2schema - Convert dashcam drive recordings into the diary schema
//!
//! A drive is one video plus the telemetry log recorded next to it. Each
//! drive is cut into sequences; every frame and telemetry sample becomes an
//! element with its data and sensor readings, and every sequence gets its
//! own video segment and four JSON tables:
//!
//! ```text
//! diary → drive → sequence → element → data → sensor reading
//! ```
//!
//! # Sources
//!
//! - **OnePlus**: `.mp4` + 1 Hz GPS `.xml`, fixed-duration sequences
//! - **Waylens**: `.mp4` + frame-indexed `.csv` (GNSS, IMU, OBD speed),
//!   sequences aligned to wall-clock minutes
//!
//! # Example
//!
//! ```rust,no_run
//! use drive2schema::{Hardware, TransformOptions, run_batch};
//! use drive2schema::video::Ffmpeg;
//!
//! let options = TransformOptions {
//!     hardware: Hardware::Waylens,
//!     vehicle_id: "sally".to_string(),
//!     source_dir: "recordings".into(),
//!     dest_dir: "out".into(),
//!     schema_dir: "schemas".into(),
//!     chunk_size_sec: 60.0,
//!     location: "Berlin".to_string(),
//!     show_progress: true,
//!     json_dump: false,
//!     push_to: None,
//! };
//!
//! let report = run_batch(&options, &Ffmpeg::from_env())?;
//! report.summary.print();
//! # Ok::<(), drive2schema::TransformError>(())
//! ```

pub mod align;
pub mod blobstore;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod error;
pub mod layout;
pub mod pairing;
pub mod records;
pub mod schema;
pub mod tables;
pub mod telemetry;
pub mod transform;
pub mod validate;
pub mod video;

// Re-export main types for convenience
pub use config::{Hardware, TransformOptions};
pub use error::{Result, TransformError};
pub use records::{RecordGraph, RecordKind, Token};
pub use schema::SchemaRegistry;
pub use transform::batch::{BatchReport, run_batch};
pub use transform::{BatchTransformer, DriveTransformer, OnePlus, SummaryReport, Waylens};
