//! Crate-wide error type and the fatal / per-drive split

use std::path::PathBuf;
use thiserror::Error;

use crate::chunker::ChunkError;
use crate::pairing::PairingError;
use crate::records::GraphError;
use crate::schema::{SchemaError, ValidationError};
use crate::telemetry::TelemetryError;
use crate::video::VideoError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Pairing(#[from] PairingError),
    #[error("record graph invariant violated: {0}")]
    Graph(#[from] GraphError),

    #[error("schema validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("chunking: {0}")]
    Chunk(#[from] ChunkError),
    #[error("video: {0}")]
    Video(#[from] VideoError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("table file: {0}")]
    Avro(#[from] apache_avro::Error),
    #[error("cannot serialize table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Drive(String),
}

impl TransformError {
    /// Whether the batch may continue with the next drive.
    ///
    /// Configuration, pairing and graph invariant errors stop the batch;
    /// everything caused by one drive's inputs or outputs only abandons
    /// that drive.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            TransformError::Config(_)
                | TransformError::Schema(_)
                | TransformError::Pairing(_)
                | TransformError::Graph(_)
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransformError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;
