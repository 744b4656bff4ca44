//! Error handling for dimuon selection runs.
//!
//! Every failure here is fatal for the run: schema problems abort before the
//! first event, per-event failures abort the pass instead of silently skipping
//! an event, since a skipped event would corrupt the cutflow.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DimuonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dataset not found at path: {path}")]
    DatasetNotFound { path: PathBuf },

    #[error("Schema error in column '{column}': {reason}")]
    Schema { column: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Misaligned muon arrays in event {entry}: {details}")]
    MisalignedArrays { entry: u64, details: String },

    #[error("Malformed value in column '{column}' at event {entry}: {reason}")]
    MalformedValue {
        column: String,
        entry: u64,
        reason: String,
    },

    #[error("Non-finite value {value} for histogram '{histogram}'")]
    NonFiniteValue { histogram: String, value: f64 },

    #[error("Stage '{stage}' precondition violated at event {entry}: {reason}")]
    StagePrecondition {
        stage: String,
        entry: u64,
        reason: String,
    },

    #[error("Invalid stage order: stage '{stage}' requires {requirement}, which no earlier stage provides")]
    PipelineOrder { stage: String, requirement: String },

    #[error("Cannot merge histogram '{name}': {reason}")]
    HistogramMismatch { name: String, reason: String },

    #[error("Cannot merge cutflows: {reason}")]
    CutflowMismatch { reason: String },

    #[error("Worker for events {start}..{end} failed: {reason}")]
    WorkerFailed { start: u64, end: u64, reason: String },

    #[error("Background task failed while {task}: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("Failed to render plot of histogram '{histogram}': {reason}")]
    Render { histogram: String, reason: String },

    #[error("Failed to write output {path}: {reason}")]
    OutputWrite { path: PathBuf, reason: String },
}

impl DimuonError {
    /// Create a schema error for a column
    pub fn schema(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a stage precondition error
    pub fn precondition(stage: impl Into<String>, entry: u64, reason: impl Into<String>) -> Self {
        Self::StagePrecondition {
            stage: stage.into(),
            entry,
            reason: reason.into(),
        }
    }

    /// Whether this error was raised before any event could be processed
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. }
                | Self::Configuration { .. }
                | Self::DatasetNotFound { .. }
                | Self::PipelineOrder { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DimuonError>;
