//! Error taxonomy for the recognition pipeline.
//!
//! Three families of failure are distinguished:
//! - [`VisionError`]: a call into the vision library failed. Reported as a
//!   transient message, scoped to the smallest unit of work (one category,
//!   one frame, one image).
//! - [`Precondition`]: an operation was refused because a model or input it
//!   depends on is not available. Never papered over with defaults.
//! - [`PersistError`]: reading or writing a persisted artifact failed.
//!
//! None of them is fatal: every worker skips the affected unit and carries on.

use std::path::PathBuf;

use thiserror::Error;

use crate::workers::WorkerKind;

/// Failure of a single vision-library call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisionError {
    #[error("could not decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("could not encode image {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("feature extraction failed: {0}")]
    Features(String),

    #[error("descriptor matching failed: {0}")]
    Matching(String),

    #[error("homography estimation failed: {0}")]
    Homography(String),

    #[error("calibration failed: {0}")]
    Calibration(String),

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error("classifier failed: {0}")]
    Classifier(String),

    #[error("stereo matching failed: {0}")]
    Stereo(String),

    #[error("unexpected data layout: {0}")]
    Layout(String),
}

/// An operation was refused because something it needs is missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("no calibration data (missing {})", .missing.join(", "))]
    NoCalibrationData { missing: Vec<&'static str> },

    #[error("no template images or template features available")]
    NoRecognitionData,

    #[error("no template images found")]
    NoTemplates,

    #[error("no stereo frame available")]
    NoFrame,

    #[error("category '{0}' is not currently detected")]
    NotDetected(String),

    #[error("a {0} worker is already running")]
    WorkerBusy(WorkerKind),

    #[error("could not start {kind} worker: {reason}")]
    SpawnFailed { kind: WorkerKind, reason: String },
}

/// Failure reading or writing a persisted artifact.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("record '{name}' not found in {path}")]
    MissingRecord { path: PathBuf, name: String },

    #[error("record '{name}' has the wrong shape: {reason}")]
    Shape { name: String, reason: String },

    #[error(transparent)]
    Vision(#[from] VisionError),
}

impl PersistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.into(),
            source,
        }
    }
}
