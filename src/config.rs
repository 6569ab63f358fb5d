//! Runtime configuration.
//!
//! Loaded from a YAML file; every field falls back to its default so a
//! partial (or absent) file is valid.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestrator and its workers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SordeConfig {
    pub paths: PathsConfig,
    pub recognition: RecognitionParams,
    pub svm: SvmParams,
    pub stereo: SgbmParams,
    pub messages: MessageConfig,
}

impl SordeConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let config = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse config")
    }
}

/// Where models and captured images live on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Category templates, training images, vocabulary and classifiers.
    pub svm_data_dir: PathBuf,
    /// Chessboard captures (`Left/`, `Right/`) and calibration records.
    pub calib_data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            svm_data_dir: PathBuf::from("data/Train_SVM"),
            calib_data_dir: PathBuf::from("data/Calibration"),
        }
    }
}

/// Parameters of the per-frame categorizer and of vocabulary training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionParams {
    /// Lowe ratio: accept a match only if best < ratio * second best.
    pub match_ratio: f32,
    /// Matches required before a homography is attempted.
    pub min_matches: usize,
    /// Decision values below this count as the positive class.
    pub decision_threshold: f32,
    /// Number of vocabulary cluster centers.
    pub vocabulary_size: usize,
    /// Detector strength hint passed to the feature backend.
    pub feature_threshold: f64,
}

impl Default for RecognitionParams {
    fn default() -> Self {
        Self {
            match_ratio: 0.6,
            min_matches: 4,
            decision_threshold: 0.5,
            vocabulary_size: 1000,
            feature_threshold: 500.0,
        }
    }
}

/// Binary classifier training parameters (C-SVC with an RBF kernel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    pub gamma: f64,
    pub c: f64,
    pub max_iterations: i32,
    pub epsilon: f64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            gamma: 0.50625000000000009,
            c: 312.5,
            max_iterations: 100,
            epsilon: 1e-6,
        }
    }
}

/// Semi-global block matching parameters.
///
/// `p1`/`p2` are derived from the block size and the channel count of the
/// input frames, see [`SgbmParams::smoothness`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgbmParams {
    pub min_disparity: i32,
    pub num_disparities: i32,
    pub block_size: i32,
    pub pre_filter_cap: i32,
    pub uniqueness_ratio: i32,
    pub speckle_window_size: i32,
    pub speckle_range: i32,
    pub disp12_max_diff: i32,
}

impl Default for SgbmParams {
    fn default() -> Self {
        Self {
            min_disparity: 16,
            num_disparities: 96,
            block_size: 3,
            pre_filter_cap: 63,
            uniqueness_ratio: 10,
            speckle_window_size: 100,
            speckle_range: 32,
            disp12_max_diff: 1,
        }
    }
}

impl SgbmParams {
    /// Smoothness penalties (P1, P2) for images with `channels` channels.
    pub fn smoothness(&self, channels: u8) -> (i32, i32) {
        let area = i32::from(channels) * self.block_size * self.block_size;
        (8 * area, 32 * area)
    }
}

/// Display timeouts for status messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Timeout for diagnostics raised by workers.
    pub transient_ms: u64,
    /// Timeout for orchestrator status lines.
    pub status_ms: u64,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            transient_ms: 2500,
            status_ms: 1000,
        }
    }
}

impl MessageConfig {
    pub fn transient(&self) -> Duration {
        Duration::from_millis(self.transient_ms)
    }

    pub fn status(&self) -> Duration {
        Duration::from_millis(self.status_ms)
    }
}
