//! Boundary to the vision-algorithms library.
//!
//! Feature detection and matching, chessboard calibration, clustering,
//! classifier training and dense stereo matching are delegated to a backend.
//! Each concern is its own trait so a worker only depends on the calls it
//! actually makes; [`VisionBackend`] bundles them for the orchestrator.
//!
//! Every call returns `Result<_, VisionError>` so failures surface as values
//! at the call site instead of unwinding through a worker.
//!
//! The OpenCV implementation lives in [`opencv`] behind the `opencv` feature.

pub mod image;
#[cfg(feature = "opencv")]
pub mod opencv;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Matrix3, Matrix3x4, Point2, Point3};

use crate::config::{SgbmParams, SvmParams};
use crate::error::VisionError;
use crate::geometry::DisparityMap;
use crate::model::calibration::{CameraIntrinsics, RemapPair, StereoExtrinsics, StereoRectification};

pub use image::{Image, ImageSize};

/// A detected interest point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub pt: Point2<f32>,
    pub size: f32,
    pub response: f32,
}

impl KeyPoint {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            pt: Point2::new(x, y),
            size: 1.0,
            response: 0.0,
        }
    }
}

/// Keypoints and their descriptors; `descriptors.row(i)` describes `keypoints[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: DMatrix<f32>,
}

impl FeatureSet {
    pub fn empty() -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: DMatrix::zeros(0, 0),
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty() || self.descriptors.nrows() == 0
    }
}

/// One descriptor correspondence, query row to train row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Internal-corner layout of a calibration chessboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternSize {
    pub rows: u32,
    pub cols: u32,
}

impl PatternSize {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    pub fn corner_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

/// How an image file should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Color,
    Grayscale,
}

/// Image file decoding and encoding.
pub trait ImageIo: Send + Sync {
    fn read_image(&self, path: &Path, mode: ReadMode) -> Result<Image, VisionError>;

    fn write_image(&self, path: &Path, image: &Image) -> Result<(), VisionError>;
}

/// Local features, descriptor matching and homography estimation.
pub trait FeatureBackend: Send + Sync {
    /// Detect keypoints and compute one descriptor row per keypoint.
    fn detect_and_compute(&self, image: &Image) -> Result<FeatureSet, VisionError>;

    /// For every query row, the `k` nearest train rows in ascending distance.
    fn knn_match(
        &self,
        query: &DMatrix<f32>,
        train: &DMatrix<f32>,
        k: usize,
    ) -> Result<Vec<Vec<DMatch>>, VisionError>;

    /// Robust (RANSAC) homography mapping `src` points onto `dst` points.
    fn find_homography(
        &self,
        src: &[Point2<f32>],
        dst: &[Point2<f32>],
    ) -> Result<Matrix3<f64>, VisionError>;
}

/// Chessboard detection and camera / stereo calibration.
pub trait CalibrationBackend: Send + Sync {
    /// Locate the internal chessboard corners, `None` if the pattern is not found.
    fn find_chessboard_corners(
        &self,
        image: &Image,
        pattern: PatternSize,
    ) -> Result<Option<Vec<Point2<f32>>>, VisionError>;

    /// Refine corner positions to sub-pixel accuracy in place.
    fn refine_corners(&self, image: &Image, corners: &mut [Point2<f32>]) -> Result<(), VisionError>;

    /// Single camera calibration; returns the intrinsics and the RMS reprojection error.
    fn calibrate_camera(
        &self,
        object_points: &[Vec<Point3<f32>>],
        image_points: &[Vec<Point2<f32>>],
        size: ImageSize,
    ) -> Result<(CameraIntrinsics, f64), VisionError>;

    /// Stereo calibration with fixed intrinsics; returns the extrinsics and the RMS error.
    fn stereo_calibrate(
        &self,
        object_points: &[Vec<Point3<f32>>],
        left_points: &[Vec<Point2<f32>>],
        right_points: &[Vec<Point2<f32>>],
        left: &CameraIntrinsics,
        right: &CameraIntrinsics,
        size: ImageSize,
    ) -> Result<(StereoExtrinsics, f64), VisionError>;

    fn stereo_rectify(
        &self,
        left: &CameraIntrinsics,
        right: &CameraIntrinsics,
        extrinsics: &StereoExtrinsics,
        size: ImageSize,
    ) -> Result<StereoRectification, VisionError>;

    /// Fixed-point remap tables (2-channel `i16` coordinates plus `u16`
    /// interpolation indices) undistorting and rectifying one camera.
    fn init_rectify_map(
        &self,
        intrinsics: &CameraIntrinsics,
        rotation: &Matrix3<f64>,
        projection: &Matrix3x4<f64>,
        size: ImageSize,
    ) -> Result<RemapPair, VisionError>;
}

/// A trained binary classifier owned by the backend.
pub trait BinaryClassifier: Send + Sync + fmt::Debug {
    /// Signed decision value for one feature vector.
    fn decision(&self, sample: &DVector<f32>) -> Result<f32, VisionError>;

    /// Serialized form, written verbatim to the classifier file.
    fn to_text(&self) -> Result<String, VisionError>;
}

/// Clustering and classifier training.
pub trait LearningBackend: Send + Sync {
    /// Cluster descriptor rows into `clusters` centers, one center per row.
    fn cluster(&self, descriptors: &DMatrix<f32>, clusters: usize) -> Result<DMatrix<f32>, VisionError>;

    /// Train on one sample per row; `labels` are 1 (positive) or 0 (negative).
    fn train_classifier(
        &self,
        samples: &DMatrix<f32>,
        labels: &[i32],
        params: &SvmParams,
    ) -> Result<Arc<dyn BinaryClassifier>, VisionError>;

    fn load_classifier(&self, text: &str) -> Result<Arc<dyn BinaryClassifier>, VisionError>;
}

/// Rectification and dense stereo matching.
pub trait StereoBackend: Send + Sync {
    fn remap(&self, image: &Image, maps: &RemapPair) -> Result<Image, VisionError>;

    /// Disparity in the backend's fixed-point format (16 units per pixel).
    fn compute_disparity(
        &self,
        left: &Image,
        right: &Image,
        params: &SgbmParams,
    ) -> Result<DisparityMap, VisionError>;
}

/// Everything the orchestrator needs from the vision library.
pub trait VisionBackend:
    ImageIo + FeatureBackend + CalibrationBackend + LearningBackend + StereoBackend + 'static
{
}

impl<T> VisionBackend for T where
    T: ImageIo + FeatureBackend + CalibrationBackend + LearningBackend + StereoBackend + 'static
{
}
