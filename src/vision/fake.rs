//! Deterministic in-memory backend for tests.
//!
//! Images carry a text label in their first pixels. Files read from disk
//! take their label from the file contents, falling back to the file name,
//! so fixtures are plain text files. Features, chessboard detection and
//! failures are keyed on that label.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicUsize, Ordering};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector3};
use parking_lot::Mutex;

use super::{
    BinaryClassifier, CalibrationBackend, DMatch, FeatureBackend, FeatureSet, Image, ImageIo,
    ImageSize, KeyPoint, LearningBackend, PatternSize, ReadMode, StereoBackend,
};
use crate::config::{SgbmParams, SvmParams};
use crate::error::VisionError;
use crate::geometry::DisparityMap;
use crate::model::calibration::{
    CameraIntrinsics, RemapPair, RemapTable, StereoExtrinsics, StereoRectification,
};

pub(crate) const FAKE_WIDTH: u32 = 64;
pub(crate) const FAKE_HEIGHT: u32 = 48;
const DEFAULT_KEYPOINTS: usize = 32;
const DESCRIPTOR_LEN: usize = 8;

/// One `train_classifier` call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrainingCall {
    pub rows: usize,
    pub positives: usize,
    pub negatives: usize,
    /// Labels are positives first, then negatives.
    pub positives_first: bool,
}

#[derive(Debug)]
pub(crate) struct FakeClassifier {
    value: f32,
}

impl FakeClassifier {
    pub(crate) fn new(value: f32) -> Self {
        Self { value }
    }
}

impl BinaryClassifier for FakeClassifier {
    fn decision(&self, _sample: &DVector<f32>) -> Result<f32, VisionError> {
        Ok(self.value)
    }

    fn to_text(&self) -> Result<String, VisionError> {
        Ok(format!("fake:{}", self.value))
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeVision {
    features: Mutex<HashMap<String, FeatureSet>>,
    failing_features: Mutex<HashSet<String>>,
    pub homography_calls: AtomicUsize,
    pub fail_homography: AtomicBool,
    pub calibrate_views: Mutex<Vec<usize>>,
    pub stereo_views: Mutex<Vec<usize>>,
    pub fail_stereo_calibration: AtomicBool,
    pub training: Mutex<Vec<TrainingCall>>,
    /// Decision value of freshly trained classifiers.
    pub trained_decision: Mutex<f32>,
    pub fail_disparity: AtomicBool,
    disparity: AtomicI16,
}

impl FakeVision {
    pub(crate) fn new() -> Self {
        Self {
            trained_decision: Mutex::new(-1.0),
            disparity: AtomicI16::new(32 * 16),
            ..Default::default()
        }
    }

    pub(crate) fn labelled_image(&self, label: &str) -> Image {
        labelled_image(label)
    }

    /// Override the features detected in images labelled `label`.
    pub(crate) fn set_features(&self, label: &str, features: FeatureSet) {
        self.features.lock().insert(label.to_string(), features);
    }

    pub(crate) fn fail_features_for(&self, label: &str) {
        self.failing_features.lock().insert(label.to_string());
    }

    /// Raw fixed-point disparity of every matched pixel.
    pub(crate) fn set_disparity(&self, raw: i16) {
        self.disparity.store(raw, Ordering::SeqCst);
    }
}

pub(crate) fn labelled_image(label: &str) -> Image {
    let mut data = vec![0u8; (FAKE_WIDTH * FAKE_HEIGHT) as usize];
    let bytes = label.as_bytes();
    let n = bytes.len().min(data.len());
    data[..n].copy_from_slice(&bytes[..n]);
    Image::new(FAKE_WIDTH, FAKE_HEIGHT, 1, data).unwrap()
}

pub(crate) fn label_of(image: &Image) -> String {
    let end = image.data().iter().position(|&b| b == 0).unwrap_or(image.data().len());
    String::from_utf8_lossy(&image.data()[..end]).into_owned()
}

/// Deterministic, pairwise distinct descriptor rows for a label.
pub(crate) fn default_features(label: &str) -> FeatureSet {
    let seed = label.bytes().fold(17u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
    let keypoints = (0..DEFAULT_KEYPOINTS)
        .map(|i| KeyPoint::at((i % 8) as f32 * 4.0, (i / 8) as f32 * 4.0))
        .collect();
    let descriptors = DMatrix::from_fn(DEFAULT_KEYPOINTS, DESCRIPTOR_LEN, |i, j| {
        ((seed + i as u64 * 31 + j as u64 * 7) % 97) as f32
    });
    FeatureSet {
        keypoints,
        descriptors,
    }
}

/// Features whose descriptors are scaled one-hot rows `ids`, at `points`.
pub(crate) fn one_hot_features(ids: &[usize], points: &[(f32, f32)]) -> FeatureSet {
    let width = ids.iter().max().map_or(1, |m| m + 1).max(DESCRIPTOR_LEN);
    let mut descriptors = DMatrix::zeros(ids.len(), width);
    for (row, &id) in ids.iter().enumerate() {
        descriptors[(row, id)] = 100.0;
    }
    FeatureSet {
        keypoints: points.iter().map(|&(x, y)| KeyPoint::at(x, y)).collect(),
        descriptors,
    }
}

impl ImageIo for FakeVision {
    fn read_image(&self, path: &Path, _mode: ReadMode) -> Result<Image, VisionError> {
        let contents = fs::read_to_string(path).map_err(|e| VisionError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let label = match contents.trim() {
            "" => path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            text => text.to_string(),
        };
        Ok(labelled_image(&label))
    }

    fn write_image(&self, path: &Path, image: &Image) -> Result<(), VisionError> {
        fs::write(path, label_of(image)).map_err(|e| VisionError::Encode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl FeatureBackend for FakeVision {
    fn detect_and_compute(&self, image: &Image) -> Result<FeatureSet, VisionError> {
        let label = label_of(image);
        if self.failing_features.lock().contains(&label) {
            return Err(VisionError::Features(format!("no features for {label}")));
        }
        if let Some(features) = self.features.lock().get(&label) {
            return Ok(features.clone());
        }
        if label.starts_with("blank") {
            return Ok(FeatureSet::empty());
        }
        Ok(default_features(&label))
    }

    fn knn_match(
        &self,
        query: &DMatrix<f32>,
        train: &DMatrix<f32>,
        k: usize,
    ) -> Result<Vec<Vec<DMatch>>, VisionError> {
        if query.ncols() != train.ncols() {
            return Err(VisionError::Matching(format!(
                "descriptor widths differ: {} vs {}",
                query.ncols(),
                train.ncols()
            )));
        }
        let matches = query
            .row_iter()
            .enumerate()
            .map(|(qi, q)| {
                let mut row: Vec<DMatch> = train
                    .row_iter()
                    .enumerate()
                    .map(|(ti, t)| DMatch {
                        query_idx: qi,
                        train_idx: ti,
                        distance: (q - t).norm(),
                    })
                    .collect();
                row.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                row.truncate(k);
                row
            })
            .collect();
        Ok(matches)
    }

    /// Pure translation: the mean offset from `src` to `dst`.
    fn find_homography(&self, src: &[Point2<f32>], dst: &[Point2<f32>]) -> Result<Matrix3<f64>, VisionError> {
        self.homography_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_homography.load(Ordering::SeqCst) {
            return Err(VisionError::Homography("degenerate configuration".into()));
        }
        if src.len() != dst.len() || src.len() < 4 {
            return Err(VisionError::Homography(format!("{} correspondences", src.len())));
        }
        let n = src.len() as f64;
        let (dx, dy) = src.iter().zip(dst).fold((0.0, 0.0), |(dx, dy), (s, d)| {
            (dx + (d.x - s.x) as f64, dy + (d.y - s.y) as f64)
        });
        Ok(Matrix3::new(1.0, 0.0, dx / n, 0.0, 1.0, dy / n, 0.0, 0.0, 1.0))
    }
}

pub(crate) fn fake_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics {
        camera_matrix: Matrix3::new(500.0, 0.0, 32.0, 0.0, 500.0, 24.0, 0.0, 0.0, 1.0),
        dist_coeffs: DVector::zeros(5),
    }
}

impl CalibrationBackend for FakeVision {
    fn find_chessboard_corners(
        &self,
        image: &Image,
        pattern: PatternSize,
    ) -> Result<Option<Vec<Point2<f32>>>, VisionError> {
        if label_of(image).contains("noboard") {
            return Ok(None);
        }
        let corners = (0..pattern.rows)
            .flat_map(|i| (0..pattern.cols).map(move |j| Point2::new(j as f32 * 5.0 + 2.0, i as f32 * 5.0 + 2.0)))
            .collect();
        Ok(Some(corners))
    }

    fn refine_corners(&self, _image: &Image, _corners: &mut [Point2<f32>]) -> Result<(), VisionError> {
        Ok(())
    }

    fn calibrate_camera(
        &self,
        object_points: &[Vec<Point3<f32>>],
        image_points: &[Vec<Point2<f32>>],
        _size: ImageSize,
    ) -> Result<(CameraIntrinsics, f64), VisionError> {
        if object_points.is_empty() || object_points.len() != image_points.len() {
            return Err(VisionError::Calibration(format!(
                "{} object views, {} image views",
                object_points.len(),
                image_points.len()
            )));
        }
        self.calibrate_views.lock().push(image_points.len());
        Ok((fake_intrinsics(), 0.25))
    }

    fn stereo_calibrate(
        &self,
        object_points: &[Vec<Point3<f32>>],
        left_points: &[Vec<Point2<f32>>],
        right_points: &[Vec<Point2<f32>>],
        _left: &CameraIntrinsics,
        _right: &CameraIntrinsics,
        _size: ImageSize,
    ) -> Result<(StereoExtrinsics, f64), VisionError> {
        if self.fail_stereo_calibration.load(Ordering::SeqCst) {
            return Err(VisionError::Calibration("did not converge".into()));
        }
        if left_points.len() != right_points.len() || left_points.len() != object_points.len() {
            return Err(VisionError::Calibration("unpaired views".into()));
        }
        self.stereo_views.lock().push(left_points.len());
        let extrinsics = StereoExtrinsics {
            r: Matrix3::identity(),
            t: Vector3::new(-60.0, 0.0, 0.0),
            e: Matrix3::zeros(),
            f: Matrix3::zeros(),
        };
        Ok((extrinsics, 0.5))
    }

    fn stereo_rectify(
        &self,
        left: &CameraIntrinsics,
        _right: &CameraIntrinsics,
        extrinsics: &StereoExtrinsics,
        _size: ImageSize,
    ) -> Result<StereoRectification, VisionError> {
        let k = left.camera_matrix;
        let (f, cx, cy) = (k[(0, 0)], k[(0, 2)], k[(1, 2)]);
        let baseline = extrinsics.t.x.abs();
        Ok(StereoRectification {
            rl: Matrix3::identity(),
            rr: Matrix3::identity(),
            pl: Matrix3x4::new(f, 0.0, cx, 0.0, 0.0, f, cy, 0.0, 0.0, 0.0, 1.0, 0.0),
            pr: Matrix3x4::new(f, 0.0, cx, -f * baseline, 0.0, f, cy, 0.0, 0.0, 0.0, 1.0, 0.0),
            q: Matrix4::new(
                1.0, 0.0, 0.0, -cx, 0.0, 1.0, 0.0, -cy, 0.0, 0.0, 0.0, f, 0.0, 0.0,
                1.0 / baseline, 0.0,
            ),
        })
    }

    fn init_rectify_map(
        &self,
        _intrinsics: &CameraIntrinsics,
        _rotation: &Matrix3<f64>,
        _projection: &Matrix3x4<f64>,
        size: ImageSize,
    ) -> Result<RemapPair, VisionError> {
        let map1 = (0..size.height)
            .flat_map(|y| (0..size.width).flat_map(move |x| [x as i16, y as i16]))
            .collect();
        Ok(RemapPair {
            map1: RemapTable::new(size, 2, map1)?,
            map2: RemapTable::new(size, 1, vec![0; size.area()])?,
        })
    }
}

impl LearningBackend for FakeVision {
    /// The first `clusters` rows.
    fn cluster(&self, descriptors: &DMatrix<f32>, clusters: usize) -> Result<DMatrix<f32>, VisionError> {
        if clusters == 0 || descriptors.nrows() < clusters {
            return Err(VisionError::Clustering(format!(
                "{} descriptors for {} clusters",
                descriptors.nrows(),
                clusters
            )));
        }
        Ok(descriptors.rows(0, clusters).into_owned())
    }

    fn train_classifier(
        &self,
        samples: &DMatrix<f32>,
        labels: &[i32],
        _params: &SvmParams,
    ) -> Result<Arc<dyn BinaryClassifier>, VisionError> {
        if samples.nrows() != labels.len() {
            return Err(VisionError::Classifier("label count mismatch".into()));
        }
        let positives = labels.iter().filter(|&&l| l == 1).count();
        let positives_first = labels.iter().take(positives).all(|&l| l == 1);
        self.training.lock().push(TrainingCall {
            rows: samples.nrows(),
            positives,
            negatives: labels.len() - positives,
            positives_first,
        });
        Ok(Arc::new(FakeClassifier::new(*self.trained_decision.lock())))
    }

    fn load_classifier(&self, text: &str) -> Result<Arc<dyn BinaryClassifier>, VisionError> {
        let value = text
            .strip_prefix("fake:")
            .and_then(|v| v.trim().parse::<f32>().ok())
            .ok_or_else(|| VisionError::Classifier(format!("not a fake classifier: {text:?}")))?;
        Ok(Arc::new(FakeClassifier::new(value)))
    }
}

impl StereoBackend for FakeVision {
    fn remap(&self, image: &Image, _maps: &RemapPair) -> Result<Image, VisionError> {
        Ok(image.clone())
    }

    fn compute_disparity(
        &self,
        left: &Image,
        _right: &Image,
        params: &SgbmParams,
    ) -> Result<DisparityMap, VisionError> {
        if self.fail_disparity.load(Ordering::SeqCst) {
            return Err(VisionError::Stereo("matcher failed".into()));
        }
        // The top row is unmatched, flagged one below the search range.
        let invalid = ((params.min_disparity - 1) * 16) as i16;
        let width = left.width() as usize;
        let mut data = vec![self.disparity.load(Ordering::SeqCst); left.size().area()];
        let unmatched = width.min(data.len());
        data[..unmatched].fill(invalid);
        DisparityMap::new(left.size(), data)
    }
}
