//! Chessboard stereo calibration.
//!
//! Reads `Left/` and `Right/` under the calibration directory, calibrates
//! each camera on its own, calibrates the pair on the views where both
//! cameras see the board, then rectifies. Progress: right camera 25, left
//! camera 50, stereo 90, rectification 100.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nalgebra::{Point2, Point3};
use tracing::{debug, info, warn};

use super::{EventSink, Job, Outcome, WorkerEvent, WorkerKind};
use crate::error::{PersistError, Precondition, VisionError};
use crate::model::{CalibrationModel, CameraIntrinsics, StereoExtrinsics};
use crate::persist::calibration::{self as store, LEFT_FILE, RIGHT_FILE, STEREO_FILE};
use crate::vision::{CalibrationBackend, Image, ImageIo, ImageSize, PatternSize, ReadMode};

pub const LEFT_DIR: &str = "Left";
pub const RIGHT_DIR: &str = "Right";

/// Board corners in board coordinates, row by row, origin at the top left.
pub fn chessboard_object_points(pattern: PatternSize, square_size: f32) -> Vec<Point3<f32>> {
    (0..pattern.rows)
        .flat_map(|i| {
            (0..pattern.cols).map(move |j| Point3::new(j as f32 * square_size, i as f32 * square_size, 0.0))
        })
        .collect()
}

/// Per-view corner detections of a stereo capture set.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoCorrespondences {
    pub left: Vec<Vec<Point2<f32>>>,
    pub right: Vec<Vec<Point2<f32>>>,
    /// Indices of the retained views in the original ordering.
    pub views: Vec<usize>,
}

impl StereoCorrespondences {
    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// Keep only the views where both cameras found the pattern.
///
/// Views are paired by position; any surplus on the longer side has no
/// partner and is dropped.
pub fn pair_correspondences(
    left: Vec<Option<Vec<Point2<f32>>>>,
    right: Vec<Option<Vec<Point2<f32>>>>,
) -> StereoCorrespondences {
    let mut pairs = StereoCorrespondences {
        left: Vec::new(),
        right: Vec::new(),
        views: Vec::new(),
    };
    for (view, (l, r)) in left.into_iter().zip(right).enumerate() {
        if let (Some(l), Some(r)) = (l, r) {
            pairs.left.push(l);
            pairs.right.push(r);
            pairs.views.push(view);
        }
    }
    pairs
}

pub struct CalibrationJob<B> {
    backend: Arc<B>,
    dir: PathBuf,
    pattern: PatternSize,
    square_size: f32,
}

impl<B: ImageIo + CalibrationBackend> CalibrationJob<B> {
    pub fn new(backend: Arc<B>, dir: impl Into<PathBuf>, pattern: PatternSize, square_size: f32) -> Self {
        Self {
            backend,
            dir: dir.into(),
            pattern,
            square_size,
        }
    }

    fn load_images(&self, camera: &str, sink: &EventSink) -> Vec<Image> {
        let dir = self.dir.join(camera);
        let paths = match sorted_files(&dir) {
            Ok(paths) => paths,
            Err(e) => {
                sink.message(format!("No {camera} calibration images: {e}"));
                return Vec::new();
            }
        };
        paths
            .iter()
            .filter_map(|path| match self.backend.read_image(path, ReadMode::Color) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable calibration image");
                    None
                }
            })
            .collect()
    }

    /// Refined corners of one view, `None` when the board is not found.
    fn detect(&self, image: &Image) -> Result<Option<Vec<Point2<f32>>>, VisionError> {
        let Some(mut corners) = self.backend.find_chessboard_corners(image, self.pattern)? else {
            return Ok(None);
        };
        self.backend.refine_corners(image, &mut corners)?;
        Ok(Some(corners))
    }

    fn detect_all(&self, images: &[Image], sink: &EventSink) -> Vec<Option<Vec<Point2<f32>>>> {
        images
            .iter()
            .map(|image| {
                self.detect(image).unwrap_or_else(|e| {
                    sink.message(e.to_string());
                    None
                })
            })
            .collect()
    }

    fn calibrate_single(
        &self,
        camera: &str,
        images: &[Image],
        file: &str,
        sink: &EventSink,
    ) -> Option<CameraIntrinsics> {
        let found: Vec<_> = self.detect_all(images, sink).into_iter().flatten().collect();
        debug!(camera, images = images.len(), views = found.len(), "Detected chessboards");
        if found.is_empty() {
            sink.message(format!("No chessboard found in {camera} camera images"));
            return None;
        }
        let object = vec![chessboard_object_points(self.pattern, self.square_size); found.len()];
        let size = images[0].size();
        match self.backend.calibrate_camera(&object, &found, size) {
            Ok((intrinsics, rms)) => {
                self.persist(sink, || store::save_camera(&self.dir.join(file), &intrinsics));
                sink.status(format!("RMS reprojection error of {rms} for {camera} camera"));
                Some(intrinsics)
            }
            Err(e) => {
                sink.message(e.to_string());
                None
            }
        }
    }

    fn calibrate_stereo(
        &self,
        left_images: &[Image],
        right_images: &[Image],
        intrinsics: Option<(&CameraIntrinsics, &CameraIntrinsics)>,
        sink: &EventSink,
    ) -> Option<StereoExtrinsics> {
        let (left, right) = intrinsics?;
        let pairs = pair_correspondences(
            self.detect_all(left_images, sink),
            self.detect_all(right_images, sink),
        );
        info!(pairs = pairs.len(), "Stereo correspondences");
        if pairs.is_empty() {
            sink.message("No image pair shows the chessboard in both cameras");
            return None;
        }
        let object = vec![chessboard_object_points(self.pattern, self.square_size); pairs.len()];
        let size = left_images[0].size();
        match self
            .backend
            .stereo_calibrate(&object, &pairs.left, &pairs.right, left, right, size)
        {
            Ok((extrinsics, rms)) => {
                self.persist(sink, || store::save_stereo(&self.dir.join(STEREO_FILE), left, right, &extrinsics));
                sink.status(format!("RMS reprojection error of {rms} for stereo camera"));
                Some(extrinsics)
            }
            Err(e) => {
                sink.message(e.to_string());
                None
            }
        }
    }

    fn rectify(
        &self,
        left: CameraIntrinsics,
        right: CameraIntrinsics,
        extrinsics: StereoExtrinsics,
        size: ImageSize,
    ) -> Result<CalibrationModel, VisionError> {
        let rectification = self.backend.stereo_rectify(&left, &right, &extrinsics, size)?;
        let map_l = self
            .backend
            .init_rectify_map(&left, &rectification.rl, &rectification.pl, size)?;
        let map_r = self
            .backend
            .init_rectify_map(&right, &rectification.rr, &rectification.pr, size)?;
        Ok(CalibrationModel::complete(left, right, extrinsics, rectification, map_l, map_r))
    }

    fn persist(&self, sink: &EventSink, write: impl FnOnce() -> Result<(), PersistError>) {
        if let Err(e) = write() {
            warn!(error = %e, "Could not persist calibration");
            sink.message(e.to_string());
        }
    }
}

impl<B: ImageIo + CalibrationBackend + 'static> Job for CalibrationJob<B> {
    const KIND: WorkerKind = WorkerKind::Calibration;

    fn run(self, sink: &EventSink) -> Outcome {
        let right_images = self.load_images(RIGHT_DIR, sink);
        let right = self.calibrate_single("right", &right_images, RIGHT_FILE, sink);
        sink.progress(25);

        let left_images = self.load_images(LEFT_DIR, sink);
        let left = self.calibrate_single("left", &left_images, LEFT_FILE, sink);
        sink.progress(50);

        let extrinsics = self.calibrate_stereo(&left_images, &right_images, left.as_ref().zip(right.as_ref()), sink);
        sink.progress(90);

        let outcome = match (left, right, extrinsics) {
            (Some(left), Some(right), Some(extrinsics)) => {
                match self.rectify(left, right, extrinsics, left_images[0].size()) {
                    Ok(model) => {
                        if let (Some(transforms), Some(q), Ok(view)) = (&model.rectify, &model.q, model.rectification()) {
                            self.persist(sink, || {
                                store::append_rectification(
                                    &self.dir.join(STEREO_FILE),
                                    transforms,
                                    q,
                                    &view.left_maps(),
                                    &view.right_maps(),
                                )
                            });
                        }
                        sink.status("Finished stereo rectification");
                        sink.deliver(WorkerEvent::Calibrated(Box::new(model)));
                        Outcome::Completed
                    }
                    Err(e) => {
                        sink.message(e.to_string());
                        Outcome::Failed(e.to_string())
                    }
                }
            }
            (left, right, extrinsics) => {
                let mut missing = Vec::new();
                if left.is_none() {
                    missing.push("cameraMatrixLeft");
                }
                if right.is_none() {
                    missing.push("cameraMatrixRight");
                }
                if extrinsics.is_none() {
                    missing.push("R/T");
                }
                let refusal = Precondition::NoCalibrationData { missing };
                sink.message(refusal.to_string());
                Outcome::Failed(refusal.to_string())
            }
        };
        sink.progress(100);
        outcome
    }
}

fn sorted_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
