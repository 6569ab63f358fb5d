//! Stereo calibration model.
//!
//! Every field is optional because the model may be loaded from a record
//! file written by an interrupted or partial calibration run. Distance
//! estimation only ever sees a [`RectificationView`], which exists only
//! when all of the geometry is present.

use nalgebra::{DVector, Matrix3, Matrix3x4, Matrix4, Vector3};

use crate::error::{Precondition, VisionError};
use crate::vision::ImageSize;

/// Intrinsic matrix and distortion coefficients of one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraIntrinsics {
    pub camera_matrix: Matrix3<f64>,
    pub dist_coeffs: DVector<f64>,
}

/// Pose of the right camera relative to the left, plus the essential and
/// fundamental matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoExtrinsics {
    pub r: Matrix3<f64>,
    pub t: Vector3<f64>,
    pub e: Matrix3<f64>,
    pub f: Matrix3<f64>,
}

/// Output of stereo rectification: rectifying rotations, projections in the
/// rectified frame, and the disparity-to-depth matrix `q`.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoRectification {
    pub rl: Matrix3<f64>,
    pub rr: Matrix3<f64>,
    pub pl: Matrix3x4<f64>,
    pub pr: Matrix3x4<f64>,
    pub q: Matrix4<f64>,
}

/// Row-major pixel lookup table with `channels` interleaved values per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapTable<T> {
    size: ImageSize,
    channels: u8,
    data: Vec<T>,
}

impl<T> RemapTable<T> {
    pub fn new(size: ImageSize, channels: u8, data: Vec<T>) -> Result<Self, VisionError> {
        let expected = size.area() * channels as usize;
        if data.len() != expected {
            return Err(VisionError::Layout(format!(
                "{}x{}x{} remap table needs {} values, got {}",
                size.width,
                size.height,
                channels,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            size,
            channels,
            data,
        })
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }
}

/// The two tables rectifying one camera: integer source coordinates
/// (`map1`, two channels) and interpolation-table indices (`map2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapPair {
    pub map1: RemapTable<i16>,
    pub map2: RemapTable<u16>,
}

/// Stereo geometry, as produced by calibration or loaded from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationModel {
    pub left: Option<CameraIntrinsics>,
    pub right: Option<CameraIntrinsics>,
    pub extrinsics: Option<StereoExtrinsics>,
    /// Rectifying rotations and projections (`Rl`, `Rr`, `Pl`, `Pr`).
    pub rectify: Option<RectifyingTransforms>,
    pub q: Option<Matrix4<f64>>,
    pub map_l1: Option<RemapTable<i16>>,
    pub map_l2: Option<RemapTable<u16>>,
    pub map_r1: Option<RemapTable<i16>>,
    pub map_r2: Option<RemapTable<u16>>,
}

/// Rotations and projections of a rectified pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RectifyingTransforms {
    pub rl: Matrix3<f64>,
    pub rr: Matrix3<f64>,
    pub pl: Matrix3x4<f64>,
    pub pr: Matrix3x4<f64>,
}

/// Borrowed view of a complete rectification bundle.
#[derive(Debug, Clone, Copy)]
pub struct RectificationView<'a> {
    pub map_l1: &'a RemapTable<i16>,
    pub map_l2: &'a RemapTable<u16>,
    pub map_r1: &'a RemapTable<i16>,
    pub map_r2: &'a RemapTable<u16>,
    pub q: &'a Matrix4<f64>,
}

impl CalibrationModel {
    /// Assemble a complete model from a finished calibration run.
    pub fn complete(
        left: CameraIntrinsics,
        right: CameraIntrinsics,
        extrinsics: StereoExtrinsics,
        rectification: StereoRectification,
        map_l: RemapPair,
        map_r: RemapPair,
    ) -> Self {
        let StereoRectification { rl, rr, pl, pr, q } = rectification;
        Self {
            left: Some(left),
            right: Some(right),
            extrinsics: Some(extrinsics),
            rectify: Some(RectifyingTransforms { rl, rr, pl, pr }),
            q: Some(q),
            map_l1: Some(map_l.map1),
            map_l2: Some(map_l.map2),
            map_r1: Some(map_r.map1),
            map_r2: Some(map_r.map2),
        }
    }

    /// Names of the fields distance estimation needs but this model lacks.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.left.is_none() {
            missing.push("cameraMatrixLeft");
        }
        if self.right.is_none() {
            missing.push("cameraMatrixRight");
        }
        if self.extrinsics.is_none() {
            missing.push("R/T");
        }
        if self.q.is_none() {
            missing.push("Q");
        }
        if self.map_l1.is_none() {
            missing.push("map_l1");
        }
        if self.map_l2.is_none() {
            missing.push("map_l2");
        }
        if self.map_r1.is_none() {
            missing.push("map_r1");
        }
        if self.map_r2.is_none() {
            missing.push("map_r2");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// The rectification bundle, or the list of what is missing.
    pub fn rectification(&self) -> Result<RectificationView<'_>, Precondition> {
        match (
            &self.left,
            &self.right,
            &self.extrinsics,
            &self.q,
            &self.map_l1,
            &self.map_l2,
            &self.map_r1,
            &self.map_r2,
        ) {
            (Some(_), Some(_), Some(_), Some(q), Some(map_l1), Some(map_l2), Some(map_r1), Some(map_r2)) => {
                Ok(RectificationView {
                    map_l1,
                    map_l2,
                    map_r1,
                    map_r2,
                    q,
                })
            }
            _ => Err(Precondition::NoCalibrationData {
                missing: self.missing_fields(),
            }),
        }
    }
}

impl RectificationView<'_> {
    pub fn left_maps(&self) -> RemapPair {
        RemapPair {
            map1: self.map_l1.clone(),
            map2: self.map_l2.clone(),
        }
    }

    pub fn right_maps(&self) -> RemapPair {
        RemapPair {
            map1: self.map_r1.clone(),
            map2: self.map_r2.clone(),
        }
    }
}
