//! Calibration record files.
//!
//! Per-camera files hold `cameraMatrix` and `distCoeffs`. The combined
//! stereo file first receives both cameras and the extrinsics, then the
//! rectification artifacts are appended to it once they exist.

use std::path::Path;

use tracing::debug;

use crate::error::PersistError;
use crate::model::{
    CalibrationModel, CameraIntrinsics, RectifyingTransforms, RemapPair, StereoExtrinsics,
};
use crate::persist::records::{MatrixRecord, RecordFile};

pub const LEFT_FILE: &str = "left_calib.yml";
pub const RIGHT_FILE: &str = "right_calib.yml";
pub const STEREO_FILE: &str = "stereo_calib.yml";

pub fn save_camera(path: &Path, intrinsics: &CameraIntrinsics) -> Result<(), PersistError> {
    let mut file = RecordFile::new();
    file.insert("cameraMatrix", MatrixRecord::from_smatrix(&intrinsics.camera_matrix))
        .insert("distCoeffs", MatrixRecord::from_dvector(&intrinsics.dist_coeffs));
    file.save(path)
}

pub fn load_camera(path: &Path) -> Result<CameraIntrinsics, PersistError> {
    let file = RecordFile::load(path)?;
    Ok(CameraIntrinsics {
        camera_matrix: file.require(path, "cameraMatrix")?.to_smatrix("cameraMatrix")?,
        dist_coeffs: file.require(path, "distCoeffs")?.to_dvector("distCoeffs")?,
    })
}

/// Write both cameras and the extrinsics, replacing any previous stereo file.
pub fn save_stereo(
    path: &Path,
    left: &CameraIntrinsics,
    right: &CameraIntrinsics,
    extrinsics: &StereoExtrinsics,
) -> Result<(), PersistError> {
    let mut file = RecordFile::new();
    file.insert("cameraMatrixLeft", MatrixRecord::from_smatrix(&left.camera_matrix))
        .insert("distCoeffsLeft", MatrixRecord::from_dvector(&left.dist_coeffs))
        .insert("cameraMatrixRight", MatrixRecord::from_smatrix(&right.camera_matrix))
        .insert("distCoeffsRight", MatrixRecord::from_dvector(&right.dist_coeffs))
        .insert("R", MatrixRecord::from_smatrix(&extrinsics.r))
        .insert("T", MatrixRecord::from_smatrix(&extrinsics.t))
        .insert("E", MatrixRecord::from_smatrix(&extrinsics.e))
        .insert("F", MatrixRecord::from_smatrix(&extrinsics.f));
    file.save(path)
}

/// Append the rectification artifacts to an existing stereo file.
pub fn append_rectification(
    path: &Path,
    transforms: &RectifyingTransforms,
    q: &nalgebra::Matrix4<f64>,
    map_l: &RemapPair,
    map_r: &RemapPair,
) -> Result<(), PersistError> {
    let mut file = RecordFile::new();
    file.insert("Rl", MatrixRecord::from_smatrix(&transforms.rl))
        .insert("Rr", MatrixRecord::from_smatrix(&transforms.rr))
        .insert("Pl", MatrixRecord::from_smatrix(&transforms.pl))
        .insert("Pr", MatrixRecord::from_smatrix(&transforms.pr))
        .insert("Q", MatrixRecord::from_smatrix(q))
        .insert("map_l1", MatrixRecord::from_table_i16(&map_l.map1))
        .insert("map_l2", MatrixRecord::from_table_u16(&map_l.map2))
        .insert("map_r1", MatrixRecord::from_table_i16(&map_r.map1))
        .insert("map_r2", MatrixRecord::from_table_u16(&map_r.map2));
    file.append_to(path)
}

/// Persist a complete model as a calibration run would have written it.
pub fn save_model(path: &Path, model: &CalibrationModel) -> Result<(), PersistError> {
    if let (Some(left), Some(right), Some(extrinsics)) = (&model.left, &model.right, &model.extrinsics) {
        save_stereo(path, left, right, extrinsics)?;
    }
    if let (Some(transforms), Some(q), Ok(view)) = (&model.rectify, &model.q, model.rectification()) {
        append_rectification(path, transforms, q, &view.left_maps(), &view.right_maps())?;
    }
    Ok(())
}

/// Load whatever the stereo file holds.
///
/// Absent records leave the corresponding field empty; the completeness
/// gate decides later whether the result is usable. Records that are
/// present but malformed are an error.
pub fn load_model(path: &Path) -> Result<CalibrationModel, PersistError> {
    let file = RecordFile::load(path)?;
    let mut model = CalibrationModel::default();

    if let (Some(k), Some(d)) = (file.get("cameraMatrixLeft"), file.get("distCoeffsLeft")) {
        model.left = Some(CameraIntrinsics {
            camera_matrix: k.to_smatrix("cameraMatrixLeft")?,
            dist_coeffs: d.to_dvector("distCoeffsLeft")?,
        });
    }
    if let (Some(k), Some(d)) = (file.get("cameraMatrixRight"), file.get("distCoeffsRight")) {
        model.right = Some(CameraIntrinsics {
            camera_matrix: k.to_smatrix("cameraMatrixRight")?,
            dist_coeffs: d.to_dvector("distCoeffsRight")?,
        });
    }
    if let (Some(r), Some(t), Some(e), Some(f)) = (file.get("R"), file.get("T"), file.get("E"), file.get("F")) {
        model.extrinsics = Some(StereoExtrinsics {
            r: r.to_smatrix("R")?,
            t: t.to_smatrix("T")?,
            e: e.to_smatrix("E")?,
            f: f.to_smatrix("F")?,
        });
    }
    if let (Some(rl), Some(rr), Some(pl), Some(pr)) = (file.get("Rl"), file.get("Rr"), file.get("Pl"), file.get("Pr")) {
        model.rectify = Some(RectifyingTransforms {
            rl: rl.to_smatrix("Rl")?,
            rr: rr.to_smatrix("Rr")?,
            pl: pl.to_smatrix("Pl")?,
            pr: pr.to_smatrix("Pr")?,
        });
    }
    model.q = file.get("Q").map(|q| q.to_smatrix("Q")).transpose()?;
    model.map_l1 = file.get("map_l1").map(|m| m.to_table_i16("map_l1")).transpose()?;
    model.map_l2 = file.get("map_l2").map(|m| m.to_table_u16("map_l2")).transpose()?;
    model.map_r1 = file.get("map_r1").map(|m| m.to_table_i16("map_r1")).transpose()?;
    model.map_r2 = file.get("map_r2").map(|m| m.to_table_u16("map_r2")).transpose()?;

    debug!(path = %path.display(), missing = ?model.missing_fields(), "Loaded calibration records");
    Ok(model)
}
