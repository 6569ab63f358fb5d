//! OpenCV implementation of the vision traits.
//!
//! SIFT features, brute-force L2 matching, RANSAC homographies, chessboard
//! calibration, k-means vocabularies, RBF C-SVC classifiers and SGBM
//! disparity. Conversions between [`Image`]/nalgebra and `Mat` live at the
//! bottom of the file.

use std::path::Path;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector3};
use opencv::calib3d;
use opencv::core::{
    self, DMatch as CvDMatch, FileStorage, KeyPoint as CvKeyPoint, Mat, Point2f, Point3f, Ptr, Size,
    TermCriteria, Vector,
};
use opencv::features2d::{self, BFMatcher};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::ml;
use opencv::prelude::*;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    BinaryClassifier, CalibrationBackend, DMatch, FeatureBackend, FeatureSet, Image, ImageIo, ImageSize,
    KeyPoint, LearningBackend, PatternSize, ReadMode, StereoBackend,
};
use crate::config::{RecognitionParams, SgbmParams, SvmParams};
use crate::error::VisionError;
use crate::geometry::DisparityMap;
use crate::model::calibration::{CameraIntrinsics, RemapPair, RemapTable, StereoExtrinsics, StereoRectification};

/// `TermCriteria::COUNT | TermCriteria::EPS`.
const TERM_COUNT_EPS: i32 = 3;
/// `TermCriteria::MAX_ITER`.
const TERM_MAX_ITER: i32 = 1;
/// `FileNode::MAP`.
const FILE_NODE_MAP: i32 = 5;
/// Top-level node OpenCV uses for a saved SVM.
const SVM_NODE: &str = "opencv_ml_svm";

const RANSAC_REPROJ_THRESHOLD: f64 = 3.0;
const KMEANS_ATTEMPTS: i32 = 1;

trait CvResultExt<T> {
    fn or_vision(self, kind: fn(String) -> VisionError) -> Result<T, VisionError>;
}

impl<T> CvResultExt<T> for opencv::Result<T> {
    fn or_vision(self, kind: fn(String) -> VisionError) -> Result<T, VisionError> {
        self.map_err(|e| kind(e.message))
    }
}

/// Vision backend built on the OpenCV bindings.
pub struct OpenCvBackend {
    sift: Mutex<Ptr<features2d::SIFT>>,
}

// SAFETY: the SIFT instance is only used while holding its mutex; OpenCV
// algorithms carry no thread-affine state.
unsafe impl Send for OpenCvBackend {}
unsafe impl Sync for OpenCvBackend {}

impl OpenCvBackend {
    pub fn new(params: &RecognitionParams) -> Result<Self, VisionError> {
        let sift = features2d::SIFT::create(params.feature_threshold.round() as i32, 3, 0.04, 10.0, 1.6, false)
            .or_vision(VisionError::Features)?;
        Ok(Self {
            sift: Mutex::new(sift),
        })
    }
}

impl ImageIo for OpenCvBackend {
    fn read_image(&self, path: &Path, mode: ReadMode) -> Result<Image, VisionError> {
        let decode = |reason: String| VisionError::Decode {
            path: path.to_path_buf(),
            reason,
        };
        let flags = match mode {
            ReadMode::Color => imgcodecs::IMREAD_COLOR,
            ReadMode::Grayscale => imgcodecs::IMREAD_GRAYSCALE,
        };
        let name = path.to_str().ok_or_else(|| decode("path is not valid UTF-8".into()))?;
        let mat = imgcodecs::imread(name, flags).map_err(|e| decode(e.message))?;
        if mat.empty() {
            return Err(decode("unreadable or unsupported image".into()));
        }
        image_from_mat(&mat)
    }

    fn write_image(&self, path: &Path, image: &Image) -> Result<(), VisionError> {
        let encode = |reason: String| VisionError::Encode {
            path: path.to_path_buf(),
            reason,
        };
        let name = path.to_str().ok_or_else(|| encode("path is not valid UTF-8".into()))?;
        let mat = mat_from_image(image)?;
        let written = imgcodecs::imwrite_def(name, &mat).map_err(|e| encode(e.message))?;
        if !written {
            return Err(encode("encoder refused the image".into()));
        }
        Ok(())
    }
}

impl FeatureBackend for OpenCvBackend {
    fn detect_and_compute(&self, image: &Image) -> Result<FeatureSet, VisionError> {
        let mat = gray(&mat_from_image(image)?)?;
        let mut keypoints = Vector::<CvKeyPoint>::new();
        let mut descriptors = Mat::default();
        self.sift
            .lock()
            .detect_and_compute(&mat, &core::no_array(), &mut keypoints, &mut descriptors, false)
            .or_vision(VisionError::Features)?;
        if keypoints.is_empty() {
            return Ok(FeatureSet::empty());
        }
        let keypoints = keypoints
            .iter()
            .map(|kp| {
                let pt = kp.pt();
                KeyPoint {
                    pt: Point2::new(pt.x, pt.y),
                    size: kp.size(),
                    response: kp.response(),
                }
            })
            .collect();
        Ok(FeatureSet {
            keypoints,
            descriptors: dmatrix_from_mat(&descriptors)?,
        })
    }

    fn knn_match(
        &self,
        query: &DMatrix<f32>,
        train: &DMatrix<f32>,
        k: usize,
    ) -> Result<Vec<Vec<DMatch>>, VisionError> {
        let query = mat_from_dmatrix(query)?;
        let train = mat_from_dmatrix(train)?;
        let matcher = BFMatcher::new(core::NORM_L2, false).or_vision(VisionError::Matching)?;
        let mut matches = Vector::<Vector<CvDMatch>>::new();
        matcher
            .knn_train_match_def(&query, &train, &mut matches, k as i32)
            .or_vision(VisionError::Matching)?;
        Ok(matches
            .iter()
            .map(|row| {
                row.iter()
                    .map(|m| DMatch {
                        query_idx: m.query_idx as usize,
                        train_idx: m.train_idx as usize,
                        distance: m.distance,
                    })
                    .collect()
            })
            .collect())
    }

    fn find_homography(&self, src: &[Point2<f32>], dst: &[Point2<f32>]) -> Result<Matrix3<f64>, VisionError> {
        let src: Vector<Point2f> = src.iter().map(|p| Point2f::new(p.x, p.y)).collect();
        let dst: Vector<Point2f> = dst.iter().map(|p| Point2f::new(p.x, p.y)).collect();
        let mut mask = Mat::default();
        let h = calib3d::find_homography(&src, &dst, &mut mask, calib3d::RANSAC, RANSAC_REPROJ_THRESHOLD)
            .or_vision(VisionError::Homography)?;
        if h.empty() {
            return Err(VisionError::Homography("no consistent homography".into()));
        }
        let values = f64_values(&h)?;
        if values.len() != 9 {
            return Err(VisionError::Homography(format!("{} coefficients", values.len())));
        }
        Ok(Matrix3::from_row_slice(&values))
    }
}

impl CalibrationBackend for OpenCvBackend {
    fn find_chessboard_corners(
        &self,
        image: &Image,
        pattern: PatternSize,
    ) -> Result<Option<Vec<Point2<f32>>>, VisionError> {
        let mat = mat_from_image(image)?;
        let mut corners = Vector::<Point2f>::new();
        let found = calib3d::find_chessboard_corners(
            &mat,
            pattern_size(pattern),
            &mut corners,
            calib3d::CALIB_CB_ADAPTIVE_THRESH | calib3d::CALIB_CB_NORMALIZE_IMAGE,
        )
        .or_vision(VisionError::Calibration)?;
        if !found {
            return Ok(None);
        }
        Ok(Some(corners.iter().map(|p| Point2::new(p.x, p.y)).collect()))
    }

    fn refine_corners(&self, image: &Image, corners: &mut [Point2<f32>]) -> Result<(), VisionError> {
        let mat = gray(&mat_from_image(image)?)?;
        let mut refined: Vector<Point2f> = corners.iter().map(|p| Point2f::new(p.x, p.y)).collect();
        let criteria = TermCriteria::new(TERM_COUNT_EPS, 30, 0.1).or_vision(VisionError::Calibration)?;
        imgproc::corner_sub_pix(&mat, &mut refined, Size::new(11, 11), Size::new(-1, -1), criteria)
            .or_vision(VisionError::Calibration)?;
        for (corner, p) in corners.iter_mut().zip(refined.iter()) {
            *corner = Point2::new(p.x, p.y);
        }
        Ok(())
    }

    fn calibrate_camera(
        &self,
        object_points: &[Vec<Point3<f32>>],
        image_points: &[Vec<Point2<f32>>],
        size: ImageSize,
    ) -> Result<(CameraIntrinsics, f64), VisionError> {
        let mut k = Mat::default();
        let mut d = Mat::default();
        let mut rvecs = Vector::<Mat>::new();
        let mut tvecs = Vector::<Mat>::new();
        let rms = calib3d::calibrate_camera_def(
            &object_vectors(object_points),
            &image_vectors(image_points),
            cv_size(size),
            &mut k,
            &mut d,
            &mut rvecs,
            &mut tvecs,
        )
        .or_vision(VisionError::Calibration)?;
        Ok((intrinsics_from_mats(&k, &d)?, rms))
    }

    fn stereo_calibrate(
        &self,
        object_points: &[Vec<Point3<f32>>],
        left_points: &[Vec<Point2<f32>>],
        right_points: &[Vec<Point2<f32>>],
        left: &CameraIntrinsics,
        right: &CameraIntrinsics,
        size: ImageSize,
    ) -> Result<(StereoExtrinsics, f64), VisionError> {
        let (mut k1, mut d1) = intrinsics_to_mats(left)?;
        let (mut k2, mut d2) = intrinsics_to_mats(right)?;
        let mut r = Mat::default();
        let mut t = Mat::default();
        let mut e = Mat::default();
        let mut f = Mat::default();
        // Default flags keep the per-camera intrinsics fixed.
        let rms = calib3d::stereo_calibrate_def(
            &object_vectors(object_points),
            &image_vectors(left_points),
            &image_vectors(right_points),
            &mut k1,
            &mut d1,
            &mut k2,
            &mut d2,
            cv_size(size),
            &mut r,
            &mut t,
            &mut e,
            &mut f,
        )
        .or_vision(VisionError::Calibration)?;
        let extrinsics = StereoExtrinsics {
            r: matrix3_from_mat(&r)?,
            t: Vector3::from_column_slice(&exact_values(&t, 3)?),
            e: matrix3_from_mat(&e)?,
            f: matrix3_from_mat(&f)?,
        };
        Ok((extrinsics, rms))
    }

    fn stereo_rectify(
        &self,
        left: &CameraIntrinsics,
        right: &CameraIntrinsics,
        extrinsics: &StereoExtrinsics,
        size: ImageSize,
    ) -> Result<StereoRectification, VisionError> {
        let (k1, d1) = intrinsics_to_mats(left)?;
        let (k2, d2) = intrinsics_to_mats(right)?;
        let r = mat_from_f64(extrinsics.r.transpose().as_slice(), 3)?;
        let t = mat_from_f64(extrinsics.t.as_slice(), 3)?;
        let (mut rl, mut rr, mut pl, mut pr, mut q) =
            (Mat::default(), Mat::default(), Mat::default(), Mat::default(), Mat::default());
        calib3d::stereo_rectify_def(
            &k1,
            &d1,
            &k2,
            &d2,
            cv_size(size),
            &r,
            &t,
            &mut rl,
            &mut rr,
            &mut pl,
            &mut pr,
            &mut q,
        )
        .or_vision(VisionError::Calibration)?;
        Ok(StereoRectification {
            rl: matrix3_from_mat(&rl)?,
            rr: matrix3_from_mat(&rr)?,
            pl: Matrix3x4::from_row_slice(&exact_values(&pl, 12)?),
            pr: Matrix3x4::from_row_slice(&exact_values(&pr, 12)?),
            q: Matrix4::from_row_slice(&exact_values(&q, 16)?),
        })
    }

    fn init_rectify_map(
        &self,
        intrinsics: &CameraIntrinsics,
        rotation: &Matrix3<f64>,
        projection: &Matrix3x4<f64>,
        size: ImageSize,
    ) -> Result<RemapPair, VisionError> {
        let (k, d) = intrinsics_to_mats(intrinsics)?;
        let r = mat_from_f64(rotation.transpose().as_slice(), 3)?;
        let p = mat_from_f64(projection.transpose().as_slice(), 3)?;
        let mut map1 = Mat::default();
        let mut map2 = Mat::default();
        calib3d::init_undistort_rectify_map(&k, &d, &r, &p, cv_size(size), core::CV_16SC2, &mut map1, &mut map2)
            .or_vision(VisionError::Calibration)?;
        Ok(RemapPair {
            map1: RemapTable::new(size, 2, i16_values(&map1)?)?,
            map2: RemapTable::new(size, 1, u16_values(&map2)?)?,
        })
    }
}

/// A trained SVM. Prediction returns the raw decision value.
pub struct OpenCvClassifier {
    svm: Mutex<Ptr<ml::SVM>>,
}

// SAFETY: the SVM is only used while holding its mutex.
unsafe impl Send for OpenCvClassifier {}
unsafe impl Sync for OpenCvClassifier {}

impl std::fmt::Debug for OpenCvClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenCvClassifier").finish_non_exhaustive()
    }
}

impl BinaryClassifier for OpenCvClassifier {
    fn decision(&self, sample: &DVector<f32>) -> Result<f32, VisionError> {
        let row = mat_from_f32(sample.as_slice(), 1)?;
        let mut out = Mat::default();
        self.svm
            .lock()
            .predict(&row, &mut out, ml::StatModel_Flags::RAW_OUTPUT as i32)
            .or_vision(VisionError::Classifier)
    }

    fn to_text(&self) -> Result<String, VisionError> {
        let svm = self.svm.lock();
        let mut fs = FileStorage::new(
            ".xml",
            core::FileStorage_Mode::WRITE as i32 | core::FileStorage_Mode::MEMORY as i32,
            "",
        )
        .or_vision(VisionError::Classifier)?;
        fs.start_write_struct(SVM_NODE, FILE_NODE_MAP, "").or_vision(VisionError::Classifier)?;
        svm.write(&mut fs).or_vision(VisionError::Classifier)?;
        fs.end_write_struct().or_vision(VisionError::Classifier)?;
        fs.release_and_get_string().or_vision(VisionError::Classifier)
    }
}

impl LearningBackend for OpenCvBackend {
    fn cluster(&self, descriptors: &DMatrix<f32>, clusters: usize) -> Result<DMatrix<f32>, VisionError> {
        if descriptors.nrows() < clusters {
            return Err(VisionError::Clustering(format!(
                "{} descriptors cannot form {} clusters",
                descriptors.nrows(),
                clusters
            )));
        }
        let data = mat_from_dmatrix(descriptors)?;
        let mut labels = Mat::default();
        let mut centers = Mat::default();
        let criteria = TermCriteria::new(TERM_COUNT_EPS, 100, 0.001).or_vision(VisionError::Clustering)?;
        let compactness = core::kmeans(
            &data,
            clusters as i32,
            &mut labels,
            criteria,
            KMEANS_ATTEMPTS,
            core::KMEANS_PP_CENTERS,
            &mut centers,
        )
        .or_vision(VisionError::Clustering)?;
        debug!(clusters, compactness, "k-means finished");
        dmatrix_from_mat(&centers)
    }

    fn train_classifier(
        &self,
        samples: &DMatrix<f32>,
        labels: &[i32],
        params: &SvmParams,
    ) -> Result<Arc<dyn BinaryClassifier>, VisionError> {
        let data = mat_from_dmatrix(samples)?;
        let responses = Mat::from_slice(labels)
            .and_then(|m| m.reshape(1, labels.len() as i32).and_then(|m| m.try_clone()))
            .or_vision(VisionError::Classifier)?;

        let mut svm = ml::SVM::create().or_vision(VisionError::Classifier)?;
        svm.set_type(ml::SVM_Types::C_SVC as i32).or_vision(VisionError::Classifier)?;
        svm.set_kernel(ml::SVM_KernelTypes::RBF as i32).or_vision(VisionError::Classifier)?;
        svm.set_gamma(params.gamma).or_vision(VisionError::Classifier)?;
        svm.set_c(params.c).or_vision(VisionError::Classifier)?;
        let criteria =
            TermCriteria::new(TERM_MAX_ITER, params.max_iterations, params.epsilon).or_vision(VisionError::Classifier)?;
        svm.set_term_criteria(criteria).or_vision(VisionError::Classifier)?;

        let trained = svm
            .train(&data, ml::SampleTypes::ROW_SAMPLE as i32, &responses)
            .or_vision(VisionError::Classifier)?;
        if !trained {
            return Err(VisionError::Classifier("training did not converge".into()));
        }
        Ok(Arc::new(OpenCvClassifier {
            svm: Mutex::new(svm),
        }))
    }

    fn load_classifier(&self, text: &str) -> Result<Arc<dyn BinaryClassifier>, VisionError> {
        let fs = FileStorage::new(
            text,
            core::FileStorage_Mode::READ as i32 | core::FileStorage_Mode::MEMORY as i32,
            "",
        )
        .or_vision(VisionError::Classifier)?;
        let node = fs.get(SVM_NODE).or_vision(VisionError::Classifier)?;
        if node.empty().or_vision(VisionError::Classifier)? {
            return Err(VisionError::Classifier(format!("no {SVM_NODE} node")));
        }
        let mut svm = ml::SVM::create().or_vision(VisionError::Classifier)?;
        svm.read(&node).or_vision(VisionError::Classifier)?;
        if !svm.is_trained().or_vision(VisionError::Classifier)? {
            return Err(VisionError::Classifier("classifier file holds an untrained model".into()));
        }
        Ok(Arc::new(OpenCvClassifier {
            svm: Mutex::new(svm),
        }))
    }
}

impl StereoBackend for OpenCvBackend {
    fn remap(&self, image: &Image, maps: &RemapPair) -> Result<Image, VisionError> {
        let src = mat_from_image(image)?;
        let size = maps.map1.size();
        let map1 = mat_from_i16(maps.map1.data(), 2, size.height as i32)?;
        let map2 = mat_from_u16(maps.map2.data(), size.height as i32)?;
        let mut dst = Mat::default();
        imgproc::remap_def(&src, &mut dst, &map1, &map2, imgproc::INTER_LINEAR).or_vision(VisionError::Stereo)?;
        image_from_mat(&dst)
    }

    fn compute_disparity(&self, left: &Image, right: &Image, params: &SgbmParams) -> Result<DisparityMap, VisionError> {
        let (p1, p2) = params.smoothness(left.channels());
        let mut sgbm = calib3d::StereoSGBM::create(
            params.min_disparity,
            params.num_disparities,
            params.block_size,
            p1,
            p2,
            params.disp12_max_diff,
            params.pre_filter_cap,
            params.uniqueness_ratio,
            params.speckle_window_size,
            params.speckle_range,
            calib3d::StereoSGBM_MODE_SGBM,
        )
        .or_vision(VisionError::Stereo)?;
        let mut disparity = Mat::default();
        sgbm.compute(&mat_from_image(left)?, &mat_from_image(right)?, &mut disparity)
            .or_vision(VisionError::Stereo)?;
        let size = ImageSize::new(disparity.cols() as u32, disparity.rows() as u32);
        DisparityMap::new(size, i16_values(&disparity)?)
    }
}

fn layout(e: opencv::Error) -> VisionError {
    VisionError::Layout(e.message)
}

fn cv_size(size: ImageSize) -> Size {
    Size::new(size.width as i32, size.height as i32)
}

fn pattern_size(pattern: PatternSize) -> Size {
    Size::new(pattern.cols as i32, pattern.rows as i32)
}

fn object_vectors(points: &[Vec<Point3<f32>>]) -> Vector<Vector<Point3f>> {
    points
        .iter()
        .map(|view| view.iter().map(|p| Point3f::new(p.x, p.y, p.z)).collect())
        .collect()
}

fn image_vectors(points: &[Vec<Point2<f32>>]) -> Vector<Vector<Point2f>> {
    points
        .iter()
        .map(|view| view.iter().map(|p| Point2f::new(p.x, p.y)).collect())
        .collect()
}

fn gray(mat: &Mat) -> Result<Mat, VisionError> {
    if mat.channels() == 1 {
        return mat.try_clone().map_err(layout);
    }
    let mut out = Mat::default();
    imgproc::cvt_color_def(mat, &mut out, imgproc::COLOR_BGR2GRAY).map_err(layout)?;
    Ok(out)
}

fn mat_from_image(image: &Image) -> Result<Mat, VisionError> {
    if image.is_empty() {
        return Ok(Mat::default());
    }
    Mat::from_slice(image.data())
        .and_then(|m| m.reshape(i32::from(image.channels()), image.height() as i32).and_then(|m| m.try_clone()))
        .map_err(layout)
}

fn image_from_mat(mat: &Mat) -> Result<Image, VisionError> {
    if mat.depth() != core::CV_8U {
        return Err(VisionError::Layout(format!("expected 8-bit pixels, got depth {}", mat.depth())));
    }
    let bytes = continuous_bytes(mat)?;
    Image::new(mat.cols() as u32, mat.rows() as u32, mat.channels() as u8, bytes)
}

fn mat_from_f32(data: &[f32], rows: i32) -> Result<Mat, VisionError> {
    Mat::from_slice(data)
        .and_then(|m| m.reshape(1, rows).and_then(|m| m.try_clone()))
        .map_err(layout)
}

fn mat_from_f64(data: &[f64], rows: i32) -> Result<Mat, VisionError> {
    Mat::from_slice(data)
        .and_then(|m| m.reshape(1, rows).and_then(|m| m.try_clone()))
        .map_err(layout)
}

fn mat_from_i16(data: &[i16], channels: i32, rows: i32) -> Result<Mat, VisionError> {
    Mat::from_slice(data)
        .and_then(|m| m.reshape(channels, rows).and_then(|m| m.try_clone()))
        .map_err(layout)
}

fn mat_from_u16(data: &[u16], rows: i32) -> Result<Mat, VisionError> {
    Mat::from_slice(data)
        .and_then(|m| m.reshape(1, rows).and_then(|m| m.try_clone()))
        .map_err(layout)
}

fn mat_from_dmatrix(m: &DMatrix<f32>) -> Result<Mat, VisionError> {
    if m.is_empty() {
        return Ok(Mat::default());
    }
    // Column-major storage of the transpose is the row-major order OpenCV wants.
    mat_from_f32(m.transpose().as_slice(), m.nrows() as i32)
}

fn dmatrix_from_mat(mat: &Mat) -> Result<DMatrix<f32>, VisionError> {
    if mat.empty() {
        return Ok(DMatrix::zeros(0, 0));
    }
    let mut converted = Mat::default();
    mat.convert_to(&mut converted, core::CV_32F, 1.0, 0.0).map_err(layout)?;
    let values = converted.data_typed::<f32>().map_err(layout)?;
    Ok(DMatrix::from_row_slice(mat.rows() as usize, mat.cols() as usize, values))
}

/// All elements as `f64`, row-major.
fn f64_values(mat: &Mat) -> Result<Vec<f64>, VisionError> {
    let mut converted = Mat::default();
    mat.convert_to(&mut converted, core::CV_64F, 1.0, 0.0).map_err(layout)?;
    Ok(converted.data_typed::<f64>().map_err(layout)?.to_vec())
}

fn exact_values(mat: &Mat, count: usize) -> Result<Vec<f64>, VisionError> {
    let values = f64_values(mat)?;
    if values.len() != count {
        return Err(VisionError::Layout(format!("expected {count} values, got {}", values.len())));
    }
    Ok(values)
}

fn matrix3_from_mat(mat: &Mat) -> Result<Matrix3<f64>, VisionError> {
    Ok(Matrix3::from_row_slice(&exact_values(mat, 9)?))
}

fn intrinsics_from_mats(k: &Mat, d: &Mat) -> Result<CameraIntrinsics, VisionError> {
    Ok(CameraIntrinsics {
        camera_matrix: matrix3_from_mat(k)?,
        dist_coeffs: DVector::from_vec(f64_values(d)?),
    })
}

fn intrinsics_to_mats(intrinsics: &CameraIntrinsics) -> Result<(Mat, Mat), VisionError> {
    let k = mat_from_f64(intrinsics.camera_matrix.transpose().as_slice(), 3)?;
    let d = mat_from_f64(intrinsics.dist_coeffs.as_slice(), 1)?;
    Ok((k, d))
}

/// Element bytes of `mat` in row-major order.
fn continuous_bytes(mat: &Mat) -> Result<Vec<u8>, VisionError> {
    if mat.is_continuous() {
        return Ok(mat.data_bytes().map_err(layout)?.to_vec());
    }
    let owned = mat.try_clone().map_err(layout)?;
    Ok(owned.data_bytes().map_err(layout)?.to_vec())
}

/// Raw 16-bit elements of a (possibly multi-channel) `CV_16S` matrix.
fn i16_values(mat: &Mat) -> Result<Vec<i16>, VisionError> {
    if mat.depth() != core::CV_16S {
        return Err(VisionError::Layout(format!("expected 16-bit signed data, got depth {}", mat.depth())));
    }
    let bytes = continuous_bytes(mat)?;
    Ok(bytes.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])).collect())
}

fn u16_values(mat: &Mat) -> Result<Vec<u16>, VisionError> {
    if mat.depth() != core::CV_16U {
        return Err(VisionError::Layout(format!("expected 16-bit unsigned data, got depth {}", mat.depth())));
    }
    let bytes = continuous_bytes(mat)?;
    Ok(bytes.chunks_exact(2).map(|b| u16::from_ne_bytes([b[0], b[1]])).collect())
}
