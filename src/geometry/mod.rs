//! Image-plane and stereo geometry: detection outlines, homography
//! projection, disparity conversion and reprojection to depth.

pub mod disparity;
pub mod quad;

pub use disparity::{DISPARITY_SCALE, DisparityMap, MISSING_DEPTH, PointCloud, reproject_to_3d};
pub use quad::{BoundingBox, Quad, perspective_transform};
