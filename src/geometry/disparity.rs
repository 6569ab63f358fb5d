//! Disparity maps and their reprojection to scene coordinates.

use nalgebra::{Matrix4, Vector3, Vector4};

use crate::error::VisionError;
use crate::geometry::BoundingBox;
use crate::vision::ImageSize;

/// Fixed-point disparity units per pixel.
pub const DISPARITY_SCALE: f32 = 16.0;

/// Depth assigned to pixels carrying the minimal (invalid) disparity.
pub const MISSING_DEPTH: f32 = 10_000.0;

/// Dense disparity in fixed-point units, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    size: ImageSize,
    data: Vec<i16>,
}

impl DisparityMap {
    pub fn new(size: ImageSize, data: Vec<i16>) -> Result<Self, VisionError> {
        if data.len() != size.area() {
            return Err(VisionError::Layout(format!(
                "{}x{} disparity map needs {} values, got {}",
                size.width,
                size.height,
                size.area(),
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn raw(&self) -> &[i16] {
        &self.data
    }

    /// Disparity in pixels.
    pub fn to_pixels(&self) -> Vec<f32> {
        self.data
            .iter()
            .map(|&d| f32::from(d) / DISPARITY_SCALE)
            .collect()
    }
}

/// Per-pixel scene coordinates.
#[derive(Debug, Clone)]
pub struct PointCloud {
    size: ImageSize,
    points: Vec<Vector3<f32>>,
}

impl PointCloud {
    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn point(&self, x: u32, y: u32) -> Option<&Vector3<f32>> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        self.points
            .get(y as usize * self.size.width as usize + x as usize)
    }

    /// Mean depth (Z) over the pixels of `bbox`.
    ///
    /// Pixels without a usable depth (non-finite or flagged missing) are
    /// ignored; `None` if the box holds no usable depth at all.
    pub fn mean_depth(&self, bbox: &BoundingBox) -> Option<f64> {
        let bbox = bbox.clamp_to(self.size)?;
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for y in bbox.y0..bbox.y1 {
            let row = y as usize * self.size.width as usize;
            for x in bbox.x0..bbox.x1 {
                let z = self.points[row + x as usize].z;
                if z.is_finite() && z != MISSING_DEPTH {
                    sum += f64::from(z);
                    count += 1;
                }
            }
        }
        (count > 0).then(|| sum / count as f64)
    }
}

/// Reproject a disparity image (in pixels) to 3-D using the 4x4 matrix `q`.
///
/// With `handle_missing`, pixels holding the smallest disparity in the map
/// are treated as unmatched and pushed to [`MISSING_DEPTH`].
pub fn reproject_to_3d(
    size: ImageSize,
    disparity: &[f32],
    q: &Matrix4<f64>,
    handle_missing: bool,
) -> Result<PointCloud, VisionError> {
    if disparity.len() != size.area() {
        return Err(VisionError::Layout(format!(
            "disparity has {} values for a {}x{} image",
            disparity.len(),
            size.width,
            size.height
        )));
    }

    let min_disparity = if handle_missing {
        disparity.iter().copied().fold(f32::INFINITY, f32::min)
    } else {
        f32::NEG_INFINITY
    };

    let mut points = Vec::with_capacity(disparity.len());
    for y in 0..size.height {
        for x in 0..size.width {
            let d = disparity[y as usize * size.width as usize + x as usize];
            let h: Vector4<f64> = q * Vector4::new(f64::from(x), f64::from(y), f64::from(d), 1.0);
            let inv_w = if h.w.abs() > f64::from(f32::EPSILON) {
                1.0 / h.w
            } else {
                f64::INFINITY
            };
            let mut p = Vector3::new(
                (h.x * inv_w) as f32,
                (h.y * inv_w) as f32,
                (h.z * inv_w) as f32,
            );
            if handle_missing && d == min_disparity {
                p.z = MISSING_DEPTH;
            }
            points.push(p);
        }
    }

    Ok(PointCloud { size, points })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Q for a rectified pair: focal 500 px, principal point (2, 2), baseline 60.
    fn test_q() -> Matrix4<f64> {
        Matrix4::new(
            1.0, 0.0, 0.0, -2.0, //
            0.0, 1.0, 0.0, -2.0, //
            0.0, 0.0, 0.0, 500.0, //
            0.0, 0.0, 1.0 / 60.0, 0.0,
        )
    }

    #[test]
    fn test_fixed_point_conversion() {
        let map = DisparityMap::new(ImageSize::new(2, 1), vec![512, -16]).unwrap();
        assert_eq!(map.to_pixels(), vec![32.0, -1.0]);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        assert!(DisparityMap::new(ImageSize::new(2, 2), vec![0; 3]).is_err());
        assert!(reproject_to_3d(ImageSize::new(2, 2), &[0.0; 3], &test_q(), false).is_err());
    }

    #[test]
    fn test_depth_from_disparity() {
        let size = ImageSize::new(4, 4);
        let disparity = vec![32.0f32; 16];
        let cloud = reproject_to_3d(size, &disparity, &test_q(), false).unwrap();
        let p = cloud.point(2, 2).unwrap();
        assert!((p.z - 937.5).abs() < 1e-3);
        assert!(p.x.abs() < 1e-4);
    }

    #[test]
    fn test_missing_values_are_excluded_from_mean() {
        let size = ImageSize::new(4, 1);
        let disparity = vec![0.0f32, 32.0, 32.0, 64.0];
        let cloud = reproject_to_3d(size, &disparity, &test_q(), true).unwrap();
        assert_eq!(cloud.point(0, 0).unwrap().z, MISSING_DEPTH);

        let bbox = BoundingBox { x0: 0, y0: 0, x1: 4, y1: 1 };
        let mean = cloud.mean_depth(&bbox).unwrap();
        let expected = (937.5 + 937.5 + 468.75) / 3.0;
        assert!((mean - expected).abs() < 1e-3);
    }

    #[test]
    fn test_mean_depth_outside_image_is_none() {
        let size = ImageSize::new(2, 2);
        let cloud = reproject_to_3d(size, &[32.0; 4], &test_q(), false).unwrap();
        let bbox = BoundingBox { x0: 5, y0: 5, x1: 9, y1: 9 };
        assert!(cloud.mean_depth(&bbox).is_none());
    }
}
