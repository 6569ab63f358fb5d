//! Image-plane quadrilaterals and their axis-aligned bounds.

use nalgebra::{Matrix3, Point2, Vector3};

use crate::vision::ImageSize;

/// Four image-plane corners, in template order: top-left, top-right,
/// bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub corners: [Point2<f32>; 4],
}

impl Quad {
    pub fn new(corners: [Point2<f32>; 4]) -> Self {
        Self { corners }
    }

    /// The outline of a template image of the given size.
    pub fn from_size(size: ImageSize) -> Self {
        let w = size.width as f32;
        let h = size.height as f32;
        Self::new([
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ])
    }

    /// Map every corner through a homography.
    ///
    /// Returns `None` when a corner lands at infinity.
    pub fn project(&self, homography: &Matrix3<f64>) -> Option<Quad> {
        let mut out = self.corners;
        for (dst, src) in out.iter_mut().zip(self.corners.iter()) {
            *dst = perspective_transform(homography, src)?;
        }
        Some(Quad::new(out))
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for c in &self.corners {
            min_x = min_x.min(c.x);
            min_y = min_y.min(c.y);
            max_x = max_x.max(c.x);
            max_y = max_y.max(c.y);
        }
        BoundingBox {
            x0: min_x.floor() as i64,
            y0: min_y.floor() as i64,
            x1: max_x.ceil() as i64,
            y1: max_y.ceil() as i64,
        }
    }
}

/// Apply a homography to a single point.
pub fn perspective_transform(homography: &Matrix3<f64>, p: &Point2<f32>) -> Option<Point2<f32>> {
    let v = homography * Vector3::new(f64::from(p.x), f64::from(p.y), 1.0);
    if v.z.abs() <= f64::EPSILON {
        return None;
    }
    let x = v.x / v.z;
    let y = v.y / v.z;
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some(Point2::new(x as f32, y as f32))
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl BoundingBox {
    pub fn width(&self) -> i64 {
        (self.x1 - self.x0).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.y1 - self.y0).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Intersect with the image; `None` if nothing remains.
    pub fn clamp_to(&self, size: ImageSize) -> Option<BoundingBox> {
        let clamped = BoundingBox {
            x0: self.x0.clamp(0, i64::from(size.width)),
            y0: self.y0.clamp(0, i64::from(size.height)),
            x1: self.x1.clamp(0, i64::from(size.width)),
            y1: self.y1.clamp(0, i64::from(size.height)),
        };
        if clamped.is_empty() {
            None
        } else {
            Some(clamped)
        }
    }
}
