//! Camera intrinsics and radial-tangential distortion model.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::{Point2, Point3};

/// Fixed-point iterations used to invert the distortion
const UNDISTORT_ITERS: usize = 20;

/// Round-trip tolerance (pixels) for a pixel to count as inside the valid FOV
const MASK_ROUND_TRIP_PX: f64 = 0.5;

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Returns `true` when all entries are finite and focal lengths non-zero.
    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy].iter().all(|v| v.is_finite())
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    pub fn pixel_to_normalized(&self, pixel: Point2) -> Point2 {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    pub fn normalized_to_pixel(&self, normalized: Point2) -> Point2 {
        Point2::new(
            self.fx * normalized.x + self.cx,
            self.fy * normalized.y + self.cy,
        )
    }
}

/// Brown-Conrady coefficients in OpenCV order (k1, k2, p1, p2, k3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RadialTangentialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    #[serde(default)]
    pub k3: f64,
}

impl RadialTangentialDistortion {
    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, p: Point2) -> Point2 {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + dx, y * radial + dy)
    }

    /// Invert [`Self::distort`] by fixed-point iteration.
    pub fn undistort(&self, distorted: Point2) -> Point2 {
        let (x0, y0) = (distorted.x, distorted.y);
        let (mut x, mut y) = (x0, y0);
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (x0 - dx) / radial;
            y = (y0 - dy) / radial;
        }
        Point2::new(x, y)
    }
}

/// Complete camera model (intrinsics + distortion).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: RadialTangentialDistortion,
}

impl CameraModel {
    /// Raw pixel to undistorted normalized image coordinates.
    pub fn undistort_point(&self, pixel: Point2) -> Point2 {
        self.distortion
            .undistort(self.intrinsics.pixel_to_normalized(pixel))
    }

    /// Normalized (undistorted) coordinates to raw pixel.
    pub fn distort_point(&self, normalized: Point2) -> Point2 {
        self.intrinsics
            .normalized_to_pixel(self.distortion.distort(normalized))
    }

    /// Project a point expressed in this camera's frame to raw pixel coordinates.
    ///
    /// Returns `None` for points on the camera plane.
    pub fn project(&self, p: &Point3) -> Option<Point2> {
        if p.z.abs() <= f64::EPSILON {
            return None;
        }
        Some(self.distort_point(Point2::new(p.x / p.z, p.y / p.z)))
    }

    /// Mask of pixels inside the region where the distortion model is invertible,
    /// together with the horizontal field of view (degrees) it spans.
    pub fn valid_mask(&self, width: u32, height: u32) -> (GrayImage, f64) {
        let mut max_angle = 0.0f64;
        let center_row = height / 2;
        let mask = GrayImage::from_fn(width, height, |x, y| {
            let pixel = Point2::new(x as f64, y as f64);
            let normalized = self.undistort_point(pixel);
            let back = self.distort_point(normalized);
            let valid = normalized.x.is_finite()
                && normalized.y.is_finite()
                && (back - pixel).norm() < MASK_ROUND_TRIP_PX;
            if valid && y == center_row {
                max_angle = max_angle.max(normalized.x.atan().abs());
            }
            Luma([if valid { 255 } else { 0 }])
        });
        (mask, 2.0 * max_angle.to_degrees())
    }
}
