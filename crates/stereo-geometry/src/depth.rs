//! Disparity to 3D conversion and depth visualizations
//!
//! Disparities are signed 16-bit values in 1/16 pixel units, the layout
//! block-matching backends emit. Non-positive values carry no depth.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use nalgebra::{Matrix4, Vector4};

use crate::GeometryError;

/// Sub-pixel scale of disparity values
pub const DISPARITY_SCALE: f32 = 16.0;

/// Points nearer than this (meters) are tinted black in the clipped view
pub const NEAR_CUT: f32 = 0.2;

/// Points farther than this (meters) are tinted green in the clipped view
pub const FAR_CUT: f32 = 1.0;

/// Depths below this (meters) are written as zero millimeters
const MIN_VALID_DEPTH: f32 = 1e-5;

/// Largest disparity (pixels) the color ramp distinguishes
const RAMP_MAX_DISPARITY: f32 = 96.0;

/// Far-to-near ramp; index 0 holds the smallest disparities
const DISPARITY_RAMP: [[u8; 3]; 8] = [
    [0, 0, 128],
    [0, 0, 255],
    [0, 128, 255],
    [0, 255, 255],
    [0, 255, 0],
    [255, 255, 0],
    [255, 128, 0],
    [255, 0, 0],
];

/// Row-major disparity image
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<i16>,
}

impl DisparityMap {
    pub fn new(width: u32, height: u32, data: Vec<i16>) -> Result<Self, GeometryError> {
        if data.len() != (width as usize) * (height as usize) {
            return Err(GeometryError::Invalid(format!(
                "disparity buffer holds {} values for {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Map filled with one value
    pub fn filled(width: u32, height: u32, value: i16) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width as usize) * (height as usize)],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> i16 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Source of disparity maps for a rectified mono pair
pub trait DisparityEstimator: Send {
    /// Compute a disparity map the size of `left`
    fn compute(&mut self, left: &GrayImage, right: &GrayImage)
        -> Result<DisparityMap, GeometryError>;
}

/// Row-major XYZ points in the left camera frame (meters)
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub width: u32,
    pub height: u32,
    pub points: Vec<[f32; 3]>,
}

impl PointCloud {
    pub fn get(&self, x: u32, y: u32) -> [f32; 3] {
        self.points[(y * self.width + x) as usize]
    }

    /// Number of non-zero points
    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| p[2] != 0.0).count()
    }
}

/// Reproject every positive disparity through `q`; invalid pixels map to zero.
pub fn disparity_to_points(disparity: &DisparityMap, q: &Matrix4<f64>) -> PointCloud {
    let q = q.cast::<f32>();
    let mut points = vec![[0.0f32; 3]; disparity.data.len()];
    for y in 0..disparity.height {
        for x in 0..disparity.width {
            let idx = (y * disparity.width + x) as usize;
            let d = disparity.data[idx];
            if d <= 0 {
                continue;
            }
            let h = q * Vector4::new(x as f32, y as f32, d as f32 / DISPARITY_SCALE, 1.0);
            if h.w.abs() <= f32::EPSILON {
                continue;
            }
            points[idx] = [h.x / h.w, h.y / h.w, h.z / h.w];
        }
    }
    PointCloud {
        width: disparity.width,
        height: disparity.height,
        points,
    }
}

/// Ramp color of one raw disparity value; black when invalid
pub fn disparity_color(d: i16) -> Rgb<u8> {
    if d <= 0 {
        return Rgb([0, 0, 0]);
    }
    let pixels = (d as f32 / DISPARITY_SCALE).min(RAMP_MAX_DISPARITY - 1e-3);
    let bucket = (pixels / RAMP_MAX_DISPARITY * DISPARITY_RAMP.len() as f32) as usize;
    Rgb(DISPARITY_RAMP[bucket.min(DISPARITY_RAMP.len() - 1)])
}

/// Color-coded rendering of a whole disparity map
pub fn depth_canvas(disparity: &DisparityMap) -> RgbImage {
    RgbImage::from_fn(disparity.width, disparity.height, |x, y| {
        disparity_color(disparity.get(x, y))
    })
}

/// Restrict a cloud to the `[near, far]` band.
///
/// Out-of-band points are zeroed; far ones are tinted green and near ones
/// black. In-band points blend from red (near) to green (far).
pub fn clip_point_cloud(cloud: &PointCloud, near: f32, far: f32) -> (PointCloud, RgbImage) {
    let mut clipped = cloud.clone();
    let mut colors = RgbImage::new(cloud.width, cloud.height);
    let span = far - near;
    for (point, color) in clipped.points.iter_mut().zip(colors.pixels_mut()) {
        let z = point[2];
        if z > far {
            *point = [0.0; 3];
            *color = Rgb([0, 255, 0]);
        } else if z < near {
            *point = [0.0; 3];
            *color = Rgb([0, 0, 0]);
        } else {
            let r = (255.0 * (far - z) / span) as u8;
            let g = (255.0 * (z - near) / span) as u8;
            *color = Rgb([r, g, 0]);
        }
    }
    (clipped, colors)
}

/// Depth image in millimeters, zero where the depth is invalid
pub fn depth_millimeters(cloud: &PointCloud) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    ImageBuffer::from_fn(cloud.width, cloud.height, |x, y| {
        let z = cloud.get(x, y)[2];
        if z < MIN_VALID_DEPTH {
            Luma([0])
        } else {
            Luma([(z * 1000.0) as u16])
        }
    })
}
