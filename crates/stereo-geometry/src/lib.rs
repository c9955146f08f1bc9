//! Stereo Geometry
//!
//! Everything the logger needs to reason about the calibrated stereo rig:
//! - Pinhole + radial-tangential camera model (undistort / project)
//! - Calibration file loading and validation
//! - Linear (DLT) triangulation
//! - Disparity map to camera-frame point conversion and depth visualizations

pub mod calibration;
pub mod camera;
pub mod depth;
pub mod triangulation;

pub use calibration::{CalibrationParameters, CameraCalibration};
pub use camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion};
pub use depth::{
    clip_point_cloud, depth_canvas, depth_millimeters, disparity_color, disparity_to_points,
    DisparityEstimator, DisparityMap, PointCloud,
};
pub use triangulation::triangulate_linear;

use thiserror::Error;

/// 2D point in pixel or normalized coordinates
pub type Point2 = nalgebra::Point2<f64>;

/// 3D point in a camera frame (meters)
pub type Point3 = nalgebra::Point3<f64>;

/// Geometry error types
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Failed to read calibration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed calibration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid calibration: {0}")]
    Invalid(String),

    #[error("Image size {actual:?} does not match calibration size {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Triangulation failed: {0}")]
    Triangulation(String),

    #[error("Disparity backend failed: {0}")]
    Disparity(String),
}
