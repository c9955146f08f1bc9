//! Stereo calibration parameters
//!
//! Loaded once at startup from a JSON file and shared read-only.

use std::path::Path;

use nalgebra::{Matrix3x4, Matrix4};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion};
use crate::GeometryError;

/// On-disk layout of one camera
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CameraEntry {
    intrinsics: CameraIntrinsics,
    #[serde(default)]
    distortion: RadialTangentialDistortion,
    /// Row-major 4x4 transform taking camera coordinates to the device frame
    device_from_camera: [[f64; 4]; 4],
}

/// On-disk layout of the calibration file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibrationFile {
    image_size: [u32; 2],
    cameras: [CameraEntry; 2],
    /// Row-major 4x4 disparity-to-depth matrix
    reprojection: [[f64; 4]; 4],
}

fn to_matrix(rows: &[[f64; 4]; 4]) -> Matrix4<f64> {
    Matrix4::from_fn(|r, c| rows[r][c])
}

fn to_rows(m: &Matrix4<f64>) -> [[f64; 4]; 4] {
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    rows
}

/// One calibrated camera of the rig
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraCalibration {
    pub model: CameraModel,
    /// Camera-to-device rigid transform
    pub device_from_camera: Matrix4<f64>,
}

/// Intrinsics, extrinsics and reprojection transform of the stereo pair
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParameters {
    /// (width, height) the calibration was computed for
    pub image_size: (u32, u32),
    /// Left and right cameras
    pub cameras: [CameraCalibration; 2],
    /// Disparity-to-3D reprojection matrix (Q)
    pub reprojection: Matrix4<f64>,
    right_from_left: Matrix4<f64>,
}

impl CalibrationParameters {
    /// Build and validate from components
    pub fn new(
        image_size: (u32, u32),
        cameras: [CameraCalibration; 2],
        reprojection: Matrix4<f64>,
    ) -> Result<Self, GeometryError> {
        if image_size.0 == 0 || image_size.1 == 0 {
            return Err(GeometryError::Invalid(format!(
                "image size {}x{}",
                image_size.0, image_size.1
            )));
        }
        for (lr, cam) in cameras.iter().enumerate() {
            if !cam.model.intrinsics.is_valid() {
                return Err(GeometryError::Invalid(format!("camera {} intrinsics", lr)));
            }
        }
        if reprojection.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::Invalid("reprojection matrix".into()));
        }
        let right_to_device = cameras[1]
            .device_from_camera
            .try_inverse()
            .ok_or_else(|| GeometryError::Invalid("right extrinsic not invertible".into()))?;
        let right_from_left = right_to_device * cameras[0].device_from_camera;

        Ok(Self {
            image_size,
            cameras,
            reprojection,
            right_from_left,
        })
    }

    /// Parse a JSON calibration document
    pub fn from_json_str(json: &str) -> Result<Self, GeometryError> {
        let file: CalibrationFile = serde_json::from_str(json)?;
        let cameras = file.cameras.map(|entry| CameraCalibration {
            model: CameraModel {
                intrinsics: entry.intrinsics,
                distortion: entry.distortion,
            },
            device_from_camera: to_matrix(&entry.device_from_camera),
        });
        Self::new(
            (file.image_size[0], file.image_size[1]),
            cameras,
            to_matrix(&file.reprojection),
        )
    }

    /// Load a JSON calibration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GeometryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| GeometryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let params = Self::from_json_str(&json)?;
        info!(
            "Loaded calibration {} ({}x{})",
            path.display(),
            params.image_size.0,
            params.image_size.1
        );
        Ok(params)
    }

    /// Serialize back to the JSON file layout
    pub fn to_json_string(&self) -> Result<String, GeometryError> {
        let entry = |cam: &CameraCalibration| CameraEntry {
            intrinsics: cam.model.intrinsics,
            distortion: cam.model.distortion,
            device_from_camera: to_rows(&cam.device_from_camera),
        };
        let file = CalibrationFile {
            image_size: [self.image_size.0, self.image_size.1],
            cameras: [entry(&self.cameras[0]), entry(&self.cameras[1])],
            reprojection: to_rows(&self.reprojection),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Fail unless the driver-reported size matches the calibrated size
    pub fn check_image_size(&self, width: u32, height: u32) -> Result<(), GeometryError> {
        if (width, height) != self.image_size {
            return Err(GeometryError::SizeMismatch {
                expected: self.image_size,
                actual: (width, height),
            });
        }
        Ok(())
    }

    pub fn left(&self) -> &CameraModel {
        &self.cameras[0].model
    }

    pub fn right(&self) -> &CameraModel {
        &self.cameras[1].model
    }

    /// Rigid transform taking left-camera coordinates into the right camera
    pub fn right_from_left(&self) -> &Matrix4<f64> {
        &self.right_from_left
    }

    /// Normalized projection matrices `[I|0]` and `[R|t]` with the left
    /// camera as the reference frame.
    pub fn projection_matrices(&self) -> [Matrix3x4<f64>; 2] {
        let left = Matrix3x4::identity();
        let right = self.right_from_left.fixed_view::<3, 4>(0, 0).into_owned();
        [left, right]
    }
}
