//! Logger configuration
//!
//! Values come from an optional config file layered under `XP_LOGGER_*`
//! environment variables, then get resolved into the [`RunModes`] the
//! pipeline runs with.

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use calib_verify::Strategy;
use sensor_driver::SensorVariant;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::LoggerError;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "XP_LOGGER";

/// Logger configuration as loaded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    /// LI, XP, XP2, XP3, XPIRL, XPIRL2 or FACE
    pub sensor_type: String,
    /// Device identifier (empty = first device found)
    pub dev_id: String,
    /// Stereo calibration file (JSON)
    pub calib_file: Option<PathBuf>,
    /// Compute depth from disparity
    pub depth: bool,
    /// Verify calibration with fiducial tag identities
    pub tag_verify: bool,
    /// Verify calibration with cross-checked binary descriptors
    pub descriptor_verify: bool,
    /// Accumulate target detections on saved frames and check coverage
    pub coverage_capture: bool,
    /// Only save frames on the operator's save command
    pub manual_trigger: bool,
    /// Output directory; nothing is recorded when unset
    pub record_path: Option<PathBuf>,
    /// No display output
    pub headless: bool,
    /// Show brightness histograms
    pub show_hist: bool,
    /// Show the clipped point cloud view
    pub viz3d: bool,
    /// Undistort the display pair and draw horizontal rectification lines
    pub horizontal_line: bool,
    /// Coverage radius around the image center (pixels)
    pub valid_radius: f64,
    /// Debug-level logging
    pub verbose: bool,
    /// Start with auto exposure enabled
    pub auto_exposure: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            sensor_type: "XP".to_string(),
            dev_id: String::new(),
            calib_file: None,
            depth: false,
            tag_verify: false,
            descriptor_verify: false,
            coverage_capture: false,
            manual_trigger: false,
            record_path: None,
            headless: false,
            show_hist: false,
            viz3d: false,
            horizontal_line: false,
            valid_radius: 360.0,
            verbose: false,
            auto_exposure: false,
        }
    }
}

/// Resolved, mutually consistent run modes
#[derive(Debug, Clone, PartialEq)]
pub struct RunModes {
    pub variant: SensorVariant,
    pub dev_id: String,
    pub calib_file: Option<PathBuf>,
    pub verification: Option<Strategy>,
    pub depth: bool,
    pub coverage_capture: bool,
    pub manual_trigger: bool,
    pub record_path: Option<PathBuf>,
    pub headless: bool,
    pub show_hist: bool,
    pub viz3d: bool,
    pub horizontal_line: bool,
    pub valid_radius: f64,
    pub auto_exposure: bool,
}

impl RunModes {
    /// Fail when a requested mode needs a vision backend this build lacks
    pub fn require_backends(
        &self,
        has_disparity: bool,
        has_tag_detector: bool,
    ) -> Result<(), LoggerError> {
        if self.depth && !has_disparity {
            return Err(LoggerError::MissingBackend("disparity estimator"));
        }
        let needs_tags =
            self.coverage_capture || self.verification == Some(Strategy::TagIdentity);
        if needs_tags && !has_tag_detector {
            return Err(LoggerError::MissingBackend("tag detector"));
        }
        Ok(())
    }
}

fn display_available() -> bool {
    if cfg!(target_os = "linux") {
        std::env::var_os("DISPLAY").is_some()
    } else {
        true
    }
}

impl LoggerConfig {
    /// Load from an optional file plus `XP_LOGGER_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, LoggerError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, LoggerError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Check mode compatibility and resolve derived settings
    pub fn validate(&self) -> Result<RunModes, LoggerError> {
        let variant: SensorVariant = self.sensor_type.parse()?;

        let verification = match (self.tag_verify, self.descriptor_verify) {
            (true, true) => {
                return Err(LoggerError::InvalidModes(
                    "tag and descriptor verification requested together".into(),
                ))
            }
            (true, false) => Some(Strategy::TagIdentity),
            (false, true) => Some(Strategy::Descriptor),
            (false, false) => None,
        };

        if self.calib_file.is_none() {
            if self.depth {
                return Err(LoggerError::InvalidModes(
                    "depth requires a calibration file".into(),
                ));
            }
            if verification.is_some() {
                return Err(LoggerError::InvalidModes(
                    "verification requires a calibration file".into(),
                ));
            }
        }
        if self.depth && verification.is_some() {
            return Err(LoggerError::InvalidModes(
                "depth and verification requested together".into(),
            ));
        }
        if self.horizontal_line && self.calib_file.is_none() {
            return Err(LoggerError::InvalidModes(
                "horizontal lines require a calibration file".into(),
            ));
        }
        if verification.is_some() && self.record_path.is_some() {
            return Err(LoggerError::InvalidModes(
                "verification and recording requested together".into(),
            ));
        }
        if self.coverage_capture && self.record_path.is_none() {
            return Err(LoggerError::InvalidModes(
                "coverage capture requires a record path".into(),
            ));
        }

        let mut headless = self.headless;
        if !headless && !display_available() {
            warn!("No display available, running headless");
            headless = true;
        }

        Ok(RunModes {
            variant,
            dev_id: self.dev_id.clone(),
            calib_file: self.calib_file.clone(),
            verification,
            depth: self.depth,
            coverage_capture: self.coverage_capture,
            // Coverage capture only saves on demand
            manual_trigger: self.manual_trigger || self.coverage_capture,
            record_path: self.record_path.clone(),
            headless,
            show_hist: self.show_hist,
            viz3d: self.viz3d,
            horizontal_line: self.horizontal_line,
            valid_radius: self.valid_radius,
            auto_exposure: self.auto_exposure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_calib() -> LoggerConfig {
        LoggerConfig {
            calib_file: Some(PathBuf::from("calib.json")),
            ..Default::default()
        }
    }

    fn invalid(config: LoggerConfig) -> bool {
        matches!(config.validate(), Err(LoggerError::InvalidModes(_)))
    }

    #[test]
    fn test_defaults_are_valid() {
        let modes = LoggerConfig::default().validate().unwrap();
        assert_eq!(modes.variant, SensorVariant::Xp);
        assert_eq!(modes.verification, None);
        assert_eq!(modes.valid_radius, 360.0);
        assert!(!modes.manual_trigger);
    }

    #[test]
    fn test_unsupported_variant() {
        let config = LoggerConfig {
            sensor_type: "XP9".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LoggerError::Driver(sensor_driver::DriverError::UnsupportedVariant(_)))
        ));
    }

    #[test]
    fn test_calibration_required() {
        assert!(invalid(LoggerConfig {
            depth: true,
            ..Default::default()
        }));
        assert!(invalid(LoggerConfig {
            tag_verify: true,
            ..Default::default()
        }));
        assert!(invalid(LoggerConfig {
            descriptor_verify: true,
            ..Default::default()
        }));
    }

    #[test]
    fn test_exclusive_modes() {
        assert!(invalid(LoggerConfig {
            tag_verify: true,
            descriptor_verify: true,
            ..with_calib()
        }));
        assert!(invalid(LoggerConfig {
            depth: true,
            descriptor_verify: true,
            ..with_calib()
        }));
        assert!(invalid(LoggerConfig {
            descriptor_verify: true,
            record_path: Some("/tmp/rec".into()),
            ..with_calib()
        }));
        assert!(invalid(LoggerConfig {
            coverage_capture: true,
            ..Default::default()
        }));
    }

    #[test]
    fn test_coverage_capture_forces_manual_trigger() {
        let modes = LoggerConfig {
            coverage_capture: true,
            record_path: Some("/tmp/rec".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(modes.manual_trigger);
        assert!(modes.require_backends(true, false).is_err());
        assert!(modes.require_backends(false, true).is_ok());
    }

    #[test]
    fn test_depth_excludes_verification() {
        assert!(invalid(LoggerConfig {
            depth: true,
            tag_verify: true,
            ..with_calib()
        }));
        let modes = LoggerConfig {
            depth: true,
            ..with_calib()
        }
        .validate()
        .unwrap();
        assert_eq!(modes.verification, None);
        assert!(matches!(
            modes.require_backends(false, true),
            Err(LoggerError::MissingBackend("disparity estimator"))
        ));
    }

    #[test]
    fn test_horizontal_line_requires_calibration() {
        assert!(invalid(LoggerConfig {
            horizontal_line: true,
            ..Default::default()
        }));
        let modes = LoggerConfig {
            horizontal_line: true,
            ..with_calib()
        }
        .validate()
        .unwrap();
        assert!(modes.horizontal_line);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("xp-logger-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("logger.json");
        std::fs::write(
            &path,
            r#"{ "sensor_type": "XPIRL", "show_hist": true, "valid_radius": 200.0 }"#,
        )
        .unwrap();

        let config = LoggerConfig::load_with_prefix(Some(&path), "XP_LOGGER_TEST_UNSET").unwrap();
        assert_eq!(config.sensor_type, "XPIRL");
        assert!(config.show_hist);
        assert_eq!(config.valid_radius, 200.0);
        assert_eq!(config.record_path, None);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = LoggerConfig::load_with_prefix(
            Some(Path::new("/nonexistent/logger.toml")),
            "XP_LOGGER_TEST_UNSET",
        );
        assert!(matches!(result, Err(LoggerError::Config(_))));
    }
}
