//! Stereo Sensor Driver Contract
//!
//! Describes what the pipeline needs from the stereo camera / IMU driver:
//! - Frame and IMU delivery through [`SensorSink`] callbacks
//! - Fire-and-forget exposure and illumination commands
//! - Best-effort capture and IMU rate estimates
//!
//! A [`SyntheticDriver`] producing test patterns stands in for the hardware.

pub mod frame;
pub mod imu;
pub mod synthetic;

pub use frame::{ChannelMode, SensorImage, StereoFrame};
pub use imu::ImuSample;
pub use synthetic::SyntheticDriver;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Driver error types
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Sensor type {0} not supported")]
    UnsupportedVariant(String),

    #[error("Driver failed to init: {0}")]
    Init(String),

    #[error("Failed to read sensor resolution")]
    Resolution,

    #[error("Driver not initialized")]
    NotInitialized,

    #[error("Driver already running")]
    AlreadyRunning,

    #[error("Driver failed to stop: {0}")]
    Stop(String),
}

/// Supported sensor hardware variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorVariant {
    Li,
    Xp,
    Xp2,
    Xp3,
    XpIrl,
    XpIrl2,
    /// Rotated XP3: the reported resolution is transposed
    Face,
}

impl SensorVariant {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorVariant::Li => "LI",
            SensorVariant::Xp => "XP",
            SensorVariant::Xp2 => "XP2",
            SensorVariant::Xp3 => "XP3",
            SensorVariant::XpIrl => "XPIRL",
            SensorVariant::XpIrl2 => "XPIRL2",
            SensorVariant::Face => "FACE",
        }
    }

    /// Whether manual exposure commands are accepted
    pub fn supports_exposure_control(&self) -> bool {
        !matches!(self, SensorVariant::Li)
    }

    /// Whether the infrared illuminator can be toggled
    pub fn supports_illumination_toggle(&self) -> bool {
        matches!(self, SensorVariant::XpIrl)
    }

    /// Whether width and height are swapped relative to the sensor registers
    pub fn transposes_resolution(&self) -> bool {
        matches!(self, SensorVariant::Face)
    }

    /// Color sensors deliver 3-channel frames
    pub fn channel_mode(&self) -> ChannelMode {
        match self {
            SensorVariant::Xp3 | SensorVariant::Face => ChannelMode::Color,
            _ => ChannelMode::Mono,
        }
    }
}

impl FromStr for SensorVariant {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LI" => Ok(SensorVariant::Li),
            "XP" => Ok(SensorVariant::Xp),
            "XP2" => Ok(SensorVariant::Xp2),
            "XP3" => Ok(SensorVariant::Xp3),
            "XPIRL" => Ok(SensorVariant::XpIrl),
            "XPIRL2" => Ok(SensorVariant::XpIrl2),
            "FACE" => Ok(SensorVariant::Face),
            other => Err(DriverError::UnsupportedVariant(other.to_string())),
        }
    }
}

impl fmt::Display for SensorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of driver data.
///
/// Both callbacks run on threads owned by the driver and must return promptly:
/// no blocking I/O, no locks beyond a queue's own.
pub trait SensorSink: Send + Sync {
    /// A synchronized stereo pair; `timestamp` is in 100 µs ticks
    fn on_stereo_frame(&self, left: SensorImage, right: SensorImage, timestamp: f64);

    /// One inertial sample
    fn on_imu_sample(&self, sample: ImuSample);
}

/// Stereo camera / IMU driver
pub trait SensorDriver: Send + Sync {
    /// Hardware variant this driver talks to
    fn variant(&self) -> SensorVariant;

    /// Open the device and apply the initial exposure index
    fn init(&self, exposure_index: i32) -> Result<(), DriverError>;

    /// Sensor resolution as (width, height), before any variant transposition
    fn resolution(&self) -> Result<(u32, u32), DriverError>;

    /// Whether frames are 3-channel
    fn is_color(&self) -> bool;

    /// Number of exposure table steps; valid indices are `[0, steps)`
    fn exposure_steps(&self) -> i32;

    /// Number of illumination PWM steps; valid indices are `[0, steps)`
    fn illumination_steps(&self) -> i32;

    fn set_exposure_index(&self, index: i32);
    fn set_illumination_index(&self, index: i32);
    fn set_auto_exposure(&self, enabled: bool);
    fn set_auto_illumination(&self, enabled: bool);

    /// Best-effort frame rate estimate (Hz)
    fn capture_rate(&self) -> f32;

    /// Best-effort IMU rate estimate (Hz)
    fn imu_rate(&self) -> f32;

    /// Start delivering data to `sink` on driver-owned threads. Returns immediately.
    fn run(&self, sink: Arc<dyn SensorSink>) -> Result<(), DriverError>;

    /// Stop delivery and release the device
    fn stop(&self) -> Result<(), DriverError>;
}

/// Sensor configuration
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Hardware variant
    pub variant: SensorVariant,
    /// Device identifier (empty = first device found)
    pub dev_id: String,
    /// Start with auto exposure enabled
    pub auto_exposure: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            variant: SensorVariant::Xp,
            dev_id: String::new(),
            auto_exposure: false,
        }
    }
}
