//! XP Sensor Logger
//!
//! Capture pipeline for stereo camera / IMU rigs:
//! - Driver callbacks feed lock-protected queues through the capture bridge
//! - One processing thread adjusts exposure, verifies calibration, computes
//!   depth and renders diagnostics
//! - Persistence and IMU threads write frames and inertial samples to disk

pub mod bridge;
pub mod config;
pub mod context;
pub mod control;
pub mod display;
pub mod imu_writer;
pub mod persistence;
pub mod pipeline;
pub mod processing;
pub mod record;

pub use bridge::CaptureBridge;
pub use config::{LoggerConfig, RunModes};
pub use context::PipelineContext;
pub use control::{Command, ControlError, ExposureControl, Preset};
pub use display::{Display, InputSource, NullDisplay, StdinInput};
pub use imu_writer::{format_imu_line, ImuWriter};
pub use persistence::{frame_name, CoverageCapture, PersistenceWorker, SaveRequest};
pub use pipeline::{spawn_pipeline, PipelineHandle, PipelineStats};
pub use processing::{LoopStats, ProcessingLoop};

use calib_verify::VerifyError;
use sensor_driver::DriverError;
use stereo_geometry::GeometryError;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logger error types
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid mode combination: {0}")]
    InvalidModes(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Calibration error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image write failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("No {0} backend is available in this build")]
    MissingBackend(&'static str),

    #[error("Thread error: {0}")]
    Thread(String),
}

/// Initialize logging
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}
