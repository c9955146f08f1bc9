//! Shared pipeline state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sensor_driver::{ChannelMode, ImuSample, SensorDriver, StereoFrame};
use shared_queue::SharedQueue;
use stereo_geometry::CalibrationParameters;
use tracing::info;

use crate::config::RunModes;
use crate::persistence::SaveRequest;
use crate::LoggerError;

/// State shared by the driver callbacks and every pipeline thread
pub struct PipelineContext {
    pub stereo_queue: SharedQueue<StereoFrame>,
    pub imu_queue: SharedQueue<ImuSample>,
    pub save_queue: SharedQueue<SaveRequest>,
    run_flag: AtomicBool,
    pub auto_exposure: AtomicBool,
    pub auto_illumination: AtomicBool,
    pub modes: RunModes,
    pub calibration: Option<Arc<CalibrationParameters>>,
    pub driver: Arc<dyn SensorDriver>,
    /// Frame size as delivered, (width, height)
    pub image_size: (u32, u32),
    /// Channel layout every frame of this session must have
    pub channel_mode: ChannelMode,
}

impl PipelineContext {
    /// Build the context for an initialized driver.
    ///
    /// Fails when the resolution cannot be read or disagrees with the
    /// calibration.
    pub fn new(
        modes: RunModes,
        driver: Arc<dyn SensorDriver>,
        calibration: Option<Arc<CalibrationParameters>>,
    ) -> Result<Self, LoggerError> {
        let (width, height) = driver.resolution()?;
        let image_size = if driver.variant().transposes_resolution() {
            (height, width)
        } else {
            (width, height)
        };
        if let Some(calib) = &calibration {
            calib.check_image_size(image_size.0, image_size.1)?;
        }
        let channel_mode = if driver.is_color() {
            ChannelMode::Color
        } else {
            ChannelMode::Mono
        };
        info!(
            "{} sensor {}x{} ({:?})",
            driver.variant(),
            image_size.0,
            image_size.1,
            channel_mode
        );

        Ok(Self {
            stereo_queue: SharedQueue::new(),
            imu_queue: SharedQueue::new(),
            save_queue: SharedQueue::new(),
            run_flag: AtomicBool::new(true),
            auto_exposure: AtomicBool::new(modes.auto_exposure),
            auto_illumination: AtomicBool::new(false),
            modes,
            calibration,
            driver,
            image_size,
            channel_mode,
        })
    }

    pub fn is_running(&self) -> bool {
        self.run_flag.load(Ordering::SeqCst)
    }

    /// Stop accepting data and release every blocked consumer
    pub fn shutdown(&self) {
        if self.run_flag.swap(false, Ordering::SeqCst) {
            info!("Shutting down pipeline");
        }
        self.stereo_queue.kill();
        self.imu_queue.kill();
        self.save_queue.kill();
    }
}
