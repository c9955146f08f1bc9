//! XP Sensor Logger
//!
//! Usage: `xp-sensor-logger [config-file]`, with `XP_LOGGER_*` environment
//! overrides.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use calib_verify::{FastBriefExtractor, Strategy, Verifier};
use sensor_driver::{SensorConfig, SensorDriver, SyntheticDriver};
use sensor_logger::control::INITIAL_EXPOSURE_INDEX;
use sensor_logger::record::prepare_record_path;
use sensor_logger::{
    init_logging, spawn_pipeline, CaptureBridge, ImuWriter, LoggerConfig, NullDisplay,
    PersistenceWorker, PipelineContext, ProcessingLoop, StdinInput,
};
use stereo_geometry::CalibrationParameters;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = LoggerConfig::load(config_path.as_deref())?;

    init_logging(config.verbose);
    info!("=== XP Sensor Logger v{} ===", env!("CARGO_PKG_VERSION"));

    let mut modes = config.validate()?;
    // Neither a disparity estimator nor a tag detector ships with this build
    modes.require_backends(false, false)?;

    if let Some(path) = modes.record_path.take() {
        modes.record_path = Some(prepare_record_path(&path, modes.manual_trigger)?);
    }

    let calibration = match &modes.calib_file {
        Some(path) => Some(Arc::new(
            CalibrationParameters::load(path)
                .with_context(|| format!("loading calibration {}", path.display()))?,
        )),
        None => None,
    };

    let driver: Arc<dyn SensorDriver> = Arc::new(SyntheticDriver::new(SensorConfig {
        variant: modes.variant,
        dev_id: modes.dev_id.clone(),
        auto_exposure: modes.auto_exposure,
    }));
    driver.init(INITIAL_EXPOSURE_INDEX)?;

    let ctx = Arc::new(PipelineContext::new(modes, driver.clone(), calibration)?);
    let modes = &ctx.modes;

    let mut processing = ProcessingLoop::new(
        ctx.clone(),
        Box::new(NullDisplay),
        Box::new(StdinInput::spawn()?),
    );
    if let (Some(Strategy::Descriptor), Some(calib)) = (modes.verification, &ctx.calibration) {
        processing = processing.with_verifier(Verifier::with_feature_extractor(
            calib.clone(),
            Box::new(FastBriefExtractor::default()),
        ));
    }

    let persistence = match modes.record_path {
        Some(_) => Some(PersistenceWorker::new(ctx.clone(), Box::new(NullDisplay))?),
        None => None,
    };
    let imu = ImuWriter::new(ctx.clone());

    let handle = spawn_pipeline(ctx.clone(), processing, persistence, imu)?;
    driver.run(Arc::new(CaptureBridge::new(ctx.clone())))?;
    info!("Streaming; type 'q' to quit, 'save' to capture");

    let mut joined = tokio::task::spawn_blocking(move || handle.join());
    let stats = tokio::select! {
        result = &mut joined => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            ctx.shutdown();
            joined.await??
        }
    };

    if let Err(e) = driver.stop() {
        error!("Failed to stop driver: {}", e);
    }
    info!(
        "Processed {} frames, saved {}, wrote {} IMU samples",
        stats.processing.frames_processed, stats.frames_saved, stats.imu_samples
    );
    Ok(())
}
