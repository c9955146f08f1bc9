//! IMU log writer

use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use sensor_driver::ImuSample;
use tracing::{error, info, warn};

use crate::context::PipelineContext;

/// IMU log file name inside the record directory
pub const IMU_FILE: &str = "imu_data.txt";

/// Written when the sensor reports no temperature
const NO_TEMPERATURE: f32 = 999.0;

/// `ts ax ay az gx gy gz temperature`
pub fn format_imu_line(sample: &ImuSample) -> String {
    let [ax, ay, az] = sample.accel;
    let [gx, gy, gz] = sample.angular_velocity;
    format!(
        "{} {} {} {} {} {} {} {}",
        sample.timestamp,
        ax,
        ay,
        az,
        gx,
        gy,
        gz,
        sample.temperature.unwrap_or(NO_TEMPERATURE)
    )
}

/// Drains the IMU queue in arrival order
pub struct ImuWriter {
    ctx: Arc<PipelineContext>,
    path: Option<PathBuf>,
}

impl ImuWriter {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let path = ctx.modes.record_path.as_ref().map(|dir| dir.join(IMU_FILE));
        Self { ctx, path }
    }

    /// Consume samples until the queue is killed; returns the number written
    pub fn run(self) -> u64 {
        let mut out = self.path.as_ref().and_then(|path| match File::create(path) {
            Ok(file) => {
                info!("Writing IMU samples to {}", path.display());
                Some(LineWriter::new(file))
            }
            Err(e) => {
                error!("Failed to open {}: {}", path.display(), e);
                None
            }
        });

        let mut written = 0u64;
        while let Ok(sample) = self.ctx.imu_queue.wait_and_pop_front() {
            let Some(writer) = out.as_mut() else {
                continue;
            };
            match writeln!(writer, "{}", format_imu_line(&sample)) {
                Ok(()) => {
                    written += 1;
                    metrics::counter!("logger_imu_samples_written_total").increment(1);
                }
                Err(e) => {
                    warn!("IMU write failed, closing log: {}", e);
                    out = None;
                }
            }
        }

        if let Some(mut writer) = out {
            if let Err(e) = writer.flush() {
                warn!("IMU log flush failed: {}", e);
            }
        }
        info!("IMU writer stopped after {} samples", written);
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{headless_modes, synthetic_driver};
    use sensor_driver::SensorVariant;

    fn context(record_path: Option<PathBuf>) -> Arc<PipelineContext> {
        let mut modes = headless_modes();
        modes.record_path = record_path;
        Arc::new(
            PipelineContext::new(modes, synthetic_driver(SensorVariant::Xp, 8, 8), None).unwrap(),
        )
    }

    #[test]
    fn test_imu_line_format() {
        let sample = ImuSample::new(12345, [0.0, 0.0, 9.8], [0.0, 0.0, 0.0]);
        assert_eq!(format_imu_line(&sample), "12345 0 0 9.8 0 0 0 999");

        let warm = ImuSample {
            temperature: Some(36.5),
            ..ImuSample::new(7, [0.25, -1.0, 9.81], [0.5, 0.0, -0.125])
        };
        assert_eq!(format_imu_line(&warm), "7 0.25 -1 9.81 0.5 0 -0.125 36.5");
    }

    #[test]
    fn test_writes_in_arrival_order() {
        let dir = std::env::temp_dir().join(format!("xp-logger-imu-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = context(Some(dir.clone()));
        for ts in [3u64, 1, 2] {
            ctx.imu_queue.push_back(ImuSample::new(ts, [0.0, 0.0, 9.8], [0.0; 3]));
        }
        let writer = ImuWriter::new(ctx.clone());
        let handle = std::thread::spawn(move || writer.run());
        while !ctx.imu_queue.is_empty() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        ctx.shutdown();
        assert_eq!(handle.join().unwrap(), 3);

        let content = std::fs::read_to_string(dir.join(IMU_FILE)).unwrap();
        let stamps: Vec<&str> = content
            .lines()
            .map(|l| l.split(' ').next().unwrap())
            .collect();
        assert_eq!(stamps, ["3", "1", "2"]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_drains_without_record_path() {
        let ctx = context(None);
        ctx.imu_queue.push_back(ImuSample::new(1, [0.0; 3], [0.0; 3]));
        let writer = ImuWriter::new(ctx.clone());
        let handle = std::thread::spawn(move || writer.run());
        while !ctx.imu_queue.is_empty() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        ctx.shutdown();
        assert_eq!(handle.join().unwrap(), 0);
    }
}
