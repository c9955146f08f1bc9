//! Pipeline thread orchestration

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::info;

use crate::context::PipelineContext;
use crate::imu_writer::ImuWriter;
use crate::persistence::PersistenceWorker;
use crate::processing::{LoopStats, ProcessingLoop};
use crate::LoggerError;

/// Totals of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub processing: LoopStats,
    pub frames_saved: u64,
    pub imu_samples: u64,
}

/// Running pipeline threads
pub struct PipelineHandle {
    ctx: Arc<PipelineContext>,
    processing: JoinHandle<LoopStats>,
    persistence: Option<JoinHandle<u64>>,
    imu: JoinHandle<u64>,
}

fn spawn_named<T, F>(name: &str, f: F) -> Result<JoinHandle<T>, LoggerError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| LoggerError::Thread(format!("failed to spawn {}: {}", name, e)))
}

/// Start the processing, persistence and IMU threads
pub fn spawn_pipeline(
    ctx: Arc<PipelineContext>,
    processing: ProcessingLoop,
    persistence: Option<PersistenceWorker>,
    imu: ImuWriter,
) -> Result<PipelineHandle, LoggerError> {
    let imu = spawn_named("imu-writer", move || imu.run())?;
    let persistence = persistence
        .map(|worker| spawn_named("save-img", move || worker.run()))
        .transpose()?;
    let processing = spawn_named("proc-img", move || processing.run())?;
    info!("Pipeline threads started");

    Ok(PipelineHandle {
        ctx,
        processing,
        persistence,
        imu,
    })
}

impl PipelineHandle {
    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Wait for the processing loop, then stop and join the writers
    pub fn join(self) -> Result<PipelineStats, LoggerError> {
        let processing = self.processing.join();
        // The writers only stop once their queues are killed
        self.ctx.shutdown();
        let frames_saved = match self.persistence {
            Some(handle) => handle
                .join()
                .map_err(|_| LoggerError::Thread("persistence thread panicked".into()))?,
            None => 0,
        };
        let imu_samples = self
            .imu
            .join()
            .map_err(|_| LoggerError::Thread("IMU writer thread panicked".into()))?;
        let processing =
            processing.map_err(|_| LoggerError::Thread("processing thread panicked".into()))?;

        Ok(PipelineStats {
            processing,
            frames_saved,
            imu_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CaptureBridge;
    use crate::context::tests::{headless_modes, synthetic_driver};
    use crate::display::{InputSource, NullDisplay};
    use crate::control::Command;
    use crate::imu_writer::IMU_FILE;
    use sensor_driver::SensorVariant;
    use std::time::Duration;

    struct NoInput;

    impl InputSource for NoInput {
        fn poll(&mut self, timeout: Duration) -> Option<Command> {
            std::thread::sleep(timeout);
            None
        }
    }

    fn record_context(tag: &str) -> (Arc<PipelineContext>, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("xp-logger-pipeline-{}-{}", tag, std::process::id()));
        let mut modes = headless_modes();
        modes.record_path = Some(dir.clone());
        let ctx = Arc::new(
            PipelineContext::new(modes, synthetic_driver(SensorVariant::Xp, 64, 48), None).unwrap(),
        );
        (ctx, dir)
    }

    fn start(ctx: &Arc<PipelineContext>) -> PipelineHandle {
        let processing = ProcessingLoop::new(ctx.clone(), Box::new(NullDisplay), Box::new(NoInput));
        let persistence = PersistenceWorker::new(ctx.clone(), Box::new(NullDisplay)).unwrap();
        let imu = ImuWriter::new(ctx.clone());
        spawn_pipeline(ctx.clone(), processing, Some(persistence), imu).unwrap()
    }

    #[test]
    fn test_records_synthetic_stream() {
        let (ctx, dir) = record_context("sync");
        let handle = start(&ctx);
        ctx.driver.run(Arc::new(CaptureBridge::new(ctx.clone()))).unwrap();

        std::thread::sleep(Duration::from_millis(300));
        ctx.shutdown();
        ctx.driver.stop().unwrap();
        let stats = handle.join().unwrap();

        assert!(stats.processing.frames_processed > 0);
        assert!(stats.frames_saved > 0);
        assert!(stats.imu_samples > 0);

        let saved = std::fs::read_dir(dir.join("l")).unwrap().count();
        assert_eq!(saved as u64, stats.frames_saved);
        let imu_lines = std::fs::read_to_string(dir.join(IMU_FILE)).unwrap().lines().count();
        assert_eq!(imu_lines as u64, stats.imu_samples);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_join_from_blocking_task() {
        let (ctx, dir) = record_context("tokio");
        let handle = start(&ctx);
        assert!(Arc::ptr_eq(handle.context(), &ctx));

        let joined = tokio::task::spawn_blocking(move || handle.join());
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.shutdown();
        let stats = joined.await.unwrap().unwrap();
        assert_eq!(stats, PipelineStats::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
