//! Driver callback adapter
//!
//! Runs on driver-owned threads, so it only moves buffers into the queues.

use std::sync::Arc;

use sensor_driver::{ImuSample, SensorImage, SensorSink, StereoFrame};

use crate::context::PipelineContext;

/// Producer side of the stereo and IMU queues
pub struct CaptureBridge {
    ctx: Arc<PipelineContext>,
}

impl CaptureBridge {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

impl SensorSink for CaptureBridge {
    fn on_stereo_frame(&self, left: SensorImage, right: SensorImage, timestamp: f64) {
        if self.ctx.is_running() {
            self.ctx
                .stereo_queue
                .push_back(StereoFrame::new(left, right, timestamp));
        }
    }

    fn on_imu_sample(&self, sample: ImuSample) {
        if self.ctx.is_running() {
            self.ctx.imu_queue.push_back(sample);
        }
    }
}
