//! Stereo processing loop
//!
//! Consumes stereo frames, reacts to operator commands, runs calibration
//! verification and depth, renders diagnostics and hands frames to the
//! persistence thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use calib_verify::{render_report, Verifier};
use image::RgbImage;
use sensor_driver::StereoFrame;
use stereo_geometry::depth::{FAR_CUT, NEAR_CUT};
use stereo_geometry::{clip_point_cloud, depth_canvas, disparity_to_points, DisparityEstimator};
use tracing::{debug, error, info, warn};

use crate::context::PipelineContext;
use crate::control::{Command, ExposureControl};
use crate::display::{
    brightness_histogram, draw_histogram, draw_horizontal_lines, side_by_side, Display,
    InputSource, UndistortMap,
};
use crate::persistence::{frame_name, SaveRequest};

/// Pending frames above which the loop drains to the newest
pub const OVERLOAD_THRESHOLD: usize = 10;

/// Frames per processing-rate measurement
const RATE_WINDOW: u64 = 10;

/// How long each iteration waits for an operator command
const INPUT_TIMEOUT: Duration = Duration::from_millis(10);

const HISTOGRAM_SIZE: (u32, u32) = (256, 100);

/// Outcome of a processing run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub frames_processed: u64,
    /// Timestamp of the last processed frame (100 µs ticks)
    pub last_timestamp: Option<f64>,
}

/// Stereo-queue consumer
pub struct ProcessingLoop {
    ctx: Arc<PipelineContext>,
    display: Box<dyn Display>,
    input: Box<dyn InputSource>,
    control: ExposureControl,
    verifier: Option<Verifier>,
    disparity: Option<Box<dyn DisparityEstimator>>,
    /// Left and right maps, built once when rectification lines are on
    undistort: Option<[UndistortMap; 2]>,
}

impl ProcessingLoop {
    pub fn new(
        ctx: Arc<PipelineContext>,
        display: Box<dyn Display>,
        input: Box<dyn InputSource>,
    ) -> Self {
        let control = ExposureControl::new(ctx.driver.clone());
        let undistort = match ctx.calibration.as_ref() {
            Some(calib) if ctx.modes.horizontal_line && !ctx.modes.headless => {
                let (width, height) = calib.image_size;
                Some([
                    UndistortMap::new(calib.left(), width, height),
                    UndistortMap::new(calib.right(), width, height),
                ])
            }
            _ => None,
        };
        Self {
            ctx,
            display,
            input,
            control,
            verifier: None,
            disparity: None,
            undistort,
        }
    }

    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_disparity_estimator(mut self, estimator: Box<dyn DisparityEstimator>) -> Self {
        self.disparity = Some(estimator);
        self
    }

    /// Process frames until the stereo queue is killed or the operator quits
    pub fn run(mut self) -> LoopStats {
        let ctx = self.ctx.clone();
        let modes = &ctx.modes;
        let mut stats = LoopStats::default();
        let mut rate_hz = 0.0f32;
        let mut window_start = Instant::now();

        info!("Processing loop started");
        loop {
            let overloaded = ctx.stereo_queue.size() > OVERLOAD_THRESHOLD;
            let popped = if modes.verification.is_some() || overloaded {
                ctx.stereo_queue.wait_and_pop_to_back_counted().map(|(frame, shed)| {
                    if shed > 0 {
                        metrics::counter!("logger_frames_shed_total").increment(shed as u64);
                        if overloaded && !modes.depth {
                            error!("Processing too slow, dropped {} frames", shed);
                        }
                    }
                    frame
                })
            } else {
                ctx.stereo_queue.wait_and_pop_front()
            };
            let Ok(frame) = popped else {
                break;
            };

            if stats.frames_processed > 0 && stats.frames_processed % RATE_WINDOW == 0 {
                let elapsed_ms = window_start.elapsed().as_millis() as u64;
                if elapsed_ms > 0 {
                    rate_hz = (RATE_WINDOW * 1000 / elapsed_ms) as f32;
                    metrics::gauge!("logger_processing_rate_hz").set(rate_hz as f64);
                }
                window_start = Instant::now();
            }

            assert_eq!(
                frame.left.channel_mode(),
                ctx.channel_mode,
                "left frame channel layout changed mid-session"
            );
            assert_eq!(
                frame.right.channel_mode(),
                ctx.channel_mode,
                "right frame channel layout changed mid-session"
            );
            let left_mono = frame.left.to_mono();
            let right_mono = frame.right.to_mono();

            let mut save_now = false;
            if let Some(command) = self.input.poll(INPUT_TIMEOUT) {
                match command {
                    Command::Quit => {
                        info!("Quit requested");
                        ctx.shutdown();
                        break;
                    }
                    Command::Save => {
                        if modes.record_path.is_some() {
                            save_now = true;
                        } else {
                            warn!("Save requested without a record path");
                        }
                    }
                    other => {
                        if let Err(e) = self.control.apply(
                            other,
                            &ctx.auto_exposure,
                            &ctx.auto_illumination,
                        ) {
                            warn!("{}", e);
                        }
                    }
                }
            }
            let persist = modes.record_path.is_some() && (!modes.manual_trigger || save_now);

            let mut canvases = (!modes.headless).then(|| {
                let (left, right) = (frame.left.to_color(), frame.right.to_color());
                match &self.undistort {
                    Some([map_l, map_r]) => (map_l.apply(&left), map_r.apply(&right)),
                    None => (left, right),
                }
            });
            let mut overlay = Vec::new();

            if let Some(verifier) = self.verifier.as_mut() {
                match verifier.verify(&left_mono, &right_mono) {
                    Ok(report) => {
                        if let Some((left, right)) = canvases.as_mut() {
                            render_report(&report, left, right);
                            overlay.push(report.summary());
                        } else {
                            info!("{}", report.summary());
                        }
                    }
                    Err(e) => warn!("Verification failed: {}", e),
                }
            }

            if modes.show_hist && !modes.headless {
                let mut hist_l = RgbImage::new(HISTOGRAM_SIZE.0, HISTOGRAM_SIZE.1);
                let mut hist_r = RgbImage::new(HISTOGRAM_SIZE.0, HISTOGRAM_SIZE.1);
                draw_histogram(&brightness_histogram(&left_mono), &mut hist_l);
                draw_histogram(&brightness_histogram(&right_mono), &mut hist_r);
                self.display
                    .show("histogram", &side_by_side(&hist_l, &hist_r), &[]);
            }

            let mut depth = None;
            if let (Some(estimator), Some(calib)) = (self.disparity.as_mut(), ctx.calibration.as_ref()) {
                match estimator.compute(&left_mono, &right_mono) {
                    Ok(disparity) => {
                        assert_eq!(
                            disparity.dimensions(),
                            left_mono.dimensions(),
                            "disparity map size differs from the input"
                        );
                        if !modes.headless {
                            self.display.show("depth_canvas", &depth_canvas(&disparity), &[]);
                        }
                        if persist || modes.viz3d {
                            let cloud = disparity_to_points(&disparity, &calib.reprojection);
                            if modes.viz3d && !modes.headless {
                                let (_, colors) = clip_point_cloud(&cloud, NEAR_CUT, FAR_CUT);
                                self.display.show("depth cloud", &colors, &[]);
                            }
                            if persist {
                                depth = Some(cloud);
                            }
                        }
                    }
                    Err(e) => warn!("Disparity failed for frame {}: {}", frame.timestamp, e),
                }
            }

            let status = format!(
                "img {:4.1} Hz imu {:5.1} Hz proc {:4.1} Hz time {:.2} sec",
                ctx.driver.capture_rate(),
                ctx.driver.imu_rate(),
                rate_hz,
                frame.seconds()
            );
            match canvases {
                Some((left, right)) => {
                    overlay.insert(0, status);
                    let mut canvas = side_by_side(&left, &right);
                    if self.undistort.is_some() {
                        draw_horizontal_lines(&mut canvas);
                    }
                    self.display.show("img_lr", &canvas, &overlay);
                }
                None => info!("{}", status),
            }

            let StereoFrame {
                left,
                right,
                timestamp,
            } = frame;
            if persist {
                ctx.save_queue.push_back(SaveRequest {
                    name: frame_name(timestamp),
                    left,
                    right,
                    depth,
                });
            }

            stats.frames_processed += 1;
            stats.last_timestamp = Some(timestamp);
            metrics::counter!("logger_frames_processed_total").increment(1);
            debug!("Processed frame {}", timestamp);
            std::thread::sleep(Duration::from_millis(1));
        }

        info!(
            "Processing loop stopped after {} frames",
            stats.frames_processed
        );
        stats
    }
}
