//! Synthetic test-pattern driver
//!
//! Delivers a scrolling gradient stereo pair and a gravity-aligned IMU stream
//! from its own threads, honoring the same callback contract as the hardware.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::{GrayImage, Luma, Rgb, RgbImage};
use tracing::{debug, info, warn};

use crate::{
    ChannelMode, DriverError, ImuSample, SensorConfig, SensorDriver, SensorImage, SensorSink,
    SensorVariant,
};

/// Exposure table length of the XP family
pub const EXPOSURE_STEPS: i32 = 300;

/// Infrared PWM range of the XPIRL family
pub const ILLUMINATION_STEPS: i32 = 140;

/// Horizontal shift of the right image (pixels)
const PATTERN_DISPARITY: u32 = 8;

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    imu_samples: AtomicU64,
}

struct Running {
    shutdown: Arc<AtomicBool>,
    started: Instant,
    threads: Vec<JoinHandle<()>>,
}

/// Test-pattern driver
pub struct SyntheticDriver {
    config: SensorConfig,
    width: u32,
    height: u32,
    fps: u32,
    imu_hz: u32,
    initialized: AtomicBool,
    exposure_index: Arc<AtomicI32>,
    illumination_index: AtomicI32,
    auto_exposure: AtomicBool,
    auto_illumination: AtomicBool,
    counters: Arc<Counters>,
    running: Mutex<Option<Running>>,
}

impl SyntheticDriver {
    /// Create a 640x480 driver for the configured variant
    pub fn new(config: SensorConfig) -> Self {
        Self::with_resolution(config, 640, 480)
    }

    /// Create a driver with an explicit resolution
    pub fn with_resolution(config: SensorConfig, width: u32, height: u32) -> Self {
        let auto_exposure = config.auto_exposure;
        Self {
            config,
            width,
            height,
            fps: 25,
            imu_hz: 200,
            initialized: AtomicBool::new(false),
            exposure_index: Arc::new(AtomicI32::new(0)),
            illumination_index: AtomicI32::new(0),
            auto_exposure: AtomicBool::new(auto_exposure),
            auto_illumination: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
            running: Mutex::new(None),
        }
    }

    /// Override the frame and IMU rates
    pub fn with_rates(mut self, fps: u32, imu_hz: u32) -> Self {
        self.fps = fps.max(1);
        self.imu_hz = imu_hz.max(1);
        self
    }

    /// Current exposure index (as last commanded)
    pub fn exposure_index(&self) -> i32 {
        self.exposure_index.load(Ordering::SeqCst)
    }

    /// Current illumination index (as last commanded)
    pub fn illumination_index(&self) -> i32 {
        self.illumination_index.load(Ordering::SeqCst)
    }

    fn rate(&self, count: &AtomicU64) -> f32 {
        let guard = match self.running.lock() {
            Ok(guard) => guard,
            Err(_) => return 0.0,
        };
        match guard.as_ref() {
            Some(running) => {
                let secs = running.started.elapsed().as_secs_f32();
                if secs > 0.0 {
                    count.load(Ordering::Relaxed) as f32 / secs
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }
}

/// Render one gradient image; the right view is shifted by a constant disparity
fn render_pattern(
    mode: ChannelMode,
    width: u32,
    height: u32,
    phase: u32,
    shift: u32,
    brightness: u8,
) -> SensorImage {
    let value = |x: u32, y: u32| -> u8 {
        let base = ((x + shift + phase) % 64) * 2 + (y % 32);
        (base as u16 + brightness as u16).min(255) as u8
    };
    match mode {
        ChannelMode::Mono => {
            SensorImage::Mono(GrayImage::from_fn(width, height, |x, y| Luma([value(x, y)])))
        }
        ChannelMode::Color => SensorImage::Color(RgbImage::from_fn(width, height, |x, y| {
            let v = value(x, y);
            Rgb([v, v / 2, 255 - v])
        })),
    }
}

impl SensorDriver for SyntheticDriver {
    fn variant(&self) -> SensorVariant {
        self.config.variant
    }

    fn init(&self, exposure_index: i32) -> Result<(), DriverError> {
        if self.width == 0 || self.height == 0 {
            return Err(DriverError::Init(format!(
                "invalid resolution {}x{}",
                self.width, self.height
            )));
        }
        self.exposure_index
            .store(exposure_index.clamp(0, EXPOSURE_STEPS - 1), Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "Synthetic {} sensor initialized (dev '{}')",
            self.config.variant, self.config.dev_id
        );
        Ok(())
    }

    fn resolution(&self) -> Result<(u32, u32), DriverError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(DriverError::NotInitialized);
        }
        Ok((self.width, self.height))
    }

    fn is_color(&self) -> bool {
        self.config.variant.channel_mode() == ChannelMode::Color
    }

    fn exposure_steps(&self) -> i32 {
        EXPOSURE_STEPS
    }

    fn illumination_steps(&self) -> i32 {
        ILLUMINATION_STEPS
    }

    fn set_exposure_index(&self, index: i32) {
        debug!("Exposure index -> {}", index);
        self.exposure_index.store(index, Ordering::SeqCst);
    }

    fn set_illumination_index(&self, index: i32) {
        debug!("Illumination index -> {}", index);
        self.illumination_index.store(index, Ordering::SeqCst);
    }

    fn set_auto_exposure(&self, enabled: bool) {
        info!("Auto exposure {}", if enabled { "on" } else { "off" });
        self.auto_exposure.store(enabled, Ordering::SeqCst);
    }

    fn set_auto_illumination(&self, enabled: bool) {
        info!("Auto illumination {}", if enabled { "on" } else { "off" });
        self.auto_illumination.store(enabled, Ordering::SeqCst);
    }

    fn capture_rate(&self) -> f32 {
        self.rate(&self.counters.frames)
    }

    fn imu_rate(&self) -> f32 {
        self.rate(&self.counters.imu_samples)
    }

    fn run(&self, sink: Arc<dyn SensorSink>) -> Result<(), DriverError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(DriverError::NotInitialized);
        }
        let mut running = self
            .running
            .lock()
            .map_err(|e| DriverError::Init(format!("Lock error: {}", e)))?;
        if running.is_some() {
            return Err(DriverError::AlreadyRunning);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let started = Instant::now();
        let mut threads = Vec::with_capacity(2);

        // Image thread
        {
            let shutdown = shutdown.clone();
            let sink = sink.clone();
            let counters = self.counters.clone();
            let exposure = self.exposure_index.clone();
            // Transposing variants deliver frames rotated relative to the registers
            let (width, height) = if self.config.variant.transposes_resolution() {
                (self.height, self.width)
            } else {
                (self.width, self.height)
            };
            let mode = self.config.variant.channel_mode();
            let interval = Duration::from_micros(1_000_000 / self.fps as u64);
            let handle = std::thread::Builder::new()
                .name("synthetic-img".into())
                .spawn(move || {
                    let mut phase = 0u32;
                    while !shutdown.load(Ordering::SeqCst) {
                        let brightness =
                            (exposure.load(Ordering::Relaxed).clamp(0, EXPOSURE_STEPS - 1) * 64
                                / EXPOSURE_STEPS) as u8;
                        let left = render_pattern(mode, width, height, phase, 0, brightness);
                        let right = render_pattern(
                            mode,
                            width,
                            height,
                            phase,
                            PATTERN_DISPARITY,
                            brightness,
                        );
                        let ts_100us = started.elapsed().as_micros() as f64 / 100.0;
                        sink.on_stereo_frame(left, right, ts_100us);
                        counters.frames.fetch_add(1, Ordering::Relaxed);
                        phase = phase.wrapping_add(1);
                        std::thread::sleep(interval);
                    }
                    debug!("Synthetic image thread stopped");
                })
                .map_err(|e| DriverError::Init(e.to_string()))?;
            threads.push(handle);
        }

        // IMU thread
        {
            let shutdown = shutdown.clone();
            let counters = self.counters.clone();
            let interval = Duration::from_micros(1_000_000 / self.imu_hz as u64);
            let handle = std::thread::Builder::new()
                .name("synthetic-imu".into())
                .spawn(move || {
                    while !shutdown.load(Ordering::SeqCst) {
                        let ts = (started.elapsed().as_micros() / 100) as u64;
                        sink.on_imu_sample(ImuSample::new(ts, [0.0, 0.0, 9.8], [0.0; 3]));
                        counters.imu_samples.fetch_add(1, Ordering::Relaxed);
                        std::thread::sleep(interval);
                    }
                    debug!("Synthetic IMU thread stopped");
                })
                .map_err(|e| DriverError::Init(e.to_string()))?;
            threads.push(handle);
        }

        *running = Some(Running {
            shutdown,
            started,
            threads,
        });
        info!("Synthetic driver streaming at {} fps / {} Hz IMU", self.fps, self.imu_hz);
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        let running = self
            .running
            .lock()
            .map_err(|e| DriverError::Stop(format!("Lock error: {}", e)))?
            .take();
        let Some(running) = running else {
            return Ok(());
        };
        running.shutdown.store(true, Ordering::SeqCst);
        for handle in running.threads {
            if handle.join().is_err() {
                warn!("Synthetic driver thread panicked");
                return Err(DriverError::Stop("driver thread panicked".into()));
            }
        }
        info!("Synthetic driver stopped");
        Ok(())
    }
}

impl Drop for SyntheticDriver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
