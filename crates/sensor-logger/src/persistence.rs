//! Frame persistence and calibration-target coverage
//!
//! Writes `l/`, `r/` and `Z/` PNGs under the record directory. In coverage
//! capture mode every saved pair also feeds the accumulated target history.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use calib_verify::coverage::MAX_CAPTURE_FRAMES;
use calib_verify::{
    check_grid_point_density, render_coverage, CoverageReport, TagDetector, VerifyError,
};
use image::{GrayImage, RgbImage};
use sensor_driver::SensorImage;
use stereo_geometry::{depth_millimeters, Point2, PointCloud};
use tracing::{debug, error, info};

use crate::context::PipelineContext;
use crate::display::Display;
use crate::LoggerError;

/// Minimum covered fraction of the valid grid cells
pub const MIN_COVERAGE_RATIO: f32 = 0.4;

const LEFT_DIR: &str = "l";
const RIGHT_DIR: &str = "r";
const DEPTH_DIR: &str = "Z";

/// One frame queued for writing
#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// File stem, see [`frame_name`]
    pub name: String,
    pub left: SensorImage,
    pub right: SensorImage,
    /// Point cloud of the left view, when depth is on
    pub depth: Option<PointCloud>,
}

/// Zero-padded 10-digit file stem of a frame timestamp
pub fn frame_name(timestamp: f64) -> String {
    format!("{:010}", timestamp as u64)
}

/// Write one request below `record_path`
pub fn save_request(record_path: &Path, request: &SaveRequest) -> Result<(), LoggerError> {
    let file = format!("{}.png", request.name);
    request.left.save(record_path.join(LEFT_DIR).join(&file))?;
    request.right.save(record_path.join(RIGHT_DIR).join(&file))?;
    if let Some(cloud) = &request.depth {
        depth_millimeters(cloud).save(record_path.join(DEPTH_DIR).join(&file))?;
    }
    Ok(())
}

/// Coverage canvas for one camera
#[derive(Debug, Clone)]
pub struct CoverageView {
    pub canvas: RgbImage,
    pub report: CoverageReport,
    pub overlay: Vec<String>,
}

/// Accumulated calibration-target detections of both cameras
pub struct CoverageCapture {
    detector: Box<dyn TagDetector>,
    image_size: (u32, u32),
    valid_radius: f64,
    history: [Vec<Vec<Point2>>; 2],
}

impl CoverageCapture {
    pub fn new(detector: Box<dyn TagDetector>, image_size: (u32, u32), valid_radius: f64) -> Self {
        Self {
            detector,
            image_size,
            valid_radius,
            history: [Vec::new(), Vec::new()],
        }
    }

    /// Number of frames accumulated so far
    pub fn frames(&self) -> usize {
        self.history[0].len()
    }

    /// Detect targets in a saved pair and re-check coverage of both cameras
    pub fn update(
        &mut self,
        left: &GrayImage,
        right: &GrayImage,
    ) -> Result<[CoverageView; 2], VerifyError> {
        for (history, image) in self.history.iter_mut().zip([left, right]) {
            let points = self
                .detector
                .detect(image)?
                .into_iter()
                .map(|d| d.position)
                .collect();
            history.push(points);
        }

        let frames = self.frames();
        let center = Point2::new(
            self.image_size.0 as f64 / 2.0,
            self.image_size.1 as f64 / 2.0,
        );
        let view = |history: &[Vec<Point2>]| {
            let report = check_grid_point_density(
                history,
                self.image_size,
                MIN_COVERAGE_RATIO,
                self.valid_radius,
                center,
            );
            let mut canvas = RgbImage::new(self.image_size.0, self.image_size.1);
            render_coverage(history, &report, &mut canvas);
            let mut overlay = vec![format!("img # {}", frames)];
            if frames > MAX_CAPTURE_FRAMES {
                overlay.push("Too many images".to_string());
            }
            overlay.push(report.summary());
            CoverageView {
                canvas,
                report,
                overlay,
            }
        };
        Ok([view(&self.history[0]), view(&self.history[1])])
    }
}

/// Save-queue consumer
pub struct PersistenceWorker {
    ctx: Arc<PipelineContext>,
    record_path: PathBuf,
    display: Box<dyn Display>,
    coverage: Option<CoverageCapture>,
}

impl PersistenceWorker {
    /// Create the output directories for the configured record path
    pub fn new(ctx: Arc<PipelineContext>, display: Box<dyn Display>) -> Result<Self, LoggerError> {
        let record_path = ctx
            .modes
            .record_path
            .clone()
            .ok_or_else(|| LoggerError::InvalidModes("persistence without a record path".into()))?;
        let mut dirs = vec![LEFT_DIR, RIGHT_DIR];
        if ctx.modes.depth {
            dirs.push(DEPTH_DIR);
        }
        for dir in dirs {
            std::fs::create_dir_all(record_path.join(dir))?;
        }
        info!("Recording frames to {}", record_path.display());

        Ok(Self {
            ctx,
            record_path,
            display,
            coverage: None,
        })
    }

    pub fn with_coverage(mut self, coverage: CoverageCapture) -> Self {
        self.coverage = Some(coverage);
        self
    }

    fn update_coverage(&mut self, request: &SaveRequest) -> Result<(), LoggerError> {
        let Some(coverage) = self.coverage.as_mut() else {
            return Ok(());
        };
        let views = coverage.update(&request.left.to_mono(), &request.right.to_mono())?;
        for (name, view) in ["coverage l", "coverage r"].into_iter().zip(views) {
            if self.ctx.modes.headless {
                info!("{}: {}", name, view.overlay.join(", "));
            } else {
                self.display.show(name, &view.canvas, &view.overlay);
            }
        }
        Ok(())
    }

    /// Write requests until the queue is killed; returns the number saved
    pub fn run(mut self) -> u64 {
        let mut saved = 0u64;
        while let Ok(request) = self.ctx.save_queue.wait_and_pop_to_back() {
            if let Err(e) = save_request(&self.record_path, &request) {
                error!("Failed to save frame {}: {}", request.name, e);
                continue;
            }
            saved += 1;
            debug!("Saved frame {}", request.name);

            if let Err(e) = self.update_coverage(&request) {
                error!("Coverage update failed for {}: {}", request.name, e);
            }
        }
        info!("Persistence stopped after {} frames", saved);
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{headless_modes, synthetic_driver};
    use calib_verify::TagDetection;
    use image::Luma;
    use sensor_driver::SensorVariant;
    use std::sync::Mutex;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("xp-logger-persist-{}-{}", tag, std::process::id()))
    }

    fn request(name: &str, depth: Option<PointCloud>) -> SaveRequest {
        SaveRequest {
            name: name.to_string(),
            left: SensorImage::Mono(GrayImage::from_pixel(8, 6, Luma([10]))),
            right: SensorImage::Mono(GrayImage::from_pixel(8, 6, Luma([20]))),
            depth,
        }
    }

    /// Same two detections for every image
    struct CannedTags(Vec<Point2>);

    impl TagDetector for CannedTags {
        fn detect(&mut self, _: &GrayImage) -> Result<Vec<TagDetection>, VerifyError> {
            Ok(self
                .0
                .iter()
                .enumerate()
                .map(|(i, p)| TagDetection {
                    id: i as u32,
                    position: *p,
                })
                .collect())
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(String, Vec<String>)>>>);

    impl Display for Recorder {
        fn show(&mut self, name: &str, _: &RgbImage, overlay: &[String]) {
            self.0.lock().unwrap().push((name.to_string(), overlay.to_vec()));
        }
    }

    #[test]
    fn test_frame_name_padding() {
        assert_eq!(frame_name(100000.0), "0000100000");
        assert_eq!(frame_name(100001.0), "0000100001");
        assert_eq!(frame_name(0.4), "0000000000");
    }

    #[test]
    fn test_save_request_layout() {
        let dir = temp_dir("layout");
        for sub in [LEFT_DIR, RIGHT_DIR, DEPTH_DIR] {
            std::fs::create_dir_all(dir.join(sub)).unwrap();
        }
        let cloud = PointCloud {
            width: 8,
            height: 6,
            points: vec![[0.0, 0.0, 0.5]; 48],
        };
        save_request(&dir, &request("0000000042", Some(cloud))).unwrap();

        let left = image::open(dir.join("l/0000000042.png")).unwrap().to_luma8();
        assert_eq!(*left.get_pixel(0, 0), Luma([10]));
        assert!(dir.join("r/0000000042.png").exists());
        let depth = image::open(dir.join("Z/0000000042.png")).unwrap().to_luma16();
        assert_eq!(*depth.get_pixel(3, 3), Luma([500]));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_worker_drains_and_counts() {
        let dir = temp_dir("worker");
        let mut modes = headless_modes();
        modes.record_path = Some(dir.clone());
        let ctx = Arc::new(
            PipelineContext::new(modes, synthetic_driver(SensorVariant::Xp, 8, 6), None).unwrap(),
        );
        let worker = PersistenceWorker::new(ctx.clone(), Box::new(Recorder::default())).unwrap();
        assert!(dir.join(LEFT_DIR).is_dir());
        assert!(!dir.join(DEPTH_DIR).exists());

        ctx.save_queue.push_back(request("0000000001", None));
        let handle = std::thread::spawn(move || worker.run());
        while !ctx.save_queue.is_empty() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        // Let the in-flight write finish before killing the queue
        std::thread::sleep(std::time::Duration::from_millis(50));
        ctx.shutdown();
        assert_eq!(handle.join().unwrap(), 1);
        assert!(dir.join("l/0000000001.png").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_worker_requires_record_path() {
        let ctx = Arc::new(
            PipelineContext::new(headless_modes(), synthetic_driver(SensorVariant::Xp, 8, 6), None)
                .unwrap(),
        );
        assert!(matches!(
            PersistenceWorker::new(ctx, Box::new(Recorder::default())),
            Err(LoggerError::InvalidModes(_))
        ));
    }

    #[test]
    fn test_coverage_accumulates() {
        let points = vec![Point2::new(300.0, 220.0), Point2::new(340.0, 260.0)];
        let mut capture = CoverageCapture::new(Box::new(CannedTags(points)), (640, 480), 360.0);
        let image = GrayImage::new(640, 480);

        let [left, right] = capture.update(&image, &image).unwrap();
        assert_eq!(capture.frames(), 1);
        assert_eq!(left.overlay[0], "img # 1");
        assert_eq!(left.report.covered_cells, 2);
        assert!(!left.report.sufficient);
        assert_eq!(right.report, left.report);
        assert_eq!(*left.canvas.get_pixel(300, 220), image::Rgb([0, 255, 0]));

        for _ in 0..MAX_CAPTURE_FRAMES {
            capture.update(&image, &image).unwrap();
        }
        let [left, _] = capture.update(&image, &image).unwrap();
        assert_eq!(left.overlay[0], format!("img # {}", MAX_CAPTURE_FRAMES + 2));
        assert_eq!(left.overlay[1], "Too many images");
    }

    #[test]
    fn test_coverage_shown_when_not_headless() {
        let dir = temp_dir("coverage");
        let mut modes = headless_modes();
        modes.headless = false;
        modes.record_path = Some(dir.clone());
        let ctx = Arc::new(
            PipelineContext::new(modes, synthetic_driver(SensorVariant::Xp, 8, 6), None).unwrap(),
        );
        let recorder = Recorder::default();
        let capture = CoverageCapture::new(Box::new(CannedTags(vec![Point2::new(4.0, 3.0)])), (8, 6), 100.0);
        let worker = PersistenceWorker::new(ctx.clone(), Box::new(recorder.clone()))
            .unwrap()
            .with_coverage(capture);

        ctx.save_queue.push_back(request("0000000001", None));
        let handle = std::thread::spawn(move || worker.run());
        while recorder.0.lock().unwrap().len() < 2 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        ctx.shutdown();
        handle.join().unwrap();

        let shown = recorder.0.lock().unwrap();
        assert_eq!(shown[0].0, "coverage l");
        assert_eq!(shown[1].0, "coverage r");
        assert_eq!(shown[0].1[0], "img # 1");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    struct BrokenDetector;

    impl TagDetector for BrokenDetector {
        fn detect(&mut self, _: &GrayImage) -> Result<Vec<TagDetection>, VerifyError> {
            Err(VerifyError::TagDetection("camera cover on".into()))
        }
    }

    #[test]
    fn test_coverage_failure_still_saves() {
        let dir = temp_dir("broken");
        let mut modes = headless_modes();
        modes.record_path = Some(dir.clone());
        let ctx = Arc::new(
            PipelineContext::new(modes, synthetic_driver(SensorVariant::Xp, 8, 6), None).unwrap(),
        );
        let mut worker = PersistenceWorker::new(ctx.clone(), Box::new(Recorder::default()))
            .unwrap()
            .with_coverage(CoverageCapture::new(Box::new(BrokenDetector), (8, 6), 100.0));

        let req = request("0000000003", None);
        assert!(matches!(
            worker.update_coverage(&req),
            Err(LoggerError::Verify(VerifyError::TagDetection(_)))
        ));

        ctx.save_queue.push_back(req);
        let handle = std::thread::spawn(move || worker.run());
        wait_for_file(&dir.join("l/0000000003.png"));
        std::thread::sleep(std::time::Duration::from_millis(50));
        ctx.shutdown();
        assert_eq!(handle.join().unwrap(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    fn wait_for_file(path: &Path) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !path.exists() {
            assert!(std::time::Instant::now() < deadline, "timed out");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}
