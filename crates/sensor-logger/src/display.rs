//! Display and operator input seams
//!
//! Window toolkits live outside the workspace; the binary ships a
//! [`NullDisplay`] and a line-based [`StdinInput`].

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::geometric_transformations::{warp_with, Interpolation};
use imageproc::stats::histogram;
use stereo_geometry::{CameraModel, Point2};
use tracing::{debug, trace, warn};

use crate::control::Command;

const HISTOGRAM_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const RECTIFY_LINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Row spacing of the rectification lines
const RECTIFY_LINE_SPACING: u32 = 20;

/// Sink for named diagnostic canvases
pub trait Display: Send {
    /// Show `canvas` in the window `name`, with `overlay` lines drawn on top
    fn show(&mut self, name: &str, canvas: &RgbImage, overlay: &[String]);
}

/// Source of operator commands
pub trait InputSource: Send {
    /// Wait up to `timeout` for one command
    fn poll(&mut self, timeout: Duration) -> Option<Command>;
}

/// Discards every canvas
#[derive(Debug, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, name: &str, canvas: &RgbImage, overlay: &[String]) {
        trace!(
            "{} {}x{}: {}",
            name,
            canvas.width(),
            canvas.height(),
            overlay.join(" | ")
        );
    }
}

/// Commands typed on stdin, one per line
pub struct StdinInput {
    rx: Receiver<Command>,
}

impl StdinInput {
    /// Start the reader thread
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdin-input".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("stdin read failed: {}", e);
                            break;
                        }
                    };
                    match Command::parse_line(&line) {
                        Some(command) => {
                            if tx.send(command).is_err() {
                                break;
                            }
                        }
                        None => debug!("Ignoring input {:?}", line),
                    }
                }
            })?;
        Ok(Self { rx })
    }
}

impl InputSource for StdinInput {
    fn poll(&mut self, timeout: Duration) -> Option<Command> {
        match self.rx.recv_timeout(timeout) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

/// Left and right images next to each other
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let height = left.height().max(right.height());
    let mut canvas = RgbImage::new(left.width() + right.width(), height);
    imageops::replace(&mut canvas, left, 0, 0);
    imageops::replace(&mut canvas, right, left.width() as i64, 0);
    canvas
}

/// 256-bin brightness histogram
pub fn brightness_histogram(image: &GrayImage) -> [u32; 256] {
    histogram(image).channels[0]
}

/// Draw `hist` as vertical bars along the bottom of `canvas`
pub fn draw_histogram(hist: &[u32; 256], canvas: &mut RgbImage) {
    let peak = hist.iter().copied().max().unwrap_or(0);
    if peak == 0 || canvas.width() == 0 {
        return;
    }
    let (width, height) = (canvas.width() as f32, canvas.height() as f32);
    let bar_height = height / 4.0;
    for (bin, &count) in hist.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let x = bin as f32 * (width - 1.0) / 255.0;
        let top = height - 1.0 - bar_height * count as f32 / peak as f32;
        draw_line_segment_mut(canvas, (x, height - 1.0), (x, top), HISTOGRAM_COLOR);
    }
}

/// Per-pixel lookup from the undistorted view back into the raw image
pub struct UndistortMap {
    width: u32,
    height: u32,
    sources: Vec<(f32, f32)>,
}

impl UndistortMap {
    pub fn new(model: &CameraModel, width: u32, height: u32) -> Self {
        let sources = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                let normalized = model
                    .intrinsics
                    .pixel_to_normalized(Point2::new(x as f64, y as f64));
                let source = model.distort_point(normalized);
                (source.x as f32, source.y as f32)
            })
            .collect();
        Self {
            width,
            height,
            sources,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Remap `image`; pixels outside the map or the source turn black
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        warp_with(
            image,
            |x, y| {
                let (x, y) = (x as u32, y as u32);
                if x < self.width && y < self.height {
                    self.sources[(y * self.width + x) as usize]
                } else {
                    (-1.0, -1.0)
                }
            },
            Interpolation::Nearest,
            Rgb([0, 0, 0]),
        )
    }
}

/// Green rows every 20 px across `canvas`, starting at row 20
pub fn draw_horizontal_lines(canvas: &mut RgbImage) {
    let right = canvas.width().saturating_sub(1) as f32;
    for row in (RECTIFY_LINE_SPACING..canvas.height()).step_by(RECTIFY_LINE_SPACING as usize) {
        draw_line_segment_mut(canvas, (0.0, row as f32), (right, row as f32), RECTIFY_LINE_COLOR);
    }
}
