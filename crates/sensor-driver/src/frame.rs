//! Stereo frame types and channel normalization

use image::{DynamicImage, GrayImage, ImageResult, RgbImage};
use std::path::Path;

/// Channel layout of a session, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Single-channel 8-bit
    Mono,
    /// Three-channel 8-bit RGB
    Color,
}

/// One camera image as handed over by the driver
#[derive(Debug, Clone)]
pub enum SensorImage {
    Mono(GrayImage),
    Color(RgbImage),
}

impl SensorImage {
    /// Channel layout of this image
    pub fn channel_mode(&self) -> ChannelMode {
        match self {
            SensorImage::Mono(_) => ChannelMode::Mono,
            SensorImage::Color(_) => ChannelMode::Color,
        }
    }

    /// Image size as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            SensorImage::Mono(img) => img.dimensions(),
            SensorImage::Color(img) => img.dimensions(),
        }
    }

    /// Single-channel copy (luminance for color images)
    pub fn to_mono(&self) -> GrayImage {
        match self {
            SensorImage::Mono(img) => img.clone(),
            SensorImage::Color(img) => image::imageops::grayscale(img),
        }
    }

    /// Three-channel copy (gray replicated for mono images)
    pub fn to_color(&self) -> RgbImage {
        match self {
            SensorImage::Mono(img) => DynamicImage::ImageLuma8(img.clone()).to_rgb8(),
            SensorImage::Color(img) => img.clone(),
        }
    }

    /// Write the image; format is chosen from the extension
    pub fn save(&self, path: impl AsRef<Path>) -> ImageResult<()> {
        match self {
            SensorImage::Mono(img) => img.save(path),
            SensorImage::Color(img) => img.save(path),
        }
    }
}

/// Synchronized left/right pair
#[derive(Debug, Clone)]
pub struct StereoFrame {
    pub left: SensorImage,
    pub right: SensorImage,
    /// Hardware tick counter, 100 µs units
    pub timestamp: f64,
}

impl StereoFrame {
    /// Create a new stereo frame
    pub fn new(left: SensorImage, right: SensorImage, timestamp: f64) -> Self {
        Self {
            left,
            right,
            timestamp,
        }
    }

    /// Timestamp in seconds
    pub fn seconds(&self) -> f64 {
        self.timestamp * 1e-4
    }
}
