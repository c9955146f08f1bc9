//! Vision primitive seams and the bundled FAST/BRIEF extractor

use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use stereo_geometry::Point2;
use tracing::debug;

use crate::VerifyError;

/// 256-bit binary descriptor
pub type BinaryDescriptor = [u8; 32];

/// Half-size of the BRIEF sampling patch; keypoints closer to the border are dropped
const PATCH_HALF: i32 = 15;

/// Smoothing applied before sampling descriptor pairs
const BRIEF_SIGMA: f32 = 2.0;

/// Seed of the fixed sampling pattern
const PATTERN_SEED: u64 = 0x5eed_b21e_f00d_cafe;

/// Identified fiducial marker corner or center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagDetection {
    pub id: u32,
    pub position: Point2,
}

/// Fiducial marker detector backend
pub trait TagDetector: Send {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<TagDetection>, VerifyError>;
}

/// Detected interest point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub position: Point2,
    pub response: f32,
}

/// Keypoints with their descriptors, index-aligned
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<BinaryDescriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Keypoint detector plus binary descriptor backend
pub trait FeatureExtractor: Send {
    /// Detect up to `max_features` keypoints where `mask` is non-zero and
    /// describe each of them.
    fn extract(
        &mut self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
        max_features: usize,
    ) -> Result<Features, VerifyError>;
}

/// Number of differing bits
pub fn hamming_distance(a: &BinaryDescriptor, b: &BinaryDescriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// FAST-9 corners described with a fixed 256-pair BRIEF pattern
pub struct FastBriefExtractor {
    fast_threshold: u8,
    uniformity_radius: f64,
    pattern: Vec<[(i32, i32); 2]>,
}

impl Default for FastBriefExtractor {
    fn default() -> Self {
        Self::new(15, 5.0)
    }
}

impl FastBriefExtractor {
    /// `uniformity_radius` is the minimum spacing (pixels) between kept
    /// keypoints; stronger responses win.
    pub fn new(fast_threshold: u8, uniformity_radius: f64) -> Self {
        Self {
            fast_threshold,
            uniformity_radius,
            pattern: sampling_pattern(),
        }
    }

    fn describe(&self, smoothed: &GrayImage, x: i32, y: i32) -> BinaryDescriptor {
        let mut descriptor = [0u8; 32];
        for (i, [a, b]) in self.pattern.iter().enumerate() {
            let v1 = smoothed.get_pixel((x + a.0) as u32, (y + a.1) as u32)[0];
            let v2 = smoothed.get_pixel((x + b.0) as u32, (y + b.1) as u32)[0];
            if v1 < v2 {
                descriptor[i / 8] |= 1 << (i % 8);
            }
        }
        descriptor
    }
}

/// Deterministic pattern so descriptors are comparable across runs
fn sampling_pattern() -> Vec<[(i32, i32); 2]> {
    let mut state = PATTERN_SEED;
    let mut next = move || {
        // Knuth MMIX LCG
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((state >> 33) % (2 * PATCH_HALF as u64 + 1)) as i32 - PATCH_HALF
    };
    (0..256)
        .map(|_| [(next(), next()), (next(), next())])
        .collect()
}

impl FeatureExtractor for FastBriefExtractor {
    fn extract(
        &mut self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
        max_features: usize,
    ) -> Result<Features, VerifyError> {
        if let Some(mask) = mask {
            if mask.dimensions() != image.dimensions() {
                return Err(VerifyError::FeatureExtraction(format!(
                    "mask {:?} does not match image {:?}",
                    mask.dimensions(),
                    image.dimensions()
                )));
            }
        }
        let (width, height) = (image.width() as i32, image.height() as i32);

        let mut corners: Vec<_> = corners_fast9(image, self.fast_threshold)
            .into_iter()
            .filter(|c| {
                let (x, y) = (c.x as i32, c.y as i32);
                x > PATCH_HALF
                    && y > PATCH_HALF
                    && x < width - PATCH_HALF - 1
                    && y < height - PATCH_HALF - 1
                    && mask.map_or(true, |m| m.get_pixel(c.x, c.y)[0] > 0)
            })
            .collect();
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));

        let min_sq = self.uniformity_radius * self.uniformity_radius;
        let mut keypoints: Vec<Keypoint> = Vec::with_capacity(max_features);
        for c in corners {
            if keypoints.len() >= max_features {
                break;
            }
            let position = Point2::new(c.x as f64, c.y as f64);
            if keypoints
                .iter()
                .any(|kp| (kp.position - position).norm_squared() < min_sq)
            {
                continue;
            }
            keypoints.push(Keypoint {
                position,
                response: c.score,
            });
        }

        let smoothed = gaussian_blur_f32(image, BRIEF_SIGMA);
        let descriptors = keypoints
            .iter()
            .map(|kp| self.describe(&smoothed, kp.position.x as i32, kp.position.y as i32))
            .collect();
        debug!("Extracted {} keypoints", keypoints.len());

        Ok(Features {
            keypoints,
            descriptors,
        })
    }
}
