//! Calibration Verification
//!
//! Judges an externally supplied stereo calibration against live imagery:
//! - Tag identity or binary-descriptor stereo correspondences
//! - Triangulation and reprojection into the left camera
//! - Tight/loose error classification and a percentage score
//! - Overlay rendering of detections, good matches and rejects
//! - Grid coverage density of accumulated calibration-target detections

pub mod coverage;
pub mod features;
pub mod matching;
pub mod render;
pub mod verify;

pub use coverage::{check_grid_point_density, render_coverage, CoverageReport};
pub use features::{
    hamming_distance, BinaryDescriptor, FastBriefExtractor, FeatureExtractor, Features, Keypoint,
    TagDetection, TagDetector,
};
pub use matching::{cross_check_matches, match_tags, FeatureMatch, Provenance};
pub use render::render_report;
pub use verify::{
    classify_error, compute_score, Detection, MatchClass, MatchOutcome, Strategy,
    VerificationReport, Verifier,
};

use stereo_geometry::GeometryError;
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Tag detection failed: {0}")]
    TagDetection(String),

    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
}
