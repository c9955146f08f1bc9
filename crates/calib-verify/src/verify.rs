//! Reprojection-based calibration scoring
//!
//! Matched raw pixels are undistorted, triangulated with the calibrated
//! extrinsics and projected back into the left camera. The squared pixel
//! error against the raw left detection grades each match.

use std::sync::Arc;

use image::GrayImage;
use nalgebra::Matrix3x4;
use stereo_geometry::{triangulate_linear, CalibrationParameters, Point2};
use tracing::debug;

use crate::features::{FeatureExtractor, TagDetector};
use crate::matching::{cross_check_matches, match_tags, FeatureMatch, Provenance};
use crate::VerifyError;

/// Keypoints requested per image in descriptor mode
pub const DESCRIPTOR_FEATURES: usize = 200;

/// Squared error below which a match is tight (1 px)
const TIGHT_SQ_ERR: f64 = 1.0;

/// Squared error below which a match is loose (2 px)
const LOOSE_SQ_ERR: f64 = 4.0;

/// Descriptor mode counts every frame with more tight matches than this as perfect
const DESCRIPTOR_TIGHT_SATURATION: usize = 20;

/// Minimum denominator of the descriptor score
const DESCRIPTOR_MIN_MATCHES: usize = 30;

/// Correspondence strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    TagIdentity,
    Descriptor,
}

/// Reprojection grade of one match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchClass {
    Tight,
    Loose,
    Reject,
    /// Triangulated behind the camera or at infinity; not scored
    Discarded,
}

/// Grade a squared reprojection error
pub fn classify_error(sq_error: f64) -> MatchClass {
    if sq_error < TIGHT_SQ_ERR {
        MatchClass::Tight
    } else if sq_error < LOOSE_SQ_ERR {
        MatchClass::Loose
    } else {
        MatchClass::Reject
    }
}

/// Integer percentage score; `None` without matches
pub fn compute_score(strategy: Strategy, tight: usize, matches: usize) -> Option<u32> {
    if matches == 0 {
        return None;
    }
    let score = match strategy {
        Strategy::TagIdentity => 100 * tight / matches,
        Strategy::Descriptor if tight > DESCRIPTOR_TIGHT_SATURATION => 100,
        Strategy::Descriptor => 100 * tight / matches.max(DESCRIPTOR_MIN_MATCHES),
    };
    Some(score as u32)
}

/// Detection drawn on the overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub position: Point2,
    pub matched: bool,
}

/// Result of reprojecting one correspondence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub matched: FeatureMatch,
    /// Left-camera reprojection of the triangulated point
    pub projection: Option<Point2>,
    pub sq_error: f64,
    pub class: MatchClass,
}

/// Everything one verification pass produced
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub strategy: Strategy,
    pub left_detections: Vec<Detection>,
    pub right_detections: Vec<Detection>,
    pub outcomes: Vec<MatchOutcome>,
    /// Matches under 1 px
    pub tight: usize,
    /// Matches under 2 px, tight ones included
    pub loose: usize,
    pub score: Option<u32>,
}

impl VerificationReport {
    pub fn match_count(&self) -> usize {
        self.outcomes.len()
    }

    /// One-line overlay text
    pub fn summary(&self) -> String {
        match self.score {
            None => "score N/A".to_string(),
            Some(score) => format!(
                "score {} reproj < 1 (2) {}({}) match # {} det {} / {}",
                score,
                self.tight,
                self.loose,
                self.match_count(),
                self.left_detections.len(),
                self.right_detections.len()
            ),
        }
    }
}

enum Backend {
    Tags(Box<dyn TagDetector>),
    Descriptors {
        extractor: Box<dyn FeatureExtractor>,
        masks: [GrayImage; 2],
    },
}

/// Stereo calibration verifier
pub struct Verifier {
    calibration: Arc<CalibrationParameters>,
    projections: [Matrix3x4<f64>; 2],
    backend: Backend,
}

impl Verifier {
    /// Verify by matching fiducial tags on their identity
    pub fn with_tag_detector(
        calibration: Arc<CalibrationParameters>,
        detector: Box<dyn TagDetector>,
    ) -> Self {
        Self {
            projections: calibration.projection_matrices(),
            calibration,
            backend: Backend::Tags(detector),
        }
    }

    /// Verify with cross-checked binary descriptors restricted to each
    /// camera's valid field of view
    pub fn with_feature_extractor(
        calibration: Arc<CalibrationParameters>,
        extractor: Box<dyn FeatureExtractor>,
    ) -> Self {
        let (width, height) = calibration.image_size;
        let (left_mask, left_fov) = calibration.left().valid_mask(width, height);
        let (right_mask, right_fov) = calibration.right().valid_mask(width, height);
        debug!(
            "Valid field of view {:.1} / {:.1} deg",
            left_fov, right_fov
        );
        Self {
            projections: calibration.projection_matrices(),
            calibration,
            backend: Backend::Descriptors {
                extractor,
                masks: [left_mask, right_mask],
            },
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self.backend {
            Backend::Tags(_) => Strategy::TagIdentity,
            Backend::Descriptors { .. } => Strategy::Descriptor,
        }
    }

    /// Detect, match and score one mono stereo pair
    pub fn verify(
        &mut self,
        left: &GrayImage,
        right: &GrayImage,
    ) -> Result<VerificationReport, VerifyError> {
        let strategy = self.strategy();
        let (left_detections, right_detections, matches) = match &mut self.backend {
            Backend::Tags(detector) => {
                let tags_l = detector.detect(left)?;
                let tags_r = detector.detect(right)?;
                let (matches, right_matched) = match_tags(&tags_l, &tags_r);
                let left_detections = tags_l
                    .iter()
                    .map(|t| Detection {
                        position: t.position,
                        matched: tags_r.iter().any(|r| r.id == t.id),
                    })
                    .collect();
                let right_detections = tags_r
                    .iter()
                    .zip(right_matched)
                    .map(|(t, matched)| Detection {
                        position: t.position,
                        matched,
                    })
                    .collect();
                (left_detections, right_detections, matches)
            }
            Backend::Descriptors { extractor, masks } => {
                let feats_l = extractor.extract(left, Some(&masks[0]), DESCRIPTOR_FEATURES)?;
                let feats_r = extractor.extract(right, Some(&masks[1]), DESCRIPTOR_FEATURES)?;
                let pairs = cross_check_matches(&feats_l.descriptors, &feats_r.descriptors);

                let mut matched_l = vec![false; feats_l.len()];
                let mut matched_r = vec![false; feats_r.len()];
                let matches = pairs
                    .iter()
                    .map(|&(l, r)| {
                        matched_l[l] = true;
                        matched_r[r] = true;
                        FeatureMatch {
                            left: feats_l.keypoints[l].position,
                            right: feats_r.keypoints[r].position,
                            provenance: Provenance::CrossChecked,
                        }
                    })
                    .collect();
                let detections = |feats: &crate::Features, matched: Vec<bool>| {
                    feats
                        .keypoints
                        .iter()
                        .zip(matched)
                        .map(|(kp, matched)| Detection {
                            position: kp.position,
                            matched,
                        })
                        .collect::<Vec<_>>()
                };
                (
                    detections(&feats_l, matched_l),
                    detections(&feats_r, matched_r),
                    matches,
                )
            }
        };

        Ok(self.evaluate(strategy, left_detections, right_detections, &matches))
    }

    /// Score already established correspondences
    pub fn evaluate(
        &self,
        strategy: Strategy,
        left_detections: Vec<Detection>,
        right_detections: Vec<Detection>,
        matches: &[FeatureMatch],
    ) -> VerificationReport {
        let left_cam = self.calibration.left();
        let right_cam = self.calibration.right();

        let undistorted: Vec<(Point2, Point2)> = matches
            .iter()
            .map(|m| {
                (
                    left_cam.undistort_point(m.left),
                    right_cam.undistort_point(m.right),
                )
            })
            .collect();
        assert_eq!(undistorted.len(), matches.len(), "match list size mismatch");

        let [p_l, p_r] = &self.projections;
        let mut tight = 0;
        let mut loose = 0;
        let outcomes: Vec<MatchOutcome> = matches
            .iter()
            .zip(&undistorted)
            .map(|(m, &(nl, nr))| {
                let projection = triangulate_linear(p_l, p_r, nl, nr)
                    .ok()
                    .filter(|p| p.z > 0.0)
                    .and_then(|p| left_cam.project(&p));
                let Some(projection) = projection else {
                    return MatchOutcome {
                        matched: *m,
                        projection: None,
                        sq_error: f64::INFINITY,
                        class: MatchClass::Discarded,
                    };
                };
                let sq_error = (projection - m.left).norm_squared();
                let class = classify_error(sq_error);
                match class {
                    MatchClass::Tight => {
                        tight += 1;
                        loose += 1;
                    }
                    MatchClass::Loose => loose += 1,
                    _ => {}
                }
                MatchOutcome {
                    matched: *m,
                    projection: Some(projection),
                    sq_error,
                    class,
                }
            })
            .collect();
        assert_eq!(outcomes.len(), matches.len(), "match list size mismatch");

        let score = compute_score(strategy, tight, matches.len());
        debug!(
            "Verification: {} matches, {} tight, {} loose, score {:?}",
            matches.len(),
            tight,
            loose,
            score
        );

        VerificationReport {
            strategy,
            left_detections,
            right_detections,
            outcomes,
            tight,
            loose,
            score,
        }
    }
}
