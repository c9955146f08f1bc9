//! Verification overlay drawing

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use stereo_geometry::Point2;

use crate::verify::{Detection, MatchClass, Strategy, VerificationReport};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Descriptor rejects at least this far off (squared px) are assumed false matches
const OUTLIER_SQ_ERR: f64 = 900.0;

fn to_i32(p: Point2) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

fn draw_detections(canvas: &mut RgbImage, detections: &[Detection]) {
    for det in detections {
        let color = if det.matched { YELLOW } else { WHITE };
        draw_hollow_circle_mut(canvas, to_i32(det.position), 2, color);
    }
}

/// Draw detections on both canvases and match grades on the left one.
///
/// Tight matches get a green ring; rejects a red line from the reprojection
/// to the detection.
pub fn render_report(report: &VerificationReport, left: &mut RgbImage, right: &mut RgbImage) {
    draw_detections(left, &report.left_detections);
    draw_detections(right, &report.right_detections);

    for outcome in &report.outcomes {
        let Some(projection) = outcome.projection else {
            continue;
        };
        match outcome.class {
            MatchClass::Tight => {
                draw_hollow_circle_mut(left, to_i32(outcome.matched.left), 5, GREEN);
            }
            MatchClass::Reject => {
                let visible = report.strategy == Strategy::TagIdentity
                    || outcome.sq_error < OUTLIER_SQ_ERR;
                if visible {
                    draw_line_segment_mut(
                        left,
                        (projection.x as f32, projection.y as f32),
                        (outcome.matched.left.x as f32, outcome.matched.left.y as f32),
                        RED,
                    );
                }
            }
            MatchClass::Loose | MatchClass::Discarded => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{FeatureMatch, Provenance};
    use crate::verify::MatchOutcome;

    fn outcome(left: Point2, projection: Point2, class: MatchClass) -> MatchOutcome {
        MatchOutcome {
            matched: FeatureMatch {
                left,
                right: left,
                provenance: Provenance::CrossChecked,
            },
            projection: Some(projection),
            sq_error: (projection - left).norm_squared(),
            class,
        }
    }

    fn report(strategy: Strategy, outcomes: Vec<MatchOutcome>) -> VerificationReport {
        VerificationReport {
            strategy,
            left_detections: vec![
                Detection {
                    position: Point2::new(10.0, 10.0),
                    matched: false,
                },
                Detection {
                    position: Point2::new(30.0, 10.0),
                    matched: true,
                },
            ],
            right_detections: vec![],
            outcomes,
            tight: 0,
            loose: 0,
            score: None,
        }
    }

    #[test]
    fn test_detection_colors() {
        let mut left = RgbImage::new(64, 64);
        let mut right = RgbImage::new(64, 64);
        render_report(&report(Strategy::Descriptor, vec![]), &mut left, &mut right);
        assert_eq!(*left.get_pixel(12, 10), WHITE);
        assert_eq!(*left.get_pixel(32, 10), YELLOW);
        assert!(right.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_far_descriptor_rejects_hidden() {
        let far = outcome(Point2::new(5.0, 40.0), Point2::new(55.0, 40.0), MatchClass::Reject);
        let near = outcome(Point2::new(5.0, 50.0), Point2::new(15.0, 50.0), MatchClass::Reject);

        let mut left = RgbImage::new(64, 64);
        let mut right = RgbImage::new(64, 64);
        render_report(
            &report(Strategy::Descriptor, vec![far, near]),
            &mut left,
            &mut right,
        );
        assert_eq!(*left.get_pixel(30, 40), Rgb([0, 0, 0]));
        assert_eq!(*left.get_pixel(10, 50), RED);

        let mut left = RgbImage::new(64, 64);
        render_report(&report(Strategy::TagIdentity, vec![far]), &mut left, &mut right);
        assert_eq!(*left.get_pixel(30, 40), RED);
    }

    #[test]
    fn test_tight_ring() {
        let tight = outcome(Point2::new(32.0, 32.0), Point2::new(32.2, 32.0), MatchClass::Tight);
        let mut left = RgbImage::new(64, 64);
        let mut right = RgbImage::new(64, 64);
        render_report(&report(Strategy::Descriptor, vec![tight]), &mut left, &mut right);
        assert_eq!(*left.get_pixel(37, 32), GREEN);
    }
}
