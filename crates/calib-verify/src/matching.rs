//! Stereo correspondence building

use stereo_geometry::Point2;

use crate::features::{hamming_distance, BinaryDescriptor, TagDetection};

/// How a correspondence was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Same tag id seen in both images
    TagIdentity(u32),
    /// Mutual nearest neighbors in descriptor space
    CrossChecked,
}

/// One left/right correspondence in raw pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub left: Point2,
    pub right: Point2,
    pub provenance: Provenance,
}

/// Pair each left detection with the first right detection of the same id.
///
/// Returns the matches plus the indices of matched right detections.
pub fn match_tags(left: &[TagDetection], right: &[TagDetection]) -> (Vec<FeatureMatch>, Vec<bool>) {
    let mut right_matched = vec![false; right.len()];
    let mut matches = Vec::with_capacity(left.len().min(right.len()));
    for l in left {
        if let Some(idx) = right.iter().position(|r| r.id == l.id) {
            right_matched[idx] = true;
            matches.push(FeatureMatch {
                left: l.position,
                right: right[idx].position,
                provenance: Provenance::TagIdentity(l.id),
            });
        }
    }
    (matches, right_matched)
}

/// Index of the closest train descriptor for every query descriptor.
///
/// Ties resolve to the lowest index.
fn nearest_neighbors(query: &[BinaryDescriptor], train: &[BinaryDescriptor]) -> Vec<Option<usize>> {
    query
        .iter()
        .map(|q| {
            let mut best: Option<(usize, u32)> = None;
            for (idx, t) in train.iter().enumerate() {
                let distance = hamming_distance(q, t);
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((idx, distance));
                }
            }
            best.map(|(idx, _)| idx)
        })
        .collect()
}

/// Brute-force Hamming matching in both directions, keeping mutual pairs.
///
/// Returns `(left_index, right_index)` pairs in left order.
pub fn cross_check_matches(
    left: &[BinaryDescriptor],
    right: &[BinaryDescriptor],
) -> Vec<(usize, usize)> {
    let forward = nearest_neighbors(left, right);
    let backward = nearest_neighbors(right, left);
    forward
        .iter()
        .enumerate()
        .filter_map(|(l, r)| {
            let r = (*r)?;
            (backward[r] == Some(l)).then_some((l, r))
        })
        .collect()
}
