//! Feature matching collaborators and the lapjv-based descriptor matcher.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::track::{Descriptor, Feature, FrameId, TrackId, TrackSet};

/// Index correspondences between two feature sets.
///
/// Each pair is `(index into set a, index into set b)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    matches: Vec<(usize, usize)>,
}

impl MatchSet {
    pub fn new(matches: Vec<(usize, usize)>) -> Self {
        Self { matches }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn matches(&self) -> &[(usize, usize)] {
        &self.matches
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (usize, usize)> {
        self.matches.iter()
    }
}

impl FromIterator<(usize, usize)> for MatchSet {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Matches two sets of features with their descriptors.
///
/// `features_x[i]` and `descriptors_x[i]` describe the same observation.
/// Implementations must be deterministic for a given input.
pub trait MatchFeatures {
    fn match_features(
        &self,
        features_a: &[Feature],
        descriptors_a: &[Descriptor],
        features_b: &[Feature],
        descriptors_b: &[Descriptor],
    ) -> MatchSet;
}

/// Solve a rectangular assignment problem, rejecting pairs costing more than
/// `thresh`.
///
/// Returns `(row, col)` pairs ordered by row.
pub fn linear_assignment(cost_matrix: &Array2<f64>, thresh: f64) -> Vec<(usize, usize)> {
    let (num_rows, num_cols) = cost_matrix.dim();
    if num_rows == 0 || num_cols == 0 {
        return vec![];
    }

    // lapjv wants a square matrix; dummy rows and columns are never worth taking
    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    padded
        .slice_mut(ndarray::s![..num_rows, ..num_cols])
        .assign(cost_matrix);

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => row_to_col
            .iter()
            .enumerate()
            .take(num_rows)
            .filter(|&(row, &col)| col < num_cols && cost_matrix[[row, col]] <= thresh)
            .map(|(row, &col)| (row, col))
            .collect(),
        Err(_) => {
            tracing::warn!(num_rows, num_cols, "linear assignment failed");
            vec![]
        }
    }
}

/// Pairwise Hamming distances between two descriptor sets.
pub fn hamming_distance_matrix(a: &[Descriptor], b: &[Descriptor]) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| {
        a[i].hamming_distance(&b[j]) as f64
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorMatcherConfig {
    /// Largest Hamming distance accepted for a match, in bits
    pub max_hamming_distance: u32,
}

impl Default for DescriptorMatcherConfig {
    fn default() -> Self {
        Self {
            max_hamming_distance: 64,
        }
    }
}

/// One-to-one descriptor matcher minimizing total Hamming distance.
#[derive(Debug, Clone, Default)]
pub struct DescriptorMatcher {
    config: DescriptorMatcherConfig,
}

impl DescriptorMatcher {
    pub fn new(config: DescriptorMatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DescriptorMatcherConfig {
        &self.config
    }
}

impl MatchFeatures for DescriptorMatcher {
    fn match_features(
        &self,
        _features_a: &[Feature],
        descriptors_a: &[Descriptor],
        _features_b: &[Feature],
        descriptors_b: &[Descriptor],
    ) -> MatchSet {
        let cost = hamming_distance_matrix(descriptors_a, descriptors_b);
        let matches = linear_assignment(&cost, self.config.max_hamming_distance as f64);
        tracing::trace!(
            a = descriptors_a.len(),
            b = descriptors_b.len(),
            matched = matches.len(),
            "matched descriptors"
        );
        MatchSet::new(matches)
    }
}

/// Match the observations on two frames and translate the matches into track
/// pairs `(track on current_frame, track on target_frame)`.
///
/// Pairs whose two sides already belong to the same track are dropped.
pub fn match_tracks(
    matcher: &dyn MatchFeatures,
    tracks: &TrackSet,
    current_frame: FrameId,
    target_frame: FrameId,
) -> Vec<(TrackId, TrackId)> {
    let current = tracks.frame_observations(current_frame);
    let target = tracks.frame_observations(target_frame);
    if current.is_empty() || target.is_empty() {
        return Vec::new();
    }
    let matches = matcher.match_features(
        &current.features,
        &current.descriptors,
        &target.features,
        &target.descriptors,
    );
    matches
        .iter()
        .filter_map(|&(i, j)| Some((*current.track_ids.get(i)?, *target.track_ids.get(j)?)))
        .filter(|(a, b)| a != b)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{Track, TrackState};

    fn desc(byte: u8) -> Descriptor {
        Descriptor::new(vec![byte, byte])
    }

    #[test]
    fn test_linear_assignment_rectangular() {
        let cost = ndarray::array![[0.1, 0.9, 0.5], [0.8, 0.2, 0.4]];
        assert_eq!(linear_assignment(&cost, 0.3), vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_linear_assignment_threshold() {
        let cost = ndarray::array![[0.1, 0.9], [0.9, 0.8]];
        assert_eq!(linear_assignment(&cost, 0.5), vec![(0, 0)]);
    }

    #[test]
    fn test_linear_assignment_empty() {
        let cost = Array2::<f64>::zeros((0, 3));
        assert!(linear_assignment(&cost, 1.0).is_empty());
    }

    #[test]
    fn test_descriptor_matcher() {
        let matcher = DescriptorMatcher::new(DescriptorMatcherConfig {
            max_hamming_distance: 2,
        });
        let a = [desc(0b0000_1111), desc(0b1111_0000), desc(0b1010_1010)];
        let b = [desc(0b1111_0001), desc(0b0000_1111)];
        let feats_a = vec![Feature::new(0.0, 0.0); a.len()];
        let feats_b = vec![Feature::new(0.0, 0.0); b.len()];
        let matches = matcher.match_features(&feats_a, &a, &feats_b, &b);
        assert_eq!(matches.matches(), &[(0, 1), (1, 0)]);
    }

    #[test]
    fn test_match_tracks_maps_to_track_ids() {
        let state = |frame, byte| {
            TrackState::with_feature(frame, Feature::new(0.0, 0.0), Some(desc(byte)))
        };
        let tracks = TrackSet::from_tracks([
            Track::from_states(10, vec![state(1, 0x0f)]).unwrap(),
            Track::from_states(11, vec![state(1, 0xf0)]).unwrap(),
            Track::from_states(20, vec![state(5, 0xf0)]).unwrap(),
            Track::from_states(21, vec![state(5, 0x0f)]).unwrap(),
        ])
        .unwrap();
        let matcher = DescriptorMatcher::default();
        let mut pairs = match_tracks(&matcher, &tracks, 5, 1);
        pairs.sort();
        assert_eq!(pairs, vec![(20, 11), (21, 10)]);
    }

    #[test]
    fn test_match_tracks_skips_same_track() {
        let state = |frame| TrackState::with_feature(frame, Feature::new(0.0, 0.0), Some(desc(7)));
        let tracks =
            TrackSet::from_tracks([Track::from_states(1, vec![state(1), state(4)]).unwrap()])
                .unwrap();
        assert!(match_tracks(&DescriptorMatcher::default(), &tracks, 4, 1).is_empty());
    }
}
