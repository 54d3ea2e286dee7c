//! Keyframe selection, feature matching and loop-closure strategies.

mod bad_frames_only;
mod close_loops;
mod compute_ref_homography;
mod exhaustive;
mod homography_guided;
mod keyframe;
mod keyframe_selector;
mod match_features;
mod multi_method;

pub use bad_frames_only::{BadFramesOnly, BadFramesOnlyConfig};
pub use close_loops::CloseLoops;
pub use compute_ref_homography::ComputeRefHomography;
pub use exhaustive::{Exhaustive, ExhaustiveConfig};
pub use homography_guided::{Checkpoint, HomographyGuided, HomographyGuidedConfig};
pub use keyframe::{Keyframe, KeyframeConfig};
pub use keyframe_selector::{KeyframeSelector, KeyframeSelectorConfig};
pub use match_features::{
    DescriptorMatcher, DescriptorMatcherConfig, MatchFeatures, MatchSet, hamming_distance_matrix,
    linear_assignment, match_tracks,
};
pub use multi_method::MultiMethod;
