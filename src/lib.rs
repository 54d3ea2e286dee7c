//! Feature track bookkeeping, keyframe selection and loop closure.
//!
//! A [`TrackSet`] stores tracks of per-frame observations together with a
//! lazily rebuilt frame index. The [`KeyframeSelector`] marks keyframes in the
//! set's frame data, and the [`CloseLoops`] strategies stitch track fragments
//! that were split by tracking failures or by revisiting a scene.

pub mod algo;
pub mod config;
pub mod error;
pub mod geometry;
pub mod track;

pub use algo::{
    BadFramesOnly, CloseLoops, ComputeRefHomography, DescriptorMatcher, Exhaustive,
    HomographyGuided, Keyframe, KeyframeSelector, MatchFeatures, MatchSet, MultiMethod,
};
pub use config::{CloseLoopsBuilder, CloseLoopsConfig, StitchingConfig};
pub use error::{Error, Result};
pub use geometry::{FrameToFrameHomography, Homography};
pub use track::{
    BoundingBox, Descriptor, DetectedObject, Feature, FrameData, FrameId, LAST_FRAME, StateData,
    Track, TrackId, TrackLifecycle, TrackSet, TrackState,
};
